//! Lifecycle supervisor
//!
//! Owns the two live process handles plus a monotonically increasing
//! generation counter, and enforces the maintenance-cycle ordering:
//! stop everything, run the update, start the server, wait for its web-admin
//! interface to settle, then start the companion.
//!
//! One async mutex serializes every lifecycle transition, so no two cycles
//! can ever interleave; a cycle requested while another is running is
//! rejected, never queued. Status is published as a snapshot behind a
//! read-write lock and can be read from any task at any time.

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::logs::LogDir;
use crate::process::{ProcessHandle, ProcessRole, ProcessState};
use crate::update::UpdateRunner;

/// Lifecycle phase of the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing supervised yet, or everything deliberately stopped.
    Idle,
    /// Terminating the previous generation's processes.
    Stopping,
    /// Update tool running.
    Updating,
    /// Spawning the server process.
    StartingServer,
    /// Waiting for the server's web admin to become reachable.
    SettleDelay,
    /// Spawning the companion process.
    StartingCompanion,
    /// Both processes confirmed started.
    Running,
    /// The cycle failed, or a process died unexpectedly; the bundle stays
    /// down until the next scheduled or manual cycle.
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Stopping => "stopping",
            Self::Updating => "updating",
            Self::StartingServer => "starting_server",
            Self::SettleDelay => "settle_delay",
            Self::StartingCompanion => "starting_companion",
            Self::Running => "running",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Status of one supervised role.
#[derive(Debug, Clone, Serialize)]
pub struct RoleStatus {
    /// Process lifecycle state.
    pub state: ProcessState,
    /// OS process id recorded at spawn.
    pub pid: Option<u32>,
    /// Spawn timestamp.
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl RoleStatus {
    fn of(handle: &ProcessHandle) -> Self {
        Self {
            state: handle.state(),
            pid: handle.pid(),
            started_at: handle.started_at(),
        }
    }
}

/// Read-only snapshot of the supervisor for external monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    /// Current generation; incremented at the start of every cycle.
    pub generation: u64,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Server process status, absent before the first start.
    pub server: Option<RoleStatus>,
    /// Companion process status, absent before the first start.
    pub companion: Option<RoleStatus>,
}

/// Mutable lifecycle state, guarded by the supervisor's mutex.
struct Lifecycle {
    generation: u64,
    server: Option<ProcessHandle>,
    companion: Option<ProcessHandle>,
}

impl Lifecycle {
    fn snapshot(&self, phase: Phase) -> Status {
        Status {
            generation: self.generation,
            phase,
            server: self.server.as_ref().map(RoleStatus::of),
            companion: self.companion.as_ref().map(RoleStatus::of),
        }
    }
}

/// The process supervisor.
pub struct Supervisor {
    config: ManagerConfig,
    logs: LogDir,
    update: UpdateRunner,
    lifecycle: Mutex<Lifecycle>,
    status: RwLock<Status>,
}

impl Supervisor {
    /// Create a supervisor with no processes started.
    pub fn new(config: ManagerConfig, logs: LogDir) -> Self {
        let update = UpdateRunner::new(&config.update);
        Self {
            config,
            logs,
            update,
            lifecycle: Mutex::new(Lifecycle {
                generation: 0,
                server: None,
                companion: None,
            }),
            status: RwLock::new(Status {
                generation: 0,
                phase: Phase::Idle,
                server: None,
                companion: None,
            }),
        }
    }

    /// Read-only status snapshot.
    pub async fn status(&self) -> Status {
        self.status.read().await.clone()
    }

    async fn publish(&self, lifecycle: &Lifecycle, phase: Phase) {
        debug!(generation = lifecycle.generation, phase = %phase, "phase change");
        *self.status.write().await = lifecycle.snapshot(phase);
    }

    /// Stop both supervised processes and clear their handles.
    ///
    /// Waits for a cycle in progress to finish first. Idempotent: calling on
    /// an already-idle supervisor is a safe no-op.
    pub async fn stop_all(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await;
        self.publish(&lifecycle, Phase::Idle).await;
        Ok(())
    }

    /// Run one full maintenance cycle: stop, update, start server, settle
    /// delay, start companion.
    ///
    /// Claims the next generation atomically. If another cycle is already in
    /// progress the call returns [`Error::ReinitInProgress`] without queuing
    /// anything. A spawn failure fails the generation, cleans up partial
    /// state, and is surfaced to the caller; there is no automatic retry.
    pub async fn reinit_all(&self) -> Result<()> {
        let mut lifecycle = self
            .lifecycle
            .try_lock()
            .map_err(|_| Error::ReinitInProgress)?;

        lifecycle.generation += 1;
        let generation = lifecycle.generation;
        info!(generation, "maintenance cycle starting");

        self.publish(&lifecycle, Phase::Stopping).await;
        self.stop_locked(&mut lifecycle).await;

        if self.config.update.enabled {
            self.publish(&lifecycle, Phase::Updating).await;
            let outcome = self
                .update
                .run(&self.config.server.install_dir, &self.logs)
                .await;
            if !outcome.success {
                if self.config.update.failure_fatal {
                    error!(generation, log = %outcome.log_path.display(), "update failed, aborting cycle");
                    self.publish(&lifecycle, Phase::Failed).await;
                    return Err(Error::UpdateFailed {
                        log_path: outcome.log_path,
                    });
                }
                warn!(
                    generation,
                    log = %outcome.log_path.display(),
                    "update failed, starting with the existing install"
                );
            }
        }

        self.publish(&lifecycle, Phase::StartingServer).await;
        match self.spawn_role(ProcessRole::Server) {
            Ok(handle) => lifecycle.server = Some(handle),
            Err(e) => return self.fail_cycle(&mut lifecycle, e).await,
        }

        // The companion connects to the server's web admin; give the server
        // time to bring that interface up before the companion tries.
        self.publish(&lifecycle, Phase::SettleDelay).await;
        tokio::time::sleep(self.config.lifecycle.settle_delay()).await;

        self.publish(&lifecycle, Phase::StartingCompanion).await;
        match self.spawn_role(ProcessRole::Companion) {
            Ok(handle) => lifecycle.companion = Some(handle),
            Err(e) => return self.fail_cycle(&mut lifecycle, e).await,
        }

        self.publish(&lifecycle, Phase::Running).await;
        info!(generation, "maintenance cycle complete, both processes running");
        Ok(())
    }

    /// Liveness check between cycles.
    ///
    /// If a supervised process died outside a deliberate stop, the exit is
    /// logged, the surviving peer is stopped, and the bundle stays down
    /// until the next scheduled or manual cycle. Skipped entirely while a
    /// cycle is running.
    pub async fn probe(&self) {
        let Ok(mut lifecycle) = self.lifecycle.try_lock() else {
            return;
        };

        let mut unexpected_exit = false;
        let generation = lifecycle.generation;
        let Lifecycle {
            server, companion, ..
        } = &mut *lifecycle;
        for handle in [server.as_mut(), companion.as_mut()]
            .into_iter()
            .flatten()
        {
            if !handle.is_alive() {
                error!(
                    generation,
                    role = %handle.role(),
                    exit = ?handle.exit_status(),
                    "process exited unexpectedly, leaving bundle down until next cycle"
                );
                unexpected_exit = true;
            }
        }

        if unexpected_exit {
            self.stop_locked(&mut lifecycle).await;
            self.publish(&lifecycle, Phase::Failed).await;
        }
    }

    async fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        if lifecycle.server.is_none() && lifecycle.companion.is_none() {
            debug!("no supervised processes to stop");
            return;
        }

        info!(generation = lifecycle.generation, "stopping supervised processes");
        let timeout = self.config.lifecycle.stop_timeout();
        for mut handle in [lifecycle.server.take(), lifecycle.companion.take()]
            .into_iter()
            .flatten()
        {
            let role = handle.role();
            if let Err(e) = handle.terminate(timeout).await {
                warn!(role = %role, error = %e, "termination failed");
            }
        }
        info!(generation = lifecycle.generation, "all processes stopped");
    }

    fn spawn_role(&self, role: ProcessRole) -> Result<ProcessHandle> {
        let (spec, stream) = match role {
            ProcessRole::Server => (self.config.server.command(), "server_output"),
            ProcessRole::Companion => (self.config.companion.command(), "companion_output"),
        };
        let (log_file, log_path) = self.logs.create(stream)?;
        debug!(role = %role, log = %log_path.display(), "spawning");
        ProcessHandle::spawn(role, &spec, log_file)
    }

    async fn fail_cycle(&self, lifecycle: &mut Lifecycle, cause: Error) -> Result<()> {
        error!(
            generation = lifecycle.generation,
            error = %cause,
            "maintenance cycle failed, cleaning up partial state"
        );
        self.stop_locked(lifecycle).await;
        self.publish(lifecycle, Phase::Failed).await;
        Err(cause)
    }
}

#[cfg(test)]
mod tests;
