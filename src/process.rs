//! Child process lifecycle
//!
//! [`ProcessHandle`] wraps one OS child process: launch with output captured
//! to a dated log file, non-blocking liveness probing, and bounded graceful
//! termination (SIGTERM, then SIGKILL after a timeout).
//!
//! Output is redirected to the log file at spawn time, so the child writes
//! straight to disk and can never block on a full pipe.

use std::fmt;
use std::fs::File;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::CommandSpec;
use crate::error::{Error, Result};

/// Which member of the bundle a process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    /// The KF2 dedicated server.
    Server,
    /// The stats scraper depending on the server's web admin.
    Companion,
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Companion => write!(f, "companion"),
        }
    }
}

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Handle created, process not yet spawned.
    NotStarted,
    /// Spawn confirmed by the OS.
    Running,
    /// Graceful stop signalled, exit not yet confirmed.
    Terminating,
    /// Exit observed via wait (graceful or forced).
    Stopped,
    /// Spawn failed.
    Failed,
}

/// One supervised OS child process.
///
/// Owned exclusively by the supervisor; all state transitions happen through
/// its methods.
#[derive(Debug)]
pub struct ProcessHandle {
    role: ProcessRole,
    child: Option<Child>,
    pid: Option<u32>,
    state: ProcessState,
    started_at: DateTime<Utc>,
    exit_status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Launch a child process with stdout and stderr redirected to the given
    /// log file. Returns once the OS confirms the process exists.
    pub fn spawn(role: ProcessRole, spec: &CommandSpec, log_file: File) -> Result<Self> {
        let stderr = log_file.try_clone().map_err(Error::Io)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|source| Error::Spawn {
            role,
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(role = %role, pid, program = %spec.program.display(), "process started");

        Ok(Self {
            role,
            child: Some(child),
            pid,
            state: ProcessState::Running,
            started_at: Utc::now(),
            exit_status: None,
        })
    }

    /// Role of this process.
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// OS process id, if the process was spawned and not yet reaped.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the process was spawned.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Exit status, once observed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Non-blocking liveness probe. Records the exit status the first time
    /// an exit is observed.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                self.state = ProcessState::Stopped;
                false
            }
            Err(e) => {
                warn!(role = %self.role, error = %e, "liveness probe failed");
                false
            }
        }
    }

    /// Gracefully terminate the process: SIGTERM, wait up to `timeout`, then
    /// SIGKILL and wait for exit confirmation.
    ///
    /// Idempotent: terminating an already-stopped handle is a no-op that
    /// returns the recorded exit status.
    pub async fn terminate(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            debug!(role = %self.role, "terminate on stopped handle is a no-op");
            return Ok(self.exit_status);
        };

        // Already exited on its own?
        if let Ok(Some(status)) = child.try_wait() {
            self.record_exit(status);
            return Ok(Some(status));
        }

        self.state = ProcessState::Terminating;
        if let Some(pid) = self.pid {
            debug!(role = %self.role, pid, "sending SIGTERM");
            if let Err(e) = send_sigterm(pid) {
                // Most likely the process exited between try_wait and the
                // signal; fall through to the wait below.
                warn!(role = %self.role, pid, error = %e, "stop signal not delivered");
            }
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(wait_result) => {
                let status = wait_result.map_err(Error::Io)?;
                self.record_exit(status);
                info!(role = %self.role, status = %status, "process stopped");
                Ok(Some(status))
            }
            Err(_) => {
                warn!(
                    role = %self.role,
                    pid = self.pid,
                    timeout_secs = timeout.as_secs(),
                    "graceful stop timed out, force killing"
                );
                child.kill().await.map_err(Error::Io)?;
                let status = child.wait().await.map_err(Error::Io)?;
                self.record_exit(status);
                info!(role = %self.role, status = %status, "process killed");
                Ok(Some(status))
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        self.exit_status = Some(status);
        self.state = ProcessState::Stopped;
    }
}

/// Send SIGTERM via `kill(2)`.
#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    // SAFETY: kill(2) is memory-safe even for a stale PID; the kernel just
    // returns an error code.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::Signal {
            pid,
            source: std::io::Error::last_os_error(),
        })
    }
}

/// Non-unix platforms have no SIGTERM; `terminate` falls through to the
/// timeout and forced kill.
#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<()> {
    Ok(())
}
