//! Control loop
//!
//! One task owns the coarse tick that drives everything between cycles:
//! the daily schedule check and the liveness probe. Scheduled fires go
//! through the supervisor's non-queuing entry point, so a fire that lands
//! while a cycle is still running is skipped with a warning and the
//! in-progress cycle completes unaffected.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::scheduler::DailySchedule;
use crate::supervisor::Supervisor;

/// Run the control loop until `shutdown` is cancelled, then stop all
/// supervised processes.
pub async fn run(
    supervisor: Arc<Supervisor>,
    mut schedule: DailySchedule,
    tick: Duration,
    shutdown: CancellationToken,
) {
    info!(target_time = %schedule.target(), tick_secs = tick.as_secs(), "control loop running");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {
                if schedule.is_due(Local::now()) {
                    info!("scheduled maintenance time reached");
                    match supervisor.reinit_all().await {
                        Ok(()) => {}
                        Err(Error::ReinitInProgress) => {
                            warn!("scheduled cycle skipped: another cycle is still running");
                        }
                        Err(e) => {
                            error!(error = %e, "scheduled maintenance cycle failed");
                        }
                    }
                } else {
                    supervisor.probe().await;
                }
            }
            _ = shutdown.cancelled() => {
                info!("shutdown requested, stopping control loop");
                break;
            }
        }
    }

    if let Err(e) = supervisor.stop_all().await {
        warn!(error = %e, "error while stopping processes at shutdown");
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}
