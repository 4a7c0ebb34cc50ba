//! steamcmd update step
//!
//! Invokes the external update tool against the server install directory,
//! blocking until it exits and streaming its output to a dated log file.
//! The runner itself never retries and reports failure as an outcome, not an
//! error; whether a failed update aborts the cycle is the supervisor's
//! policy decision.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::UpdateConfig;
use crate::logs::LogDir;

/// Name of the dated log stream for update runs.
const UPDATE_LOG_STREAM: &str = "server_update";

/// Result of one update run.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Whether the tool was spawned and exited zero.
    pub success: bool,
    /// Dated log file holding the tool's output.
    pub log_path: PathBuf,
}

/// Blocking steamcmd invoker.
#[derive(Debug, Clone)]
pub struct UpdateRunner {
    steamcmd: PathBuf,
    app_id: u32,
}

impl UpdateRunner {
    /// Build a runner from the update configuration.
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            steamcmd: config.steamcmd.clone(),
            app_id: config.app_id,
        }
    }

    /// steamcmd argument vector for updating `install_dir`.
    pub fn args(&self, install_dir: &Path) -> Vec<String> {
        vec![
            "+force_install_dir".to_string(),
            install_dir.display().to_string(),
            "+login".to_string(),
            "anonymous".to_string(),
            "+app_update".to_string(),
            self.app_id.to_string(),
            "validate".to_string(),
            "+exit".to_string(),
        ]
    }

    /// Run the update tool against `install_dir`, blocking until it exits.
    pub async fn run(&self, install_dir: &Path, logs: &LogDir) -> UpdateOutcome {
        let (log_file, log_path) = match logs.create(UPDATE_LOG_STREAM) {
            Ok(created) => created,
            Err(e) => {
                warn!(error = %e, "cannot create update log file");
                return UpdateOutcome {
                    success: false,
                    log_path: logs.dated_path(UPDATE_LOG_STREAM),
                };
            }
        };
        let stderr = match log_file.try_clone() {
            Ok(clone) => clone,
            Err(e) => {
                warn!(error = %e, "cannot clone update log handle");
                return UpdateOutcome {
                    success: false,
                    log_path,
                };
            }
        };

        info!(
            steamcmd = %self.steamcmd.display(),
            install_dir = %install_dir.display(),
            app_id = self.app_id,
            "starting update"
        );

        let spawned = Command::new(&self.steamcmd)
            .args(self.args(install_dir))
            .current_dir(install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr))
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(steamcmd = %self.steamcmd.display(), error = %e, "update tool could not be spawned");
                return UpdateOutcome {
                    success: false,
                    log_path,
                };
            }
        };

        match child.wait().await {
            Ok(status) if status.success() => {
                info!("update finished");
                UpdateOutcome {
                    success: true,
                    log_path,
                }
            }
            Ok(status) => {
                warn!(status = %status, log = %log_path.display(), "update tool exited non-zero");
                UpdateOutcome {
                    success: false,
                    log_path,
                }
            }
            Err(e) => {
                warn!(error = %e, "could not wait for update tool");
                UpdateOutcome {
                    success: false,
                    log_path,
                }
            }
        }
    }
}
