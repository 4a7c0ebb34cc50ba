//! Error types for the supervisor.

use std::path::PathBuf;

use thiserror::Error;

use crate::process::ProcessRole;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Supervisor error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not create a child process. Fatal to the current lifecycle
    /// cycle; the supervisor cleans up any partially started processes.
    #[error("failed to spawn {role} process `{program}`: {source}")]
    Spawn {
        /// Which role failed to start.
        role: ProcessRole,
        /// Program that could not be launched.
        program: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The external update tool failed and `update.failure_fatal` is set.
    /// With the default policy an update failure is only logged.
    #[error("server update failed, see {log_path}")]
    UpdateFailed {
        /// Dated log file with the update tool's output.
        log_path: PathBuf,
    },

    /// Could not deliver a stop signal to a supervised process.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        /// Target process ID.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A lifecycle cycle is already running. The request is rejected, never
    /// queued, so two cycles cannot interleave.
    #[error("a lifecycle cycle is already in progress")]
    ReinitInProgress,

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure outside of process spawning (log files, waits).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
