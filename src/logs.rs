//! Dated per-stream log files.
//!
//! Each logical output stream (update run, server output, companion output)
//! gets its own file named by the calendar date of the run, e.g.
//! `server_output_20260827.log`. The manager's own log is handled separately
//! by the tracing appender in `main`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::Result;

/// Directory holding dated per-stream log files.
#[derive(Debug, Clone)]
pub struct LogDir {
    root: PathBuf,
}

impl LogDir {
    /// Open (creating if needed) the log directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the dated log file for a stream, without creating it.
    pub fn dated_path(&self, stream: &str) -> PathBuf {
        let date = Local::now().format("%Y%m%d");
        self.root.join(format!("{stream}_{date}.log"))
    }

    /// Create (truncating any same-day file) the dated log file for a
    /// stream, returning the open file and its path.
    pub fn create(&self, stream: &str) -> Result<(File, PathBuf)> {
        let path = self.dated_path(stream);
        let file = File::create(&path)?;
        Ok((file, path))
    }
}
