//! kf2-manager - process supervisor for a Killing Floor 2 server bundle
//!
//! Supervises two OS processes across a daily maintenance cycle:
//! - the KF2 dedicated server (long running)
//! - a companion stats scraper that talks to the server's web-admin interface
//!
//! The crate provides:
//! - Process: spawning, liveness probing, bounded graceful termination
//! - Supervisor: the lifecycle state machine (stop, update, ordered restart)
//! - Scheduler: a once-per-calendar-day wall-clock trigger
//! - Update: blocking steamcmd invocation with dated log capture
//! - Control: the single control loop tying ticks and probes together

#![warn(missing_docs)]

pub mod config;
pub mod control;
pub mod error;
pub mod firewall;
pub mod logs;
pub mod process;
pub mod scheduler;
pub mod supervisor;
pub mod update;

pub use config::{CommandSpec, ManagerConfig};
pub use error::{Error, Result};
pub use logs::LogDir;
pub use process::{ProcessHandle, ProcessRole, ProcessState};
pub use scheduler::DailySchedule;
pub use supervisor::{Phase, RoleStatus, Status, Supervisor};
pub use update::{UpdateOutcome, UpdateRunner};
