//! Manager configuration
//!
//! Loaded once at startup from a TOML file, with serde defaults for every
//! optional field and environment overrides for secrets. The supervisor core
//! treats the loaded config as read-only input.
//!
//! Supervised commands are always built as [`CommandSpec`] argument vectors,
//! never as shell strings, so credentials and URLs coming from configuration
//! can never be shell-interpreted.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the web-admin password.
pub const ENV_WEB_ADMIN_PASSWORD: &str = "KF2_WEB_ADMIN_PASSWORD";
/// Environment variable overriding the database password.
pub const ENV_DATABASE_PASSWORD: &str = "KF2_DATABASE_PASSWORD";

/// A fully resolved command invocation: program plus literal argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable path.
    pub program: PathBuf,
    /// Argument vector, passed through without shell interpretation.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
}

/// Root configuration for the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Dedicated server process.
    pub server: ServerConfig,
    /// Companion stats scraper process.
    pub companion: CompanionConfig,
    /// steamcmd update step.
    #[serde(default)]
    pub update: UpdateConfig,
    /// Daily maintenance schedule.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Lifecycle timing knobs.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Log output locations.
    #[serde(default)]
    pub logs: LogsConfig,
    /// One-shot firewall setup.
    #[serde(default)]
    pub firewall: FirewallConfig,
}

impl ManagerConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override secrets from the environment (populated from `.env` via
    /// dotenvy at startup), so passwords need not live in the TOML file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_WEB_ADMIN_PASSWORD) {
            self.companion.web_admin.password = value;
        }
        if let Ok(value) = std::env::var(ENV_DATABASE_PASSWORD) {
            self.companion.database.password = value;
        }
    }
}

/// Dedicated server launch parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server install directory (also the steamcmd target).
    pub install_dir: PathBuf,
    /// Server binary, relative to the install directory.
    #[serde(default = "default_server_binary")]
    pub binary: PathBuf,
    /// Map the server boots into.
    #[serde(default = "default_map")]
    pub map: String,
}

fn default_server_binary() -> PathBuf {
    PathBuf::from("Binaries/Win64/KFGameSteamServer.bin.x86_64")
}

fn default_map() -> String {
    "kf-bioticslab".to_string()
}

impl ServerConfig {
    /// Build the server launch command.
    pub fn command(&self) -> CommandSpec {
        CommandSpec {
            program: self.install_dir.join(&self.binary),
            args: vec![self.map.clone()],
            cwd: Some(self.install_dir.clone()),
            env: Vec::new(),
        }
    }
}

/// Companion scraper launch parameters.
///
/// The companion is built and run from its own project directory and receives
/// the web-admin and database parameters as positional arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Companion project directory.
    pub project_dir: PathBuf,
    /// Program used to build and run the companion.
    #[serde(default = "default_runner")]
    pub runner: PathBuf,
    /// Web-admin endpoint the companion scrapes.
    pub web_admin: WebAdminConfig,
    /// Database the companion writes to.
    pub database: DatabaseConfig,
    /// Value for the companion's `RUST_LOG`.
    #[serde(default = "default_companion_log_level")]
    pub log_level: String,
}

fn default_runner() -> PathBuf {
    PathBuf::from("cargo")
}

fn default_companion_log_level() -> String {
    "info".to_string()
}

impl CompanionConfig {
    /// Build the companion launch command.
    pub fn command(&self) -> CommandSpec {
        CommandSpec {
            program: self.runner.clone(),
            args: vec![
                "run".to_string(),
                "--release".to_string(),
                "--".to_string(),
                self.web_admin.url.clone(),
                self.web_admin.username.clone(),
                self.web_admin.password.clone(),
                self.database.url.clone(),
                self.database.name.clone(),
                self.database.username.clone(),
                self.database.password.clone(),
            ],
            cwd: Some(self.project_dir.clone()),
            env: vec![("RUST_LOG".to_string(), self.log_level.clone())],
        }
    }
}

/// Server web-admin endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAdminConfig {
    /// Web-admin base URL.
    pub url: String,
    /// Web-admin username.
    pub username: String,
    /// Web-admin password. Overridable via `KF2_WEB_ADMIN_PASSWORD`.
    #[serde(default)]
    pub password: String,
}

/// External data store the companion writes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database server URL.
    pub url: String,
    /// Database name.
    pub name: String,
    /// Database username.
    pub username: String,
    /// Database password. Overridable via `KF2_DATABASE_PASSWORD`.
    #[serde(default)]
    pub password: String,
}

/// steamcmd update step configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Path to the steamcmd binary.
    #[serde(default = "default_steamcmd")]
    pub steamcmd: PathBuf,
    /// Steam application id to update.
    #[serde(default = "default_app_id")]
    pub app_id: u32,
    /// Whether the update step runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether a failed update aborts the cycle. Default: the failure is
    /// logged and startup proceeds with the existing install, so a transient
    /// Steam outage does not keep the server offline.
    #[serde(default)]
    pub failure_fatal: bool,
}

fn default_steamcmd() -> PathBuf {
    PathBuf::from("/usr/games/steamcmd")
}

fn default_app_id() -> u32 {
    232_130
}

fn default_true() -> bool {
    true
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            steamcmd: default_steamcmd(),
            app_id: default_app_id(),
            enabled: true,
            failure_fatal: false,
        }
    }
}

/// Daily maintenance schedule (local wall clock).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Hour of day (0-23).
    #[serde(default = "default_hour")]
    pub hour: u32,
    /// Minute of hour (0-59).
    #[serde(default)]
    pub minute: u32,
    /// Control loop tick interval in seconds. Coarse granularity is enough;
    /// the schedule tracks the last-fired date, not timestamps.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_hour() -> u32 {
    6
}

fn default_tick_secs() -> u64 {
    10
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: default_hour(),
            minute: 0,
            tick_secs: default_tick_secs(),
        }
    }
}

impl ScheduleConfig {
    /// Tick interval as a [`Duration`].
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

/// Lifecycle timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Settle delay between server start and companion start, in
    /// milliseconds. Gives the server's web-admin interface time to come up
    /// before the companion connects to it.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Grace period after SIGTERM before a process is force-killed, in
    /// seconds. Bounds worst-case shutdown latency.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_settle_delay_ms() -> u64 {
    20_000
}

fn default_stop_timeout_secs() -> u64 {
    30
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl LifecycleConfig {
    /// Settle delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Stop timeout as a [`Duration`].
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Log output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Directory holding the manager log and dated per-stream logs.
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

/// One-shot firewall setup, applied before the first server start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Whether firewall setup runs at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Game ports opened via ufw.
    #[serde(default = "default_game_ports")]
    pub game_ports: Vec<PortRule>,
    /// TTL-based anti-spoofing drop rule.
    #[serde(default)]
    pub ttl_guard: TtlGuardConfig,
}

fn default_game_ports() -> Vec<PortRule> {
    vec![
        PortRule::udp(7777),
        PortRule::udp(27015),
        PortRule::tcp(8080),
        PortRule::udp(20560),
    ]
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            game_ports: default_game_ports(),
            ttl_guard: TtlGuardConfig::default(),
        }
    }
}

/// A single port/protocol pair opened at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRule {
    /// Port number.
    pub port: u16,
    /// Protocol (`udp` or `tcp`).
    pub protocol: String,
}

impl PortRule {
    /// UDP port rule.
    pub fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: "udp".to_string(),
        }
    }

    /// TCP port rule.
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: "tcp".to_string(),
        }
    }
}

/// Drop inbound game-port packets with an implausibly high TTL, a cheap
/// filter against spoofed traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlGuardConfig {
    /// UDP destination port range, iptables `low:high` syntax.
    #[serde(default = "default_ttl_port_range")]
    pub port_range: String,
    /// Packets with TTL strictly above this value are dropped.
    #[serde(default = "default_ttl_above")]
    pub ttl_above: u16,
}

fn default_ttl_port_range() -> String {
    "7777:7778".to_string()
}

fn default_ttl_above() -> u16 {
    200
}

impl Default for TtlGuardConfig {
    fn default() -> Self {
        Self {
            port_range: default_ttl_port_range(),
            ttl_above: default_ttl_above(),
        }
    }
}
