use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use super::*;
use crate::config::{
    CompanionConfig, DatabaseConfig, FirewallConfig, LifecycleConfig, LogsConfig, ScheduleConfig,
    ServerConfig, UpdateConfig, WebAdminConfig,
};

/// Write an executable shell script into `dir`. Scripts stand in for the
/// real server/companion binaries; they ignore any arguments passed to them.
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Config pointing both roles at long-running scripts, with fast timings and
/// the update step disabled.
fn test_config(dir: &TempDir) -> ManagerConfig {
    let server_script = write_script(dir.path(), "server.sh", "exec sleep 30");
    let companion_script = write_script(dir.path(), "companion.sh", "exec sleep 30");
    ManagerConfig {
        server: ServerConfig {
            install_dir: dir.path().to_path_buf(),
            binary: server_script,
            map: "kf-bioticslab".to_string(),
        },
        companion: CompanionConfig {
            project_dir: dir.path().to_path_buf(),
            runner: companion_script,
            web_admin: WebAdminConfig {
                url: "http://127.0.0.1:8080".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
            database: DatabaseConfig {
                url: "mysql://127.0.0.1:3306".to_string(),
                name: "kf2".to_string(),
                username: "kf2".to_string(),
                password: "secret".to_string(),
            },
            log_level: "info".to_string(),
        },
        update: UpdateConfig {
            enabled: false,
            ..UpdateConfig::default()
        },
        schedule: ScheduleConfig::default(),
        lifecycle: LifecycleConfig {
            settle_delay_ms: 25,
            stop_timeout_secs: 5,
        },
        logs: LogsConfig {
            dir: dir.path().join("logs"),
        },
        firewall: FirewallConfig::default(),
    }
}

fn supervisor(config: ManagerConfig) -> Supervisor {
    let logs = LogDir::new(&config.logs.dir).unwrap();
    Supervisor::new(config, logs)
}

#[tokio::test]
async fn fresh_reinit_starts_both_processes() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    // Full first cycle: stop is a no-op, the update succeeds, then the
    // ordered start runs.
    config.update = UpdateConfig {
        steamcmd: "true".into(),
        enabled: true,
        ..UpdateConfig::default()
    };
    let sup = supervisor(config);

    sup.reinit_all().await.unwrap();

    let status = sup.status().await;
    assert_eq!(status.generation, 1);
    assert_eq!(status.phase, Phase::Running);
    let server = status.server.expect("server status");
    let companion = status.companion.expect("companion status");
    assert_eq!(server.state, ProcessState::Running);
    assert_eq!(companion.state, ProcessState::Running);
    assert!(server.pid.is_some());
    assert!(companion.pid.is_some());

    sup.stop_all().await.unwrap();
}

#[tokio::test]
async fn companion_waits_for_settle_delay() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.lifecycle.settle_delay_ms = 300;
    let sup = supervisor(config);

    let started = Instant::now();
    sup.reinit_all().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));

    let status = sup.status().await;
    let server = status.server.unwrap();
    let companion = status.companion.unwrap();
    let gap = companion.started_at - server.started_at;
    assert!(gap >= chrono::Duration::milliseconds(300), "gap was {gap:?}");

    sup.stop_all().await.unwrap();
}

#[tokio::test]
async fn stop_all_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let sup = supervisor(test_config(&dir));

    // Safe no-op with nothing ever started.
    sup.stop_all().await.unwrap();
    assert_eq!(sup.status().await.phase, Phase::Idle);

    sup.reinit_all().await.unwrap();
    sup.stop_all().await.unwrap();
    sup.stop_all().await.unwrap();

    let status = sup.status().await;
    assert_eq!(status.phase, Phase::Idle);
    assert!(status.server.is_none());
    assert!(status.companion.is_none());
}

#[tokio::test]
async fn reinit_replaces_previous_generation() {
    let dir = TempDir::new().unwrap();
    let sup = supervisor(test_config(&dir));

    sup.reinit_all().await.unwrap();
    let first = sup.status().await;
    sup.reinit_all().await.unwrap();
    let second = sup.status().await;

    assert_eq!(first.generation, 1);
    assert_eq!(second.generation, 2);
    assert_eq!(second.phase, Phase::Running);
    // New generation, new processes.
    assert_ne!(
        first.server.unwrap().pid,
        second.server.as_ref().unwrap().pid
    );

    sup.stop_all().await.unwrap();
}

#[tokio::test]
async fn update_failure_is_nonfatal_by_default() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.update = UpdateConfig {
        steamcmd: "false".into(),
        enabled: true,
        failure_fatal: false,
        ..UpdateConfig::default()
    };
    let sup = supervisor(config);

    sup.reinit_all().await.unwrap();

    let status = sup.status().await;
    assert_eq!(status.phase, Phase::Running);
    assert_eq!(status.server.unwrap().state, ProcessState::Running);
    assert_eq!(status.companion.unwrap().state, ProcessState::Running);

    sup.stop_all().await.unwrap();
}

#[tokio::test]
async fn update_failure_aborts_when_configured_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.update = UpdateConfig {
        steamcmd: "false".into(),
        enabled: true,
        failure_fatal: true,
        ..UpdateConfig::default()
    };
    let sup = supervisor(config);

    let result = sup.reinit_all().await;
    assert!(matches!(result, Err(Error::UpdateFailed { .. })));

    let status = sup.status().await;
    assert_eq!(status.generation, 1);
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.server.is_none());
}

#[tokio::test]
async fn server_spawn_failure_never_starts_companion() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.server.binary = PathBuf::from("/nonexistent/kf2-server");
    // A companion that would leave a marker if it ever ran.
    let marker = dir.path().join("companion-ran");
    config.companion.runner = write_script(
        dir.path(),
        "marking-companion.sh",
        &format!("touch {} && exec sleep 30", marker.display()),
    );
    let sup = supervisor(config);

    let result = sup.reinit_all().await;
    assert!(matches!(
        result,
        Err(Error::Spawn {
            role: ProcessRole::Server,
            ..
        })
    ));

    let status = sup.status().await;
    assert_eq!(status.generation, 1);
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.companion.is_none());
    assert!(!marker.exists(), "companion must not be spawned");
}

#[tokio::test]
async fn companion_spawn_failure_stops_the_server() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.companion.runner = PathBuf::from("/nonexistent/companion");
    let sup = supervisor(config);

    let result = sup.reinit_all().await;
    assert!(matches!(
        result,
        Err(Error::Spawn {
            role: ProcessRole::Companion,
            ..
        })
    ));

    let status = sup.status().await;
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.server.is_none(), "partial state must be cleaned up");
}

#[tokio::test]
async fn concurrent_reinit_is_rejected_not_queued() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.lifecycle.settle_delay_ms = 400;
    let sup = Arc::new(supervisor(config));

    let background = {
        let sup = Arc::clone(&sup);
        tokio::spawn(async move { sup.reinit_all().await })
    };

    // Let the first cycle get into its settle delay, then contend.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let contended = sup.reinit_all().await;
    assert!(matches!(contended, Err(Error::ReinitInProgress)));

    background.await.unwrap().unwrap();

    // The in-progress cycle completed unaffected; nothing was queued.
    let status = sup.status().await;
    assert_eq!(status.generation, 1);
    assert_eq!(status.phase, Phase::Running);

    sup.stop_all().await.unwrap();
}

#[tokio::test]
async fn probe_detects_unexpected_exit_and_leaves_bundle_down() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.companion.runner = write_script(dir.path(), "flaky-companion.sh", "exit 3");
    let sup = supervisor(config);

    sup.reinit_all().await.unwrap();

    // Give the companion time to die, then probe.
    tokio::time::sleep(Duration::from_millis(200)).await;
    sup.probe().await;

    let status = sup.status().await;
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.server.is_none(), "peer is stopped, bundle left down");
    assert!(status.companion.is_none());
}

#[tokio::test]
async fn probe_is_a_noop_while_healthy() {
    let dir = TempDir::new().unwrap();
    let sup = supervisor(test_config(&dir));

    sup.reinit_all().await.unwrap();
    sup.probe().await;

    let status = sup.status().await;
    assert_eq!(status.phase, Phase::Running);
    assert_eq!(status.server.unwrap().state, ProcessState::Running);

    sup.stop_all().await.unwrap();
}

#[tokio::test]
async fn reinit_recovers_after_a_failed_generation() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let binary = config.server.binary.clone();
    let sup = supervisor(config);

    // First cycle fails to spawn: the binary is not executable yet.
    let mut perms = std::fs::metadata(&binary).unwrap().permissions();
    perms.set_mode(0o644);
    std::fs::set_permissions(&binary, perms.clone()).unwrap();

    assert!(sup.reinit_all().await.is_err());
    assert_eq!(sup.status().await.phase, Phase::Failed);

    // Fix the install and run the next cycle on the same supervisor.
    perms.set_mode(0o755);
    std::fs::set_permissions(&binary, perms).unwrap();

    sup.reinit_all().await.unwrap();
    let status = sup.status().await;
    assert_eq!(status.generation, 2);
    assert_eq!(status.phase, Phase::Running);

    sup.stop_all().await.unwrap();
}
