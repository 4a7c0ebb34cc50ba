//! One-shot firewall setup
//!
//! Opens the game ports via ufw and installs a TTL-based anti-spoofing drop
//! rule via iptables. Runs once at startup, before the first server start.
//! Failures here are logged as warnings and never block startup; on a box
//! where the rules already exist both tools exit zero anyway.

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{FirewallConfig, PortRule, TtlGuardConfig};

/// Apply the configured firewall rules.
pub async fn apply(config: &FirewallConfig) {
    if !config.enabled {
        info!("firewall setup disabled");
        return;
    }

    for rule in &config.game_ports {
        info!(port = rule.port, protocol = %rule.protocol, "opening game port");
        run_admin("ufw", &ufw_args(rule)).await;
    }

    info!(
        port_range = %config.ttl_guard.port_range,
        ttl_above = config.ttl_guard.ttl_above,
        "installing TTL guard rule"
    );
    run_admin("iptables", &ttl_guard_args(&config.ttl_guard)).await;
}

/// `ufw allow <port>/<protocol>` argument vector.
fn ufw_args(rule: &PortRule) -> Vec<String> {
    vec!["allow".to_string(), format!("{}/{}", rule.port, rule.protocol)]
}

/// iptables argument vector dropping inbound UDP game-port packets with an
/// implausibly high TTL.
fn ttl_guard_args(guard: &TtlGuardConfig) -> Vec<String> {
    vec![
        "-I".to_string(),
        "INPUT".to_string(),
        "-p".to_string(),
        "udp".to_string(),
        "--dport".to_string(),
        guard.port_range.clone(),
        "-m".to_string(),
        "ttl".to_string(),
        "--ttl-gt".to_string(),
        guard.ttl_above.to_string(),
        "--jump".to_string(),
        "DROP".to_string(),
    ]
}

/// Run a privileged command through sudo, logging instead of failing.
async fn run_admin(program: &str, args: &[String]) {
    let result = Command::new("sudo").arg(program).args(args).status().await;
    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            warn!(program, status = %status, "firewall command exited non-zero");
        }
        Err(e) => {
            warn!(program, error = %e, "firewall command could not be run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ufw_args_are_port_slash_protocol() {
        assert_eq!(ufw_args(&PortRule::udp(7777)), vec!["allow", "7777/udp"]);
        assert_eq!(ufw_args(&PortRule::tcp(8080)), vec!["allow", "8080/tcp"]);
    }

    #[test]
    fn ttl_guard_args_match_iptables_contract() {
        let args = ttl_guard_args(&TtlGuardConfig::default());
        assert_eq!(
            args,
            vec![
                "-I", "INPUT", "-p", "udp", "--dport", "7777:7778", "-m", "ttl", "--ttl-gt",
                "200", "--jump", "DROP",
            ]
        );
    }
}
