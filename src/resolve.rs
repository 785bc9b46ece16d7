//! Target address resolution (§4.2): maps a team identifier the operator
//! typed in the UI to a reachable host and a human-readable link label.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

const PROBE_PORT: u16 = 1740;
const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Result of a successful resolve: the host to dial and the label the UI
/// shows for the `link` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub host: String,
    pub label: String,
}

fn is_ipv4(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts
        .iter()
        .all(|p| p.parse::<u16>().is_ok_and(|v| v <= 255))
}

/// Resolves `team` to a reachable host, probing candidates in order.
/// Returns `None` if the team string is empty or no candidate answers.
pub async fn resolve(team: &str) -> Option<Resolved> {
    let team = team.trim();
    if team.is_empty() {
        return None;
    }

    if is_ipv4(team) {
        return Some(Resolved {
            host: team.to_string(),
            label: format!("Wi-Fi ({team})"),
        });
    }

    let mut candidates = Vec::new();
    if let Ok(team_num) = team.parse::<u32>() {
        if team_num > 0 {
            candidates.push(format!("roboRIO-{team}-FRC.local"));
        }
    }
    candidates.push("172.22.11.2".to_string());
    candidates.push("127.0.0.1".to_string());

    for host in candidates {
        if probe(&host).await {
            let label = match host.as_str() {
                "127.0.0.1" => "Sim (localhost)".to_string(),
                "172.22.11.2" => "USB (172.22.11.2)".to_string(),
                _ => format!("Wi-Fi ({host})"),
            };
            return Some(Resolved { host, label });
        }
    }
    None
}

async fn probe(host: &str) -> bool {
    matches!(
        timeout(PROBE_TIMEOUT, TcpStream::connect((host, PROBE_PORT))).await,
        Ok(Ok(_))
    )
}
