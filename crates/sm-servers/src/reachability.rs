use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sm_common::{EnvConfig, ManagerError, Result};
use tokio::process::Command;
use tracing::debug;

/// Network-level liveness check, independent of the shell channel.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Percentage (0-100) of echo requests that got no reply in time.
    async fn percent_lost(&self, address: &str) -> Result<f64>;
}

/// Probe backed by the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    binary: String,
    count: u32,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(binary: impl Into<String>, count: u32, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            count: count.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &EnvConfig) -> Self {
        Self::new(
            config.ping_binary.clone(),
            config.ping_count,
            Duration::from_secs(config.ping_timeout_secs),
        )
    }

    /// Upper bound for one whole batch, with slack for process startup.
    fn batch_deadline(&self) -> Duration {
        self.timeout * self.count + Duration::from_secs(2)
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new("ping", 3, Duration::from_secs(1))
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn percent_lost(&self, address: &str) -> Result<f64> {
        let child = Command::new(&self.binary)
            .arg("-q")
            .arg("-c")
            .arg(self.count.to_string())
            .arg("-W")
            .arg(self.timeout.as_secs().max(1).to_string())
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.batch_deadline(), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ManagerError::ServerConfiguration(format!(
                    "failed to run {}: {}",
                    self.binary, e
                )));
            }
            Err(_) => {
                debug!(address, "Reachability probe timed out");
                return Ok(100.0);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let lost = parse_packet_loss(&stdout).unwrap_or(100.0);
        debug!(address, lost, "Reachability probe finished");
        Ok(lost)
    }
}

/// Extract the loss percentage from a ping summary such as
/// `3 packets transmitted, 2 received, 33.3333% packet loss, time 2003ms`.
pub fn parse_packet_loss(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let (before, _) = line.split_once("% packet loss")?;
        let number = before
            .rsplit(|c: char| c.is_whitespace() || c == ',')
            .next()?;
        let lost: f64 = number.parse().ok()?;
        Some(lost.clamp(0.0, 100.0))
    })
}
