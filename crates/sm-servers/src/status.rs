use std::fmt;

use serde::Serialize;
use sm_common::{ManagerError, Result};
use tracing::debug;

use crate::host::Host;
use crate::reachability::ReachabilityProbe;
use crate::remote::{ExecOutcome, RemoteExecutor};

/// Power/readiness state of a host, derived fresh on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    /// No evidence of life.
    Off,
    /// Answers echo requests but not the shell channel (yet).
    Running,
    /// Answers the shell channel.
    Listening,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Running => f.write_str("running"),
            Self::Listening => f.write_str("listening"),
        }
    }
}

/// What the shell-channel liveness probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellProbe {
    Answered,
    Silent,
}

/// Combine both probe results. `percent_lost` is only consulted for a
/// silent shell channel; `None` means the echo probe was not run.
pub fn classify(shell: ShellProbe, percent_lost: Option<f64>) -> HostStatus {
    match (shell, percent_lost) {
        (ShellProbe::Answered, _) => HostStatus::Listening,
        (ShellProbe::Silent, Some(lost)) if lost < 100.0 => HostStatus::Running,
        (ShellProbe::Silent, _) => HostStatus::Off,
    }
}

/// Runs the shell probe first and falls back to the echo probe only when
/// the shell channel stays silent.
pub struct HostStatusResolver<'a> {
    executor: &'a dyn RemoteExecutor,
    reachability: &'a dyn ReachabilityProbe,
}

impl<'a> HostStatusResolver<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, reachability: &'a dyn ReachabilityProbe) -> Self {
        Self {
            executor,
            reachability,
        }
    }

    pub async fn resolve(&self, host: &Host) -> Result<HostStatus> {
        let target = host.ssh_target()?;

        let shell = match self.executor.probe(&target).await {
            ExecOutcome::Succeeded(_) => ShellProbe::Answered,
            ExecOutcome::Unreachable => ShellProbe::Silent,
            ExecOutcome::Failed(failure) => {
                return Err(ManagerError::ServerConfiguration(format!(
                    "shell probe for {} could not run: {}",
                    target, failure
                )));
            }
        };

        let percent_lost = match shell {
            ShellProbe::Answered => None,
            ShellProbe::Silent => Some(self.reachability.percent_lost(target.address()).await?),
        };

        let status = classify(shell, percent_lost);
        debug!(host = host.id(), %status, ?percent_lost, "Host status resolved");
        Ok(status)
    }
}
