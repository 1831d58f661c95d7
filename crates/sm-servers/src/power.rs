//! Power toggling.
//!
//! A host that answers the shell channel is shut down, anything else gets a
//! wake signal. The shell channel doubles as the "is it on" signal, so a host
//! whose ssh daemon is broken while the machine is up is treated like a host
//! that is off: it receives a (harmless) wake signal and no shutdown.

use serde::Serialize;
use sm_common::{ManagerError, Result};
use tracing::{debug, info};

use crate::host::Host;
use crate::remote::{ExecOutcome, RemoteCommand, RemoteExecutor};
use crate::wol::{parse_mac, WakeSignal};

/// Which transition was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    ShutdownIssued,
    WakeSent,
}

pub fn shutdown_command() -> RemoteCommand {
    RemoteCommand::new("shutdown").arg("-h").arg("now")
}

pub struct PowerController<'a> {
    executor: &'a dyn RemoteExecutor,
    wake: &'a dyn WakeSignal,
}

impl<'a> PowerController<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, wake: &'a dyn WakeSignal) -> Self {
        Self { executor, wake }
    }

    pub async fn toggle_power(&self, host: &Host) -> Result<PowerAction> {
        let Some(mac) = host.wake_address()? else {
            return Err(ManagerError::NotFound(format!(
                "Server {} has no MAC address, it cannot be power-cycled remotely",
                host.id()
            )));
        };
        let mac = parse_mac(&mac)?;
        let target = host.ssh_target()?;

        match self.executor.execute(&target, &shutdown_command()).await {
            ExecOutcome::Succeeded(output) if output.success() => {
                info!(host = host.id(), "Shutdown issued");
                Ok(PowerAction::ShutdownIssued)
            }
            // Refused on the remote side, e.g. by sudo
            ExecOutcome::Succeeded(output) => Err(ManagerError::CommandFailed(format!(
                "{}: shutdown {}",
                target,
                output.describe_failure()
            ))),
            // The host closed the channel while going down
            ExecOutcome::Failed(failure) if failure.is_channel_drop() => {
                debug!(host = host.id(), detail = %failure.detail, "Channel dropped during shutdown");
                info!(host = host.id(), "Shutdown issued");
                Ok(PowerAction::ShutdownIssued)
            }
            ExecOutcome::Unreachable => {
                debug!(host = host.id(), "Shell channel not answering, waking instead");
                self.wake.wake(mac).await?;
                info!(host = host.id(), "Wake signal issued");
                Ok(PowerAction::WakeSent)
            }
            ExecOutcome::Failed(failure) => Err(ManagerError::CommandFailed(format!(
                "{}: {}",
                target, failure
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{host_on_memory_fs, FakeExecutor, FakeWake};

    const HOST: &str = "title = \"Rack A\"\nuser = \"root\"\nip = \"10.0.0.5\"\nmac_address = \"aa:bb:cc:00:11:22\"\n";
    const MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22];

    #[tokio::test]
    async fn test_no_wake_address_is_not_found_and_does_nothing() {
        let (host, _fs) =
            host_on_memory_fs::<&str>("title = \"A\"\nip = \"10.0.0.5\"\nmac_address = \"\"\n", &[]);
        let executor = FakeExecutor::answering("");
        let wake = FakeWake::default();

        let result = PowerController::new(&executor, &wake).toggle_power(&host).await;

        assert!(matches!(result, Err(ManagerError::NotFound(_))));
        assert_eq!(executor.probes(), 0);
        assert!(executor.commands().is_empty());
        assert!(wake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_wake_address_does_nothing() {
        let (host, _fs) =
            host_on_memory_fs::<&str>("ip = \"10.0.0.5\"\nmac_address = \"not-a-mac\"\n", &[]);
        let executor = FakeExecutor::answering("");
        let wake = FakeWake::default();

        let result = PowerController::new(&executor, &wake).toggle_power(&host).await;

        assert!(matches!(result, Err(ManagerError::ServerConfiguration(_))));
        assert_eq!(executor.probes(), 0);
        assert!(wake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_listening_host_gets_exactly_one_shutdown() {
        let (host, _fs) = host_on_memory_fs::<&str>(HOST, &[]);
        let executor = FakeExecutor::answering("");
        let wake = FakeWake::default();

        let action = PowerController::new(&executor, &wake)
            .toggle_power(&host)
            .await
            .unwrap();

        assert_eq!(action, PowerAction::ShutdownIssued);
        assert_eq!(executor.commands(), vec![vec!["shutdown", "-h", "now"]]);
        assert!(wake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_channel_counts_as_shutdown() {
        let (host, _fs) = host_on_memory_fs::<&str>(HOST, &[]);
        let executor = FakeExecutor::failing(Some(255), "Connection to 10.0.0.5 closed");
        let wake = FakeWake::default();

        let action = PowerController::new(&executor, &wake)
            .toggle_power(&host)
            .await
            .unwrap();

        assert_eq!(action, PowerAction::ShutdownIssued);
        assert!(wake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_silent_host_gets_exactly_one_wake() {
        let (host, _fs) = host_on_memory_fs::<&str>(HOST, &[]);
        let executor = FakeExecutor::unreachable();
        let wake = FakeWake::default();

        let action = PowerController::new(&executor, &wake)
            .toggle_power(&host)
            .await
            .unwrap();

        assert_eq!(action, PowerAction::WakeSent);
        assert_eq!(wake.sent(), vec![MAC]);
        assert!(executor.commands().is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_shutdown_exit_propagates_without_wake() {
        let (host, _fs) = host_on_memory_fs::<&str>(HOST, &[]);
        let executor = FakeExecutor::exiting(127, "", "sh: shutdown: not found");
        let wake = FakeWake::default();

        let result = PowerController::new(&executor, &wake).toggle_power(&host).await;

        match result {
            Err(ManagerError::CommandFailed(detail)) => {
                assert!(detail.contains("exit status 127"));
                assert!(detail.contains("not found"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(wake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_propagates_without_wake() {
        let (host, _fs) = host_on_memory_fs::<&str>(HOST, &[]);
        let executor = FakeExecutor::failing(None, "failed to run ssh");
        let wake = FakeWake::default();

        let result = PowerController::new(&executor, &wake).toggle_power(&host).await;

        assert!(matches!(result, Err(ManagerError::CommandFailed(_))));
        assert!(wake.sent().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_refused_by_sudo_is_not_reported_as_issued() {
        use crate::remote::SshExecutor;
        use crate::testing::{install_fake_ssh, REFUSING_SHELL};

        let dir = tempfile::tempdir().unwrap();
        let ssh = install_fake_ssh(dir.path(), REFUSING_SHELL);
        let executor = SshExecutor::new(ssh.to_string_lossy());
        let (host, _fs) = host_on_memory_fs::<&str>(
            "user = \"admin\"\nip = \"10.0.0.5\"\nmac_address = \"aa:bb:cc:00:11:22\"\n",
            &[],
        );
        let wake = FakeWake::default();

        let result = PowerController::new(&executor, &wake).toggle_power(&host).await;

        match result {
            Err(ManagerError::CommandFailed(detail)) => {
                assert!(detail.contains("a password is required"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(wake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_twice_while_booting_wakes_twice() {
        let (host, _fs) = host_on_memory_fs::<&str>(HOST, &[]);
        let executor = FakeExecutor::unreachable();
        let wake = FakeWake::default();
        let controller = PowerController::new(&executor, &wake);

        controller.toggle_power(&host).await.unwrap();
        controller.toggle_power(&host).await.unwrap();

        assert_eq!(wake.sent(), vec![MAC, MAC]);
        assert!(executor.commands().is_empty());
    }
}
