//! Recording stand-ins for the remote, reachability and wake seams.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sm_common::{ManagerError, Result};
use sm_settings::MemoryFs;

use crate::host::Host;
use crate::reachability::ReachabilityProbe;
use crate::remote::{
    ExecFailure, ExecOutcome, RemoteCommand, RemoteExecutor, RemoteOutput, SshTarget,
};
use crate::wol::{MacAddress, WakeSignal};

/// Host `rack-a` under `/servers` with the given `host.settings` content and
/// `(service id, service file content)` pairs.
pub fn host_on_memory_fs<S: AsRef<str>>(
    host_settings: &str,
    services: &[(&str, S)],
) -> (Host, Arc<MemoryFs>) {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file("/servers/rack-a/host.settings", host_settings);
    for (id, content) in services {
        fs.add_file(
            format!("/servers/rack-a/{}.service.settings", id),
            content.as_ref(),
        );
    }
    let host = Host::open(Path::new("/servers"), "rack-a", fs.clone()).unwrap();
    (host, fs)
}

/// Stand-in ssh client that runs the last argument through a local shell,
/// the way a remote login shell would.
#[cfg(unix)]
pub const REMOTE_SHELL: &str = "for last; do :; done\nexec /bin/sh -c \"$last\"";

/// Stand-in ssh client that answers the liveness probe and refuses every
/// other command the way `sudo -n` does without a password rule.
#[cfg(unix)]
pub const REFUSING_SHELL: &str = "for last; do :; done\n\
case \"$last\" in\n\
  \"echo servermanager-alive\") exec /bin/sh -c \"$last\" ;;\n\
  *) echo \"sudo: a password is required\" >&2; exit 1 ;;\n\
esac";

/// Write an executable `ssh` script with `body` into `dir`.
#[cfg(unix)]
pub fn install_fake_ssh(dir: &Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ssh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn alive() -> ExecOutcome {
    ExecOutcome::Succeeded(RemoteOutput::new(0, "servermanager-alive\n"))
}

#[derive(Debug)]
pub struct FakeExecutor {
    probe: ExecOutcome,
    command: ExecOutcome,
    probes: AtomicUsize,
    commands: Mutex<Vec<Vec<String>>>,
}

impl FakeExecutor {
    fn with(probe: ExecOutcome, command: ExecOutcome) -> Self {
        Self {
            probe,
            command,
            probes: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Answers the probe, and every command with `output`.
    pub fn answering(output: &str) -> Self {
        Self::exiting(0, output, "")
    }

    /// Answers the probe; every command exits with `status`.
    pub fn exiting(status: i32, stdout: &str, stderr: &str) -> Self {
        Self::with(
            alive(),
            ExecOutcome::Succeeded(RemoteOutput::new(status, stdout).with_stderr(stderr)),
        )
    }

    pub fn unreachable() -> Self {
        Self::with(ExecOutcome::Unreachable, ExecOutcome::Unreachable)
    }

    /// Answers the probe, then fails every command.
    pub fn failing(status: Option<i32>, detail: &str) -> Self {
        Self::with(
            alive(),
            ExecOutcome::Failed(ExecFailure {
                status,
                detail: detail.to_string(),
            }),
        )
    }

    /// The ssh client itself cannot be run.
    pub fn probe_failing(detail: &str) -> Self {
        let failed = ExecOutcome::Failed(ExecFailure {
            status: None,
            detail: detail.to_string(),
        });
        Self::with(failed.clone(), failed)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Commands that got past the probe.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn probe(&self, _target: &SshTarget) -> ExecOutcome {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probe.clone()
    }

    async fn execute(&self, target: &SshTarget, command: &RemoteCommand) -> ExecOutcome {
        match self.probe(target).await {
            ExecOutcome::Succeeded(_) => {}
            other => return other,
        }
        self.commands
            .lock()
            .unwrap()
            .push(command.parts().to_vec());
        self.command.clone()
    }
}

#[derive(Debug)]
pub struct FakeReachability {
    lost: Option<f64>,
    addresses: Mutex<Vec<String>>,
}

impl FakeReachability {
    pub fn losing(percent: f64) -> Self {
        Self {
            lost: Some(percent),
            addresses: Mutex::new(Vec::new()),
        }
    }

    /// The ping binary cannot be run.
    pub fn broken() -> Self {
        Self {
            lost: None,
            addresses: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.addresses.lock().unwrap().len()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReachabilityProbe for FakeReachability {
    async fn percent_lost(&self, address: &str) -> Result<f64> {
        self.addresses.lock().unwrap().push(address.to_string());
        self.lost
            .ok_or_else(|| ManagerError::ServerConfiguration("ping not available".to_string()))
    }
}

#[derive(Debug, Default)]
pub struct FakeWake {
    sent: Mutex<Vec<MacAddress>>,
}

impl FakeWake {
    pub fn sent(&self) -> Vec<MacAddress> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WakeSignal for FakeWake {
    async fn wake(&self, mac: MacAddress) -> Result<()> {
        self.sent.lock().unwrap().push(mac);
        Ok(())
    }
}
