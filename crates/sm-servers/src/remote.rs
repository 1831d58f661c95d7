//! Remote command execution over ssh.
//!
//! Every command is preceded by a liveness probe on the same channel. A host
//! that does not answer the probe is reported as `Unreachable` and the real
//! command is never sent.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sm_common::{EnvConfig, ManagerError, Result};
use tokio::process::Command;
use tracing::debug;

/// Marker echoed by the liveness probe.
const PROBE_MARKER: &str = "servermanager-alive";

/// ssh reserves this exit status for its own (connection) errors.
const SSH_CHANNEL_ERROR: i32 = 255;

/// `user@address` of a remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    user: String,
    address: String,
}

impl SshTarget {
    /// Both parts must be non-empty, free of whitespace and must not look
    /// like an ssh option.
    pub fn new(user: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        let user = user.into();
        let address = address.into();
        for (what, value) in [("user", &user), ("address", &address)] {
            if value.is_empty() {
                return Err(ManagerError::ServerConfiguration(format!(
                    "remote {} is not configured",
                    what
                )));
            }
            if value.starts_with('-') || value.contains(char::is_whitespace) || value.contains('@')
            {
                return Err(ManagerError::ServerConfiguration(format!(
                    "remote {} '{}' is not usable",
                    what, value
                )));
            }
        }
        Ok(Self { user, address })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_root(&self) -> bool {
        self.user == "root"
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.address)
    }
}

/// A program and its arguments, each transmitted as one literal word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    parts: Vec<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            parts: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.parts.push(arg.into());
        self
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Remote shell line: every part quoted, elevated through `sudo -n` unless
    /// the target already is root.
    pub fn to_shell_line(&self, target: &SshTarget) -> String {
        let mut words: Vec<&str> = Vec::with_capacity(self.parts.len() + 3);
        if !target.is_root() {
            words.extend(["sudo", "-n", "--"]);
        }
        words.extend(self.parts.iter().map(String::as_str));
        shell_words::join(words)
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(&self.parts))
    }
}

/// Why a command did not produce a usable result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecFailure {
    /// Exit status of the ssh client, `None` if it could not be run at all.
    pub status: Option<i32>,
    pub detail: String,
}

impl ExecFailure {
    /// The channel was closed under the command, e.g. by the host powering off.
    pub fn is_channel_drop(&self) -> bool {
        self.status == Some(SSH_CHANNEL_ERROR)
    }
}

impl fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "exit status {}: {}", code, self.detail),
            None => write!(f, "{}", self.detail),
        }
    }
}

/// What a remote command answered. A non-zero `status` is still an answer:
/// `systemctl is-active` reports inactive units that way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn new(status: i32, stdout: impl Into<String>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// `exit status N: <stderr>` for error messages.
    pub fn describe_failure(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit status {}", self.status)
        } else {
            format!("exit status {}: {}", self.status, stderr)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The remote side ran the command.
    Succeeded(RemoteOutput),
    /// The host did not answer the shell channel.
    Unreachable,
    Failed(ExecFailure),
}

impl ExecOutcome {
    /// Collapse into a plain result: `Unreachable` becomes `NotRunning`,
    /// `Failed` and non-zero exits become `CommandFailed`.
    pub fn into_result(self, target: &SshTarget) -> Result<String> {
        match self {
            Self::Succeeded(output) if output.success() => Ok(output.stdout),
            Self::Succeeded(output) => Err(ManagerError::CommandFailed(format!(
                "{}: {}",
                target,
                output.describe_failure()
            ))),
            Self::Unreachable => Err(ManagerError::NotRunning(format!(
                "{} does not answer the shell channel",
                target
            ))),
            Self::Failed(failure) => Err(ManagerError::CommandFailed(format!(
                "{}: {}",
                target, failure
            ))),
        }
    }
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Liveness probe: `Succeeded` iff the host answers the shell channel.
    async fn probe(&self, target: &SshTarget) -> ExecOutcome;

    /// Probe, then run `command` with administrative privileges.
    async fn execute(&self, target: &SshTarget, command: &RemoteCommand) -> ExecOutcome;
}

/// Executor that shells out to the local ssh client with key-based,
/// non-interactive authentication.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    binary: String,
    identity: Option<PathBuf>,
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            identity: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &EnvConfig) -> Self {
        Self {
            binary: config.ssh_binary.clone(),
            identity: config.ssh_identity.clone(),
            connect_timeout: Duration::from_secs(config.ssh_connect_timeout_secs),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    fn command(&self, target: &SshTarget, shell_line: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        if let Some(identity) = &self.identity {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(target.to_string())
            .arg(shell_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, target: &SshTarget, shell_line: &str) -> ExecOutcome {
        let output = match self.command(target, shell_line).output().await {
            Ok(output) => output,
            Err(e) => {
                return ExecOutcome::Failed(ExecFailure {
                    status: None,
                    detail: format!("failed to run {}: {}", self.binary, e),
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(SSH_CHANNEL_ERROR) => ExecOutcome::Failed(ExecFailure {
                status: Some(SSH_CHANNEL_ERROR),
                detail: stderr,
            }),
            Some(status) => ExecOutcome::Succeeded(
                RemoteOutput::new(status, String::from_utf8_lossy(&output.stdout))
                    .with_stderr(stderr),
            ),
            None => ExecOutcome::Failed(ExecFailure {
                status: None,
                detail: format!("{} terminated by a signal", self.binary),
            }),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn probe(&self, target: &SshTarget) -> ExecOutcome {
        let line = shell_words::join(["echo", PROBE_MARKER]);
        match self.run(target, &line).await {
            ExecOutcome::Succeeded(output) if output.success() && !output.stdout.trim().is_empty() => {
                ExecOutcome::Succeeded(output)
            }
            ExecOutcome::Failed(failure) if failure.status.is_none() => {
                ExecOutcome::Failed(failure)
            }
            _ => {
                debug!(target = %target, "Shell channel not answering");
                ExecOutcome::Unreachable
            }
        }
    }

    async fn execute(&self, target: &SshTarget, command: &RemoteCommand) -> ExecOutcome {
        match self.probe(target).await {
            ExecOutcome::Succeeded(_) => {}
            other => return other,
        }

        debug!(target = %target, command = %command, "Executing remote command");
        self.run(target, &command.to_shell_line(target)).await
    }
}
