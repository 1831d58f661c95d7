use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use sm_common::{ManagerError, Result};
use sm_settings::{SettingDef, Settings, SettingsFs};
use tracing::debug;

use crate::host::Host;
use crate::remote::{ExecOutcome, RemoteCommand, RemoteExecutor};

/// Suffix of a service settings file inside its host directory.
pub const SERVICE_SETTINGS_SUFFIX: &str = ".service.settings";

pub static SERVICE_SETTINGS: &[SettingDef] = &[
    SettingDef::new(
        "title",
        "Title for service not configured yet",
        "The following phrase is shown as a title for the service",
    ),
    SettingDef::new(
        "unit",
        "",
        "Name of the unit managed by the service manager, e.g. nginx.service",
    ),
    SettingDef::new(
        "manager",
        "systemd",
        "Type of the service manager on the server (supported: systemd)",
    ),
];

/// Service managers a status query can be phrased for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManagerKind {
    Systemd,
}

impl ServiceManagerKind {
    pub fn status_command(self, unit: &str) -> RemoteCommand {
        match self {
            Self::Systemd => RemoteCommand::new("systemctl").arg("is-active").arg(unit),
        }
    }

    /// Whether the answer to [`status_command`](Self::status_command) reports
    /// the unit as active.
    pub fn reports_active(self, output: &str) -> bool {
        match self {
            Self::Systemd => output.lines().any(|line| line.trim() == "active"),
        }
    }
}

impl FromStr for ServiceManagerKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "systemd" => Ok(Self::Systemd),
            other => Err(ManagerError::ServiceConfiguration(format!(
                "unsupported service manager '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Stopped,
    Running,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// A unit run by a service manager on exactly one host.
#[derive(Debug)]
pub struct Service {
    id: String,
    host_id: String,
    settings: Settings,
}

impl Service {
    /// Open `<host_dir>/<id>.service.settings`, which must exist.
    pub fn open(host_dir: &Path, host_id: &str, id: &str, fs: Arc<dyn SettingsFs>) -> Result<Self> {
        let settings = Settings::open(
            host_dir.join(format!("{}{}", id, SERVICE_SETTINGS_SUFFIX)),
            format!("Settings for service with id {}", id),
            SERVICE_SETTINGS,
            fs,
        )?;
        Ok(Self {
            id: id.to_string(),
            host_id: host_id.to_string(),
            settings,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Anchor used by presentation code, unique across the fleet.
    pub fn unique_identifier(&self) -> String {
        format!("{}-{}", self.id, self.host_id)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn title(&self) -> Result<String> {
        self.settings.get("title")
    }

    /// Underlying service-manager identifier, `None` when unset.
    pub fn unit(&self) -> Result<Option<String>> {
        let unit = self.settings.get("unit")?;
        let unit = unit.trim();
        Ok((!unit.is_empty()).then(|| unit.to_string()))
    }

    pub fn manager(&self) -> Result<ServiceManagerKind> {
        self.settings.get("manager")?.parse()
    }
}

/// Asks a service's host for the state of its unit.
pub struct ServiceStatusResolver<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> ServiceStatusResolver<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// `Stopped` without a unit or when the host does not answer; an
    /// unsupported manager type is an error, never `Stopped`.
    pub async fn resolve(&self, host: &Host, service: &Service) -> Result<ServiceStatus> {
        let Some(unit) = service.unit()? else {
            return Ok(ServiceStatus::Stopped);
        };
        let kind = service.manager()?;
        let target = host.ssh_target()?;

        match self.executor.execute(&target, &kind.status_command(&unit)).await {
            // An answer on stdout counts even with a non-zero exit
            ExecOutcome::Succeeded(output)
                if !output.success() && output.stdout.trim().is_empty() =>
            {
                Err(ManagerError::CommandFailed(format!(
                    "{}: {}",
                    target,
                    output.describe_failure()
                )))
            }
            ExecOutcome::Succeeded(output) => {
                let status = if kind.reports_active(&output.stdout) {
                    ServiceStatus::Running
                } else {
                    ServiceStatus::Stopped
                };
                debug!(host = host.id(), service = service.id(), %status, "Service status resolved");
                Ok(status)
            }
            ExecOutcome::Unreachable => {
                debug!(host = host.id(), service = service.id(), "Host unreachable, service stopped");
                Ok(ServiceStatus::Stopped)
            }
            ExecOutcome::Failed(failure) => Err(ManagerError::CommandFailed(format!(
                "{}: {}",
                target, failure
            ))),
        }
    }
}
