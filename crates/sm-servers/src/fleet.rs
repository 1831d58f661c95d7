//! The top-level manager: fleet settings, host discovery and request dispatch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sm_common::{EnvConfig, ManagerError, Result};
use sm_settings::{DiskFs, SettingDef, Settings, SettingsFs};
use tracing::{debug, info, warn};

use crate::access::{AccessControl, Doorman};
use crate::action::{Action, ActionOutcome, ActionRequest};
use crate::host::{Host, HOST_SETTINGS_FILE};
use crate::power::{PowerAction, PowerController};
use crate::reachability::{PingProbe, ReachabilityProbe};
use crate::remote::{RemoteExecutor, SshExecutor};
use crate::service::{Service, ServiceStatus, ServiceStatusResolver, SERVICE_SETTINGS_SUFFIX};
use crate::status::{HostStatus, HostStatusResolver};
use crate::wol::{UdpWake, WakeSignal};

pub static FLEET_SETTINGS: &[SettingDef] = &[
    SettingDef::new(
        "title",
        "Title not configured yet",
        "The following phrase is shown as a title for the server manager",
    ),
    SettingDef::new(
        "banner_path",
        "no_path.png",
        "The following path points to the banner image",
    ),
    SettingDef::new(
        "server_dir_path",
        "./servers",
        "Path to the directory containing the configuration directories of all the servers",
    ),
    SettingDef::new(
        "users_path",
        "./custom/users.ini",
        "The following path points to the file where user info is stored",
    ),
    SettingDef::new(
        "groups_path",
        "./custom/groups.ini",
        "The following path points to the file where group info is stored",
    ),
];

const FLEET_HEADER: &str = "General settings for the server manager";

/// External collaborators every request goes through.
#[derive(Clone)]
pub struct Backends {
    pub executor: Arc<dyn RemoteExecutor>,
    pub reachability: Arc<dyn ReachabilityProbe>,
    pub wake: Arc<dyn WakeSignal>,
}

impl Backends {
    pub fn from_config(config: &EnvConfig) -> Self {
        Self {
            executor: Arc::new(SshExecutor::from_config(config)),
            reachability: Arc::new(PingProbe::from_config(config)),
            wake: Arc::new(UdpWake::from_config(config)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceOverview {
    pub id: String,
    pub unique_identifier: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostOverview {
    pub id: String,
    pub unique_identifier: String,
    pub title: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HostStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub services: Vec<ServiceOverview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetOverview {
    pub title: String,
    pub banner_path: String,
    pub hosts: Vec<HostOverview>,
}

pub struct Fleet {
    settings: Settings,
    server_dir: PathBuf,
    fs: Arc<dyn SettingsFs>,
    hosts: BTreeMap<String, Host>,
    backends: Backends,
    access: Box<dyn AccessControl>,
}

impl Fleet {
    /// Open the fleet described by the settings file at `path` on disk.
    pub fn open(path: impl Into<PathBuf>, backends: Backends) -> Result<Self> {
        Self::open_with(path, Arc::new(DiskFs), backends)
    }

    /// Load the fleet settings, then every host directory under
    /// `server_dir_path`. Hidden entries are skipped.
    pub fn open_with(
        path: impl Into<PathBuf>,
        fs: Arc<dyn SettingsFs>,
        backends: Backends,
    ) -> Result<Self> {
        let settings = Settings::open(path, FLEET_HEADER, FLEET_SETTINGS, fs.clone())?;
        let base = settings
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let server_dir = resolve_relative(&base, &settings.get("server_dir_path")?);
        if !fs.is_dir(&server_dir) {
            return Err(ManagerError::NotFound(format!(
                "Directory {} not found!",
                server_dir.display()
            )));
        }

        let mut hosts = BTreeMap::new();
        for entry in fs.read_dir(&server_dir)? {
            if !entry.is_dir || entry.name.starts_with('.') {
                continue;
            }
            let host = Host::open(&server_dir, &entry.name, fs.clone())?;
            hosts.insert(entry.name, host);
        }

        let access = Doorman::new(
            resolve_relative(&base, &settings.get("users_path")?),
            resolve_relative(&base, &settings.get("groups_path")?),
        );
        info!(
            server_dir = %server_dir.display(),
            hosts = hosts.len(),
            "Fleet loaded"
        );

        Ok(Self {
            settings,
            server_dir,
            fs,
            hosts,
            backends,
            access: Box::new(access),
        })
    }

    /// Replace the access-control collaborator.
    pub fn with_access(mut self, access: impl AccessControl + 'static) -> Self {
        self.access = Box::new(access);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn title(&self) -> Result<String> {
        self.settings.get("title")
    }

    pub fn banner_path(&self) -> Result<String> {
        self.settings.get("banner_path")
    }

    pub fn server_dir(&self) -> &Path {
        &self.server_dir
    }

    /// Hosts in id order.
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn host(&self, id: &str) -> Result<&Host> {
        self.hosts
            .get(id)
            .ok_or_else(|| ManagerError::NotFound(format!("Server {} not found", id)))
    }

    /// Create `<server_dir>/<id>/host.settings` filled with defaults.
    pub fn create_host(&mut self, id: &str) -> Result<&Host> {
        validate_id("server", id)?;
        let dir = self.server_dir.join(id);
        if self.fs.is_dir(&dir) || self.fs.is_file(&dir) {
            return Err(ManagerError::UnexpectedState(format!(
                "Server {} already exists",
                id
            )));
        }

        self.fs.create_dir(&dir)?;
        let created = self
            .fs
            .write(&dir.join(HOST_SETTINGS_FILE), "")
            .map_err(ManagerError::from)
            .and_then(|()| Host::open(&self.server_dir, id, self.fs.clone()));
        let host = match created {
            Ok(host) => host,
            Err(e) => {
                // Leave no half-created server behind
                if let Err(cleanup) = self.fs.remove_dir_all(&dir) {
                    warn!(host = id, error = %cleanup, "Could not remove partially created server");
                }
                return Err(e);
            }
        };
        info!(host = id, "Server created");

        let host: &Host = self.hosts.entry(id.to_string()).or_insert(host);
        Ok(host)
    }

    /// Create `<id>.service.settings` in an existing host's directory.
    pub fn create_service(&mut self, host_id: &str, id: &str) -> Result<&Service> {
        validate_id("service", id)?;
        let fs = self.fs.clone();
        let host = self
            .hosts
            .get_mut(host_id)
            .ok_or_else(|| ManagerError::NotFound(format!("Server {} not found", host_id)))?;

        let path = host.dir().join(format!("{}{}", id, SERVICE_SETTINGS_SUFFIX));
        if host.has_service(id) || fs.is_file(&path) || fs.is_dir(&path) {
            return Err(ManagerError::UnexpectedState(format!(
                "Service {} already exists on server {}",
                id, host_id
            )));
        }

        fs.write(&path, "")?;
        let service = Service::open(host.dir(), host_id, id, fs)?;
        host.insert_service(service);
        info!(host = host_id, service = id, "Service created");

        host.service(id)
    }

    pub async fn process_action(&self, request: &ActionRequest) -> Result<ActionOutcome> {
        if !self.access.authorize(request) {
            warn!(action = %request.action, host = %request.host_id, "Request refused");
            return Err(ManagerError::PermissionDenied(format!(
                "{} on server {}",
                request.action, request.host_id
            )));
        }

        let host = self.host(&request.host_id)?;
        debug!(action = %request.action, host = host.id(), "Processing action");

        match request.action {
            Action::PowerButton => self.toggle_power(host).await.map(ActionOutcome::Power),
            Action::HostStatus => self.host_status(host).await.map(ActionOutcome::Host),
            Action::ServiceStatus => {
                let service_id = request.service_id.as_deref().ok_or_else(|| {
                    ManagerError::NotFound(format!(
                        "No service given for {} on server {}",
                        request.action,
                        host.id()
                    ))
                })?;
                let service = host.service(service_id)?;
                self.service_status(host, service)
                    .await
                    .map(ActionOutcome::Service)
            }
        }
    }

    pub async fn toggle_power(&self, host: &Host) -> Result<PowerAction> {
        PowerController::new(&*self.backends.executor, &*self.backends.wake)
            .toggle_power(host)
            .await
    }

    pub async fn host_status(&self, host: &Host) -> Result<HostStatus> {
        HostStatusResolver::new(&*self.backends.executor, &*self.backends.reachability)
            .resolve(host)
            .await
    }

    pub async fn service_status(&self, host: &Host, service: &Service) -> Result<ServiceStatus> {
        ServiceStatusResolver::new(&*self.backends.executor)
            .resolve(host, service)
            .await
    }

    /// Resolve every host and service in order. Resolution failures are
    /// reported per entry; only unreadable settings abort the snapshot.
    pub async fn overview(&self) -> Result<FleetOverview> {
        let mut hosts = Vec::with_capacity(self.hosts.len());

        for host in self.hosts() {
            let (status, error) = split(self.host_status(host).await);

            let mut services = Vec::new();
            for service in host.services() {
                let (status, error) = split(self.service_status(host, service).await);
                services.push(ServiceOverview {
                    id: service.id().to_string(),
                    unique_identifier: service.unique_identifier(),
                    title: service.title()?,
                    status,
                    error,
                });
            }

            hosts.push(HostOverview {
                id: host.id().to_string(),
                unique_identifier: host.unique_identifier().to_string(),
                title: host.title()?,
                address: host.address()?,
                status,
                error,
                services,
            });
        }

        Ok(FleetOverview {
            title: self.title()?,
            banner_path: self.banner_path()?,
            hosts,
        })
    }
}

fn split<T>(result: Result<T>) -> (Option<T>, Option<String>) {
    match result {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e.to_string())),
    }
}

/// Relative paths in the fleet settings are relative to the settings file.
fn resolve_relative(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    base.join(path.strip_prefix(".").unwrap_or(path))
}

/// Ids become directory and file names.
fn validate_id(what: &str, id: &str) -> Result<()> {
    let usable = !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\'])
        && !id.chars().any(|c| c.is_whitespace() || c.is_control());
    if usable {
        Ok(())
    } else {
        Err(ManagerError::UnexpectedState(format!(
            "'{}' is not a valid {} id",
            id, what
        )))
    }
}
