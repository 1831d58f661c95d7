use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sm_common::{ManagerError, Result};
use sm_settings::{SettingDef, Settings, SettingsFs};
use tracing::debug;

use crate::remote::SshTarget;
use crate::service::{Service, SERVICE_SETTINGS_SUFFIX};

/// Settings file inside every host directory.
pub const HOST_SETTINGS_FILE: &str = "host.settings";

pub static HOST_SETTINGS: &[SettingDef] = &[
    SettingDef::new(
        "title",
        "Title for server not configured yet",
        "The following phrase is shown as a title for the server",
    ),
    SettingDef::new(
        "user",
        "root",
        "The user used for administrative commands via ssh",
    ),
    SettingDef::new(
        "ip",
        "",
        "The IP Address of the server, used for connecting via ssh, ping etc.",
    ),
    SettingDef::new(
        "mac_address",
        "",
        "The MAC Address of the server, used for starting the server via wake on lan",
    ),
];

/// A managed machine: one directory holding its settings and its services.
#[derive(Debug)]
pub struct Host {
    id: String,
    dir: PathBuf,
    settings: Settings,
    services: BTreeMap<String, Service>,
}

impl Host {
    /// Open `<server_dir>/<id>`, which must contain `host.settings`, and load
    /// every `*.service.settings` next to it.
    pub fn open(server_dir: &Path, id: &str, fs: Arc<dyn SettingsFs>) -> Result<Self> {
        let dir = server_dir.join(id);
        if !fs.is_dir(&dir) {
            return Err(ManagerError::NotFound(format!(
                "Directory {} not found!",
                dir.display()
            )));
        }

        let settings = Settings::open(
            dir.join(HOST_SETTINGS_FILE),
            format!("Settings for server with id {}", id),
            HOST_SETTINGS,
            fs.clone(),
        )?;

        let mut services = BTreeMap::new();
        for entry in fs.read_dir(&dir)? {
            if entry.is_dir {
                continue;
            }
            let Some(service_id) = entry.name.strip_suffix(SERVICE_SETTINGS_SUFFIX) else {
                continue;
            };
            if service_id.is_empty() {
                continue;
            }
            let service = Service::open(&dir, id, service_id, fs.clone())?;
            services.insert(service_id.to_string(), service);
        }
        debug!(host = id, services = services.len(), "Host loaded");

        Ok(Self {
            id: id.to_string(),
            dir,
            settings,
            services,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Anchor used by presentation code.
    pub fn unique_identifier(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn title(&self) -> Result<String> {
        self.settings.get("title")
    }

    pub fn user(&self) -> Result<String> {
        self.settings.get("user")
    }

    pub fn address(&self) -> Result<String> {
        self.settings.get("ip")
    }

    /// Hardware wake address; `None` when unset, meaning the host cannot be
    /// powered on remotely.
    pub fn wake_address(&self) -> Result<Option<String>> {
        let mac = self.settings.get("mac_address")?;
        let mac = mac.trim();
        Ok((!mac.is_empty()).then(|| mac.to_string()))
    }

    pub fn ssh_target(&self) -> Result<SshTarget> {
        SshTarget::new(self.user()?, self.address()?)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn service(&self, id: &str) -> Result<&Service> {
        self.services.get(id).ok_or_else(|| {
            ManagerError::NotFound(format!("Service {} not found on server {}", id, self.id))
        })
    }

    pub fn has_service(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }

    pub(crate) fn insert_service(&mut self, service: Service) {
        self.services.insert(service.id().to_string(), service);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_settings::MemoryFs;

    fn fs_with_host() -> Arc<MemoryFs> {
        let fs = Arc::new(MemoryFs::new());
        fs.add_file(
            "/servers/rack-a/host.settings",
            "title = \"Rack A\"\nuser = \"admin\"\nip = \"10.0.0.5\"\nmac_address = \"aa:bb:cc:00:11:22\"\n",
        );
        fs.add_file(
            "/servers/rack-a/web.service.settings",
            "title = \"Web\"\nunit = \"nginx.service\"\nmanager = \"systemd\"\n",
        );
        fs.add_file(
            "/servers/rack-a/db.service.settings",
            "title = \"DB\"\nunit = \"postgresql.service\"\nmanager = \"systemd\"\n",
        );
        fs.add_file("/servers/rack-a/notes.txt", "not a service");
        fs
    }

    #[test]
    fn test_open_reads_settings_and_services() {
        let fs = fs_with_host();
        let host = Host::open(Path::new("/servers"), "rack-a", fs).unwrap();

        assert_eq!(host.title().unwrap(), "Rack A");
        assert_eq!(host.ssh_target().unwrap().to_string(), "admin@10.0.0.5");
        assert_eq!(
            host.wake_address().unwrap().as_deref(),
            Some("aa:bb:cc:00:11:22")
        );

        let ids: Vec<_> = host.services().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["db", "web"]);
        assert_eq!(host.service("web").unwrap().title().unwrap(), "Web");
        assert!(matches!(
            host.service("mail"),
            Err(ManagerError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_directory_or_settings() {
        let fs = Arc::new(MemoryFs::new());
        fs.add_dir("/servers/empty");

        assert!(matches!(
            Host::open(Path::new("/servers"), "nope", fs.clone()),
            Err(ManagerError::NotFound(_))
        ));
        assert!(matches!(
            Host::open(Path::new("/servers"), "empty", fs),
            Err(ManagerError::NotFound(_))
        ));
    }

    #[test]
    fn test_new_host_file_is_completed() {
        let fs = Arc::new(MemoryFs::new());
        fs.add_file("/servers/fresh/host.settings", "");

        let host = Host::open(Path::new("/servers"), "fresh", fs.clone()).unwrap();

        assert_eq!(host.user().unwrap(), "root");
        assert_eq!(host.wake_address().unwrap(), None);
        let content = fs.contents("/servers/fresh/host.settings").unwrap();
        assert!(content.starts_with("; Settings for server with id fresh."));
        assert!(content.contains("mac_address = \"\""));
    }

    #[test]
    fn test_ssh_target_requires_address() {
        let fs = Arc::new(MemoryFs::new());
        fs.add_file("/servers/fresh/host.settings", "");
        let host = Host::open(Path::new("/servers"), "fresh", fs).unwrap();
        assert!(matches!(
            host.ssh_target(),
            Err(ManagerError::ServerConfiguration(_))
        ));
    }
}
