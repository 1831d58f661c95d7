use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Process configuration loaded from environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Fleet settings file (title, server directory, user/group files)
    pub settings_path: PathBuf,
    /// ssh client used for the remote shell channel
    pub ssh_binary: String,
    /// Pre-shared private key; ssh's own defaults apply when unset
    pub ssh_identity: Option<PathBuf>,
    /// Connection setup bound handed to ssh (the session itself is unbounded)
    pub ssh_connect_timeout_secs: u64,
    /// Echo probe binary
    pub ping_binary: String,
    /// Echo requests per reachability probe
    pub ping_count: u32,
    /// Per-echo reply timeout
    pub ping_timeout_secs: u64,
    /// Destination of the wake datagram
    pub wol_broadcast: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from("./custom/settings.ini"),
            ssh_binary: "ssh".to_string(),
            ssh_identity: None,
            ssh_connect_timeout_secs: 10,
            ping_binary: "ping".to_string(),
            ping_count: 3,
            ping_timeout_secs: 1,
            wol_broadcast: "255.255.255.255:9".to_string(),
        }
    }
}

impl EnvConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    /// Numeric values that fail to parse keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("SERVERMANAGER_SETTINGS") {
            config.settings_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SSH_BINARY") {
            config.ssh_binary = v;
        }
        if let Some(v) = lookup("SSH_IDENTITY") {
            if !v.trim().is_empty() {
                config.ssh_identity = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = lookup("SSH_CONNECT_TIMEOUT") {
            if let Ok(secs) = v.parse() {
                config.ssh_connect_timeout_secs = secs;
            }
        }
        if let Some(v) = lookup("PING_BINARY") {
            config.ping_binary = v;
        }
        if let Some(v) = lookup("PING_COUNT") {
            if let Ok(count) = v.parse() {
                config.ping_count = count;
            }
        }
        if let Some(v) = lookup("PING_TIMEOUT") {
            if let Ok(secs) = v.parse() {
                config.ping_timeout_secs = secs;
            }
        }
        if let Some(v) = lookup("WOL_BROADCAST") {
            config.wol_broadcast = v;
        }

        config
    }

    /// Load the .env file, then read the environment
    pub fn load(env_file: Option<&Path>) -> Self {
        match env_file {
            Some(path) => {
                if let Err(e) = dotenvy::from_path(path) {
                    debug!("No env file loaded from {}: {}", path.display(), e);
                }
            }
            None => {
                // Ok if .env does not exist
                dotenvy::dotenv().ok();
            }
        }

        Self::from_env()
    }
}
