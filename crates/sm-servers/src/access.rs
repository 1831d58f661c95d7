use std::path::{Path, PathBuf};

use tracing::debug;

use crate::action::ActionRequest;

/// Decides whether a request may run. Consulted before anything is resolved.
pub trait AccessControl: Send + Sync {
    fn authorize(&self, request: &ActionRequest) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn authorize(&self, _request: &ActionRequest) -> bool {
        true
    }
}

/// The fleet's default gatekeeper, configured with the user and group files
/// named in the fleet settings.
///
/// No user or group model is enforced yet, so every request is allowed.
#[derive(Debug, Clone)]
pub struct Doorman {
    users_path: PathBuf,
    groups_path: PathBuf,
}

impl Doorman {
    pub fn new(users_path: impl Into<PathBuf>, groups_path: impl Into<PathBuf>) -> Self {
        Self {
            users_path: users_path.into(),
            groups_path: groups_path.into(),
        }
    }

    pub fn users_path(&self) -> &Path {
        &self.users_path
    }

    pub fn groups_path(&self) -> &Path {
        &self.groups_path
    }
}

impl AccessControl for Doorman {
    fn authorize(&self, request: &ActionRequest) -> bool {
        debug!(action = %request.action, host = %request.host_id, "Request admitted");
        true
    }
}
