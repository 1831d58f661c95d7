use thiserror::Error;

/// Error kinds shared by the settings store, the resolvers and the power controller.
///
/// Only `NotRunning` is branched on inside the core; everything else travels
/// unmodified to whoever rendered the request.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// A file, directory, declared setting or control path is missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The host did not answer the remote shell channel.
    #[error("Not running: {0}")]
    NotRunning(String),

    #[error("Server configuration error: {0}")]
    ServerConfiguration(String),

    #[error("Service configuration error: {0}")]
    ServiceConfiguration(String),

    /// A mutating operation found its target in a contradicting state.
    #[error("Unexpected state: {0}")]
    UnexpectedState(String),

    /// The remote command channel failed for a reason other than the host being down.
    #[error("Remote command failed: {0}")]
    CommandFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ManagerError {
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning(_))
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;
