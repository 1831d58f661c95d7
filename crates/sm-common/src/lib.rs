pub mod config;
pub mod error;

pub use config::EnvConfig;
pub use error::{ManagerError, Result};
