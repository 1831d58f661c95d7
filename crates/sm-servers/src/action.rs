use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sm_common::{ManagerError, Result};

use crate::power::PowerAction;
use crate::service::ServiceStatus;
use crate::status::HostStatus;

/// Operations a single request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    PowerButton,
    HostStatus,
    ServiceStatus,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Self::PowerButton => "powerbutton",
            Self::HostStatus => "status",
            Self::ServiceStatus => "service-status",
        }
    }

    pub fn needs_service(self) -> bool {
        matches!(self, Self::ServiceStatus)
    }
}

impl FromStr for Action {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "powerbutton" => Ok(Self::PowerButton),
            "status" => Ok(Self::HostStatus),
            "service-status" => Ok(Self::ServiceStatus),
            other => Err(ManagerError::NotFound(format!(
                "Action {} not found",
                other
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: Action,
    pub host_id: String,
    pub service_id: Option<String>,
}

impl ActionRequest {
    pub fn new(action: Action, host_id: impl Into<String>) -> Self {
        Self {
            action,
            host_id: host_id.into(),
            service_id: None,
        }
    }

    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum ActionOutcome {
    Power(PowerAction),
    Host(HostStatus),
    Service(ServiceStatus),
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Power(PowerAction::ShutdownIssued) => f.write_str("shutdown issued"),
            Self::Power(PowerAction::WakeSent) => f.write_str("wake signal sent"),
            Self::Host(status) => write!(f, "{}", status),
            Self::Service(status) => write!(f, "{}", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_names() {
        assert_eq!("powerbutton".parse::<Action>().unwrap(), Action::PowerButton);
        assert_eq!("status".parse::<Action>().unwrap(), Action::HostStatus);
        assert_eq!(
            "service-status".parse::<Action>().unwrap(),
            Action::ServiceStatus
        );
        assert!(matches!(
            "reboot".parse::<Action>(),
            Err(ManagerError::NotFound(_))
        ));
        assert!("Status".parse::<Action>().is_err());
    }

    #[test]
    fn test_name_round_trips() {
        for action in [Action::PowerButton, Action::HostStatus, Action::ServiceStatus] {
            assert_eq!(action.name().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            ActionOutcome::Power(PowerAction::WakeSent).to_string(),
            "wake signal sent"
        );
        assert_eq!(ActionOutcome::Host(HostStatus::Listening).to_string(), "listening");
    }
}
