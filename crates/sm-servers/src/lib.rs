//! Remote hosts and their services: status resolution, power control and the
//! fleet that ties them to their settings files.

pub mod access;
pub mod action;
pub mod fleet;
pub mod host;
pub mod power;
pub mod reachability;
pub mod remote;
pub mod service;
pub mod status;
pub mod wol;

#[cfg(test)]
mod testing;

pub use access::{AccessControl, AllowAll, Doorman};
pub use action::{Action, ActionOutcome, ActionRequest};
pub use fleet::{Backends, Fleet, FleetOverview, HostOverview, ServiceOverview};
pub use host::Host;
pub use power::{PowerAction, PowerController};
pub use reachability::{PingProbe, ReachabilityProbe};
pub use remote::{
    ExecFailure, ExecOutcome, RemoteCommand, RemoteExecutor, RemoteOutput, SshExecutor, SshTarget,
};
pub use service::{Service, ServiceManagerKind, ServiceStatus, ServiceStatusResolver};
pub use status::{classify, HostStatus, HostStatusResolver, ShellProbe};
pub use wol::{MacAddress, UdpWake, WakeSignal};
