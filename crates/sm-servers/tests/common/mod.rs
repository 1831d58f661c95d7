use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sm_common::Result;
use sm_servers::{
    Backends, ExecOutcome, MacAddress, ReachabilityProbe, RemoteCommand, RemoteExecutor,
    RemoteOutput, SshTarget, WakeSignal,
};

/// Every host answers the shell channel iff its address is listed.
#[derive(Default)]
pub struct Lab {
    pub listening: Vec<String>,
    pub service_output: String,
    pub commands: Mutex<Vec<(String, String)>>,
    pub wakes: Mutex<Vec<MacAddress>>,
}

impl Lab {
    pub fn new(listening: &[&str], service_output: &str) -> Arc<Self> {
        Arc::new(Self {
            listening: listening.iter().map(|s| s.to_string()).collect(),
            service_output: service_output.to_string(),
            ..Default::default()
        })
    }

    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends {
            executor: self.clone(),
            reachability: self.clone(),
            wake: self.clone(),
        }
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn wakes(&self) -> Vec<MacAddress> {
        self.wakes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for Lab {
    async fn probe(&self, target: &SshTarget) -> ExecOutcome {
        if self.listening.iter().any(|a| a == target.address()) {
            ExecOutcome::Succeeded(RemoteOutput::new(0, "alive\n"))
        } else {
            ExecOutcome::Unreachable
        }
    }

    async fn execute(&self, target: &SshTarget, command: &RemoteCommand) -> ExecOutcome {
        match self.probe(target).await {
            ExecOutcome::Succeeded(_) => {}
            other => return other,
        }
        self.commands
            .lock()
            .unwrap()
            .push((target.to_string(), command.to_shell_line(target)));
        ExecOutcome::Succeeded(RemoteOutput::new(0, self.service_output.clone()))
    }
}

#[async_trait]
impl ReachabilityProbe for Lab {
    async fn percent_lost(&self, _address: &str) -> Result<f64> {
        Ok(100.0)
    }
}

#[async_trait]
impl WakeSignal for Lab {
    async fn wake(&self, mac: MacAddress) -> Result<()> {
        self.wakes.lock().unwrap().push(mac);
        Ok(())
    }
}
