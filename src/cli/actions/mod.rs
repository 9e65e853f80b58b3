mod run;

use crate::config::{Config, Module};
use std::net::IpAddr;

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    /// Run the HTTP exporter and the scheduled collector
    Serve {
        config: Config,
        listen: Option<IpAddr>,
        port: u16,
        metrics_path: String,
        interval: u16,
    },
    /// Probe one target, print its metrics and exit
    Probe {
        target: String,
        module_name: String,
        module: Module,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
