use crate::{
    cli::actions::Action,
    config::{Config, DEFAULT_MODULE},
};
use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use std::{net::IpAddr, path::PathBuf};

// routes served next to the metrics path
const RESERVED_PATHS: [&str; 2] = ["/probe", "/health"];

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or an argument is invalid
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    let config_path = matches
        .get_one::<PathBuf>("config")
        .context("config file is required")?;
    let config = Config::load(config_path)?;

    if let Some(target) = matches.get_one::<String>("probe") {
        let module_name = matches
            .get_one::<String>("module")
            .map_or(DEFAULT_MODULE, String::as_str);
        let module = config
            .module(module_name)
            .with_context(|| format!("Unknown module: {module_name}"))?
            .clone();

        return Ok(Action::Probe {
            target: target.clone(),
            module_name: module_name.to_string(),
            module,
        });
    }

    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(9117);
    let interval = matches.get_one::<u16>("interval").copied().unwrap_or(60);

    let metrics_path = matches
        .get_one::<String>("metrics-path")
        .cloned()
        .unwrap_or_else(|| "/metrics".to_string());
    if !metrics_path.starts_with('/') {
        bail!("Invalid metrics path: {metrics_path}, it must start with '/'");
    }
    if RESERVED_PATHS.contains(&metrics_path.as_str()) {
        bail!("Invalid metrics path: {metrics_path} is already in use");
    }

    Ok(Action::Serve {
        config,
        listen,
        port,
        metrics_path,
        interval,
    })
}
