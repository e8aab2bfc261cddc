//! Warden CLI

use clap::{Arg, ArgAction, Command};
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use warden_cache::resp;
use warden_checks::metrics::Prometheus;
use warden_orchestrator::{registry::File, Config, Orchestrator};
use warden_relay::http;

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

/// Flag for JSON output
const JSON_FLAG: &str = "json";

const CONFIG_FLAG: &str = "config";
const REGISTRY_FLAG: &str = "registry";
const METRICS_FILE_FLAG: &str = "metrics-file";

/// Entrypoint for the Warden CLI
#[tokio::main]
async fn main() -> ExitCode {
    // Define application
    let matches = Command::new("warden")
        .version(crate_version())
        .about("Check the nodes of every staked application session and publish the healthy ones.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(JSON_FLAG)
                .long(JSON_FLAG)
                .help("Emit logs as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(CONFIG_FLAG)
                .long(CONFIG_FLAG)
                .required(true)
                .help("Path to YAML config file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(REGISTRY_FLAG)
                .long(REGISTRY_FLAG)
                .required(true)
                .help("Path to YAML registry of applications and blockchains")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(METRICS_FILE_FLAG)
                .long(METRICS_FILE_FLAG)
                .help("Write metrics of the run to this file (text exposition format)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    if matches.get_flag(JSON_FLAG) {
        tracing_subscriber::fmt().json().with_max_level(level).init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    // Load configuration
    let (Some(config_path), Some(registry_path)) = (
        matches.get_one::<PathBuf>(CONFIG_FLAG),
        matches.get_one::<PathBuf>(REGISTRY_FLAG),
    ) else {
        error!("missing required arguments");
        return ExitCode::FAILURE;
    };
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error=?e, path=%config_path.display(), "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    let client = match http::Client::new(config.relay()) {
        Ok(client) => client,
        Err(e) => {
            error!(error=?e, "failed to create relay client");
            return ExitCode::FAILURE;
        }
    };
    let replicas = config
        .replicas
        .iter()
        .map(|address| resp::Client::new(config.replica(address)))
        .collect();

    // Run
    let mut registry = Registry::with_prefix("warden");
    let recorder = Prometheus::new(&mut registry);
    let orchestrator = Orchestrator::new(
        &config,
        client.clone(),
        client,
        recorder,
        replicas,
        File::new(registry_path),
        &mut registry,
    );
    let result = orchestrator.run().await;

    // Export metrics (even if the run failed)
    if let Some(path) = matches.get_one::<PathBuf>(METRICS_FILE_FLAG) {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &registry) {
            error!(error=?e, "failed to encode metrics");
        } else if let Err(e) = tokio::fs::write(path, buffer).await {
            error!(error=?e, path=%path.display(), "failed to write metrics");
        }
    }
    match result {
        Ok(report) => {
            info!(?report, "run succeeded");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error=?e, "run failed");
            ExitCode::FAILURE
        }
    }
}
