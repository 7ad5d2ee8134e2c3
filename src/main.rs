//! Cataklism protocol monitor.
//!
//! Main entry point for the monitoring daemon and its query commands.

mod cli;
mod cmd_query;
mod cmd_run;
mod server;
mod signal;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};

use cataklism_config::{Config, ConfigLoader, ConfigValidator};

use crate::cli::{Cli, Commands};

const DEFAULT_CONFIG: &str = "config/monitor.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    server::init_tracing()?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None => cmd_run::run_monitor(config, false).await,
        Some(Commands::Run { dry_run }) => cmd_run::run_monitor(config, dry_run).await,
        Some(Commands::Check { probe }) => cmd_query::check(config, probe).await,
        Some(Commands::Alerts { hours, level, json }) => {
            cmd_query::list_alerts(&config, hours, level, json).await
        }
        Some(Commands::Report { period }) => cmd_query::generate_report(&config, period).await,
    }
}

/// Load and validate the configuration.
///
/// Without an explicit path the default file is used when present, otherwise
/// built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => ConfigLoader::load(path)?,
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if default.exists() {
                ConfigLoader::load(&default)?
            } else {
                info!("No {} found, using built-in defaults", DEFAULT_CONFIG);
                Config::default()
            }
        }
    };

    for warning in ConfigValidator::ensure_valid(&config)? {
        warn!("Config warning: {}: {}", warning.path, warning.message);
    }
    Ok(config)
}
