//! CLI definitions for the Cataklism monitor.

use std::path::PathBuf;

use cataklism_engine::{AlertLevel, ReportPeriod};
use clap::{Parser, Subcommand};

/// Cataklism protocol monitor.
#[derive(Parser)]
#[command(name = "cataklism-monitor")]
#[command(about = "Protocol health monitoring and alerting for Cataklism")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CATAKLISM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the monitor in the foreground (default)
    Run {
        /// Keep snapshots and alerts in memory instead of SQLite
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and print warnings
    Check {
        /// Also run every collector and check once
        #[arg(long)]
        probe: bool,
    },

    /// Query the durable alert log
    Alerts {
        /// How many hours back to look
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Minimum severity (info, warning, critical, emergency)
        #[arg(long, default_value = "info")]
        level: AlertLevel,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Generate a report now
    Report {
        /// Report period (daily, weekly)
        #[arg(long, default_value = "daily")]
        period: ReportPeriod,
    },
}
