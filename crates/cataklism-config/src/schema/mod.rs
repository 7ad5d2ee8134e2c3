//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

mod schema_alerts;
mod schema_thresholds;

pub use schema_alerts::*;
pub use schema_thresholds::*;

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// Shared default helper used by submodules.
pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub api: ApiConfig,

    /// Chain RPC endpoints, keyed by network name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Contract addresses per network, keyed by contract name.
    #[serde(default)]
    pub contracts: BTreeMap<String, BTreeMap<String, String>>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub intervals: IntervalsConfig,

    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub notifiers: NotifiersConfig,

    #[serde(default)]
    pub reports: ReportsConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// HTTP server exposing `/health` and `/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9090
}

/// Protocol API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the protocol backend.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Path of the protocol statistics endpoint.
    #[serde(default = "default_stats_path")]
    pub stats_path: String,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Endpoints probed by the API health check.
    #[serde(default = "default_health_endpoints")]
    pub health_endpoints: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            stats_path: default_stats_path(),
            timeout_secs: default_request_timeout(),
            health_endpoints: default_health_endpoints(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_stats_path() -> String {
    "/api/protocol/stats".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_health_endpoints() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/api/protocol/stats".to_string(),
        "/api/vault/stats".to_string(),
        "/api/staking/pools".to_string(),
    ]
}

/// A chain network reachable over JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,

    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

/// Durable storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Snapshots older than this are deleted by the retention sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Upper bound on a single store write.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Consecutive failed writes before a CRITICAL alert is raised.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            retention_days: default_retention_days(),
            write_timeout_secs: default_write_timeout(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("~/.cataklism/monitor.db")
}

fn default_retention_days() -> u32 {
    30
}

fn default_write_timeout() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

/// Latest-snapshot cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

/// Collection intervals in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalsConfig {
    #[serde(default = "default_protocol_interval")]
    pub protocol_secs: u64,

    #[serde(default = "default_network_interval")]
    pub network_secs: u64,

    #[serde(default = "default_gas_interval")]
    pub gas_secs: u64,

    #[serde(default = "default_api_interval")]
    pub api_secs: u64,

    #[serde(default = "default_contracts_interval")]
    pub contracts_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub alert_sweep_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub retention_secs: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            protocol_secs: default_protocol_interval(),
            network_secs: default_network_interval(),
            gas_secs: default_gas_interval(),
            api_secs: default_api_interval(),
            contracts_secs: default_contracts_interval(),
            alert_sweep_secs: default_sweep_interval(),
            retention_secs: default_sweep_interval(),
        }
    }
}

fn default_protocol_interval() -> u64 {
    60
}

fn default_network_interval() -> u64 {
    300
}

fn default_gas_interval() -> u64 {
    180
}

fn default_api_interval() -> u64 {
    120
}

fn default_contracts_interval() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    3600
}

/// Calendar-aligned report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Output directory for generated reports.
    #[serde(default = "default_reports_dir")]
    pub dir: PathBuf,

    /// Weekday of the weekly report (cron day-of-week name).
    #[serde(default = "default_weekly_day")]
    pub weekly_day: String,

    /// A wake-up later than this after its boundary counts as missed.
    #[serde(default = "default_late_tolerance")]
    pub late_tolerance_secs: u64,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: default_reports_dir(),
            weekly_day: default_weekly_day(),
            late_tolerance_secs: default_late_tolerance(),
        }
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_weekly_day() -> String {
    "Sun".to_string()
}

fn default_late_tolerance() -> u64 {
    60
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace(),
        }
    }
}

fn default_grace() -> u64 {
    10
}
