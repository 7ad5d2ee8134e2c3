//! Health check endpoint.

use std::collections::BTreeMap;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineStats;
use crate::scheduler::TaskStats;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    /// Per-task status.
    pub components: BTreeMap<String, ComponentHealth>,
    pub alerts: PipelineSummary,
}

/// Alert pipeline counters exposed on `/health`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub raw: u64,
    pub dispatched: u64,
    pub suppressed: u64,
    pub record_failures: u64,
}

impl From<PipelineStats> for PipelineSummary {
    fn from(s: PipelineStats) -> Self {
        Self {
            raw: s.raw,
            dispatched: s.dispatched,
            suppressed: s.suppressed,
            record_failures: s.record_failures,
        }
    }
}

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All tasks succeeded on their last run.
    Healthy,
    /// Some tasks are failing.
    Degraded,
    /// Every task is failing.
    Unhealthy,
}

/// Component health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub invocations: u64,
    pub failures: u64,
    pub skipped: u64,
}

impl From<&TaskStats> for ComponentHealth {
    fn from(stats: &TaskStats) -> Self {
        Self {
            status: if stats.last_failed() {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            details: stats.last_error.clone(),
            invocations: stats.invocations,
            failures: stats.failures,
            skipped: stats.skipped,
        }
    }
}

/// Health endpoint handler.
pub struct HealthEndpoint {
    version: String,
    start_time: std::time::Instant,
}

impl HealthEndpoint {
    /// Create a new health endpoint.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate health response from task stats.
    pub fn check(&self, tasks: &[(String, TaskStats)], pipeline: PipelineStats) -> HealthResponse {
        let components: BTreeMap<String, ComponentHealth> = tasks
            .iter()
            .map(|(name, stats)| (name.clone(), ComponentHealth::from(stats)))
            .collect();

        let failing = components
            .values()
            .filter(|c| c.status != HealthStatus::Healthy)
            .count();
        let status = match failing {
            0 => HealthStatus::Healthy,
            n if n == components.len() => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };

        HealthResponse {
            status,
            version: self.version.clone(),
            uptime_secs: self.uptime_secs(),
            components,
            alerts: pipeline.into(),
        }
    }

    /// Axum handler for health check.
    pub async fn handler(&self, tasks: &[(String, TaskStats)], pipeline: PipelineStats) -> impl IntoResponse {
        let response = self.check(tasks, pipeline);
        let status_code = match response.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(response))
    }
}
