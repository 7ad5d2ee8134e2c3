//! Liveness checks for chain nodes, API endpoints and deployed contracts.

#[cfg(test)]
#[path = "health_checks_tests.rs"]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info};

use crate::alerts::{AlertEvent, AlertLevel};
use crate::chain::ChainClient;
use crate::error::{FetchError, MonitorError};
use crate::metrics::{names, MetricsRegistry};
use crate::pipeline::AlertPipeline;
use crate::scheduler::ScheduledTask;

async fn raise(pipeline: &AlertPipeline, event: AlertEvent) {
    if let Err(e) = pipeline.submit(event).await {
        error!("Failed to submit alert: {}", e);
    }
}

/// Checks that a network's node answers and produces fresh blocks.
pub struct NetworkHealthCheck {
    name: String,
    chain: Arc<dyn ChainClient>,
    pipeline: Arc<AlertPipeline>,
    metrics: Arc<MetricsRegistry>,
    max_block_age: chrono::Duration,
}

impl NetworkHealthCheck {
    /// Create a new network check.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        pipeline: Arc<AlertPipeline>,
        metrics: Arc<MetricsRegistry>,
        max_block_age: chrono::Duration,
    ) -> Self {
        Self {
            name: format!("network:{}", chain.network()),
            chain,
            pipeline,
            metrics,
            max_block_age,
        }
    }
}

#[async_trait]
impl ScheduledTask for NetworkHealthCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), MonitorError> {
        let network = self.chain.network();
        let block = match self.chain.latest_block().await {
            Ok(block) => block,
            Err(e @ (FetchError::Timeout | FetchError::Unreachable(_))) => {
                let event = AlertEvent::new(
                    AlertLevel::Critical,
                    format!("{} Network Disconnected", network),
                    format!("Cannot reach the {} node: {}", network, e),
                    format!("network_{}", network),
                    0.0,
                    1.0,
                )
                .with_source(&self.name);
                raise(&self.pipeline, event).await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let age = Utc::now() - block.timestamp;
        let age_secs = age.num_milliseconds() as f64 / 1000.0;
        self.metrics.set_gauge(
            names::METRIC_VALUE,
            &[("source", self.name.as_str()), ("metric", "block_number")],
            block.number as f64,
        );
        self.metrics.set_gauge(
            names::METRIC_VALUE,
            &[("source", self.name.as_str()), ("metric", "block_age_seconds")],
            age_secs,
        );

        if age > self.max_block_age {
            let event = AlertEvent::new(
                AlertLevel::Warning,
                format!("{} Stale Blocks", network),
                format!(
                    "Latest block #{} is {:.1} minutes old",
                    block.number,
                    age_secs / 60.0
                ),
                format!("block_age_{}", network),
                age_secs,
                self.max_block_age.num_seconds() as f64,
            )
            .with_source(&self.name);
            raise(&self.pipeline, event).await;
        } else {
            debug!(network, block = block.number, "Network healthy");
        }

        Ok(())
    }
}

/// Probes a list of API endpoints for status and latency.
pub struct ApiHealthCheck {
    base_url: String,
    endpoints: Vec<String>,
    client: reqwest::Client,
    timeout: Duration,
    slow_after: Duration,
    pipeline: Arc<AlertPipeline>,
    metrics: Arc<MetricsRegistry>,
}

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, PartialEq)]
enum Probe {
    Ok { elapsed: Duration },
    Status { status: u16, elapsed: Duration },
    Failed(FetchError),
}

impl ApiHealthCheck {
    /// Create a new API check.
    pub fn new(
        base_url: impl Into<String>,
        endpoints: Vec<String>,
        timeout: Duration,
        slow_after: Duration,
        pipeline: Arc<AlertPipeline>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Custom(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints,
            client,
            timeout,
            slow_after,
            pipeline,
            metrics,
        })
    }

    async fn probe(&self, endpoint: &str) -> Probe {
        let started = Instant::now();
        match self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .send()
            .await
        {
            Ok(response) if response.status().as_u16() == 200 => Probe::Ok {
                elapsed: started.elapsed(),
            },
            Ok(response) => Probe::Status {
                status: response.status().as_u16(),
                elapsed: started.elapsed(),
            },
            Err(e) => Probe::Failed(e.into()),
        }
    }

    fn event_for(&self, endpoint: &str, probe: &Probe) -> Option<AlertEvent> {
        let slug = endpoint.replace('/', "_");
        let slow_secs = self.slow_after.as_secs_f64();
        let event = match probe {
            Probe::Ok { elapsed } if *elapsed > self.slow_after => AlertEvent::new(
                AlertLevel::Warning,
                "Slow API Response",
                format!("{} took {:.2}s to respond", endpoint, elapsed.as_secs_f64()),
                format!("response_time{}", slug),
                elapsed.as_secs_f64(),
                slow_secs,
            ),
            Probe::Ok { .. } => return None,
            Probe::Status { status, .. } => AlertEvent::new(
                AlertLevel::Warning,
                "API Endpoint Error",
                format!("{} returned status {}", endpoint, status),
                format!("api{}", slug),
                *status as f64,
                200.0,
            ),
            Probe::Failed(FetchError::Timeout) => AlertEvent::new(
                AlertLevel::Critical,
                "API Timeout",
                format!("{} timed out after {}s", endpoint, self.timeout.as_secs()),
                format!("timeout{}", slug),
                self.timeout.as_secs_f64(),
                slow_secs,
            ),
            Probe::Failed(e) => AlertEvent::new(
                AlertLevel::Critical,
                "API Connection Error",
                format!("Failed to reach {}: {}", endpoint, e),
                format!("connection{}", slug),
                0.0,
                1.0,
            ),
        };
        Some(event.with_source("api"))
    }
}

#[async_trait]
impl ScheduledTask for ApiHealthCheck {
    fn name(&self) -> &str {
        "api"
    }

    async fn run(&self) -> Result<(), MonitorError> {
        for endpoint in &self.endpoints {
            let probe = self.probe(endpoint).await;
            if let Probe::Ok { elapsed } | Probe::Status { elapsed, .. } = &probe {
                self.metrics.set_gauge(
                    names::API_RESPONSE_SECONDS,
                    &[("endpoint", endpoint.as_str())],
                    elapsed.as_secs_f64(),
                );
            }
            if let Some(event) = self.event_for(endpoint, &probe) {
                raise(&self.pipeline, event).await;
            }
        }
        Ok(())
    }
}

/// Verifies that every listed contract still has bytecode.
pub struct ContractCodeCheck {
    name: String,
    chain: Arc<dyn ChainClient>,
    /// Contract name to address.
    contracts: BTreeMap<String, String>,
    pipeline: Arc<AlertPipeline>,
}

impl ContractCodeCheck {
    /// Create a new contract check.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contracts: BTreeMap<String, String>,
        pipeline: Arc<AlertPipeline>,
    ) -> Self {
        Self {
            name: format!("contracts:{}", chain.network()),
            chain,
            contracts,
            pipeline,
        }
    }
}

fn is_empty_code(code: &str) -> bool {
    let hex = code.trim().trim_start_matches("0x");
    hex.is_empty() || hex.chars().all(|c| c == '0')
}

#[async_trait]
impl ScheduledTask for ContractCodeCheck {
    fn name(&self) -> &str {
        &self.name
    }

    /// Every contract is checked. The first lookup error, if any, is
    /// returned after the rest have been checked.
    async fn run(&self) -> Result<(), MonitorError> {
        let network = self.chain.network();
        let mut first_error = None;

        for (contract, address) in &self.contracts {
            match self.chain.code_at(address).await {
                Ok(code) if is_empty_code(&code) => {
                    let event = AlertEvent::new(
                        AlertLevel::Emergency,
                        "Contract Code Missing",
                        format!("{} contract on {} has no code at {}", contract, network, address),
                        format!("contract_{}_{}", contract, network),
                        0.0,
                        1.0,
                    )
                    .with_source(&self.name);
                    raise(&self.pipeline, event).await;
                }
                Ok(_) => debug!(network, contract = %contract, "Contract code present"),
                Err(e) => {
                    error!(network, contract = %contract, "Failed to check contract: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => {
                info!(network, checked = self.contracts.len(), "Contract check complete");
                Ok(())
            }
        }
    }
}
