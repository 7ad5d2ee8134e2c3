//! Wiring of collectors, checks and services from configuration.

use std::sync::Arc;
use std::time::Duration;

use cataklism_config::{Config, ConfigLoader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alert_channels::notifiers_from_config;
use crate::cache::LatestCache;
use crate::chain::{ChainClient, JsonRpcClient};
use crate::collector::{CollectorContext, SnapshotCollector};
use crate::error::MonitorError;
use crate::evaluator::ThresholdEvaluator;
use crate::health::{HealthEndpoint, HealthResponse};
use crate::health_checks::{ApiHealthCheck, ContractCodeCheck, NetworkHealthCheck};
use crate::metrics::MetricsRegistry;
use crate::pipeline::{AlertPipeline, PipelineConfig};
use crate::report::{run_report_loop, ReportGenerator, ReportPeriod, ReportSchedule};
use crate::scheduler::{ScheduledTask, Scheduler, ShutdownReport};
use crate::source::{GasPriceSource, MetricSource, ProtocolApiSource};
use crate::store::{AlertLog, MetricStore};
use crate::sweep::{AlertWindowSweep, RetentionSweep};

/// A task together with its run interval.
struct Planned {
    task: Arc<dyn ScheduledTask>,
    interval: Duration,
}

/// The assembled monitor.
pub struct Engine {
    config: Config,
    metrics: Arc<MetricsRegistry>,
    pipeline: Arc<AlertPipeline>,
    cache: Arc<LatestCache>,
    scheduler: Scheduler,
    reports: Arc<ReportGenerator>,
    health: HealthEndpoint,
    planned: Vec<Planned>,
}

impl Engine {
    /// Build every component described by `config`. Nothing runs until
    /// [`Engine::start`].
    pub fn build(
        config: &Config,
        store: Arc<dyn MetricStore>,
        alert_log: Arc<dyn AlertLog>,
        cancel: CancellationToken,
    ) -> Result<Self, MonitorError> {
        let metrics = Arc::new(MetricsRegistry::with_defaults());

        let notifiers = notifiers_from_config(&config.notifiers);
        if notifiers.is_empty() {
            warn!("No notifiers enabled, alerts will only be logged and recorded");
        }
        let pipeline = Arc::new(
            AlertPipeline::new(
                alert_log.clone(),
                PipelineConfig::from_config(&config.alerts, &config.storage),
            )
            .with_notifiers(notifiers)
            .with_metrics(metrics.clone()),
        );

        let cache = Arc::new(LatestCache::new(chrono::Duration::seconds(
            config.cache.ttl_secs as i64,
        )));
        let evaluator = Arc::new(ThresholdEvaluator::new(config.thresholds.rules.clone()));

        let scheduler = Scheduler::new(cancel)
            .with_pipeline(pipeline.clone())
            .with_metrics(metrics.clone());

        let reports = Arc::new(ReportGenerator::new(
            store.clone(),
            alert_log,
            ConfigLoader::expand_path(&config.reports.dir),
        ));

        let ctx = CollectorContext {
            store: store.clone(),
            cache: cache.clone(),
            evaluator,
            pipeline: pipeline.clone(),
            metrics: metrics.clone(),
            write_timeout: Duration::from_secs(config.storage.write_timeout_secs),
            failure_threshold: config.storage.failure_threshold,
        };
        let planned = plan_tasks(config, store, &ctx)?;

        Ok(Self {
            config: config.clone(),
            metrics,
            pipeline,
            cache,
            scheduler,
            reports,
            health: HealthEndpoint::new(env!("CARGO_PKG_VERSION")),
            planned,
        })
    }

    /// Schedule every task and start the report services.
    pub fn start(&self) -> Result<(), MonitorError> {
        for planned in &self.planned {
            info!(task = planned.task.name(), interval = ?planned.interval, "Scheduling task");
            self.scheduler.schedule(planned.task.clone(), planned.interval);
        }

        if self.config.reports.enabled {
            let late = chrono::Duration::seconds(self.config.reports.late_tolerance_secs as i64);
            for period in [ReportPeriod::Daily, ReportPeriod::Weekly] {
                let schedule = ReportSchedule::new(period, &self.config.reports.weekly_day, late)?;
                let generator = self.reports.clone();
                self.scheduler.spawn_service(&format!("report:{}", period), move |cancel| {
                    run_report_loop(generator, schedule, cancel)
                });
            }
        }
        Ok(())
    }

    /// Run every task once, in order, without scheduling.
    pub async fn run_once(&self) -> Vec<(String, Result<(), MonitorError>)> {
        let mut results = Vec::with_capacity(self.planned.len());
        for planned in &self.planned {
            let result = planned.task.run().await;
            results.push((planned.task.name().to_string(), result));
        }
        results
    }

    /// Names of the tasks [`Engine::start`] schedules.
    pub fn task_names(&self) -> Vec<String> {
        self.planned.iter().map(|p| p.task.name().to_string()).collect()
    }

    /// Stop the scheduler, waiting up to `grace`.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.scheduler.shutdown(grace).await
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    pub fn pipeline(&self) -> Arc<AlertPipeline> {
        self.pipeline.clone()
    }

    pub fn cache(&self) -> &LatestCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report_generator(&self) -> Arc<ReportGenerator> {
        self.reports.clone()
    }

    /// Current health of every scheduled task.
    pub fn health(&self) -> HealthResponse {
        self.health.check(&self.scheduler.stats(), self.pipeline.stats())
    }

    pub fn health_endpoint(&self) -> &HealthEndpoint {
        &self.health
    }
}

fn plan_tasks(
    config: &Config,
    store: Arc<dyn MetricStore>,
    ctx: &CollectorContext,
) -> Result<Vec<Planned>, MonitorError> {
    let intervals = &config.intervals;
    let mut planned = Vec::new();

    let protocol: Arc<dyn MetricSource> = Arc::new(ProtocolApiSource::new(
        &config.api.base_url,
        &config.api.stats_path,
        Duration::from_secs(config.api.timeout_secs),
    )?);
    planned.push(Planned {
        task: Arc::new(SnapshotCollector::new(protocol, ctx.clone())),
        interval: Duration::from_secs(intervals.protocol_secs),
    });

    let max_block_age = chrono::Duration::seconds(config.thresholds.block_age_secs as i64);
    for (network, net) in &config.networks {
        let chain: Arc<dyn ChainClient> = Arc::new(JsonRpcClient::new(
            network.as_str(),
            net.rpc_url.as_str(),
            Duration::from_secs(net.timeout_secs),
        )?);

        planned.push(Planned {
            task: Arc::new(SnapshotCollector::new(
                Arc::new(GasPriceSource::new(chain.clone())),
                ctx.clone(),
            )),
            interval: Duration::from_secs(intervals.gas_secs),
        });
        planned.push(Planned {
            task: Arc::new(NetworkHealthCheck::new(
                chain.clone(),
                ctx.pipeline.clone(),
                ctx.metrics.clone(),
                max_block_age,
            )),
            interval: Duration::from_secs(intervals.network_secs),
        });

        if let Some(contracts) = config.contracts.get(network).filter(|c| !c.is_empty()) {
            planned.push(Planned {
                task: Arc::new(ContractCodeCheck::new(
                    chain,
                    contracts.clone(),
                    ctx.pipeline.clone(),
                )),
                interval: Duration::from_secs(intervals.contracts_secs),
            });
        }
    }

    if !config.api.health_endpoints.is_empty() {
        planned.push(Planned {
            task: Arc::new(ApiHealthCheck::new(
                config.api.base_url.as_str(),
                config.api.health_endpoints.clone(),
                Duration::from_secs(config.api.timeout_secs),
                Duration::try_from_secs_f64(config.thresholds.response_time_secs)
                    .map_err(|e| MonitorError::ConfigInvalid(format!("thresholds.response_time_secs: {}", e)))?,
                ctx.pipeline.clone(),
                ctx.metrics.clone(),
            )?),
            interval: Duration::from_secs(intervals.api_secs),
        });
    }

    planned.push(Planned {
        task: Arc::new(AlertWindowSweep::new(ctx.pipeline.clone(), ctx.metrics.clone())),
        interval: Duration::from_secs(intervals.alert_sweep_secs),
    });
    planned.push(Planned {
        task: Arc::new(RetentionSweep::new(
            store,
            chrono::Duration::days(config.storage.retention_days as i64),
        )),
        interval: Duration::from_secs(intervals.retention_secs),
    });

    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use cataklism_config::NetworkConfig;
    use std::collections::BTreeMap;

    fn engine(config: &Config) -> Engine {
        let store = Arc::new(MemoryStore::new());
        Engine::build(config, store.clone(), store, CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_build_default_tasks() {
        let engine = engine(&Config::default());
        let names = engine.task_names();
        assert_eq!(names[0], "protocol");
        assert!(names.contains(&"api".to_string()));
        assert!(names.contains(&"alert_sweep".to_string()));
        assert!(names.contains(&"retention".to_string()));
    }

    #[test]
    fn test_build_network_tasks() {
        let mut config = Config::default();
        config.networks.insert(
            "ethereum".to_string(),
            NetworkConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                timeout_secs: 5,
            },
        );
        let mut contracts = BTreeMap::new();
        contracts.insert("vault".to_string(), "0xabc".to_string());
        config.contracts.insert("ethereum".to_string(), contracts);
        config.contracts.insert("polygon".to_string(), BTreeMap::new());

        let names = engine(&config).task_names();
        assert!(names.contains(&"gas:ethereum".to_string()));
        assert!(names.contains(&"network:ethereum".to_string()));
        assert!(names.contains(&"contracts:ethereum".to_string()));
        assert!(!names.iter().any(|n| n.ends_with(":polygon")));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut config = Config::default();
        config.api.base_url = "http://127.0.0.1:9".to_string();
        config.reports.enabled = true;
        let engine = engine(&config);

        engine.start().unwrap();
        let report = engine.shutdown(Duration::from_secs(5)).await;
        assert!(report.clean);
    }
}
