//! Collection through alert delivery against mocked HTTP endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cataklism_config::{ThresholdsConfig, WebhookConfig};
use cataklism_engine::collector::CollectorContext;
use cataklism_engine::metrics::names;
use cataklism_engine::{
    AlertLevel, AlertPipeline, GasPriceSource, JsonRpcClient, LatestCache, MemoryStore,
    MetricsRegistry, PipelineConfig, ProtocolApiSource, ScheduledTask, SnapshotCollector,
    ThresholdEvaluator, WebhookNotifier,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stats(tvl: f64) -> Value {
    json!({
        "tvl": tvl,
        "total_stakers": 1200,
        "active_pools": 8,
        "avg_apy": "12.5",
        "token_price": 2.4,
        "market_cap": 24000000,
        "vault_tvl": 400000,
        "vault_apy": 9.1,
        "gas_price": 30,
        "block_number": 19000000,
        "network_health": true
    })
}

/// Serve `first` once, then `rest` for every later request.
async fn protocol_api(first: f64, rest: f64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/protocol/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats(first)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/protocol/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats(rest)))
        .mount(&server)
        .await;
    server
}

struct Monitor {
    store: Arc<MemoryStore>,
    metrics: Arc<MetricsRegistry>,
    ctx: CollectorContext,
}

impl Monitor {
    fn new(webhook_url: Option<String>, ttl: chrono::Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(MetricsRegistry::with_defaults());

        let mut pipeline =
            AlertPipeline::new(store.clone(), PipelineConfig::default()).with_metrics(metrics.clone());
        if let Some(url) = webhook_url {
            pipeline = pipeline.with_notifier(Arc::new(WebhookNotifier::new(WebhookConfig {
                enabled: true,
                url,
                headers: BTreeMap::new(),
            })));
        }

        let ctx = CollectorContext {
            store: store.clone(),
            cache: Arc::new(LatestCache::new(ttl)),
            evaluator: Arc::new(ThresholdEvaluator::new(ThresholdsConfig::default().rules)),
            pipeline: Arc::new(pipeline),
            metrics: metrics.clone(),
            write_timeout: Duration::from_secs(5),
            failure_threshold: 3,
        };
        Self { store, metrics, ctx }
    }

    fn protocol(&self, server: &MockServer) -> SnapshotCollector {
        let source = ProtocolApiSource::new(&server.uri(), "/api/protocol/stats", Duration::from_secs(5)).unwrap();
        SnapshotCollector::new(Arc::new(source), self.ctx.clone())
    }
}

#[tokio::test]
async fn test_tvl_drop_raises_one_critical_alert() {
    let api = protocol_api(1_000_000.0, 790_000.0).await;
    let hook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "level": "critical", "metric": "tvl_drop" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&hook)
        .await;

    let monitor = Monitor::new(Some(hook.uri()), chrono::Duration::minutes(5));
    let collector = monitor.protocol(&api);
    collector.run().await.unwrap();
    collector.run().await.unwrap();

    let alerts = monitor.store.alerts();
    assert_eq!(alerts.len(), 1);
    let event = &alerts[0].event;
    assert_eq!(event.level, AlertLevel::Critical);
    assert_eq!(event.metric, "tvl_drop");
    assert!((event.value - 21.0).abs() < 1e-9);
    assert_eq!(event.threshold, 20.0);
    assert_eq!(event.source, "protocol");
    assert_eq!(monitor.store.snapshot_count(), 2);
}

#[tokio::test]
async fn test_drop_at_exact_limit_is_quiet() {
    let api = protocol_api(1_000_000.0, 800_000.0).await;
    let monitor = Monitor::new(None, chrono::Duration::minutes(5));
    let collector = monitor.protocol(&api);
    collector.run().await.unwrap();
    collector.run().await.unwrap();

    assert_eq!(monitor.store.alert_count(), 0);
}

#[tokio::test]
async fn test_expired_baseline_is_not_compared() {
    let api = protocol_api(1_000_000.0, 790_000.0).await;
    let monitor = Monitor::new(None, chrono::Duration::milliseconds(100));
    let collector = monitor.protocol(&api);
    collector.run().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    collector.run().await.unwrap();

    assert_eq!(monitor.store.alert_count(), 0);
    assert_eq!(monitor.store.snapshot_count(), 2);
}

#[tokio::test]
async fn test_high_gas_warns_every_cycle_below_dispatch_floor() {
    let rpc = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_gasPrice" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1bf08eb000" })),
        )
        .mount(&rpc)
        .await;
    let hook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&hook)
        .await;

    let monitor = Monitor::new(Some(hook.uri()), chrono::Duration::minutes(5));
    let chain = JsonRpcClient::new("ethereum", rpc.uri(), Duration::from_secs(5)).unwrap();
    let collector = SnapshotCollector::new(Arc::new(GasPriceSource::new(Arc::new(chain))), monitor.ctx.clone());
    assert_eq!(collector.name(), "gas:ethereum");

    for _ in 0..3 {
        collector.run().await.unwrap();
    }

    let alerts = monitor.store.alerts();
    assert_eq!(alerts.len(), 3);
    assert!(alerts.iter().all(|a| a.event.level == AlertLevel::Warning));
    assert_eq!(alerts[0].event.value, 120.0);
    assert_eq!(monitor.ctx.pipeline.stats().skipped, 3);
    assert_eq!(
        monitor.metrics.get_counter(names::ALERTS_TOTAL, &[("level", "warning")]),
        Some(3)
    );
}

#[tokio::test]
async fn test_failing_notifier_does_not_lose_alert() {
    let api = protocol_api(1_000_000.0, 500_000.0).await;
    let hook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&hook)
        .await;

    let monitor = Monitor::new(Some(hook.uri()), chrono::Duration::minutes(5));
    let collector = monitor.protocol(&api);
    collector.run().await.unwrap();
    collector.run().await.unwrap();

    assert_eq!(monitor.store.alert_count(), 1);
    assert_eq!(
        monitor
            .metrics
            .get_counter(names::NOTIFIER_FAILURES_TOTAL, &[("notifier", "webhook")]),
        Some(1)
    );
}

#[tokio::test]
async fn test_unreachable_api_is_a_task_error() {
    let monitor = Monitor::new(None, chrono::Duration::minutes(5));
    let source = ProtocolApiSource::new("http://127.0.0.1:9", "/api/protocol/stats", Duration::from_secs(2)).unwrap();
    let collector = SnapshotCollector::new(Arc::new(source), monitor.ctx.clone());

    assert!(collector.run().await.is_err());
    assert_eq!(monitor.store.snapshot_count(), 0);
    assert_eq!(monitor.store.alert_count(), 0);
}
