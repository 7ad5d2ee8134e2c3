//! # Cataklism Engine
//!
//! Monitoring engine for the Cataklism protocol.
//!
//! ## Flow
//!
//! The [`Scheduler`] runs every collector on its own interval. A collector
//! fetches a [`Snapshot`] from a [`MetricSource`], appends it to the
//! [`MetricStore`], swaps it into the [`LatestCache`] and hands the pair to the
//! [`ThresholdEvaluator`]. Resulting [`AlertEvent`]s go through the
//! [`AlertPipeline`], which records them durably before fanning out to
//! [`Notifier`]s.

pub mod alert_channels;
pub mod alerts;
pub mod cache;
pub mod chain;
pub mod collector;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod health;
pub mod health_checks;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod sweep;
pub mod window;

pub use alert_channels::{DiscordNotifier, EmailNotifier, TelegramNotifier, WebhookNotifier};
pub use alerts::{AlertEvent, AlertId, AlertLevel, Notifier};
pub use cache::LatestCache;
pub use chain::{BlockHeader, ChainClient, JsonRpcClient};
pub use collector::SnapshotCollector;
pub use engine::Engine;
pub use error::{ErrorKind, FetchError, MonitorError, StoreError};
pub use evaluator::ThresholdEvaluator;
pub use health::HealthEndpoint;
pub use metrics::{MetricsEndpoint, MetricsRegistry};
pub use pipeline::{AlertOutcome, AlertPipeline, AlertState, PipelineConfig, PipelineStats};
pub use report::{Report, ReportGenerator, ReportPeriod, ReportSchedule};
pub use scheduler::{ScheduledTask, Scheduler, ShutdownReport, TaskStats};
pub use snapshot::{MetricValue, Snapshot};
pub use source::{GasPriceSource, MetricSource, ProtocolApiSource};
pub use store::{AlertLog, MemoryStore, MetricStore, StoredAlert};
pub use window::AlertWindow;
