//! Periodic task scheduler.
//!
//! Each task runs on its own interval. A tick that arrives while the previous
//! invocation is still running is skipped, never queued. All work is tracked
//! so shutdown can wait for in-flight invocations within a grace period.

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertEvent;
use crate::error::MonitorError;
use crate::metrics::{names, MetricsRegistry};
use crate::pipeline::AlertPipeline;

/// A unit of periodic work.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Task name, unique per scheduler.
    fn name(&self) -> &str;

    /// Run one invocation.
    async fn run(&self) -> Result<(), MonitorError>;
}

/// Per-task counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
}

impl TaskStats {
    /// Whether the most recent completed invocation failed.
    pub fn last_failed(&self) -> bool {
        self.last_error.is_some()
    }
}

struct TaskSlot {
    name: String,
    running: AtomicBool,
    stats: Mutex<TaskStats>,
}

impl TaskSlot {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: AtomicBool::new(false),
            stats: Mutex::new(TaskStats::default()),
        }
    }
}

/// Clears a slot's running flag when dropped, including on unwind.
struct RunningGuard(Arc<TaskSlot>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// Result of [`Scheduler::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every tracked task finished within the grace period.
    pub clean: bool,
    /// Tasks still running when the grace period ran out.
    pub stragglers: Vec<String>,
}

/// Scheduler for periodic tasks and long-running services.
pub struct Scheduler {
    cancel: CancellationToken,
    tracker: TaskTracker,
    tasks: RwLock<Vec<Arc<TaskSlot>>>,
    services: RwLock<Vec<Arc<TaskSlot>>>,
    pipeline: Option<Arc<AlertPipeline>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Scheduler {
    /// Create a new scheduler stopped by `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tracker: TaskTracker::new(),
            tasks: RwLock::new(Vec::new()),
            services: RwLock::new(Vec::new()),
            pipeline: None,
            metrics: None,
        }
    }

    /// Report failed invocations through `pipeline`.
    pub fn with_pipeline(mut self, pipeline: Arc<AlertPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Export task counters through `registry`.
    pub fn with_metrics(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `task` every `interval`, starting immediately.
    pub fn schedule(&self, task: Arc<dyn ScheduledTask>, interval: Duration) {
        let slot = Arc::new(TaskSlot::new(task.name()));
        self.tasks.write().push(slot.clone());
        info!(task = %slot.name, "Scheduling task every {:?}", interval);

        let cancel = self.cancel.clone();
        let tracker = self.tracker.clone();
        let pipeline = self.pipeline.clone();
        let metrics = self.metrics.clone();

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if slot.running.swap(true, Ordering::AcqRel) {
                    slot.stats.lock().skipped += 1;
                    if let Some(ref m) = metrics {
                        m.inc_counter(names::TASK_SKIPPED_TOTAL, &[("task", slot.name.as_str())]);
                    }
                    debug!(task = %slot.name, "Previous invocation still running, skipping tick");
                    continue;
                }

                slot.stats.lock().invocations += 1;
                tracker.spawn(invoke(
                    task.clone(),
                    slot.clone(),
                    cancel.clone(),
                    pipeline.clone(),
                    metrics.clone(),
                ));
            }

            debug!(task = %slot.name, "Task loop stopped");
        });
    }

    /// Run a long-lived service until it returns. The service receives the
    /// scheduler's cancellation token and is expected to stop when it fires.
    pub fn spawn_service<F, Fut>(&self, name: &str, service: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let slot = Arc::new(TaskSlot::new(name));
        slot.running.store(true, Ordering::Release);
        self.services.write().push(slot.clone());

        let fut = service(self.cancel.clone());
        self.tracker.spawn(async move {
            fut.await;
            slot.running.store(false, Ordering::Release);
            debug!(service = %slot.name, "Service stopped");
        });
    }

    /// Stats for every scheduled task, in scheduling order.
    pub fn stats(&self) -> Vec<(String, TaskStats)> {
        self.tasks
            .read()
            .iter()
            .map(|slot| (slot.name.clone(), slot.stats.lock().clone()))
            .collect()
    }

    /// Stats for one task.
    pub fn task_stats(&self, name: &str) -> Option<TaskStats> {
        self.tasks
            .read()
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.stats.lock().clone())
    }

    /// Cancel everything and wait up to `grace` for in-flight work.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        info!("Stopping scheduler, grace period {:?}", grace);
        self.cancel.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            info!("Scheduler stopped cleanly");
            return ShutdownReport {
                clean: true,
                stragglers: Vec::new(),
            };
        }

        let stragglers: Vec<String> = self
            .tasks
            .read()
            .iter()
            .chain(self.services.read().iter())
            .filter(|slot| slot.running.load(Ordering::Acquire))
            .map(|slot| slot.name.clone())
            .collect();
        warn!("Grace period elapsed with work still running: {:?}", stragglers);

        ShutdownReport {
            clean: false,
            stragglers,
        }
    }
}

/// One invocation of a task, cancelled when the token fires.
async fn invoke(
    task: Arc<dyn ScheduledTask>,
    slot: Arc<TaskSlot>,
    cancel: CancellationToken,
    pipeline: Option<Arc<AlertPipeline>>,
    metrics: Option<Arc<MetricsRegistry>>,
) {
    let _guard = RunningGuard(slot.clone());
    let started = Instant::now();
    let result = tokio::select! {
        _ = cancel.cancelled() => None,
        outcome = AssertUnwindSafe(task.run()).catch_unwind() => Some(outcome.unwrap_or_else(|panic| {
            Err(MonitorError::Custom(format!("task panicked: {}", panic_message(panic.as_ref()))))
        })),
    };
    let elapsed = started.elapsed();

    match result {
        None => debug!(task = %slot.name, "Invocation cancelled"),
        Some(Ok(())) => {
            {
                let mut stats = slot.stats.lock();
                stats.successes += 1;
                stats.last_error = None;
                stats.last_duration_ms = Some(elapsed.as_millis() as u64);
                stats.last_run = Some(Utc::now());
            }
            record_run(&metrics, &slot.name, "success", elapsed);
        }
        Some(Err(e)) => {
            error!(task = %slot.name, kind = e.kind().as_str(), "Task failed: {}", e);
            {
                let mut stats = slot.stats.lock();
                stats.failures += 1;
                stats.last_error = Some(e.to_string());
                stats.last_duration_ms = Some(elapsed.as_millis() as u64);
                stats.last_run = Some(Utc::now());
            }
            record_run(&metrics, &slot.name, "failure", elapsed);

            if let Some(pipeline) = pipeline {
                let event = AlertEvent::collection_failed(&slot.name, &e);
                if let Err(e) = pipeline.submit(event).await {
                    error!(task = %slot.name, "Failed to report task failure: {}", e);
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn record_run(metrics: &Option<Arc<MetricsRegistry>>, task: &str, outcome: &str, elapsed: Duration) {
    if let Some(m) = metrics {
        m.inc_counter(names::TASK_RUNS_TOTAL, &[("task", task), ("outcome", outcome)]);
        m.set_gauge(names::TASK_DURATION_SECONDS, &[("task", task)], elapsed.as_secs_f64());
    }
}
