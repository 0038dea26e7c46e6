//! Prometheus-backed orchestrator metrics.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Gauges mirror admission and registry sizes; counters track monitor work.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared by orchestrator components.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    active_tasks: IntGauge,
    queued_tasks: IntGauge,
    monitored_tasks: IntGauge,
    monitor_cycles_total: IntCounter,
    task_transitions_total: IntCounterVec,
    engine_errors_total: IntCounterVec,
    classification_failures_total: IntCounter,
}

/// Snapshot of the gauges and unlabelled counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Tasks holding an admission slot.
    pub active_tasks: i64,
    /// Tasks waiting for an admission slot.
    pub queued_tasks: i64,
    /// Tasks present in the registry.
    pub monitored_tasks: i64,
    /// Completed monitor polling cycles.
    pub monitor_cycles_total: u64,
    /// Snapshot entries the monitor could not classify.
    pub classification_failures_total: u64,
}

impl Metrics {
    /// Construct a registry with every orchestrator collector registered.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let active_tasks = IntGauge::with_opts(Opts::new(
            "active_tasks",
            "Tasks currently holding an admission slot",
        ))
        .map_err(collector_error("active_tasks"))?;
        let queued_tasks = IntGauge::with_opts(Opts::new(
            "queued_tasks",
            "Tasks waiting for an admission slot",
        ))
        .map_err(collector_error("queued_tasks"))?;
        let monitored_tasks = IntGauge::with_opts(Opts::new(
            "monitored_tasks",
            "Tasks tracked by the lifecycle monitor",
        ))
        .map_err(collector_error("monitored_tasks"))?;
        let monitor_cycles_total = IntCounter::with_opts(Opts::new(
            "monitor_cycles_total",
            "Completed lifecycle monitor polling cycles",
        ))
        .map_err(collector_error("monitor_cycles_total"))?;
        let task_transitions_total = IntCounterVec::new(
            Opts::new(
                "task_transitions_total",
                "Lifecycle transitions applied by the monitor",
            ),
            &["transition"],
        )
        .map_err(collector_error("task_transitions_total"))?;
        let engine_errors_total = IntCounterVec::new(
            Opts::new("engine_errors_total", "Failed engine calls by operation"),
            &["operation"],
        )
        .map_err(collector_error("engine_errors_total"))?;
        let classification_failures_total = IntCounter::with_opts(Opts::new(
            "classification_failures_total",
            "Snapshot entries the monitor could not classify",
        ))
        .map_err(collector_error("classification_failures_total"))?;

        register(&registry, "active_tasks", &active_tasks)?;
        register(&registry, "queued_tasks", &queued_tasks)?;
        register(&registry, "monitored_tasks", &monitored_tasks)?;
        register(&registry, "monitor_cycles_total", &monitor_cycles_total)?;
        register(&registry, "task_transitions_total", &task_transitions_total)?;
        register(&registry, "engine_errors_total", &engine_errors_total)?;
        register(
            &registry,
            "classification_failures_total",
            &classification_failures_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                active_tasks,
                queued_tasks,
                monitored_tasks,
                monitor_cycles_total,
                task_transitions_total,
                engine_errors_total,
                classification_failures_total,
            }),
        })
    }

    /// Set the active task gauge.
    pub fn set_active_tasks(&self, count: usize) {
        self.inner.active_tasks.set(saturating_i64(count));
    }

    /// Set the queued task gauge.
    pub fn set_queued_tasks(&self, count: usize) {
        self.inner.queued_tasks.set(saturating_i64(count));
    }

    /// Set the monitored task gauge.
    pub fn set_monitored_tasks(&self, count: usize) {
        self.inner.monitored_tasks.set(saturating_i64(count));
    }

    /// Count one completed polling cycle.
    pub fn inc_monitor_cycle(&self) {
        self.inner.monitor_cycles_total.inc();
    }

    /// Count one lifecycle transition (e.g. `recheck`, `completed`).
    pub fn inc_transition(&self, transition: &str) {
        self.inner
            .task_transitions_total
            .with_label_values(&[transition])
            .inc();
    }

    /// Count one failed engine call.
    pub fn inc_engine_error(&self, operation: &str) {
        self.inner
            .engine_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Count one classification failure.
    pub fn inc_classification_failure(&self) {
        self.inner.classification_failures_total.inc();
    }

    /// Current value of the transition counter for `transition`.
    #[must_use]
    pub fn transitions(&self, transition: &str) -> u64 {
        self.inner
            .task_transitions_total
            .with_label_values(&[transition])
            .get()
    }

    /// Current value of the engine error counter for `operation`.
    #[must_use]
    pub fn engine_errors(&self, operation: &str) -> u64 {
        self.inner
            .engine_errors_total
            .with_label_values(&[operation])
            .get()
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_tasks: self.inner.active_tasks.get(),
            queued_tasks: self.inner.queued_tasks.get(),
            monitored_tasks: self.inner.monitored_tasks.get(),
            monitor_cycles_total: self.inner.monitor_cycles_total.get(),
            classification_failures_total: self.inner.classification_failures_total.get(),
        }
    }
}

fn collector_error(name: &'static str) -> impl FnOnce(prometheus::Error) -> TelemetryError {
    move |source| TelemetryError::MetricsCollector { name, source }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
