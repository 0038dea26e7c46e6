//! Torrent-session orchestrator owning admission, registry, and the lifecycle monitor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use seedkeep_config::OrchestratorConfig;
use seedkeep_events::{Event, EventBus};
use seedkeep_telemetry::Metrics;
use seedkeep_torrent_core::{
    ContentIdentity, DuplicateChecker, NoDuplicateCheck, TaskId, TaskListener, TorrentEngine,
    TorrentError, TorrentResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::admission::AdmissionController;
use crate::ingest::{self, SubmitRequest, Variant};
use crate::monitor::MonitorSupervisor;
use crate::registry::{StatusHandle, TaskEntry, TaskRegistry, Withdrawal};

const STOPPED_BY_USER: &str = "download stopped by user";

/// Collaborators injected into an [`Orchestrator`].
pub struct OrchestratorDeps {
    /// Control API of the torrent daemon.
    pub engine: Arc<dyn TorrentEngine>,
    /// Conflict detector run once per task when downloading starts.
    pub duplicates: Arc<dyn DuplicateChecker>,
    /// Lifecycle event bus.
    pub events: EventBus,
    /// Metrics registry.
    pub metrics: Metrics,
}

impl OrchestratorDeps {
    /// Dependencies without duplicate suppression.
    #[must_use]
    pub fn new(engine: Arc<dyn TorrentEngine>, events: EventBus, metrics: Metrics) -> Self {
        Self {
            engine,
            duplicates: Arc::new(NoDuplicateCheck),
            events,
            metrics,
        }
    }

    /// Replace the duplicate checker.
    #[must_use]
    pub fn with_duplicate_checker(mut self, duplicates: Arc<dyn DuplicateChecker>) -> Self {
        self.duplicates = duplicates;
        self
    }
}

/// State shared by the ingestion path, the monitor loop, and side tasks.
pub(crate) struct Core {
    pub(crate) engine: Arc<dyn TorrentEngine>,
    pub(crate) duplicates: Arc<dyn DuplicateChecker>,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) admission: AdmissionController,
    pub(crate) monitor: MonitorSupervisor,
    pub(crate) events: EventBus,
    pub(crate) metrics: Metrics,
    pub(crate) config: OrchestratorConfig,
    pub(crate) root: CancellationToken,
    pub(crate) stop_all: AtomicBool,
}

impl Core {
    pub(crate) fn publish(&self, event: Event) {
        self.events.publish(event);
    }

    pub(crate) fn refresh_admission_gauges(&self) {
        self.metrics.set_active_tasks(self.admission.active_count());
        self.metrics.set_queued_tasks(self.admission.queued_count());
    }

    pub(crate) fn release_slot(&self, task_id: TaskId) {
        self.admission.release(task_id);
        self.refresh_admission_gauges();
    }

    /// Log and count a failed best-effort engine call.
    pub(crate) fn engine_failed(
        &self,
        operation: &'static str,
        identity: &ContentIdentity,
        err: &TorrentError,
    ) {
        self.metrics.inc_engine_error(operation);
        warn!(operation, identity = %identity, error = %err, "engine call failed");
    }

    /// Remove a deregistered task engine-side together with its files.
    pub(crate) async fn purge(&self, task_id: TaskId, identity: &ContentIdentity) {
        if let Err(err) = self.engine.remove(identity, true).await {
            self.engine_failed("remove", identity, &err);
        }
        self.publish(Event::TaskRemoved {
            task_id,
            identity: identity.clone(),
        });
        self.metrics.set_monitored_tasks(self.registry.len().await);
    }

    /// Tear down a task its user withdrew; the caller already deregistered `entry`.
    pub(crate) async fn stop_by_user(&self, identity: ContentIdentity, entry: TaskEntry) {
        let task_id = entry.task_id;
        entry.token.cancel();
        info!(task_id = %task_id, identity = %identity, "task cancelled by user");
        self.metrics.inc_transition("cancelled");
        self.purge(task_id, &identity).await;
        entry
            .listener
            .on_download_error(STOPPED_BY_USER.to_string(), None)
            .await;
        self.publish(Event::TaskFailed {
            task_id,
            identity: Some(identity),
            message: STOPPED_BY_USER.to_string(),
        });
    }
}

/// Entry point for submitting, inspecting, and cancelling torrent tasks.
///
/// Owns its registry and monitor; dropping the orchestrator after
/// [`Orchestrator::shutdown`] tears every background task down.
pub struct Orchestrator {
    core: Arc<Core>,
}

impl Orchestrator {
    /// Build an orchestrator; nothing runs until the first submission.
    #[must_use]
    pub fn new(config: OrchestratorConfig, deps: OrchestratorDeps) -> Self {
        let core = Core {
            engine: deps.engine,
            duplicates: deps.duplicates,
            registry: TaskRegistry::new(),
            admission: AdmissionController::new(config.admission),
            monitor: MonitorSupervisor::new(),
            events: deps.events,
            metrics: deps.metrics,
            config,
            root: CancellationToken::new(),
            stop_all: AtomicBool::new(false),
        };
        Self {
            core: Arc::new(core),
        }
    }

    /// Submit a magnet, remote link, or local `.torrent` file.
    ///
    /// # Errors
    ///
    /// Returns the error already reported through
    /// [`TaskListener::on_download_error`] when the task could not be registered.
    pub async fn submit(
        &self,
        listener: Arc<dyn TaskListener>,
        request: SubmitRequest,
    ) -> TorrentResult<StatusHandle> {
        ingest::submit(&self.core, listener, request, Variant::Any).await
    }

    /// Submit a local `.torrent` file and prune its dead trackers in the background.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InvalidIdentity`] for magnets and links, and
    /// otherwise behaves like [`Orchestrator::submit`].
    pub async fn submit_file(
        &self,
        listener: Arc<dyn TaskListener>,
        request: SubmitRequest,
    ) -> TorrentResult<StatusHandle> {
        ingest::submit(&self.core, listener, request, Variant::FileOnly).await
    }

    /// Stop a task on behalf of its user; returns `false` when the task is unknown.
    ///
    /// A task still being submitted is never registered: its pending
    /// [`Orchestrator::submit`] call fails with [`TorrentError::Cancelled`].
    pub async fn cancel(&self, task_id: TaskId) -> bool {
        let core = &self.core;
        let withdrawal = core.registry.withdraw(task_id).await;
        core.admission.cancel(task_id);
        core.refresh_admission_gauges();

        match withdrawal {
            Withdrawal::Registered(identity, entry) => {
                core.stop_by_user(identity, entry).await;
                true
            }
            Withdrawal::InFlight => {
                info!(task_id = %task_id, "cancellation recorded for in-flight submission");
                true
            }
            Withdrawal::Unknown => false,
        }
    }

    /// Ask in-flight completions to skip their remaining side effects.
    pub fn stop_all(&self) {
        self.core.stop_all.store(true, Ordering::SeqCst);
        info!("stop-all requested");
    }

    /// Status handle for `task_id`.
    pub async fn status(&self, task_id: TaskId) -> Option<StatusHandle> {
        self.core.registry.lookup_by_task_id(task_id).await
    }

    /// Registry backing this orchestrator.
    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.core.registry
    }

    /// Admission controller backing this orchestrator.
    #[must_use]
    pub fn admission(&self) -> &AdmissionController {
        &self.core.admission
    }

    /// Event bus lifecycle events are published on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.core.events
    }

    /// Metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.core.metrics
    }

    /// Whether the monitor loop is currently running.
    pub async fn is_monitoring(&self) -> bool {
        self.core.monitor.is_running().await
    }

    /// Cancel every background task and wait for the monitor to exit.
    pub async fn shutdown(&self) {
        self.core.root.cancel();
        self.core.monitor.join().await;
        info!("orchestrator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedkeep_test_support::{FakeEngine, RecordingListener, magnet_for, sample_identity};
    use seedkeep_torrent_core::RequesterId;

    fn orchestrator(engine: Arc<FakeEngine>) -> anyhow::Result<Orchestrator> {
        let deps = OrchestratorDeps::new(engine, EventBus::with_capacity(64), Metrics::new()?);
        Ok(Orchestrator::new(OrchestratorConfig::default(), deps))
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_noop() -> anyhow::Result<()> {
        let orchestrator = orchestrator(Arc::new(FakeEngine::new()))?;
        assert!(!orchestrator.cancel(TaskId(404)).await);
        assert!(orchestrator.status(TaskId(404)).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn cancel_removes_task_and_reports_once() -> anyhow::Result<()> {
        let engine = Arc::new(FakeEngine::new());
        let orchestrator = orchestrator(Arc::clone(&engine))?;
        let listener = Arc::new(RecordingListener::new(11));
        let identity = sample_identity();

        orchestrator
            .submit(
                listener.clone(),
                SubmitRequest::new(RequesterId(1), magnet_for(&identity), "/downloads/11"),
            )
            .await?;
        assert!(orchestrator.cancel(TaskId(11)).await);
        assert!(!orchestrator.cancel(TaskId(11)).await);

        assert_eq!(listener.errors(), vec![STOPPED_BY_USER.to_string()]);
        assert!(orchestrator.registry().get(&identity).await.is_none());
        assert!(engine.task(&identity).is_none());
        assert_eq!(orchestrator.admission().active_count(), 0);
        orchestrator.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_stops_monitor() -> anyhow::Result<()> {
        let engine = Arc::new(FakeEngine::new());
        let orchestrator = orchestrator(engine)?;
        let identity = sample_identity();
        orchestrator
            .submit(
                Arc::new(RecordingListener::new(12)),
                SubmitRequest::new(RequesterId(1), magnet_for(&identity), "/downloads/12"),
            )
            .await?;
        assert!(orchestrator.is_monitoring().await);

        orchestrator.shutdown().await;
        assert!(!orchestrator.is_monitoring().await);
        Ok(())
    }
}
