#![allow(clippy::redundant_pub_crate)]

//! Lazily started polling loop reconciling engine snapshots with the registry.
//!
//! # Design
//! - Explicit `Stopped | Running` state; `ensure_running` is idempotent.
//! - The loop stops itself once the registry is empty, deciding under the state lock so a
//!   concurrent registration always restarts it.
//! - One engine snapshot per cycle regardless of task count.

use std::sync::Arc;

use chrono::Utc;
use seedkeep_events::Event;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::lifecycle;
use crate::orchestrator::Core;
use crate::registry::TaskRegistry;

enum MonitorState {
    Stopped,
    Running(JoinHandle<()>),
}

/// Owner of the monitor task handle.
pub(crate) struct MonitorSupervisor {
    state: Mutex<MonitorState>,
}

impl MonitorSupervisor {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState::Stopped),
        }
    }

    /// Start the loop unless one is already running.
    pub(crate) async fn ensure_running(&self, core: &Arc<Core>) {
        let mut state = self.state.lock().await;
        if let MonitorState::Running(handle) = &*state
            && !handle.is_finished()
        {
            return;
        }
        if core.root.is_cancelled() {
            return;
        }
        let handle = tokio::spawn(run(Arc::clone(core)));
        *state = MonitorState::Running(handle);
    }

    pub(crate) async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, MonitorState::Running(handle) if !handle.is_finished())
    }

    /// Mark the loop stopped when nothing is registered; returns whether it should exit.
    async fn stop_if_idle(&self, registry: &TaskRegistry) -> bool {
        let mut state = self.state.lock().await;
        if !registry.is_empty().await {
            return false;
        }
        *state = MonitorState::Stopped;
        true
    }

    /// Wait for a running loop to exit; the root token must already be cancelled.
    pub(crate) async fn join(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, MonitorState::Stopped);
        if let MonitorState::Running(handle) = previous
            && let Err(err) = handle.await
        {
            warn!(error = %err, "monitor task join failed");
        }
    }
}

async fn run(core: Arc<Core>) {
    info!(
        poll_interval_ms = core.config.monitor.poll_interval_ms,
        "lifecycle monitor started"
    );
    core.publish(Event::MonitorStarted);

    let mut ticker = time::interval(core.config.monitor.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = core.root.cancelled() => {
                debug!("lifecycle monitor cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }

        core.metrics.inc_monitor_cycle();
        match core.engine.list(None).await {
            Ok(snapshots) => lifecycle::reconcile(&core, snapshots, Utc::now()).await,
            Err(err) => {
                core.metrics.inc_engine_error("list");
                warn!(error = %err, "failed to fetch engine snapshot; retrying next cycle");
            }
        }
        core.metrics.set_monitored_tasks(core.registry.len().await);

        if core.monitor.stop_if_idle(&core.registry).await {
            break;
        }
    }

    core.publish(Event::MonitorStopped);
    info!("lifecycle monitor stopped");
}
