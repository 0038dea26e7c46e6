#![allow(dead_code, unreachable_pub)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use seedkeep_app::{Orchestrator, OrchestratorDeps, TaskPhase};
use seedkeep_config::{OrchestratorConfig, PruningConfig};
use seedkeep_events::{Event, EventBus};
use seedkeep_telemetry::Metrics;
use seedkeep_test_support::FakeEngine;
use seedkeep_torrent_core::{ContentIdentity, DuplicateChecker, TaskId};

pub const WAIT: Duration = Duration::from_secs(5);

/// Millisecond-scale timings so the monitor cycles quickly.
pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.monitor.poll_interval_ms = 20;
    config.monitor.settle_delay_ms = 0;
    config.ingest.poll_attempts = 3;
    config.ingest.poll_interval_ms = 10;
    config.ingest.fallback_delay_ms = 10;
    config.pruning = PruningConfig {
        settle_delay_secs: 0,
        poll_interval_secs: 0,
        max_attempts: 5,
    };
    config
}

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub orchestrator: Orchestrator,
}

pub fn harness(config: OrchestratorConfig) -> Result<Harness> {
    build(config, None)
}

pub fn harness_with_checker(
    config: OrchestratorConfig,
    duplicates: Arc<dyn DuplicateChecker>,
) -> Result<Harness> {
    build(config, Some(duplicates))
}

fn build(
    config: OrchestratorConfig,
    duplicates: Option<Arc<dyn DuplicateChecker>>,
) -> Result<Harness> {
    let engine = Arc::new(FakeEngine::new());
    let mut deps = OrchestratorDeps::new(
        Arc::clone(&engine) as _,
        EventBus::with_capacity(256),
        Metrics::new()?,
    );
    if let Some(duplicates) = duplicates {
        deps = deps.with_duplicate_checker(duplicates);
    }
    Ok(Harness {
        engine,
        orchestrator: Orchestrator::new(config, deps),
    })
}

/// Poll `predicate` every 10ms until it holds or [`WAIT`] elapses.
pub async fn eventually(predicate: impl Fn() -> bool) -> bool {
    let poll = async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(WAIT, poll).await.is_ok()
}

pub async fn deregistered(orchestrator: &Orchestrator, identity: &ContentIdentity) -> bool {
    let poll = async {
        while orchestrator.registry().get(identity).await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(WAIT, poll).await.is_ok()
}

pub async fn reaches_phase(orchestrator: &Orchestrator, task_id: TaskId, phase: TaskPhase) -> bool {
    let poll = async {
        loop {
            let current = orchestrator.status(task_id).await.map(|handle| handle.phase());
            if current == Some(phase) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(WAIT, poll).await.is_ok()
}

/// Every event published so far, in order.
pub fn published(orchestrator: &Orchestrator) -> Vec<Event> {
    orchestrator
        .events()
        .backlog_since(0)
        .into_iter()
        .map(|envelope| envelope.event)
        .collect()
}

pub fn count_kind(orchestrator: &Orchestrator, kind: &str) -> usize {
    published(orchestrator)
        .iter()
        .filter(|event| event.kind() == kind)
        .count()
}
