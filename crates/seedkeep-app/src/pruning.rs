#![allow(clippy::redundant_pub_crate)]

//! Dead-tracker pruning for tasks submitted from local `.torrent` files.
//!
//! The engine lists three pseudo-trackers (DHT, PeX, LSD) ahead of the real
//! announce URLs. Once the first real tracker is reported dead, it and every
//! tracker after it are removed in a single call.

use seedkeep_events::Event;
use seedkeep_torrent_core::{ContentIdentity, TaskId, TrackerEntry};
use tracing::{debug, info};

use crate::orchestrator::Core;

/// Pseudo-tracker rows preceding the announce list.
const PSEUDO_TRACKERS: usize = 3;

/// URLs from the first dead tracker to the end of the list.
pub(crate) fn dead_tail(trackers: &[TrackerEntry]) -> Vec<String> {
    let real = trackers.get(PSEUDO_TRACKERS..).unwrap_or_default();
    real.iter()
        .position(|entry| entry.status.is_dead())
        .map(|first| real[first..].iter().map(|entry| entry.url.clone()).collect())
        .unwrap_or_default()
}

/// Poll trackers until a dead one shows up, then prune; runs at most once per task.
///
/// Cancellation is handled by the caller's token; this loop additionally stops as
/// soon as the task is deregistered.
pub(crate) async fn prune_dead_trackers(core: &Core, task_id: TaskId, identity: ContentIdentity) {
    let settings = core.config.pruning;
    tokio::time::sleep(settings.settle_delay()).await;

    for attempt in 1..=settings.max_attempts {
        if core.registry.get(&identity).await.is_none() {
            debug!(task_id = %task_id, "task deregistered; tracker pruning stopped");
            return;
        }

        match core.engine.trackers(&identity).await {
            Ok(trackers) => {
                let removed = dead_tail(&trackers);
                if !removed.is_empty() {
                    if let Err(err) = core.engine.remove_trackers(&identity, &removed).await {
                        core.engine_failed("remove_trackers", &identity, &err);
                        return;
                    }
                    info!(
                        task_id = %task_id,
                        identity = %identity,
                        removed = removed.len(),
                        "pruned dead trackers"
                    );
                    core.publish(Event::TrackersPruned { identity, removed });
                    return;
                }
            }
            Err(err) => core.engine_failed("trackers", &identity, &err),
        }

        if attempt < settings.max_attempts {
            tokio::time::sleep(settings.poll_interval()).await;
        }
    }
    debug!(task_id = %task_id, "no dead trackers found");
}
