#![allow(clippy::redundant_pub_crate)]

//! Per-task state machine driven by the monitor.
//!
//! # Design
//! - `classify` is pure: record + snapshot + clock in, one action out. Rows are evaluated in
//!   order and the first match wins.
//! - Terminal transitions deregister synchronously; engine-side cleanup and callbacks run in
//!   side tasks carrying a child of the task token.
//! - An unrecognised engine state fails classification for that task only.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use seedkeep_events::Event;
use seedkeep_torrent_core::{
    ContentIdentity, EngineState, ErrorChoice, SeedSummary, TaskSnapshot, TorrentError,
    TorrentResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::Core;
use crate::registry::{SeedingHandoff, TaskEntry, TaskRecord};

const RECHECK_FLOOR: f64 = 0.9999;
const NEAR_COMPLETE: f64 = 0.999;

/// Transition chosen for one task in one cycle.
#[derive(Debug)]
pub(crate) enum Action {
    /// Nothing to do this cycle.
    Idle,
    /// Re-announce to trackers, optionally refreshing the watermark.
    Reannounce { refresh_watermark: bool },
    /// Forward progress observed; the first observation runs the duplicate check.
    Progress { check_duplicates: bool },
    /// Force an integrity re-check; `near_complete` marks the one-shot variant.
    Recheck { near_complete: bool },
    /// Terminal failure.
    Fail(TorrentError),
    /// Hand the finished payload off.
    Complete,
    /// Seeding limits were reached.
    FinishSeeding,
}

/// Pick the transition for `snapshot`.
///
/// # Errors
///
/// Returns [`TorrentError::UnrecognizedState`] for states the adapter could not map.
pub(crate) fn classify(
    record: &TaskRecord,
    snapshot: &TaskSnapshot,
    now: DateTime<Utc>,
    timeout: Option<Duration>,
) -> TorrentResult<Action> {
    let identity = &snapshot.identity;
    let by_state = match &snapshot.state {
        EngineState::MetadataFetching | EngineState::ForcedMetadataFetching => {
            if expired(snapshot.added_at.max(record.admitted_at), now, timeout) {
                Some(Action::Fail(TorrentError::DeadTask {
                    identity: identity.clone(),
                }))
            } else {
                Some(Action::Reannounce {
                    refresh_watermark: true,
                })
            }
        }
        EngineState::Downloading | EngineState::ForcedDownload => Some(Action::Progress {
            check_duplicates: !record.stop_dup_check_done,
        }),
        EngineState::StalledDownload => Some(
            if snapshot.progress > RECHECK_FLOOR && snapshot.progress < 1.0 && !record.rechecked {
                Action::Recheck {
                    near_complete: true,
                }
            } else if expired(record.stalled_watermark, now, timeout) {
                Action::Fail(TorrentError::DeadTask {
                    identity: identity.clone(),
                })
            } else {
                Action::Reannounce {
                    refresh_watermark: false,
                }
            },
        ),
        EngineState::MissingFiles => Some(Action::Recheck {
            near_complete: false,
        }),
        EngineState::Error => Some(Action::Fail(TorrentError::EngineReportedError {
            identity: identity.clone(),
        })),
        EngineState::Unknown(raw) => {
            return Err(TorrentError::UnrecognizedState {
                identity: identity.clone(),
                raw: raw.clone(),
            });
        }
        EngineState::Uploading
        | EngineState::PausedUpload
        | EngineState::QueuedUpload
        | EngineState::StalledUpload
        | EngineState::CheckingUpload
        | EngineState::ForcedUpload
        | EngineState::Allocating
        | EngineState::PausedDownload
        | EngineState::QueuedDownload
        | EngineState::CheckingDownload
        | EngineState::CheckingResumeData
        | EngineState::Moving => None,
    };
    if let Some(action) = by_state {
        return Ok(action);
    }

    let finished = snapshot.progress >= NEAR_COMPLETE
        || matches!(
            snapshot.state,
            EngineState::Uploading | EngineState::StalledUpload
        );
    if finished && !record.uploaded && !snapshot.state.is_checking() {
        return Ok(Action::Complete);
    }
    if snapshot.state == EngineState::PausedUpload && record.seeding {
        return Ok(Action::FinishSeeding);
    }
    Ok(Action::Idle)
}

fn expired(since: DateTime<Utc>, now: DateTime<Utc>, timeout: Option<Duration>) -> bool {
    timeout.is_some_and(|limit| {
        now.signed_duration_since(since)
            .to_std()
            .is_ok_and(|age| age >= limit)
    })
}

/// Classify and act on every registered task in the snapshot.
pub(crate) async fn reconcile(core: &Arc<Core>, snapshots: Vec<TaskSnapshot>, now: DateTime<Utc>) {
    let timeout = core.config.monitor.torrent_timeout();
    for snapshot in snapshots {
        let Some(entry) = core.registry.get(&snapshot.identity).await else {
            continue;
        };
        match classify(&entry.record, &snapshot, now, timeout) {
            Ok(action) => apply(core, entry, snapshot, action, now).await,
            Err(err) => {
                core.metrics.inc_classification_failure();
                warn!(
                    task_id = %entry.task_id,
                    identity = %snapshot.identity,
                    error = %err,
                    "failed to classify engine state; skipping task this cycle"
                );
            }
        }
    }
}

async fn apply(
    core: &Arc<Core>,
    entry: TaskEntry,
    snapshot: TaskSnapshot,
    action: Action,
    now: DateTime<Utc>,
) {
    let identity = &snapshot.identity;
    match action {
        Action::Idle => {}
        Action::Reannounce { refresh_watermark } => {
            if refresh_watermark {
                core.registry
                    .update(identity, |record| record.stalled_watermark = now)
                    .await;
            }
            debug!(identity = %identity, state = ?snapshot.state, "re-announcing task");
            match core.engine.reannounce(identity).await {
                Ok(()) => core.publish(Event::Reannounced {
                    identity: identity.clone(),
                }),
                Err(err) => core.engine_failed("reannounce", identity, &err),
            }
        }
        Action::Progress { check_duplicates } => {
            core.registry
                .update(identity, |record| {
                    record.stalled_watermark = now;
                    if check_duplicates {
                        record.stop_dup_check_done = true;
                    }
                })
                .await;
            if check_duplicates
                && let Some(verdict) = core
                    .duplicates
                    .check(entry.listener.as_ref(), &snapshot.name, snapshot.size)
                    .await
            {
                info!(task_id = %entry.task_id, identity = %identity, "duplicate check flagged task");
                fail(core, identity, verdict.message, verdict.choice).await;
            }
        }
        Action::Recheck { near_complete } => {
            if near_complete {
                core.registry
                    .update(identity, |record| record.rechecked = true)
                    .await;
            }
            info!(identity = %identity, progress = snapshot.progress, "forcing integrity re-check");
            match core.engine.recheck(identity).await {
                Ok(()) => core.publish(Event::Rechecked {
                    identity: identity.clone(),
                }),
                Err(err) => core.engine_failed("recheck", identity, &err),
            }
        }
        Action::Fail(err) => fail(core, identity, err.to_string(), None).await,
        Action::Complete => {
            core.registry
                .update(identity, |record| record.uploaded = true)
                .await;
            let token = entry.token.child_token();
            let core = Arc::clone(core);
            spawn_guarded(token, async move { complete(&core, entry, snapshot).await });
        }
        Action::FinishSeeding => {
            core.registry
                .update(identity, |record| record.seeding = false)
                .await;
            let token = entry.token.child_token();
            let core = Arc::clone(core);
            spawn_guarded(token, async move { finish_seeding(&core, entry, snapshot).await });
        }
    }
}

/// Deregister `identity` and report `message`; no-op when another path already removed it.
pub(crate) async fn fail(
    core: &Arc<Core>,
    identity: &ContentIdentity,
    message: String,
    choice: Option<ErrorChoice>,
) {
    let Some(entry) = core.registry.remove(identity).await else {
        debug!(identity = %identity, "task already deregistered");
        return;
    };
    core.release_slot(entry.task_id);
    core.metrics.inc_transition("failed");
    warn!(task_id = %entry.task_id, identity = %identity, message = %message, "task failed");
    core.publish(Event::TaskFailed {
        task_id: entry.task_id,
        identity: Some(identity.clone()),
        message: message.clone(),
    });

    let token = entry.token.child_token();
    let core = Arc::clone(core);
    let identity = identity.clone();
    spawn_guarded(token, async move {
        if let Err(err) = core.engine.pause(&identity).await {
            core.engine_failed("pause", &identity, &err);
        }
        entry.listener.on_download_error(message, choice).await;
        tokio::time::sleep(core.config.monitor.settle_delay()).await;
        core.purge(entry.task_id, &identity).await;
    });
}

/// Run `task` in the background until it finishes or `token` is cancelled.
pub(crate) fn spawn_guarded<F>(token: CancellationToken, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => debug!("side task cancelled"),
            () = task => {}
        }
    });
}

async fn complete(core: &Arc<Core>, entry: TaskEntry, snapshot: TaskSnapshot) {
    let identity = &snapshot.identity;
    let listener = Arc::clone(&entry.listener);
    let seed = listener.seed_requested();
    info!(task_id = %entry.task_id, identity = %identity, seed, "download complete");

    if !seed && let Err(err) = core.engine.pause(identity).await {
        core.engine_failed("pause", identity, &err);
    }
    if listener.select_files() {
        remove_skipped_files(core, identity, &snapshot.save_path).await;
    }
    listener.on_download_complete().await;
    core.metrics.inc_transition("completed");
    core.publish(Event::TaskCompleted {
        task_id: entry.task_id,
        identity: identity.clone(),
    });
    core.release_slot(entry.task_id);

    if core.stop_all.load(Ordering::SeqCst) {
        debug!(identity = %identity, "stop-all set; skipping post-completion steps");
        return;
    }

    if seed && !listener.is_cancelled() {
        match core.registry.begin_seeding(entry.task_id, identity).await {
            SeedingHandoff::Started => {}
            SeedingHandoff::StatusGone => {
                debug!(identity = %identity, "status handle gone; dropping completed task");
                if core.registry.remove(identity).await.is_some() {
                    core.purge(entry.task_id, identity).await;
                }
                return;
            }
            SeedingHandoff::Removed => {
                debug!(identity = %identity, "task removed before seeding started");
                return;
            }
        }
        core.metrics.inc_transition("seeding");
        core.publish(Event::SeedingStarted {
            task_id: entry.task_id,
            identity: identity.clone(),
        });
        core.publish(Event::StatusRefresh {
            task_id: entry.task_id,
        });
    } else if core.registry.remove(identity).await.is_some() {
        core.purge(entry.task_id, identity).await;
    }
}

async fn remove_skipped_files(core: &Core, identity: &ContentIdentity, save_path: &Path) {
    let files = match core.engine.files(identity).await {
        Ok(files) => files,
        Err(err) => {
            core.engine_failed("files", identity, &err);
            return;
        }
    };
    for file in files.iter().filter(|file| file.is_skipped()) {
        let path = save_path.join(&file.path);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "removed deselected file"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove deselected file"),
        }
    }
}

async fn finish_seeding(core: &Arc<Core>, entry: TaskEntry, snapshot: TaskSnapshot) {
    let identity = &snapshot.identity;
    let summary = SeedSummary {
        name: snapshot.name.clone(),
        ratio: snapshot.ratio,
        seeding_time: snapshot.seeding_time,
    };
    info!(task_id = %entry.task_id, identity = %identity, summary = %summary, "seeding finished");
    entry.listener.on_seeding_stopped(summary).await;
    core.metrics.inc_transition("seeding_stopped");
    core.publish(Event::SeedingStopped {
        task_id: entry.task_id,
        identity: identity.clone(),
        ratio: snapshot.ratio,
        seeding_secs: snapshot.seeding_time.as_secs(),
    });
    if core.registry.remove(identity).await.is_some() {
        core.purge(entry.task_id, identity).await;
    }
    tokio::time::sleep(core.config.monitor.settle_delay()).await;
}
