//! Submission path: identity resolution, duplicate pre-check, admission, and registration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use seedkeep_events::Event;
use seedkeep_torrent_core::{
    AddRequest, ContentIdentity, RequesterId, SubmitAck, TaskId, TaskListener, TaskSnapshot,
    TorrentError, TorrentResult, TorrentSource,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::{Admission, AdmissionTicket};
use crate::lifecycle::spawn_guarded;
use crate::orchestrator::Core;
use crate::pruning;
use crate::registry::{StatusHandle, TaskEntry, TaskPhase, TaskRecord};

/// Parameters of a single submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// User on whose behalf the task runs.
    pub requester: RequesterId,
    /// Magnet URI, remote link, or path of a local `.torrent` file.
    pub link: String,
    /// Download directory on the engine host.
    pub save_path: PathBuf,
    /// Share ratio at which seeding stops.
    pub ratio_limit: Option<f64>,
    /// Seeding time after which seeding stops.
    pub seed_time_limit: Option<Duration>,
}

impl SubmitRequest {
    /// Request without seeding limits.
    #[must_use]
    pub fn new(requester: RequesterId, link: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            requester,
            link: link.into(),
            save_path: save_path.into(),
            ratio_limit: None,
            seed_time_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Variant {
    Any,
    /// Local `.torrent` files only, followed by tracker pruning.
    FileOnly,
}

pub(crate) async fn submit(
    core: &Arc<Core>,
    listener: Arc<dyn TaskListener>,
    request: SubmitRequest,
    variant: Variant,
) -> TorrentResult<StatusHandle> {
    let task_id = listener.task_id();
    core.registry.begin_intake(task_id).await;
    match admit(core, &listener, request, variant).await {
        Ok(handle) => Ok(handle),
        Err(err) => {
            core.registry.abandon_intake(task_id).await;
            core.admission.cancel(task_id);
            core.refresh_admission_gauges();
            let transition = if matches!(err, TorrentError::Cancelled { .. }) {
                "cancelled"
            } else {
                "failed"
            };
            core.metrics.inc_transition(transition);
            warn!(task_id = %task_id, error = %err, "submission failed");
            listener.on_download_error(err.to_string(), None).await;
            core.publish(Event::TaskFailed {
                task_id,
                identity: None,
                message: err.to_string(),
            });
            Err(err)
        }
    }
}

async fn admit(
    core: &Arc<Core>,
    listener: &Arc<dyn TaskListener>,
    request: SubmitRequest,
    variant: Variant,
) -> TorrentResult<StatusHandle> {
    let task_id = listener.task_id();
    let source = TorrentSource::infer(&request.link);
    if variant == Variant::FileOnly && !source.is_local_file() {
        return Err(TorrentError::InvalidIdentity {
            value: request.link.chars().take(96).collect(),
            reason: "not_a_torrent_file",
        });
    }

    let known = resolve(&source).await?;
    if let Some(identity) = &known {
        reject_duplicate(core, identity).await?;
    }

    let admission = core.admission.check(task_id, request.requester);
    core.refresh_admission_gauges();
    let queued = admission.is_queued();
    if core.registry.intake_cancelled(task_id).await {
        return Err(TorrentError::Cancelled { task_id });
    }

    let ack = core
        .engine
        .submit(AddRequest {
            source,
            save_path: request.save_path,
            paused: queued,
            ratio_limit: request.ratio_limit,
            seed_time_limit: request.seed_time_limit,
            tag: task_id.to_string(),
        })
        .await?;
    if let SubmitAck::Rejected { message } = ack {
        return Err(TorrentError::SubmissionRejected { message });
    }

    let snapshot = match known {
        Some(identity) => poll_by_identity(core, &identity).await?,
        None => newest_task(core).await?,
    };
    let identity = snapshot.identity.clone();
    if listener.is_cancelled() || core.registry.intake_cancelled(task_id).await {
        core.purge(task_id, &identity).await;
        return Err(TorrentError::Cancelled { task_id });
    }

    let token = core.root.child_token();
    let entry = TaskEntry {
        task_id,
        listener: Arc::clone(listener),
        token: token.clone(),
        record: TaskRecord::new(Utc::now()),
    };
    let phase = if queued {
        TaskPhase::Queued
    } else {
        TaskPhase::Downloading
    };
    let handle = match core.registry.register(identity.clone(), entry, phase).await {
        Ok(handle) => handle,
        Err(err @ TorrentError::Cancelled { .. }) => {
            core.purge(task_id, &identity).await;
            return Err(err);
        }
        Err(err) => return Err(err),
    };
    core.metrics.set_monitored_tasks(core.registry.len().await);
    core.monitor.ensure_running(core).await;

    info!(task_id = %task_id, identity = %identity, queued, "task registered");
    listener.on_download_start().await;
    core.metrics.inc_transition("started");
    core.publish(Event::TaskStarted {
        task_id,
        identity: identity.clone(),
        name: snapshot.name,
    });
    if listener.multi_count() <= 1 {
        core.publish(Event::StatusRefresh { task_id });
    }

    if let Admission::Queued(ticket) = admission {
        core.publish(Event::TaskQueued {
            task_id,
            identity: identity.clone(),
        });
        let core_ref = Arc::clone(core);
        let listener = Arc::clone(listener);
        let waiting = identity.clone();
        let guard = token.child_token();
        tokio::spawn(async move {
            await_slot(&core_ref, listener.as_ref(), waiting, ticket, guard).await;
        });
    }

    if variant == Variant::FileOnly {
        let core_ref = Arc::clone(core);
        spawn_guarded(token.child_token(), async move {
            pruning::prune_dead_trackers(&core_ref, task_id, identity).await;
        });
    }

    Ok(handle)
}

async fn resolve(source: &TorrentSource) -> TorrentResult<Option<ContentIdentity>> {
    match source {
        TorrentSource::Magnet { uri } => match ContentIdentity::from_magnet(uri) {
            Ok(identity) => Ok(Some(identity)),
            Err(err) => {
                debug!(error = %err, "magnet identity unresolved before submission");
                Ok(None)
            }
        },
        TorrentSource::File { path } => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| TorrentError::Io {
                    operation: "torrent_file.read",
                    path: path.clone(),
                    source,
                })?;
            ContentIdentity::from_torrent_bytes(&bytes).map(Some)
        }
        TorrentSource::Url { .. } => Ok(None),
    }
}

/// Fail fast when the engine or registry already tracks `identity`; lookup errors are tolerated.
async fn reject_duplicate(core: &Core, identity: &ContentIdentity) -> TorrentResult<()> {
    if core.registry.get(identity).await.is_some() {
        return Err(TorrentError::DuplicateTask {
            identity: identity.clone(),
        });
    }
    match core.engine.list(Some(identity)).await {
        Ok(existing) if existing.iter().any(|task| &task.identity == identity) => {
            Err(TorrentError::DuplicateTask {
                identity: identity.clone(),
            })
        }
        Ok(_) => Ok(()),
        Err(err) => {
            core.metrics.inc_engine_error("list");
            warn!(identity = %identity, error = %err, "duplicate pre-check failed; continuing");
            Ok(())
        }
    }
}

async fn poll_by_identity(core: &Core, identity: &ContentIdentity) -> TorrentResult<TaskSnapshot> {
    let ingest = core.config.ingest;
    for attempt in 1..=ingest.poll_attempts {
        let listed = core.engine.list(Some(identity)).await?;
        if let Some(snapshot) = listed.into_iter().find(|task| &task.identity == identity) {
            debug!(identity = %identity, attempt, "submitted task visible in engine");
            return Ok(snapshot);
        }
        if attempt < ingest.poll_attempts {
            tokio::time::sleep(ingest.poll_interval()).await;
        }
    }
    Err(TorrentError::SubmissionTimeout {
        attempts: ingest.poll_attempts,
    })
}

/// Last resort for links whose identity is only known engine-side.
async fn newest_task(core: &Core) -> TorrentResult<TaskSnapshot> {
    tokio::time::sleep(core.config.ingest.fallback_delay()).await;
    let listed = core.engine.list(None).await?;
    listed
        .into_iter()
        .max_by_key(|task| task.added_at)
        .ok_or(TorrentError::SubmissionTimeout { attempts: 1 })
}

async fn await_slot(
    core: &Core,
    listener: &dyn TaskListener,
    identity: ContentIdentity,
    ticket: AdmissionTicket,
    token: CancellationToken,
) {
    let task_id: TaskId = ticket.task_id();
    let released = tokio::select! {
        () = token.cancelled() => false,
        released = ticket.released() => released,
    };
    if token.is_cancelled() {
        debug!(task_id = %task_id, "queued task wait aborted");
        core.admission.cancel(task_id);
        core.refresh_admission_gauges();
        return;
    }
    if !released || listener.is_cancelled() {
        core.admission.cancel(task_id);
        core.refresh_admission_gauges();
        if let Some(entry) = core.registry.remove(&identity).await {
            core.stop_by_user(identity, entry).await;
        }
        return;
    }

    core.refresh_admission_gauges();
    if !core.registry.swap_status(task_id, TaskPhase::Downloading).await {
        debug!(task_id = %task_id, "queued task deregistered before admission");
        core.release_slot(task_id);
        return;
    }
    let admitted = Utc::now();
    core.registry
        .update(&identity, |record| {
            record.admitted_at = admitted;
            record.stalled_watermark = admitted;
        })
        .await;
    if let Err(err) = core.engine.resume(&identity).await {
        core.engine_failed("resume", &identity, &err);
    }
    info!(task_id = %task_id, identity = %identity, "queued task admitted");
    core.metrics.inc_transition("resumed");
    core.publish(Event::TaskResumed {
        task_id,
        identity,
    });
    core.publish(Event::StatusRefresh { task_id });
}
