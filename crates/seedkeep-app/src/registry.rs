//! Lifecycle-scoped registry of monitored tasks.
//!
//! # Design
//! - One mutex guards both tables so readers see a record either fully formed or absent.
//! - `remove` hands the entry to exactly one caller; only that caller runs terminal side effects.
//! - Status handles hold a `Weak` back-reference and never own engine state.
//! - Submissions in flight are tracked by task id until they register, so a cancel that
//!   races the submission is recorded instead of lost.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use seedkeep_torrent_core::{ContentIdentity, TaskId, TaskListener, TorrentError, TorrentResult};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Mutable monitoring state for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Last time forward progress was observed.
    pub stalled_watermark: DateTime<Utc>,
    /// Whether the one-shot duplicate check already ran.
    pub stop_dup_check_done: bool,
    /// Whether the near-complete integrity re-check was issued.
    pub rechecked: bool,
    /// Whether the completion sequence started.
    pub uploaded: bool,
    /// Whether the task keeps seeding after completion.
    pub seeding: bool,
    /// When the task last obtained an admission slot; timeouts never count queue time.
    pub admitted_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Fresh record admitted at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            stalled_watermark: now,
            stop_dup_check_done: false,
            rechecked: false,
            uploaded: false,
            seeding: false,
            admitted_at: now,
        }
    }
}

/// Registry entry: the record plus the owning task's collaborators.
#[derive(Clone)]
pub struct TaskEntry {
    /// External task id.
    pub task_id: TaskId,
    /// Callbacks for the task.
    pub listener: Arc<dyn TaskListener>,
    /// Token cancelled when the task ends.
    pub token: CancellationToken,
    /// Monitoring state.
    pub record: TaskRecord,
}

/// Display phase of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Waiting for an admission slot.
    Queued,
    /// Transferring payload.
    Downloading,
    /// Seeding after completion.
    Seeding,
}

/// Non-owning view of a task for status display.
#[derive(Clone)]
pub struct StatusHandle {
    task_id: TaskId,
    identity: ContentIdentity,
    phase: TaskPhase,
    registry: Weak<TaskRegistry>,
}

impl StatusHandle {
    /// External task id.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Engine-side identity.
    #[must_use]
    pub const fn identity(&self) -> &ContentIdentity {
        &self.identity
    }

    /// Current display phase.
    #[must_use]
    pub const fn phase(&self) -> TaskPhase {
        self.phase
    }

    /// Live record, if the task is still registered and the registry alive.
    pub async fn record(&self) -> Option<TaskRecord> {
        let registry = self.registry.upgrade()?;
        registry.get(&self.identity).await.map(|entry| entry.record)
    }
}

impl std::fmt::Debug for StatusHandle {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StatusHandle")
            .field("task_id", &self.task_id)
            .field("identity", &self.identity)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Result of [`TaskRegistry::withdraw`].
pub enum Withdrawal {
    /// The task was registered; the caller now owns its entry.
    Registered(ContentIdentity, TaskEntry),
    /// The task is still being submitted; registration will be refused.
    InFlight,
    /// Nothing is known about the task.
    Unknown,
}

/// Result of [`TaskRegistry::begin_seeding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedingHandoff {
    /// Phase switched to seeding and the record flagged.
    Started,
    /// The record is live but its status handle is gone.
    StatusGone,
    /// The task was deregistered.
    Removed,
}

#[derive(Default)]
struct Tables {
    entries: HashMap<ContentIdentity, TaskEntry>,
    statuses: HashMap<TaskId, StatusHandle>,
    /// Submissions not yet registered; `true` once cancelled.
    intake: HashMap<TaskId, bool>,
}

/// Identity → entry and task id → status tables behind one lock.
#[derive(Default)]
pub struct TaskRegistry {
    tables: Mutex<Tables>,
}

impl TaskRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Track `task_id` as being submitted.
    pub async fn begin_intake(&self, task_id: TaskId) {
        self.tables.lock().await.intake.insert(task_id, false);
    }

    /// Stop tracking a submission that ended without registering.
    pub async fn abandon_intake(&self, task_id: TaskId) {
        self.tables.lock().await.intake.remove(&task_id);
    }

    /// Whether the in-flight submission of `task_id` was cancelled.
    pub async fn intake_cancelled(&self, task_id: TaskId) -> bool {
        self.tables
            .lock()
            .await
            .intake
            .get(&task_id)
            .copied()
            .unwrap_or(false)
    }

    /// Insert the entry and its status handle atomically, ending its intake.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Cancelled`] when the submission was withdrawn, and
    /// [`TorrentError::DuplicateTask`] when `identity` is already registered.
    pub async fn register(
        self: &Arc<Self>,
        identity: ContentIdentity,
        entry: TaskEntry,
        phase: TaskPhase,
    ) -> TorrentResult<StatusHandle> {
        let mut tables = self.tables.lock().await;
        if tables.intake.remove(&entry.task_id) == Some(true) {
            return Err(TorrentError::Cancelled {
                task_id: entry.task_id,
            });
        }
        if tables.entries.contains_key(&identity) {
            return Err(TorrentError::DuplicateTask { identity });
        }
        let handle = StatusHandle {
            task_id: entry.task_id,
            identity: identity.clone(),
            phase,
            registry: Arc::downgrade(self),
        };
        tables.statuses.insert(entry.task_id, handle.clone());
        tables.entries.insert(identity, entry);
        Ok(handle)
    }

    /// Copy of the entry for `identity`.
    pub async fn get(&self, identity: &ContentIdentity) -> Option<TaskEntry> {
        self.tables.lock().await.entries.get(identity).cloned()
    }

    /// Mutate the record for `identity`; `None` when it is not registered.
    pub async fn update<R>(
        &self,
        identity: &ContentIdentity,
        apply: impl FnOnce(&mut TaskRecord) -> R,
    ) -> Option<R> {
        let mut tables = self.tables.lock().await;
        tables
            .entries
            .get_mut(identity)
            .map(|entry| apply(&mut entry.record))
    }

    /// Deregister `identity` together with its status handle.
    ///
    /// Returns the entry to exactly one caller.
    pub async fn remove(&self, identity: &ContentIdentity) -> Option<TaskEntry> {
        let mut tables = self.tables.lock().await;
        let entry = tables.entries.remove(identity)?;
        tables.statuses.remove(&entry.task_id);
        Some(entry)
    }

    /// Deregister `task_id` on behalf of its user, or mark its submission cancelled.
    pub async fn withdraw(&self, task_id: TaskId) -> Withdrawal {
        let mut tables = self.tables.lock().await;
        tables.statuses.remove(&task_id);
        let identity = tables
            .entries
            .iter()
            .find(|(_, entry)| entry.task_id == task_id)
            .map(|(identity, _)| identity.clone());
        if let Some(identity) = identity
            && let Some(entry) = tables.entries.remove(&identity)
        {
            return Withdrawal::Registered(identity, entry);
        }
        match tables.intake.get_mut(&task_id) {
            Some(cancelled) => {
                *cancelled = true;
                Withdrawal::InFlight
            }
            None => Withdrawal::Unknown,
        }
    }

    /// Switch a completed task to seeding in one step.
    pub async fn begin_seeding(&self, task_id: TaskId, identity: &ContentIdentity) -> SeedingHandoff {
        let mut tables = self.tables.lock().await;
        let Tables {
            entries, statuses, ..
        } = &mut *tables;
        let Some(entry) = entries.get_mut(identity) else {
            return SeedingHandoff::Removed;
        };
        let Some(handle) = statuses.get_mut(&task_id) else {
            return SeedingHandoff::StatusGone;
        };
        handle.phase = TaskPhase::Seeding;
        entry.record.seeding = true;
        SeedingHandoff::Started
    }

    /// Status handle for `task_id`.
    pub async fn lookup_by_task_id(&self, task_id: TaskId) -> Option<StatusHandle> {
        self.tables.lock().await.statuses.get(&task_id).cloned()
    }

    /// Identity registered for `task_id`.
    pub async fn identity_for_task(&self, task_id: TaskId) -> Option<ContentIdentity> {
        let tables = self.tables.lock().await;
        tables
            .entries
            .iter()
            .find(|(_, entry)| entry.task_id == task_id)
            .map(|(identity, _)| identity.clone())
    }

    /// Change the phase of `task_id`; `false` when its status handle is gone.
    pub async fn swap_status(&self, task_id: TaskId, phase: TaskPhase) -> bool {
        let mut tables = self.tables.lock().await;
        match tables.statuses.get_mut(&task_id) {
            Some(handle) => {
                handle.phase = phase;
                true
            }
            None => false,
        }
    }

    /// Drop only the status handle of `task_id`.
    pub async fn remove_status(&self, task_id: TaskId) -> Option<StatusHandle> {
        self.tables.lock().await.statuses.remove(&task_id)
    }

    /// Number of registered tasks.
    pub async fn len(&self) -> usize {
        self.tables.lock().await.entries.len()
    }

    /// Whether no task is registered.
    pub async fn is_empty(&self) -> bool {
        self.tables.lock().await.entries.is_empty()
    }

    /// Registered identities.
    pub async fn identities(&self) -> Vec<ContentIdentity> {
        self.tables.lock().await.entries.keys().cloned().collect()
    }
}
