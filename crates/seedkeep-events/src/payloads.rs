//! Event payload types emitted by the orchestrator.

use chrono::{DateTime, Utc};
use seedkeep_torrent_core::{ContentIdentity, TaskId};
use serde::{Deserialize, Serialize};

/// Identifier assigned to each event published on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Lifecycle events surfaced by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Admission is full; the task waits for a slot.
    TaskQueued {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity.
        identity: ContentIdentity,
    },
    /// The task was registered and monitoring started.
    TaskStarted {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity.
        identity: ContentIdentity,
        /// Display name reported by the engine.
        name: String,
    },
    /// A queued task received its slot and was resumed engine-side.
    TaskResumed {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity.
        identity: ContentIdentity,
    },
    /// The monitor asked the engine to re-announce.
    Reannounced {
        /// Engine-side identity.
        identity: ContentIdentity,
    },
    /// The monitor forced an integrity re-check.
    Rechecked {
        /// Engine-side identity.
        identity: ContentIdentity,
    },
    /// The payload finished downloading.
    TaskCompleted {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity.
        identity: ContentIdentity,
    },
    /// The task keeps seeding after completion.
    SeedingStarted {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity.
        identity: ContentIdentity,
    },
    /// Seeding limits were reached.
    SeedingStopped {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity.
        identity: ContentIdentity,
        /// Final share ratio.
        ratio: f64,
        /// Total seeding time in seconds.
        seeding_secs: u64,
    },
    /// The task terminated with an error.
    TaskFailed {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity, when it was resolved.
        identity: Option<ContentIdentity>,
        /// Message surfaced to the user.
        message: String,
    },
    /// The task was deregistered and removed from the engine.
    TaskRemoved {
        /// External task id.
        task_id: TaskId,
        /// Engine-side identity.
        identity: ContentIdentity,
    },
    /// Dead trackers were removed from a task.
    TrackersPruned {
        /// Engine-side identity.
        identity: ContentIdentity,
        /// Announce URLs that were removed.
        removed: Vec<String>,
    },
    /// Status display for the task should be redrawn.
    StatusRefresh {
        /// External task id.
        task_id: TaskId,
    },
    /// The polling loop started.
    MonitorStarted,
    /// The polling loop exited.
    MonitorStopped,
}

impl Event {
    /// Machine-friendly discriminator for log and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskQueued { .. } => "task_queued",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskResumed { .. } => "task_resumed",
            Self::Reannounced { .. } => "reannounced",
            Self::Rechecked { .. } => "rechecked",
            Self::TaskCompleted { .. } => "task_completed",
            Self::SeedingStarted { .. } => "seeding_started",
            Self::SeedingStopped { .. } => "seeding_stopped",
            Self::TaskFailed { .. } => "task_failed",
            Self::TaskRemoved { .. } => "task_removed",
            Self::TrackersPruned { .. } => "trackers_pruned",
            Self::StatusRefresh { .. } => "status_refresh",
            Self::MonitorStarted => "monitor_started",
            Self::MonitorStopped => "monitor_stopped",
        }
    }

    /// External task id the event concerns, when it has one.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::TaskQueued { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskResumed { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::SeedingStarted { task_id, .. }
            | Self::SeedingStopped { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskRemoved { task_id, .. }
            | Self::StatusRefresh { task_id } => Some(*task_id),
            Self::Reannounced { .. }
            | Self::Rechecked { .. }
            | Self::TrackersPruned { .. }
            | Self::MonitorStarted
            | Self::MonitorStopped => None,
        }
    }
}

/// Metadata wrapper tracking the event id and emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}
