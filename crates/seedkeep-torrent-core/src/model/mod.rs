//! Core torrent domain types and DTOs shared across the workspace.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ContentIdentity;

/// External task identifier assigned by the surrounding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier of the user on whose behalf a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(pub i64);

impl Display for RequesterId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Source describing how a torrent should be handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TorrentSource {
    /// Magnet URI resolved by the engine.
    Magnet {
        /// Magnet URI to submit.
        uri: String,
    },
    /// Local `.torrent` file uploaded to the engine.
    File {
        /// Path of the descriptor on the local filesystem.
        path: PathBuf,
    },
    /// Remote link the engine downloads itself.
    Url {
        /// Link to submit.
        url: String,
    },
}

impl TorrentSource {
    /// Classify a raw link as a magnet, an existing local file, or a remote URL.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        if raw
            .get(..7)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("magnet:"))
        {
            Self::Magnet {
                uri: raw.to_string(),
            }
        } else if Path::new(raw).is_file() {
            Self::File {
                path: PathBuf::from(raw),
            }
        } else {
            Self::Url {
                url: raw.to_string(),
            }
        }
    }

    /// Whether the source is a local descriptor file.
    #[must_use]
    pub const fn is_local_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

/// Request payload for admitting a torrent into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRequest {
    /// How the torrent should be retrieved.
    pub source: TorrentSource,
    /// Download directory on the engine host.
    pub save_path: PathBuf,
    /// Whether the engine should admit the task paused.
    pub paused: bool,
    /// Share ratio at which seeding stops.
    pub ratio_limit: Option<f64>,
    /// Seeding time after which seeding stops.
    pub seed_time_limit: Option<Duration>,
    /// Tag attached to the engine task (the external task id).
    pub tag: String,
}

/// Engine acknowledgment for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAck {
    /// The engine accepted the torrent.
    Accepted,
    /// The engine refused the torrent, usually because it is a duplicate or unsupported.
    Rejected {
        /// Raw response returned by the engine.
        message: String,
    },
}

impl SubmitAck {
    /// Whether the acknowledgment is affirmative.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Engine-reported task state, closed over every state the monitor reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Engine hit a hard failure (typically out of disk space).
    Error,
    /// Payload files vanished from disk.
    MissingFiles,
    /// Seeding with active peers.
    Uploading,
    /// Paused after the download finished.
    PausedUpload,
    /// Queued for seeding.
    QueuedUpload,
    /// Seeding without peers.
    StalledUpload,
    /// Verifying data after completion.
    CheckingUpload,
    /// Forced seeding.
    ForcedUpload,
    /// Allocating disk space.
    Allocating,
    /// Downloading with active peers.
    Downloading,
    /// Fetching metadata from peers.
    MetadataFetching,
    /// Forced metadata fetch.
    ForcedMetadataFetching,
    /// Paused before completion.
    PausedDownload,
    /// Queued for download.
    QueuedDownload,
    /// Downloading without progress.
    StalledDownload,
    /// Verifying data before completion.
    CheckingDownload,
    /// Forced download.
    ForcedDownload,
    /// Checking resume data on startup.
    CheckingResumeData,
    /// Moving payload to a new location.
    Moving,
    /// State string the adapter could not map.
    Unknown(String),
}

impl EngineState {
    /// Whether the engine is verifying data.
    #[must_use]
    pub const fn is_checking(&self) -> bool {
        matches!(
            self,
            Self::CheckingUpload | Self::CheckingDownload | Self::CheckingResumeData
        )
    }
}

/// One task as reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Canonical identity of the task.
    pub identity: ContentIdentity,
    /// Display name reported by the engine.
    pub name: String,
    /// Engine-reported state.
    pub state: EngineState,
    /// Completion fraction in `0.0..=1.0`.
    pub progress: f64,
    /// Time the engine admitted the task.
    pub added_at: DateTime<Utc>,
    /// Current share ratio.
    pub ratio: f64,
    /// Accumulated seeding time.
    pub seeding_time: Duration,
    /// Bytes downloaded so far.
    pub downloaded_bytes: u64,
    /// Size of the selected files.
    pub size: u64,
    /// Size of the whole payload.
    pub total_size: u64,
    /// Directory holding the payload.
    pub save_path: PathBuf,
}

/// Tracker status codes reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// Pseudo-tracker (DHT, PeX, LSD) or disabled entry.
    Disabled,
    /// Not contacted yet.
    NotContacted,
    /// Contacted and working.
    Working,
    /// Announce in flight.
    Updating,
    /// Contacted and failing.
    NotWorking,
}

impl TrackerStatus {
    /// Whether the tracker counts as dead for pruning purposes.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::NotWorking | Self::NotContacted)
    }
}

/// Tracker attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEntry {
    /// Announce URL (or pseudo-tracker label).
    pub url: String,
    /// Current status.
    pub status: TrackerStatus,
}

/// File inside a task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFile {
    /// Path relative to the task save path.
    pub path: PathBuf,
    /// Engine priority; zero means the file is not downloaded.
    pub priority: u8,
}

impl TaskFile {
    /// Whether the file was deselected.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.priority == 0
    }
}

/// A single button offered alongside an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceButton {
    /// Label shown to the user.
    pub label: String,
    /// Opaque payload returned when pressed.
    pub data: String,
}

/// Optional set of choices attached to an error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorChoice {
    /// Buttons in display order.
    pub buttons: Vec<ChoiceButton>,
}

/// Result of a duplicate-suppression check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateVerdict {
    /// Explanation shown to the user.
    pub message: String,
    /// Choices offered alongside the message.
    pub choice: Option<ErrorChoice>,
}

/// Final statistics reported when seeding stops.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedSummary {
    /// Task name.
    pub name: String,
    /// Final share ratio.
    pub ratio: f64,
    /// Total time spent seeding.
    pub seeding_time: Duration,
}

impl Display for SeedSummary {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "Seeding stopped with ratio {:.3} and time {}",
            self.ratio,
            readable_duration(self.seeding_time)
        )
    }
}

/// Render a duration as `1d2h3m4s`, omitting leading zero units.
#[must_use]
pub fn readable_duration(duration: Duration) -> String {
    const UNITS: [(u64, char); 4] = [(86_400, 'd'), (3_600, 'h'), (60, 'm'), (1, 's')];
    let mut remaining = duration.as_secs();
    let mut rendered = String::new();
    for (size, suffix) in UNITS {
        let count = remaining / size;
        remaining %= size;
        if count > 0 || (suffix == 's' && rendered.is_empty()) {
            rendered.push_str(&count.to_string());
            rendered.push(suffix);
        }
    }
    rendered
}
