//! Error types for torrent core services.

use std::error::Error;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::identity::ContentIdentity;
use crate::model::TaskId;

/// Primary error type for torrent operations.
///
/// Display strings are user-facing: listeners receive them verbatim when a
/// task terminates.
#[derive(Debug, Error)]
pub enum TorrentError {
    /// Operation is not supported by the underlying engine.
    #[error("torrent operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Input could not be resolved to a content identity.
    #[error("invalid torrent identity")]
    InvalidIdentity {
        /// Offending input, truncated by the caller when large.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Torrent metainfo could not be decoded.
    #[error("invalid torrent file")]
    Metainfo {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Control-API call against the engine failed.
    #[error("torrent engine unavailable")]
    EngineUnavailable {
        /// Operation identifier.
        operation: &'static str,
        /// Identity involved in the call when available.
        identity: Option<ContentIdentity>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The engine already tracks a task with this identity.
    #[error("this torrent is already being downloaded")]
    DuplicateTask {
        /// Identity already present in the engine.
        identity: ContentIdentity,
    },
    /// The engine did not acknowledge the submission.
    #[error("torrent was rejected by the engine: duplicate or unsupported")]
    SubmissionRejected {
        /// Raw acknowledgment body returned by the engine.
        message: String,
    },
    /// The submitted task never became visible in the engine.
    #[error("torrent did not appear in the engine after submission")]
    SubmissionTimeout {
        /// Number of polls performed before giving up.
        attempts: u32,
    },
    /// Task made no progress within the configured timeout.
    #[error("dead torrent")]
    DeadTask {
        /// Identity of the stalled task.
        identity: ContentIdentity,
    },
    /// Engine surfaced a hard failure state for the task.
    #[error("not enough space for this torrent on device")]
    EngineReportedError {
        /// Identity of the failed task.
        identity: ContentIdentity,
    },
    /// Engine reported a state string the monitor does not recognise.
    #[error("unrecognized engine state")]
    UnrecognizedState {
        /// Identity of the task carrying the state.
        identity: ContentIdentity,
        /// Raw state string reported by the engine.
        raw: String,
    },
    /// The user cancelled the task while it was being submitted.
    #[error("download stopped by user")]
    Cancelled {
        /// Task that was withdrawn.
        task_id: TaskId,
    },
    /// Torrent was not found in the engine.
    #[error("torrent not found")]
    NotFound {
        /// Missing torrent identity.
        identity: ContentIdentity,
    },
    /// Local filesystem access failed.
    #[error("torrent file access failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl TorrentError {
    /// Wrap an engine-side failure for the given operation.
    pub fn engine(
        operation: &'static str,
        identity: Option<ContentIdentity>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::EngineUnavailable {
            operation,
            identity,
            source: source.into(),
        }
    }

    pub(crate) fn invalid_identity(value: &str, reason: &'static str) -> Self {
        const MAX_ECHO: usize = 96;
        let value = value.chars().take(MAX_ECHO).collect();
        Self::InvalidIdentity { value, reason }
    }
}

/// Convenience alias for torrent operation results.
pub type TorrentResult<T> = Result<T, TorrentError>;
