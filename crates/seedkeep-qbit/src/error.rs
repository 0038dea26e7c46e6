//! # Design
//!
//! - Keep adapter failures local; convert to `TorrentError` at the trait boundary.
//! - Keep error messages constant; store operational context in fields.

use std::path::PathBuf;

use seedkeep_torrent_core::{ContentIdentity, TorrentError};
use thiserror::Error;

/// Failures raised while talking to the qBittorrent Web API.
#[derive(Debug, Error)]
pub enum QbitError {
    /// Base URL could not be parsed or joined.
    #[error("invalid engine url")]
    InvalidUrl {
        /// Offending value.
        value: String,
    },
    /// Building the HTTP client failed.
    #[error("failed to build engine http client")]
    ClientBuild {
        /// Underlying reqwest error.
        source: reqwest::Error,
    },
    /// The HTTP request could not be completed.
    #[error("engine request failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying reqwest error.
        source: reqwest::Error,
    },
    /// The Web API answered with a non-success status.
    #[error("engine returned an error status")]
    Status {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
    },
    /// The Web API refused the configured credentials.
    #[error("engine rejected the credentials")]
    LoginRejected,
    /// Response body did not match the expected shape.
    #[error("failed to decode engine response")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A local torrent file could not be read for upload.
    #[error("failed to read torrent file")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

impl QbitError {
    /// HTTP status carried by the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Wrap into the engine-agnostic error for `operation`.
    #[must_use]
    pub fn into_torrent(
        self,
        operation: &'static str,
        identity: Option<&ContentIdentity>,
    ) -> TorrentError {
        TorrentError::engine(operation, identity.cloned(), self)
    }
}

/// Result alias for adapter internals.
pub type QbitResult<T> = Result<T, QbitError>;
