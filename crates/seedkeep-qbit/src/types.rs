//! Wire types for the qBittorrent Web API v2.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Connection settings for [`crate::QbitEngine`].
#[derive(Debug, Clone)]
pub struct QbitSettings {
    /// Web UI base URL.
    pub base_url: Url,
    /// Web UI user.
    pub username: String,
    /// Web UI password.
    pub password: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Entry of `GET /api/v2/torrents/info`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TorrentInfo {
    pub(crate) hash: String,
    #[serde(default)]
    pub(crate) name: String,
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) progress: f64,
    #[serde(default)]
    pub(crate) added_on: i64,
    #[serde(default)]
    pub(crate) ratio: f64,
    #[serde(default)]
    pub(crate) seeding_time: i64,
    #[serde(default)]
    pub(crate) downloaded: i64,
    #[serde(default)]
    pub(crate) size: i64,
    #[serde(default)]
    pub(crate) total_size: i64,
    #[serde(default)]
    pub(crate) save_path: String,
}

/// Entry of `GET /api/v2/torrents/trackers`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TrackerInfo {
    pub(crate) url: String,
    pub(crate) status: i64,
}

/// Entry of `GET /api/v2/torrents/files`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FileInfo {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) priority: i64,
}
