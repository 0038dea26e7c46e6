//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers; every section deserializes from a partial document.
//! - Durations are stored as integers and exposed through accessors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Complete orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Connection to the engine daemon.
    pub engine: EngineConfig,
    /// Concurrency limits.
    pub admission: AdmissionConfig,
    /// Polling loop settings.
    pub monitor: MonitorConfig,
    /// Submission polling settings.
    pub ingest: IngestConfig,
    /// Tracker pruning settings.
    pub pruning: PruningConfig,
    /// Logging settings.
    pub telemetry: TelemetryConfig,
}

/// Connection settings for the engine Web API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Base URL of the Web UI, e.g. `http://127.0.0.1:8090`.
    pub base_url: String,
    /// Web UI user.
    pub username: String,
    /// Web UI password.
    pub password: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::ENGINE_BASE_URL.to_string(),
            username: defaults::ENGINE_USERNAME.to_string(),
            password: defaults::ENGINE_PASSWORD.to_string(),
            request_timeout_secs: defaults::ENGINE_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Admission limits; `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Maximum simultaneously active tasks.
    pub max_active: Option<usize>,
    /// Maximum simultaneously active tasks per requester.
    pub per_requester: Option<usize>,
}

/// Lifecycle monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Delay between polling cycles.
    pub poll_interval_ms: u64,
    /// Dead-task timeout; absent means tasks never time out.
    pub torrent_timeout_secs: Option<u64>,
    /// Pause between engine-side steps of terminal sequences.
    pub settle_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::MONITOR_POLL_INTERVAL_MS,
            torrent_timeout_secs: None,
            settle_delay_ms: defaults::MONITOR_SETTLE_DELAY_MS,
        }
    }
}

impl MonitorConfig {
    /// Delay between polling cycles.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Dead-task timeout, when configured.
    #[must_use]
    pub fn torrent_timeout(&self) -> Option<Duration> {
        self.torrent_timeout_secs.map(Duration::from_secs)
    }

    /// Settle delay for terminal sequences.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Post-submission polling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// How many times to look the task up after submission.
    pub poll_attempts: u32,
    /// Backoff between lookups.
    pub poll_interval_ms: u64,
    /// Wait before listing all tasks when the identity was unknown.
    pub fallback_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_attempts: defaults::INGEST_POLL_ATTEMPTS,
            poll_interval_ms: defaults::INGEST_POLL_INTERVAL_MS,
            fallback_delay_ms: defaults::INGEST_FALLBACK_DELAY_MS,
        }
    }
}

impl IngestConfig {
    /// Backoff between lookups.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wait before the fallback listing.
    #[must_use]
    pub const fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }
}

/// Tracker pruning settings for file submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PruningConfig {
    /// Wait before the first tracker fetch.
    pub settle_delay_secs: u64,
    /// Delay between tracker fetches.
    pub poll_interval_secs: u64,
    /// Fetches before giving up.
    pub max_attempts: u32,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: defaults::PRUNING_SETTLE_DELAY_SECS,
            poll_interval_secs: defaults::PRUNING_POLL_INTERVAL_SECS,
            max_attempts: defaults::PRUNING_MAX_ATTEMPTS,
        }
    }
}

impl PruningConfig {
    /// Wait before the first fetch.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Delay between fetches.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub log_level: String,
    /// Output format; inferred from the build profile when absent.
    pub log_format: Option<LogFormatSetting>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::LOG_LEVEL.to_string(),
            log_format: None,
        }
    }
}
