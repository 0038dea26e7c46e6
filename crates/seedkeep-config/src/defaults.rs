#![allow(clippy::redundant_pub_crate)]

//! Default values for every configuration field.
//!
//! # Design
//! - Centralize defaults so an empty document yields a runnable orchestrator.

pub(crate) const ENGINE_BASE_URL: &str = "http://127.0.0.1:8090";
pub(crate) const ENGINE_USERNAME: &str = "admin";
pub(crate) const ENGINE_PASSWORD: &str = "adminadmin";
pub(crate) const ENGINE_REQUEST_TIMEOUT_SECS: u64 = 30;

pub(crate) const MONITOR_POLL_INTERVAL_MS: u64 = 3_000;
pub(crate) const MONITOR_SETTLE_DELAY_MS: u64 = 500;

pub(crate) const INGEST_POLL_ATTEMPTS: u32 = 10;
pub(crate) const INGEST_POLL_INTERVAL_MS: u64 = 500;
pub(crate) const INGEST_FALLBACK_DELAY_MS: u64 = 500;

pub(crate) const PRUNING_SETTLE_DELAY_SECS: u64 = 60;
pub(crate) const PRUNING_POLL_INTERVAL_SECS: u64 = 30;
pub(crate) const PRUNING_MAX_ATTEMPTS: u32 = 20;

pub(crate) const LOG_LEVEL: &str = "info";

/// Environment variable naming the YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "SEEDKEEP_CONFIG";
