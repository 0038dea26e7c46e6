#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Typed orchestrator configuration loaded from YAML and the environment.
//!
//! Layout: `model.rs` (typed sections), `defaults.rs` (field defaults),
//! `loader.rs` (document + override loading), `validate.rs` (field checks).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::CONFIG_PATH_ENV;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use model::{
    AdmissionConfig, EngineConfig, IngestConfig, LogFormatSetting, MonitorConfig,
    OrchestratorConfig, PruningConfig, TelemetryConfig,
};
pub use validate::validate;
