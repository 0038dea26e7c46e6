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

//! Seedkeep torrent-session orchestrator and process bootstrap.
//!
//! Layout: `orchestrator.rs` (public entry point), `ingest.rs` (submission path),
//! `admission.rs` (concurrency slots), `registry.rs` (monitored tasks),
//! `monitor.rs` + `lifecycle.rs` (polling loop and state machine),
//! `pruning.rs` (dead trackers), `bootstrap.rs` (binary wiring).

pub mod admission;
pub mod bootstrap;
pub mod error;
pub mod ingest;
mod lifecycle;
mod monitor;
pub mod orchestrator;
mod pruning;
pub mod registry;

pub use admission::{Admission, AdmissionController, AdmissionTicket};
pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
pub use ingest::SubmitRequest;
pub use orchestrator::{Orchestrator, OrchestratorDeps};
pub use registry::{
    SeedingHandoff, StatusHandle, TaskEntry, TaskPhase, TaskRecord, TaskRegistry, Withdrawal,
};
