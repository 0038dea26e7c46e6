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

//! Engine-agnostic torrent interfaces, identities, and DTOs.
//!
//! Layout: `identity.rs` (BTIH normalisation), `metainfo.rs` (`.torrent` decoding),
//! `model/` (DTOs), `service/` (engine, listener, duplicate-check traits).

pub mod error;
pub mod identity;
pub mod metainfo;
pub mod model;
pub mod service;

pub use error::{TorrentError, TorrentResult};
pub use identity::ContentIdentity;
pub use metainfo::TorrentMetainfo;
pub use model::{
    AddRequest, ChoiceButton, DuplicateVerdict, EngineState, ErrorChoice, RequesterId,
    SeedSummary, SubmitAck, TaskFile, TaskId, TaskSnapshot, TorrentSource, TrackerEntry,
    TrackerStatus, readable_duration,
};
pub use service::{DuplicateChecker, NoDuplicateCheck, TaskListener, TorrentEngine};
