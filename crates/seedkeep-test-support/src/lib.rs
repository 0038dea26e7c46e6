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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (identities, magnets, torrent payloads, snapshots), mocks.rs (fake engine, recording listener, duplicate checker).

pub mod fixtures;
pub mod mocks;

pub use fixtures::{
    identity_from_seed, magnet_for, sample_identity, snapshot, torrent_file_bytes,
    write_torrent_file,
};
pub use mocks::{EngineCall, FakeEngine, FlaggingDuplicateChecker, ListenerEvent, RecordingListener};
