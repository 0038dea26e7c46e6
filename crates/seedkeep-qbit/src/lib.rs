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

//! qBittorrent Web API v2 adapter implementing [`seedkeep_torrent_core::TorrentEngine`].
//!
//! Layout: `adapter.rs` (session + trait implementation), `convert.rs` (wire to DTO
//! mapping), `types.rs` (wire types and settings), `error.rs` (adapter errors).

pub mod adapter;
mod convert;
pub mod error;
pub mod types;

pub use adapter::QbitEngine;
pub use error::{QbitError, QbitResult};
pub use types::QbitSettings;
