//! Identity, payload, and snapshot fixtures.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use seedkeep_torrent_core::{ContentIdentity, EngineState, TaskSnapshot};

const SAMPLE_HASH: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

/// Stable identity used when a test needs just one.
#[must_use]
pub fn sample_identity() -> ContentIdentity {
    identity_from_str(SAMPLE_HASH)
}

/// Distinct identity per seed byte (`seed` repeated twenty times, hex encoded).
#[must_use]
pub fn identity_from_seed(seed: u8) -> ContentIdentity {
    let mut hash = String::with_capacity(40);
    for _ in 0..20 {
        let _ = write!(hash, "{seed:02x}");
    }
    identity_from_str(&hash)
}

fn identity_from_str(hash: &str) -> ContentIdentity {
    match ContentIdentity::normalize(hash) {
        Ok(identity) => identity,
        Err(err) => panic!("fixture hash {hash} must be valid: {err}"),
    }
}

/// Magnet URI carrying `identity` as its only `xt` parameter.
#[must_use]
pub fn magnet_for(identity: &ContentIdentity) -> String {
    format!("magnet:?xt=urn:btih:{identity}&dn=fixture")
}

/// Minimal single-file `.torrent` payload.
#[must_use]
pub fn torrent_file_bytes(name: &str, trackers: &[&str]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.push(b'd');
    if let Some(first) = trackers.first() {
        push_str(&mut payload, "announce");
        push_str(&mut payload, first);
    }
    if trackers.len() > 1 {
        push_str(&mut payload, "announce-list");
        payload.push(b'l');
        for tracker in trackers {
            payload.push(b'l');
            push_str(&mut payload, tracker);
            payload.push(b'e');
        }
        payload.push(b'e');
    }
    push_str(&mut payload, "info");
    payload.push(b'd');
    push_str(&mut payload, "length");
    payload.extend_from_slice(b"i1024e");
    push_str(&mut payload, "name");
    push_str(&mut payload, name);
    push_str(&mut payload, "piece length");
    payload.extend_from_slice(b"i16384e");
    push_str(&mut payload, "pieces");
    payload.extend_from_slice(b"20:");
    payload.extend_from_slice(&[0xAB; 20]);
    payload.extend_from_slice(b"ee");
    payload
}

/// Write [`torrent_file_bytes`] to `<dir>/<name>.torrent`.
///
/// # Errors
///
/// Returns the IO error raised while writing the file.
pub fn write_torrent_file(dir: &Path, name: &str, trackers: &[&str]) -> io::Result<PathBuf> {
    let path = dir.join(format!("{name}.torrent"));
    std::fs::write(&path, torrent_file_bytes(name, trackers))?;
    Ok(path)
}

/// Snapshot for `identity` in `state` at `progress`, added now.
#[must_use]
pub fn snapshot(identity: &ContentIdentity, state: EngineState, progress: f64) -> TaskSnapshot {
    TaskSnapshot {
        identity: identity.clone(),
        name: format!("task-{}", &identity.as_str()[..8]),
        state,
        progress,
        added_at: Utc::now(),
        ratio: 0.0,
        seeding_time: Duration::ZERO,
        downloaded_bytes: 0,
        size: 1_024,
        total_size: 1_024,
        save_path: PathBuf::from("/downloads"),
    }
}

fn push_str(payload: &mut Vec<u8>, value: &str) {
    payload.extend_from_slice(value.len().to_string().as_bytes());
    payload.push(b':');
    payload.extend_from_slice(value.as_bytes());
}
