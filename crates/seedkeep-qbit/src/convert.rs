#![allow(clippy::redundant_pub_crate)]

//! Conversions from Web API payloads to engine-agnostic DTOs.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use seedkeep_torrent_core::{
    ContentIdentity, EngineState, TaskFile, TaskSnapshot, TrackerEntry, TrackerStatus,
};
use tracing::debug;

use crate::types::{FileInfo, TorrentInfo, TrackerInfo};

/// Map a Web API state string onto [`EngineState`].
///
/// qBittorrent 5 renamed `paused*` to `stopped*`; both spellings are accepted.
#[must_use]
pub(crate) fn map_state(raw: &str) -> EngineState {
    match raw {
        "error" => EngineState::Error,
        "missingFiles" => EngineState::MissingFiles,
        "uploading" => EngineState::Uploading,
        "pausedUP" | "stoppedUP" => EngineState::PausedUpload,
        "queuedUP" => EngineState::QueuedUpload,
        "stalledUP" => EngineState::StalledUpload,
        "checkingUP" => EngineState::CheckingUpload,
        "forcedUP" => EngineState::ForcedUpload,
        "allocating" => EngineState::Allocating,
        "downloading" => EngineState::Downloading,
        "metaDL" => EngineState::MetadataFetching,
        "forcedMetaDL" => EngineState::ForcedMetadataFetching,
        "pausedDL" | "stoppedDL" => EngineState::PausedDownload,
        "queuedDL" => EngineState::QueuedDownload,
        "stalledDL" => EngineState::StalledDownload,
        "checkingDL" => EngineState::CheckingDownload,
        "forcedDL" => EngineState::ForcedDownload,
        "checkingResumeData" => EngineState::CheckingResumeData,
        "moving" => EngineState::Moving,
        other => EngineState::Unknown(other.to_string()),
    }
}

/// Map the numeric tracker status (0-4) onto [`TrackerStatus`].
#[must_use]
pub(crate) const fn map_tracker_status(code: i64) -> TrackerStatus {
    match code {
        1 => TrackerStatus::NotContacted,
        2 => TrackerStatus::Working,
        3 => TrackerStatus::Updating,
        4 => TrackerStatus::NotWorking,
        _ => TrackerStatus::Disabled,
    }
}

/// Convert a torrent entry; entries without a v1 info hash are skipped.
#[must_use]
pub(crate) fn to_snapshot(info: TorrentInfo) -> Option<TaskSnapshot> {
    let identity = match ContentIdentity::normalize(&info.hash) {
        Ok(identity) => identity,
        Err(_) => {
            debug!(hash = %info.hash, "skipping torrent without a v1 info hash");
            return None;
        }
    };
    Some(TaskSnapshot {
        identity,
        state: map_state(&info.state),
        name: info.name,
        progress: info.progress.clamp(0.0, 1.0),
        added_at: DateTime::<Utc>::from_timestamp(info.added_on, 0).unwrap_or_default(),
        ratio: info.ratio.max(0.0),
        seeding_time: Duration::from_secs(non_negative(info.seeding_time)),
        downloaded_bytes: non_negative(info.downloaded),
        size: non_negative(info.size),
        total_size: non_negative(info.total_size),
        save_path: PathBuf::from(info.save_path),
    })
}

#[must_use]
pub(crate) fn to_tracker(info: TrackerInfo) -> TrackerEntry {
    TrackerEntry {
        url: info.url,
        status: map_tracker_status(info.status),
    }
}

#[must_use]
pub(crate) fn to_file(info: FileInfo) -> TaskFile {
    TaskFile {
        path: PathBuf::from(info.name),
        priority: u8::try_from(info.priority.clamp(0, i64::from(u8::MAX))).unwrap_or(u8::MAX),
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(hash: &str, state: &str) -> TorrentInfo {
        TorrentInfo {
            hash: hash.to_string(),
            name: "demo".into(),
            state: state.to_string(),
            progress: 0.5,
            added_on: 1_700_000_000,
            ratio: 0.25,
            seeding_time: 90,
            downloaded: 1_024,
            size: 2_048,
            total_size: 4_096,
            save_path: "/downloads".into(),
        }
    }

    #[test]
    fn state_strings_map_to_closed_enum() {
        assert_eq!(map_state("metaDL"), EngineState::MetadataFetching);
        assert_eq!(map_state("stalledDL"), EngineState::StalledDownload);
        assert_eq!(map_state("stoppedUP"), EngineState::PausedUpload);
        assert_eq!(map_state("pausedUP"), EngineState::PausedUpload);
        assert_eq!(map_state("missingFiles"), EngineState::MissingFiles);
        assert_eq!(
            map_state("teleporting"),
            EngineState::Unknown("teleporting".into())
        );
    }

    #[test]
    fn tracker_codes_map_to_status() {
        assert_eq!(map_tracker_status(0), TrackerStatus::Disabled);
        assert_eq!(map_tracker_status(1), TrackerStatus::NotContacted);
        assert_eq!(map_tracker_status(4), TrackerStatus::NotWorking);
        assert_eq!(map_tracker_status(-1), TrackerStatus::Disabled);
    }

    #[test]
    fn snapshot_conversion_normalises_hash() {
        let snapshot = to_snapshot(info("0123456789ABCDEF0123456789ABCDEF01234567", "uploading"));
        let Some(snapshot) = snapshot else {
            panic!("expected snapshot");
        };
        assert_eq!(
            snapshot.identity.as_str(),
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert_eq!(snapshot.state, EngineState::Uploading);
        assert_eq!(snapshot.seeding_time, Duration::from_secs(90));
        assert_eq!(snapshot.added_at.timestamp(), 1_700_000_000);
        assert_eq!(snapshot.total_size, 4_096);
    }

    #[test]
    fn v2_only_hashes_are_skipped() {
        let v2 = "a".repeat(64);
        assert!(to_snapshot(info(&v2, "downloading")).is_none());
    }

    #[test]
    fn file_priority_is_clamped() {
        let file = to_file(FileInfo {
            name: "dir/skip.bin".into(),
            priority: 0,
        });
        assert!(file.is_skipped());
        assert_eq!(
            to_file(FileInfo {
                name: "x".into(),
                priority: 9_999
            })
            .priority,
            u8::MAX
        );
    }
}
