//! Engine, listener, and duplicate-check traits consumed by the orchestrator.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{TorrentError, TorrentResult};
use crate::identity::ContentIdentity;
use crate::model::{
    AddRequest, DuplicateVerdict, ErrorChoice, SeedSummary, SubmitAck, TaskFile, TaskId,
    TaskSnapshot, TrackerEntry,
};

/// Control API of the external torrent daemon.
///
/// Every action must be idempotent: pausing a paused task or removing an
/// absent one succeeds.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Hand a torrent to the engine.
    async fn submit(&self, request: AddRequest) -> TorrentResult<SubmitAck>;

    /// Snapshot every task, or only the one matching `identity`.
    async fn list(&self, identity: Option<&ContentIdentity>) -> TorrentResult<Vec<TaskSnapshot>>;

    /// Pause a task.
    async fn pause(&self, identity: &ContentIdentity) -> TorrentResult<()>;

    /// Resume a paused task.
    async fn resume(&self, identity: &ContentIdentity) -> TorrentResult<()>;

    /// Force an integrity re-check.
    async fn recheck(&self, identity: &ContentIdentity) -> TorrentResult<()>;

    /// Re-announce to every tracker.
    async fn reannounce(&self, identity: &ContentIdentity) -> TorrentResult<()>;

    /// Remove a task, optionally deleting its payload.
    async fn remove(&self, identity: &ContentIdentity, delete_files: bool) -> TorrentResult<()>;

    /// List trackers in engine order; default implementation reports lack of support.
    async fn trackers(&self, identity: &ContentIdentity) -> TorrentResult<Vec<TrackerEntry>> {
        let _ = identity;
        Err(TorrentError::Unsupported {
            operation: "trackers",
        })
    }

    /// Remove trackers in one call; default implementation reports lack of support.
    async fn remove_trackers(
        &self,
        identity: &ContentIdentity,
        urls: &[String],
    ) -> TorrentResult<()> {
        let _ = (identity, urls);
        Err(TorrentError::Unsupported {
            operation: "remove_trackers",
        })
    }

    /// List payload files with priorities; default implementation reports lack of support.
    async fn files(&self, identity: &ContentIdentity) -> TorrentResult<Vec<TaskFile>> {
        let _ = identity;
        Err(TorrentError::Unsupported { operation: "files" })
    }
}

/// Per-task callbacks and read-only fields owned by the surrounding layer.
#[async_trait]
pub trait TaskListener: Send + Sync {
    /// External task id.
    fn task_id(&self) -> TaskId;

    /// Display name.
    fn name(&self) -> String;

    /// Download directory requested by the user.
    fn dir(&self) -> PathBuf;

    /// Whether the user chose a subset of files.
    fn select_files(&self) -> bool {
        false
    }

    /// Whether the task should keep seeding after completion.
    fn seed_requested(&self) -> bool {
        false
    }

    /// Number of tasks submitted together with this one.
    fn multi_count(&self) -> u32 {
        1
    }

    /// Whether the user cancelled the task.
    fn is_cancelled(&self) -> bool;

    /// Called once the engine accepted and the orchestrator registered the task.
    async fn on_download_start(&self);

    /// Called once the payload finished downloading.
    async fn on_download_complete(&self);

    /// Called once when the task terminates with an error.
    async fn on_download_error(&self, message: String, choice: Option<ErrorChoice>);

    /// Called once when seeding stops.
    async fn on_seeding_stopped(&self, summary: SeedSummary);
}

/// Detects conflicting artifacts for a task that just started downloading.
#[async_trait]
pub trait DuplicateChecker: Send + Sync {
    /// Return a verdict when the task should be stopped.
    async fn check(
        &self,
        listener: &dyn TaskListener,
        name: &str,
        size: u64,
    ) -> Option<DuplicateVerdict>;
}

/// Duplicate checker that never flags anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDuplicateCheck;

#[async_trait]
impl DuplicateChecker for NoDuplicateCheck {
    async fn check(
        &self,
        _listener: &dyn TaskListener,
        _name: &str,
        _size: u64,
    ) -> Option<DuplicateVerdict> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubEngine;

    #[async_trait]
    impl TorrentEngine for StubEngine {
        async fn submit(&self, _request: AddRequest) -> TorrentResult<SubmitAck> {
            Ok(SubmitAck::Accepted)
        }

        async fn list(
            &self,
            _identity: Option<&ContentIdentity>,
        ) -> TorrentResult<Vec<TaskSnapshot>> {
            Ok(Vec::new())
        }

        async fn pause(&self, _identity: &ContentIdentity) -> TorrentResult<()> {
            Ok(())
        }

        async fn resume(&self, _identity: &ContentIdentity) -> TorrentResult<()> {
            Ok(())
        }

        async fn recheck(&self, _identity: &ContentIdentity) -> TorrentResult<()> {
            Ok(())
        }

        async fn reannounce(&self, _identity: &ContentIdentity) -> TorrentResult<()> {
            Ok(())
        }

        async fn remove(&self, _identity: &ContentIdentity, _delete: bool) -> TorrentResult<()> {
            Ok(())
        }
    }

    struct StubListener {
        cancelled: AtomicBool,
    }

    #[async_trait]
    impl TaskListener for StubListener {
        fn task_id(&self) -> TaskId {
            TaskId(7)
        }

        fn name(&self) -> String {
            "demo".into()
        }

        fn dir(&self) -> PathBuf {
            PathBuf::from("/downloads")
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }

        async fn on_download_start(&self) {}

        async fn on_download_complete(&self) {}

        async fn on_download_error(&self, _message: String, _choice: Option<ErrorChoice>) {}

        async fn on_seeding_stopped(&self, _summary: SeedSummary) {}
    }

    #[tokio::test]
    async fn engine_default_methods_error() -> TorrentResult<()> {
        let engine = StubEngine;
        let identity = ContentIdentity::normalize("0123456789abcdef0123456789abcdef01234567")?;
        assert!(matches!(
            engine.trackers(&identity).await,
            Err(TorrentError::Unsupported {
                operation: "trackers"
            })
        ));
        assert!(engine.remove_trackers(&identity, &[]).await.is_err());
        assert!(engine.files(&identity).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn listener_defaults_and_no_duplicate_check() {
        let listener = StubListener {
            cancelled: AtomicBool::new(false),
        };
        assert!(!listener.select_files());
        assert!(!listener.seed_requested());
        assert_eq!(listener.multi_count(), 1);
        assert!(!listener.is_cancelled());
        assert!(
            NoDuplicateCheck
                .check(&listener, "demo", 1_024)
                .await
                .is_none()
        );
    }
}
