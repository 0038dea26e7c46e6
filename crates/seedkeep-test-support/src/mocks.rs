//! In-memory engine, listener, and duplicate checker doubles.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use seedkeep_torrent_core::{
    AddRequest, ContentIdentity, DuplicateChecker, DuplicateVerdict, EngineState, ErrorChoice,
    SeedSummary, SubmitAck, TaskFile, TaskId, TaskListener, TaskSnapshot, TorrentEngine,
    TorrentError, TorrentResult, TorrentSource, TrackerEntry,
};

use crate::fixtures::snapshot;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call received by [`FakeEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    /// `submit` with the tag and pause flag it carried.
    Submit {
        /// Tag attached to the request.
        tag: String,
        /// Whether the task was admitted paused.
        paused: bool,
    },
    /// `list`, filtered or not.
    List(Option<ContentIdentity>),
    /// `pause`.
    Pause(ContentIdentity),
    /// `resume`.
    Resume(ContentIdentity),
    /// `recheck`.
    Recheck(ContentIdentity),
    /// `reannounce`.
    Reannounce(ContentIdentity),
    /// `remove`.
    Remove {
        /// Removed task.
        identity: ContentIdentity,
        /// Whether files were deleted too.
        delete_files: bool,
    },
    /// `trackers`.
    Trackers(ContentIdentity),
    /// `remove_trackers`.
    RemoveTrackers {
        /// Task whose trackers were removed.
        identity: ContentIdentity,
        /// URLs removed in one call.
        urls: Vec<String>,
    },
    /// `files`.
    Files(ContentIdentity),
}

#[derive(Default)]
struct Inner {
    tasks: Vec<TaskSnapshot>,
    trackers: HashMap<ContentIdentity, Vec<TrackerEntry>>,
    files: HashMap<ContentIdentity, Vec<TaskFile>>,
    calls: Vec<EngineCall>,
    url_identity: Option<ContentIdentity>,
    rejection: Option<String>,
    lookup_delay: Option<Duration>,
    resume_state: Option<EngineState>,
}

/// Scriptable [`TorrentEngine`] keeping tasks in memory and recording every call.
///
/// Accepted submissions appear in the task list immediately unless
/// [`FakeEngine::hide_submissions`] was called.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<Inner>,
    hide_submissions: AtomicBool,
    fail_list: AtomicBool,
    failing_lists: AtomicUsize,
}

impl FakeEngine {
    /// Empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a task snapshot.
    pub fn insert(&self, task: TaskSnapshot) {
        let mut state = lock(&self.state);
        state.tasks.retain(|existing| existing.identity != task.identity);
        state.tasks.push(task);
    }

    /// Move a task to `state` at `progress`; returns `false` when it is absent.
    pub fn set_state(&self, identity: &ContentIdentity, state: EngineState, progress: f64) -> bool {
        self.update(identity, |task| {
            task.state = state;
            task.progress = progress;
        })
    }

    /// Mutate a task in place; returns `false` when it is absent.
    pub fn update(&self, identity: &ContentIdentity, apply: impl FnOnce(&mut TaskSnapshot)) -> bool {
        let mut state = lock(&self.state);
        match state.tasks.iter_mut().find(|task| &task.identity == identity) {
            Some(task) => {
                apply(task);
                true
            }
            None => false,
        }
    }

    /// Current snapshot of one task.
    #[must_use]
    pub fn task(&self, identity: &ContentIdentity) -> Option<TaskSnapshot> {
        lock(&self.state)
            .tasks
            .iter()
            .find(|task| &task.identity == identity)
            .cloned()
    }

    /// Replace the tracker list of a task.
    pub fn set_trackers(&self, identity: &ContentIdentity, trackers: Vec<TrackerEntry>) {
        lock(&self.state).trackers.insert(identity.clone(), trackers);
    }

    /// Replace the file list of a task.
    pub fn set_files(&self, identity: &ContentIdentity, files: Vec<TaskFile>) {
        lock(&self.state).files.insert(identity.clone(), files);
    }

    /// Identity given to tasks submitted from remote URLs.
    pub fn set_url_identity(&self, identity: ContentIdentity) {
        lock(&self.state).url_identity = Some(identity);
    }

    /// Answer the next submission with a rejection.
    pub fn reject_next_submission(&self, message: &str) {
        lock(&self.state).rejection = Some(message.to_string());
    }

    /// Delay every `list` call filtered by identity.
    pub fn delay_lookups(&self, delay: Duration) {
        lock(&self.state).lookup_delay = Some(delay);
    }

    /// State a paused download moves to when resumed (default: downloading).
    pub fn resume_as(&self, state: EngineState) {
        lock(&self.state).resume_state = Some(state);
    }

    /// Accept submissions without ever listing them.
    pub fn hide_submissions(&self) {
        self.hide_submissions.store(true, Ordering::SeqCst);
    }

    /// Make every `list` call fail until toggled back.
    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Make only the next `list` call fail.
    pub fn fail_next_list(&self) {
        self.failing_lists.fetch_add(1, Ordering::SeqCst);
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: EngineCall) {
        lock(&self.state).calls.push(call);
    }

    fn resolve(&self, source: &TorrentSource) -> Option<ContentIdentity> {
        match source {
            TorrentSource::Magnet { uri } => ContentIdentity::from_magnet(uri).ok(),
            TorrentSource::File { path } => ContentIdentity::from_torrent_file(path).ok(),
            TorrentSource::Url { .. } => lock(&self.state).url_identity.clone(),
        }
    }
}

#[async_trait]
impl TorrentEngine for FakeEngine {
    async fn submit(&self, request: AddRequest) -> TorrentResult<SubmitAck> {
        self.record(EngineCall::Submit {
            tag: request.tag.clone(),
            paused: request.paused,
        });
        if let Some(message) = lock(&self.state).rejection.take() {
            return Ok(SubmitAck::Rejected { message });
        }
        if self.hide_submissions.load(Ordering::SeqCst) {
            return Ok(SubmitAck::Accepted);
        }
        if let Some(identity) = self.resolve(&request.source) {
            let initial = if request.paused {
                EngineState::PausedDownload
            } else {
                EngineState::Downloading
            };
            let mut task = snapshot(&identity, initial, 0.0);
            task.save_path.clone_from(&request.save_path);
            self.insert(task);
        }
        Ok(SubmitAck::Accepted)
    }

    async fn list(&self, identity: Option<&ContentIdentity>) -> TorrentResult<Vec<TaskSnapshot>> {
        self.record(EngineCall::List(identity.cloned()));
        let scripted = self
            .failing_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let delay = if identity.is_some() {
            lock(&self.state).lookup_delay
        } else {
            None
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if scripted || self.fail_list.load(Ordering::SeqCst) {
            return Err(TorrentError::engine(
                "list",
                identity.cloned(),
                "fake engine offline",
            ));
        }
        let state = lock(&self.state);
        Ok(state
            .tasks
            .iter()
            .filter(|task| identity.is_none_or(|wanted| &task.identity == wanted))
            .cloned()
            .collect())
    }

    async fn pause(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.record(EngineCall::Pause(identity.clone()));
        self.update(identity, |task| {
            task.state = if task.progress >= 1.0 {
                EngineState::PausedUpload
            } else {
                EngineState::PausedDownload
            };
        });
        Ok(())
    }

    async fn resume(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.record(EngineCall::Resume(identity.clone()));
        let resumed = lock(&self.state)
            .resume_state
            .clone()
            .unwrap_or(EngineState::Downloading);
        self.update(identity, |task| {
            if task.state == EngineState::PausedDownload {
                task.state = resumed;
            }
        });
        Ok(())
    }

    async fn recheck(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.record(EngineCall::Recheck(identity.clone()));
        Ok(())
    }

    async fn reannounce(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.record(EngineCall::Reannounce(identity.clone()));
        Ok(())
    }

    async fn remove(&self, identity: &ContentIdentity, delete_files: bool) -> TorrentResult<()> {
        self.record(EngineCall::Remove {
            identity: identity.clone(),
            delete_files,
        });
        lock(&self.state)
            .tasks
            .retain(|task| &task.identity != identity);
        Ok(())
    }

    async fn trackers(&self, identity: &ContentIdentity) -> TorrentResult<Vec<TrackerEntry>> {
        self.record(EngineCall::Trackers(identity.clone()));
        Ok(lock(&self.state)
            .trackers
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_trackers(
        &self,
        identity: &ContentIdentity,
        urls: &[String],
    ) -> TorrentResult<()> {
        self.record(EngineCall::RemoveTrackers {
            identity: identity.clone(),
            urls: urls.to_vec(),
        });
        if let Some(trackers) = lock(&self.state).trackers.get_mut(identity) {
            trackers.retain(|entry| !urls.contains(&entry.url));
        }
        Ok(())
    }

    async fn files(&self, identity: &ContentIdentity) -> TorrentResult<Vec<TaskFile>> {
        self.record(EngineCall::Files(identity.clone()));
        Ok(lock(&self.state)
            .files
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }
}

/// Callback observed by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    /// `on_download_start`.
    Started,
    /// `on_download_complete`.
    Completed,
    /// `on_download_error`.
    Error {
        /// Message passed to the callback.
        message: String,
        /// Choice passed to the callback.
        choice: Option<ErrorChoice>,
    },
    /// `on_seeding_stopped`.
    SeedingStopped(SeedSummary),
}

/// [`TaskListener`] that records every callback in order.
pub struct RecordingListener {
    task_id: TaskId,
    name: String,
    dir: PathBuf,
    select_files: bool,
    seed_requested: bool,
    multi_count: u32,
    cancelled: AtomicBool,
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    /// Listener for `task_id` downloading into `/downloads/<task_id>`.
    #[must_use]
    pub fn new(task_id: u64) -> Self {
        Self {
            task_id: TaskId(task_id),
            name: format!("task {task_id}"),
            dir: PathBuf::from(format!("/downloads/{task_id}")),
            select_files: false,
            seed_requested: false,
            multi_count: 1,
            cancelled: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Download directory override.
    #[must_use]
    pub fn with_dir(mut self, dir: PathBuf) -> Self {
        self.dir = dir;
        self
    }

    /// Request seeding after completion.
    #[must_use]
    pub const fn with_seeding(mut self) -> Self {
        self.seed_requested = true;
        self
    }

    /// Mark the task as a partial file selection.
    #[must_use]
    pub const fn with_selected_files(mut self) -> Self {
        self.select_files = true;
        self
    }

    /// Number of tasks submitted alongside this one.
    #[must_use]
    pub const fn with_multi_count(mut self, count: u32) -> Self {
        self.multi_count = count;
        self
    }

    /// Flip the user-cancellation flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Callbacks recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ListenerEvent> {
        lock(&self.events).clone()
    }

    /// Number of recorded callbacks matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&ListenerEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|event| predicate(event)).count()
    }

    /// Error messages recorded so far.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                ListenerEvent::Error { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wait up to `limit` for a recorded callback matching `predicate`.
    pub async fn wait_for(
        &self,
        limit: Duration,
        predicate: impl Fn(&ListenerEvent) -> bool,
    ) -> bool {
        let poll = async {
            loop {
                if self.count(&predicate) > 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(limit, poll).await.is_ok()
    }

    fn push(&self, event: ListenerEvent) {
        lock(&self.events).push(event);
    }
}

#[async_trait]
impl TaskListener for RecordingListener {
    fn task_id(&self) -> TaskId {
        self.task_id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn dir(&self) -> PathBuf {
        self.dir.clone()
    }

    fn select_files(&self) -> bool {
        self.select_files
    }

    fn seed_requested(&self) -> bool {
        self.seed_requested
    }

    fn multi_count(&self) -> u32 {
        self.multi_count
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn on_download_start(&self) {
        self.push(ListenerEvent::Started);
    }

    async fn on_download_complete(&self) {
        self.push(ListenerEvent::Completed);
    }

    async fn on_download_error(&self, message: String, choice: Option<ErrorChoice>) {
        self.push(ListenerEvent::Error { message, choice });
    }

    async fn on_seeding_stopped(&self, summary: SeedSummary) {
        self.push(ListenerEvent::SeedingStopped(summary));
    }
}

/// [`DuplicateChecker`] flagging a fixed set of task names.
#[derive(Default)]
pub struct FlaggingDuplicateChecker {
    flagged: HashSet<String>,
    checks: AtomicUsize,
    choice: Option<ErrorChoice>,
}

impl FlaggingDuplicateChecker {
    /// Flag every name in `names`.
    #[must_use]
    pub fn flagging<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flagged: names.into_iter().map(Into::into).collect(),
            checks: AtomicUsize::new(0),
            choice: None,
        }
    }

    /// Attach `choice` to every verdict.
    #[must_use]
    pub fn with_choice(mut self, choice: ErrorChoice) -> Self {
        self.choice = Some(choice);
        self
    }

    /// Number of checks performed.
    #[must_use]
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DuplicateChecker for FlaggingDuplicateChecker {
    async fn check(
        &self,
        _listener: &dyn TaskListener,
        name: &str,
        _size: u64,
    ) -> Option<DuplicateVerdict> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.flagged.contains(name).then(|| DuplicateVerdict {
            message: format!("{name} is already available"),
            choice: self.choice.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{identity_from_seed, magnet_for};

    fn magnet_request(identity: &ContentIdentity, paused: bool) -> AddRequest {
        AddRequest {
            source: TorrentSource::Magnet {
                uri: magnet_for(identity),
            },
            save_path: PathBuf::from("/downloads/1"),
            paused,
            ratio_limit: None,
            seed_time_limit: None,
            tag: "1".into(),
        }
    }

    #[tokio::test]
    async fn accepted_submission_becomes_listed() -> TorrentResult<()> {
        let engine = FakeEngine::new();
        let identity = identity_from_seed(1);
        assert!(engine.submit(magnet_request(&identity, true)).await?.is_accepted());

        let listed = engine.list(Some(&identity)).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, EngineState::PausedDownload);

        engine.resume(&identity).await?;
        assert_eq!(
            engine.task(&identity).map(|task| task.state),
            Some(EngineState::Downloading)
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejection_and_hidden_submissions() -> TorrentResult<()> {
        let engine = FakeEngine::new();
        let identity = identity_from_seed(2);
        engine.reject_next_submission("Fails.");
        assert_eq!(
            engine.submit(magnet_request(&identity, false)).await?,
            SubmitAck::Rejected {
                message: "Fails.".into()
            }
        );

        engine.hide_submissions();
        assert!(engine.submit(magnet_request(&identity, false)).await?.is_accepted());
        assert!(engine.list(None).await?.is_empty());
        assert_eq!(
            engine.count_calls(|call| matches!(call, EngineCall::Submit { .. })),
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn scripted_list_failure_is_one_shot() -> TorrentResult<()> {
        let engine = FakeEngine::new();
        engine.fail_next_list();
        assert!(engine.list(None).await.is_err());
        assert!(engine.list(None).await.is_ok());

        engine.fail_list(true);
        assert!(engine.list(None).await.is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_resume_state_and_slow_lookups() -> TorrentResult<()> {
        let engine = FakeEngine::new();
        let identity = identity_from_seed(4);
        engine.submit(magnet_request(&identity, true)).await?;
        engine.resume_as(EngineState::StalledDownload);
        engine.resume(&identity).await?;
        assert_eq!(
            engine.task(&identity).map(|task| task.state),
            Some(EngineState::StalledDownload)
        );

        engine.delay_lookups(Duration::from_secs(30));
        let started = tokio::time::Instant::now();
        engine.list(None).await?;
        assert!(started.elapsed() < Duration::from_secs(30));
        engine.list(Some(&identity)).await?;
        assert!(started.elapsed() >= Duration::from_secs(30));
        Ok(())
    }

    #[tokio::test]
    async fn listener_records_in_order() {
        let listener = RecordingListener::new(9).with_seeding();
        listener.on_download_start().await;
        listener
            .on_download_error("dead torrent".into(), None)
            .await;
        assert_eq!(listener.events()[0], ListenerEvent::Started);
        assert_eq!(listener.errors(), vec!["dead torrent".to_string()]);
        assert!(listener.seed_requested());
        assert!(
            listener
                .wait_for(Duration::from_millis(50), |event| *event
                    == ListenerEvent::Started)
                .await
        );
    }

    #[tokio::test]
    async fn duplicate_checker_flags_listed_names() {
        let checker = FlaggingDuplicateChecker::flagging(["demo"]);
        let listener = RecordingListener::new(3);
        assert!(checker.check(&listener, "demo", 1).await.is_some());
        assert!(checker.check(&listener, "other", 1).await.is_none());
        assert_eq!(checker.checks(), 2);
    }
}
