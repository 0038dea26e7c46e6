//! Process bootstrap: configuration, telemetry, engine login, and command-line submissions.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use seedkeep_config::{ConfigLoader, EngineConfig, LogFormatSetting, TelemetryConfig};
use seedkeep_events::{EventBus, EventStream};
use seedkeep_qbit::{QbitEngine, QbitSettings};
use seedkeep_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics};
use seedkeep_torrent_core::{ErrorChoice, RequesterId, SeedSummary, TaskId, TaskListener};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{AppError, AppResult};
use crate::ingest::SubmitRequest;
use crate::orchestrator::{Orchestrator, OrchestratorDeps};

const DOWNLOAD_DIR_ENV: &str = "SEEDKEEP_DOWNLOAD_DIR";
const SEED_ENV: &str = "SEEDKEEP_SEED";
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
/// Requester id used for command-line submissions.
const CLI_REQUESTER: RequesterId = RequesterId(0);

/// Entry point for the Seedkeep boot sequence.
///
/// Every element of `sources` is submitted as its own task; the process then
/// runs until ctrl-c.
///
/// # Errors
///
/// Returns an error if configuration, telemetry, or the engine login fails,
/// when every submitted source was rejected, or when waiting for the shutdown
/// signal fails. Individual submission failures are otherwise only logged.
pub async fn run_app(sources: Vec<String>) -> AppResult<()> {
    let config = ConfigLoader::from_env()
        .load()
        .map_err(|err| AppError::config("config.load", err))?;

    let logging = logging_config(&config.telemetry);
    seedkeep_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("seedkeep");
    info!(sources = sources.len(), "Seedkeep starting");

    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let engine = QbitEngine::new(engine_settings(&config.engine)?)
        .map_err(|err| AppError::engine("qbit.new", err))?;
    engine
        .login()
        .await
        .map_err(|err| AppError::engine("qbit.login", err))?;
    info!(base_url = %config.engine.base_url, "engine session established");

    let events = EventBus::new();
    let event_log = tokio::spawn(log_events(events.subscribe(None)));
    let orchestrator = Orchestrator::new(
        config,
        OrchestratorDeps::new(Arc::new(engine), events, metrics),
    );

    let download_dir = std::env::var(DOWNLOAD_DIR_ENV)
        .map_or_else(|_| PathBuf::from(DEFAULT_DOWNLOAD_DIR), PathBuf::from);
    let seed = env_flag(SEED_ENV);
    let submitted = sources.len();
    let mut last_failure = None;
    let mut accepted = 0_usize;
    for (index, source) in sources.into_iter().enumerate() {
        let task_id = TaskId(index as u64 + 1);
        let dir = download_dir.join(task_id.to_string());
        let listener = Arc::new(LoggingListener::new(task_id, &source, dir.clone(), seed));
        let request = SubmitRequest::new(CLI_REQUESTER, source, dir);
        match orchestrator.submit(listener, request).await {
            Ok(_) => accepted += 1,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "submission skipped");
                last_failure = Some(err);
            }
        }
    }
    if accepted == 0
        && let Some(err) = last_failure
    {
        orchestrator.shutdown().await;
        event_log.abort();
        return Err(AppError::torrent("orchestrator.submit", err));
    }
    info!(accepted, submitted, "submissions processed");

    let signal = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    orchestrator.stop_all();
    orchestrator.shutdown().await;
    event_log.abort();
    match orchestrator.metrics().render() {
        Ok(rendered) => debug!(metrics = %rendered, "final metrics"),
        Err(err) => warn!(error = %err, "failed to render metrics"),
    }
    signal.map_err(|source| AppError::Signal { source })
}

fn logging_config(telemetry: &TelemetryConfig) -> LoggingConfig<'_> {
    LoggingConfig {
        level: &telemetry.log_level,
        format: log_format(telemetry.log_format),
        ..LoggingConfig::default()
    }
}

const fn log_format(setting: Option<LogFormatSetting>) -> LogFormat {
    match setting {
        Some(LogFormatSetting::Json) => LogFormat::Json,
        Some(LogFormatSetting::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    }
}

fn engine_settings(engine: &EngineConfig) -> AppResult<QbitSettings> {
    let base_url = Url::parse(&engine.base_url).map_err(|_| AppError::InvalidConfig {
        field: "engine.base_url",
        reason: "invalid_url",
        value: Some(engine.base_url.clone()),
    })?;
    Ok(QbitSettings {
        base_url,
        username: engine.username.clone(),
        password: engine.password.clone(),
        request_timeout: engine.request_timeout(),
    })
}

fn env_flag(name: &str) -> bool {
    env_flag_value(std::env::var(name).ok().as_deref())
}

fn env_flag_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

async fn log_events(mut stream: EventStream) {
    while let Some(envelope) = stream.next().await {
        debug!(
            event_id = envelope.id,
            kind = envelope.event.kind(),
            task_id = ?envelope.event.task_id(),
            "event"
        );
    }
}

/// Listener for command-line submissions; reports through the log only.
struct LoggingListener {
    task_id: TaskId,
    name: String,
    dir: PathBuf,
    seed: bool,
    cancelled: AtomicBool,
}

impl LoggingListener {
    fn new(task_id: TaskId, source: &str, dir: PathBuf, seed: bool) -> Self {
        Self {
            task_id,
            name: display_name(source),
            dir,
            seed,
            cancelled: AtomicBool::new(false),
        }
    }
}

/// Short label for a source: the file name of a path, otherwise a prefix of the link.
fn display_name(source: &str) -> String {
    if source.starts_with("magnet:") || source.contains("://") {
        return source.chars().take(48).collect();
    }
    PathBuf::from(source)
        .file_name()
        .map_or_else(|| source.to_string(), |name| name.to_string_lossy().into_owned())
}

#[async_trait]
impl TaskListener for LoggingListener {
    fn task_id(&self) -> TaskId {
        self.task_id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn dir(&self) -> PathBuf {
        self.dir.clone()
    }

    fn seed_requested(&self) -> bool {
        self.seed
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn on_download_start(&self) {
        info!(task_id = %self.task_id, name = %self.name, "download started");
    }

    async fn on_download_complete(&self) {
        info!(task_id = %self.task_id, name = %self.name, dir = %self.dir.display(), "download complete");
    }

    async fn on_download_error(&self, message: String, choice: Option<ErrorChoice>) {
        self.cancelled.store(true, Ordering::SeqCst);
        error!(
            task_id = %self.task_id,
            name = %self.name,
            message = %message,
            choices = choice.map_or(0, |choice| choice.buttons.len()),
            "download failed"
        );
    }

    async fn on_seeding_stopped(&self, summary: SeedSummary) {
        info!(
            task_id = %self.task_id,
            name = %summary.name,
            ratio = summary.ratio,
            seeding_secs = summary.seeding_time.as_secs(),
            "seeding stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedkeep_config::OrchestratorConfig;

    #[test]
    fn env_flag_handles_truthy_and_falsey() {
        assert!(env_flag_value(Some("TrUe")));
        assert!(env_flag_value(Some(" on ")));
        assert!(!env_flag_value(Some("no")));
        assert!(!env_flag_value(None));
    }

    #[test]
    fn log_format_prefers_explicit_setting() {
        assert_eq!(log_format(Some(LogFormatSetting::Json)), LogFormat::Json);
        assert_eq!(log_format(Some(LogFormatSetting::Pretty)), LogFormat::Pretty);
        assert_eq!(log_format(None), LogFormat::infer());
    }

    #[test]
    fn engine_settings_reject_malformed_url() -> AppResult<()> {
        let mut engine = EngineConfig::default();
        let settings = engine_settings(&engine)?;
        assert_eq!(settings.base_url.host_str(), Some("127.0.0.1"));
        assert_eq!(settings.request_timeout, engine.request_timeout());

        engine.base_url = "not a url".to_string();
        let err = engine_settings(&engine).err();
        assert!(matches!(
            err,
            Some(AppError::InvalidConfig {
                field: "engine.base_url",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn display_name_uses_file_name_for_paths() {
        assert_eq!(display_name("/tmp/linux.torrent"), "linux.torrent");
        assert_eq!(display_name("magnet:?xt=urn:btih:abc"), "magnet:?xt=urn:btih:abc");
    }

    #[tokio::test]
    async fn logging_listener_marks_itself_cancelled_on_error() {
        let listener = LoggingListener::new(TaskId(1), "a.torrent", PathBuf::from("/d/1"), true);
        assert!(listener.seed_requested());
        assert!(!listener.is_cancelled());
        listener.on_download_error("boom".to_string(), None).await;
        assert!(listener.is_cancelled());
    }

    #[test]
    fn default_config_validates() -> AppResult<()> {
        seedkeep_config::validate(&OrchestratorConfig::default())
            .map_err(|err| AppError::config("config.validate", err))
    }
}
