//! Validation rules applied after loading.

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::OrchestratorConfig;

/// Check every field of a loaded configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first offending field.
pub fn validate(config: &OrchestratorConfig) -> ConfigResult<()> {
    let engine = &config.engine;
    let parsed = Url::parse(&engine.base_url)
        .map_err(|_| ConfigError::invalid("engine", "base_url", &engine.base_url, "invalid_url"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "engine",
            "base_url",
            &engine.base_url,
            "unsupported_scheme",
        ));
    }
    positive("engine", "request_timeout_secs", engine.request_timeout_secs)?;

    optional_positive("admission", "max_active", config.admission.max_active)?;
    optional_positive("admission", "per_requester", config.admission.per_requester)?;

    positive("monitor", "poll_interval_ms", config.monitor.poll_interval_ms)?;
    optional_positive(
        "monitor",
        "torrent_timeout_secs",
        config.monitor.torrent_timeout_secs,
    )?;

    positive("ingest", "poll_attempts", config.ingest.poll_attempts)?;
    positive("ingest", "poll_interval_ms", config.ingest.poll_interval_ms)?;

    positive("pruning", "poll_interval_secs", config.pruning.poll_interval_secs)?;
    positive("pruning", "max_attempts", config.pruning.max_attempts)?;

    if config.telemetry.log_level.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            section: "telemetry",
            field: "log_level",
            value: None,
            reason: "empty",
        });
    }
    Ok(())
}

fn positive<T>(section: &'static str, field: &'static str, value: T) -> ConfigResult<()>
where
    T: Copy + Default + PartialEq + ToString,
{
    if value == T::default() {
        return Err(ConfigError::invalid(section, field, value, "must_be_positive"));
    }
    Ok(())
}

fn optional_positive<T>(
    section: &'static str,
    field: &'static str,
    value: Option<T>,
) -> ConfigResult<()>
where
    T: Copy + Default + PartialEq + ToString,
{
    value.map_or(Ok(()), |inner| positive(section, field, inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> Option<(&'static str, &'static str)> {
        match result {
            Err(ConfigError::InvalidField { section, field, .. }) => Some((section, field)),
            _ => None,
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(validate(&OrchestratorConfig::default()).is_ok());
    }

    #[test]
    fn rejects_zero_limits() {
        let mut config = OrchestratorConfig::default();
        config.admission.max_active = Some(0);
        assert_eq!(
            field_of(validate(&config)),
            Some(("admission", "max_active"))
        );

        let mut config = OrchestratorConfig::default();
        config.monitor.torrent_timeout_secs = Some(0);
        assert_eq!(
            field_of(validate(&config)),
            Some(("monitor", "torrent_timeout_secs"))
        );

        let mut config = OrchestratorConfig::default();
        config.ingest.poll_attempts = 0;
        assert_eq!(field_of(validate(&config)), Some(("ingest", "poll_attempts")));
    }

    #[test]
    fn rejects_bad_engine_url() {
        let mut config = OrchestratorConfig::default();
        config.engine.base_url = "ftp://engine.test".into();
        assert_eq!(field_of(validate(&config)), Some(("engine", "base_url")));

        config.engine.base_url = "not a url".into();
        assert_eq!(field_of(validate(&config)), Some(("engine", "base_url")));
    }

    #[test]
    fn rejects_blank_log_level() {
        let mut config = OrchestratorConfig::default();
        config.telemetry.log_level = "  ".into();
        assert_eq!(
            field_of(validate(&config)),
            Some(("telemetry", "log_level"))
        );
    }
}
