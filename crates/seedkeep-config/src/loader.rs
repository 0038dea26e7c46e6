//! YAML document loading with environment overrides.
//!
//! # Design
//! - The document is optional; absent files fall back to defaults.
//! - Overrides read through a lookup closure so tests never touch process env.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::defaults::CONFIG_PATH_ENV;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{LogFormatSetting, OrchestratorConfig};
use crate::validate::validate;

/// Loads [`OrchestratorConfig`] from an optional YAML file plus `SEEDKEEP_*` overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader reading the document named by `SEEDKEEP_CONFIG`, when set.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from),
        }
    }

    /// Loader reading a specific document.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Document location, when one is configured.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load, apply process environment overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document cannot be read or parsed, or
    /// when an override or the final result fails validation.
    pub fn load(&self) -> ConfigResult<OrchestratorConfig> {
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve override variables.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn load_with<F>(&self, lookup: F) -> ConfigResult<OrchestratorConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.path {
            Some(path) => read_document(path)?,
            None => {
                debug!("no configuration document; using defaults");
                OrchestratorConfig::default()
            }
        };
        apply_overrides(&mut config, lookup)?;
        validate(&config)?;
        info!(
            path = ?self.path,
            max_active = ?config.admission.max_active,
            engine = %config.engine.base_url,
            "configuration loaded"
        );
        Ok(config)
    }
}

fn read_document(path: &Path) -> ConfigResult<OrchestratorConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(OrchestratorConfig::default());
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_overrides<F>(config: &mut OrchestratorConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("SEEDKEEP_ENGINE_URL") {
        config.engine.base_url = value;
    }
    if let Some(value) = lookup("SEEDKEEP_ENGINE_USERNAME") {
        config.engine.username = value;
    }
    if let Some(value) = lookup("SEEDKEEP_ENGINE_PASSWORD") {
        config.engine.password = value;
    }
    if let Some(value) = lookup("SEEDKEEP_MAX_ACTIVE") {
        config.admission.max_active = parse_limit("admission", "max_active", &value)?;
    }
    if let Some(value) = lookup("SEEDKEEP_PER_REQUESTER") {
        config.admission.per_requester = parse_limit("admission", "per_requester", &value)?;
    }
    if let Some(value) = lookup("SEEDKEEP_TORRENT_TIMEOUT_SECS") {
        config.monitor.torrent_timeout_secs =
            parse_limit("monitor", "torrent_timeout_secs", &value)?;
    }
    if let Some(value) = lookup("SEEDKEEP_LOG_LEVEL") {
        config.telemetry.log_level = value;
    }
    if let Some(value) = lookup("SEEDKEEP_LOG_FORMAT") {
        config.telemetry.log_format = Some(parse_log_format(&value)?);
    }
    Ok(())
}

/// Empty or `none`/`unlimited` clears the limit.
fn parse_limit<T: FromStr>(
    section: &'static str,
    field: &'static str,
    raw: &str,
) -> ConfigResult<Option<T>> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("unlimited")
    {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::invalid(section, field, trimmed, "not_an_integer"))
}

fn parse_log_format(raw: &str) -> ConfigResult<LogFormatSetting> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormatSetting::Json),
        "pretty" | "text" => Ok(LogFormatSetting::Pretty),
        _ => Err(ConfigError::invalid(
            "telemetry",
            "log_format",
            raw,
            "unknown_format",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_path_yields_defaults() -> anyhow::Result<()> {
        let config = ConfigLoader::default().load_with(lookup(&[]))?;
        assert_eq!(config, OrchestratorConfig::default());
        Ok(())
    }

    #[test]
    fn reads_yaml_document() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "engine:\n  base_url: http://engine.test:8080\nadmission:\n  max_active: 2\n  per_requester: 1"
        )?;
        let loader = ConfigLoader::with_path(file.path());
        let config = loader.load_with(lookup(&[]))?;
        assert_eq!(config.engine.base_url, "http://engine.test:8080");
        assert_eq!(config.admission.max_active, Some(2));
        assert_eq!(config.admission.per_requester, Some(1));
        assert_eq!(loader.path(), Some(file.path()));
        Ok(())
    }

    #[test]
    fn empty_document_is_default() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let config = ConfigLoader::with_path(file.path()).load_with(lookup(&[]))?;
        assert_eq!(config, OrchestratorConfig::default());
        Ok(())
    }

    #[test]
    fn environment_overrides_document() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "admission:\n  max_active: 2")?;
        let config = ConfigLoader::with_path(file.path()).load_with(lookup(&[
            ("SEEDKEEP_ENGINE_URL", "https://remote.test"),
            ("SEEDKEEP_MAX_ACTIVE", "unlimited"),
            ("SEEDKEEP_TORRENT_TIMEOUT_SECS", "900"),
            ("SEEDKEEP_LOG_FORMAT", "JSON"),
        ]))?;
        assert_eq!(config.engine.base_url, "https://remote.test");
        assert_eq!(config.admission.max_active, None);
        assert_eq!(config.monitor.torrent_timeout_secs, Some(900));
        assert_eq!(config.telemetry.log_format, Some(LogFormatSetting::Json));
        Ok(())
    }

    #[test]
    fn malformed_inputs_fail() -> anyhow::Result<()> {
        let bad_limit =
            ConfigLoader::default().load_with(lookup(&[("SEEDKEEP_MAX_ACTIVE", "many")]));
        assert!(matches!(
            bad_limit,
            Err(ConfigError::InvalidField {
                field: "max_active",
                reason: "not_an_integer",
                ..
            })
        ));

        let zero = ConfigLoader::default().load_with(lookup(&[("SEEDKEEP_MAX_ACTIVE", "0")]));
        assert!(matches!(
            zero,
            Err(ConfigError::InvalidField {
                reason: "must_be_positive",
                ..
            })
        ));

        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "admission: [1, 2")?;
        assert!(matches!(
            ConfigLoader::with_path(file.path()).load_with(lookup(&[])),
            Err(ConfigError::Parse { .. })
        ));

        assert!(matches!(
            ConfigLoader::with_path("/definitely/missing.yaml").load_with(lookup(&[])),
            Err(ConfigError::Io { .. })
        ));
        Ok(())
    }
}
