use std::env;
use std::path::PathBuf;

use chrono::Duration;
use prep_core::model::{AiSettings, AiSettingsDraft};

use crate::error::ConfigError;

/// Snapshots older than this are discarded on resume unless configured otherwise.
pub const DEFAULT_SNAPSHOT_MAX_AGE_HOURS: i64 = 24 * 7;

const APP_DIR_NAME: &str = "radio-prep";

/// Runtime configuration, read from the environment.
///
/// | Variable | Meaning |
/// |---|---|
/// | `PREP_DATA_DIR` | directory for the snapshot file and the default database |
/// | `PREP_DB_URL` | `SQLite` URL of the exam history |
/// | `PREP_SNAPSHOT_MAX_AGE_HOURS` | resume window; `0` keeps snapshots forever |
/// | `GEMINI_API_KEY` | provider key; AI features are disabled without it |
/// | `PREP_GEMINI_BASE_URL`, `PREP_GEMINI_MODEL` | provider endpoint and text model |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_url: String,
    pub snapshot_max_age: Option<Duration>,
    pub ai: AiSettings,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable holds an invalid value or no data
    /// directory can be determined.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = match get("PREP_DATA_DIR") {
            Some(dir) => PathBuf::from(dir.trim()),
            None => dirs::data_local_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or(ConfigError::NoDataDir)?,
        };

        let db_url = get("PREP_DB_URL")
            .map(|url| url.trim().to_string())
            .unwrap_or_else(|| {
                format!(
                    "sqlite://{}?mode=rwc",
                    data_dir.join("history.sqlite3").display()
                )
            });

        let snapshot_max_age = match get("PREP_SNAPSHOT_MAX_AGE_HOURS") {
            Some(raw) => parse_max_age(&raw)?,
            None => Some(Duration::hours(DEFAULT_SNAPSHOT_MAX_AGE_HOURS)),
        };

        let ai = AiSettingsDraft {
            api_key: get("GEMINI_API_KEY"),
            base_url: get("PREP_GEMINI_BASE_URL"),
            text_model: get("PREP_GEMINI_MODEL"),
            ..AiSettingsDraft::default()
        }
        .validate()?;

        Ok(Self {
            data_dir,
            db_url,
            snapshot_max_age,
            ai,
        })
    }
}

fn parse_max_age(raw: &str) -> Result<Option<Duration>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        var: "PREP_SNAPSHOT_MAX_AGE_HOURS",
        value: raw.to_string(),
    };
    let hours: i64 = raw
        .trim()
        .parse()
        .ok()
        .filter(|h| *h >= 0)
        .ok_or_else(invalid)?;
    if hours == 0 {
        return Ok(None);
    }
    Duration::try_hours(hours).map(Some).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_derive_from_data_dir() {
        let cfg = config(&[("PREP_DATA_DIR", "/tmp/prep")]).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/prep"));
        assert_eq!(cfg.db_url, "sqlite:///tmp/prep/history.sqlite3?mode=rwc");
        assert_eq!(
            cfg.snapshot_max_age,
            Some(Duration::hours(DEFAULT_SNAPSHOT_MAX_AGE_HOURS))
        );
        assert!(!cfg.ai.is_configured());
    }

    #[test]
    fn zero_max_age_disables_expiry() {
        let cfg = config(&[
            ("PREP_DATA_DIR", "/tmp/prep"),
            ("PREP_SNAPSHOT_MAX_AGE_HOURS", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.snapshot_max_age, None);
    }

    #[test]
    fn invalid_max_age_is_reported() {
        let err = config(&[
            ("PREP_DATA_DIR", "/tmp/prep"),
            ("PREP_SNAPSHOT_MAX_AGE_HOURS", "-3"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn out_of_range_max_age_is_reported() {
        let err = config(&[
            ("PREP_DATA_DIR", "/tmp/prep"),
            ("PREP_SNAPSHOT_MAX_AGE_HOURS", "3000000000000"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "PREP_SNAPSHOT_MAX_AGE_HOURS",
                ..
            }
        ));
    }

    #[test]
    fn ai_settings_are_read() {
        let cfg = config(&[
            ("PREP_DATA_DIR", "/tmp/prep"),
            ("GEMINI_API_KEY", "k"),
            ("PREP_GEMINI_MODEL", "gemini-test"),
        ])
        .unwrap();
        assert_eq!(cfg.ai.api_key(), Some("k"));
        assert_eq!(cfg.ai.text_model(), "gemini-test");
    }

    #[test]
    fn bad_base_url_fails() {
        let err = config(&[
            ("PREP_DATA_DIR", "/tmp/prep"),
            ("PREP_GEMINI_BASE_URL", "::nope::"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Settings(_)));
    }
}
