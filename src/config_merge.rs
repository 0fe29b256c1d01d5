//! Configuration precedence and default values.
//!
//! Values resolve as: environment variable > YAML suite file > default.
//! CLI flags are applied on top afterwards by [`crate::config::Config`].
//! Unlike a silent fallback, an environment variable that is set but cannot be
//! parsed is an error.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::config::ConfigError;
use crate::utils::parse_duration_string;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Default configuration values for every optional setting.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDefaults {
    pub base_url: String,
    pub request_timeout: Duration,
    pub toggle_timeout: Duration,
    pub mode_settle_delay: Duration,
    pub worker_timeout: Duration,
    pub suite_pause: Duration,
    pub results_dir: String,
    pub skip_tls_verify: bool,
    pub min_percentile_samples: usize,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            toggle_timeout: Duration::from_secs(10),
            mode_settle_delay: Duration::from_secs(2),
            worker_timeout: Duration::from_secs(600),
            suite_pause: Duration::from_secs(30),
            results_dir: "results".to_string(),
            skip_tls_verify: false,
            min_percentile_samples: crate::percentiles::DEFAULT_MIN_PERCENTILE_SAMPLES,
        }
    }
}

/// Non-empty value of an environment variable.
fn env_value(env_var: &str) -> Option<String> {
    env::var(env_var).ok().filter(|v| !v.trim().is_empty())
}

fn invalid(env_var: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        var: env_var.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration precedence resolver.
pub struct ConfigMerger;

impl ConfigMerger {
    /// Merge string value with precedence: env > yaml > default.
    pub fn merge_string(yaml_value: Option<String>, env_var: &str, default: &str) -> String {
        env_value(env_var)
            .or(yaml_value)
            .unwrap_or_else(|| default.to_string())
    }

    /// Merge optional string with precedence: env > yaml.
    pub fn merge_optional_string(yaml_value: Option<String>, env_var: &str) -> Option<String> {
        env_value(env_var).or(yaml_value)
    }

    /// Merge a duration with precedence: env > yaml > default.
    pub fn merge_duration(
        yaml_value: Option<Duration>,
        env_var: &str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        match env_value(env_var) {
            Some(raw) => parse_duration_string(&raw).map_err(|e| invalid(env_var, &raw, e)),
            None => Ok(yaml_value.unwrap_or(default)),
        }
    }

    /// Merge a boolean flag; the environment must say "true" or "false" (any case).
    pub fn merge_bool(
        yaml_value: Option<bool>,
        env_var: &str,
        default: bool,
    ) -> Result<bool, ConfigError> {
        match env_value(env_var) {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(env_var, &raw, "expected 'true' or 'false'")),
            },
            None => Ok(yaml_value.unwrap_or(default)),
        }
    }

    /// Merge any parseable value with precedence: env > yaml.
    pub fn merge_parsed<T>(yaml_value: Option<T>, env_var: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env_value(env_var) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| invalid(env_var, &raw, e)),
            None => Ok(yaml_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_documented_values() {
        let defaults = ConfigDefaults::default();
        assert_eq!(defaults.base_url, "http://localhost:8080/api");
        assert_eq!(defaults.request_timeout, Duration::from_secs(30));
        assert_eq!(defaults.toggle_timeout, Duration::from_secs(10));
        assert_eq!(defaults.mode_settle_delay, Duration::from_secs(2));
        assert_eq!(defaults.results_dir, "results");
        assert_eq!(defaults.min_percentile_samples, 21);
    }

    #[test]
    #[serial]
    fn env_beats_yaml() {
        env::set_var("MERGE_TEST_URL", "http://env:1/api");
        let merged = ConfigMerger::merge_string(
            Some("http://yaml:1/api".into()),
            "MERGE_TEST_URL",
            DEFAULT_BASE_URL,
        );
        env::remove_var("MERGE_TEST_URL");
        assert_eq!(merged, "http://env:1/api");
    }

    #[test]
    #[serial]
    fn yaml_beats_default() {
        env::remove_var("MERGE_TEST_TIMEOUT");
        let merged = ConfigMerger::merge_duration(
            Some(Duration::from_secs(5)),
            "MERGE_TEST_TIMEOUT",
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(merged, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn empty_env_is_ignored() {
        env::set_var("MERGE_TEST_EMPTY", "  ");
        let merged = ConfigMerger::merge_optional_string(Some("yaml".into()), "MERGE_TEST_EMPTY");
        env::remove_var("MERGE_TEST_EMPTY");
        assert_eq!(merged.as_deref(), Some("yaml"));
    }

    #[test]
    #[serial]
    fn unparseable_env_is_an_error() {
        env::set_var("MERGE_TEST_BAD", "lots");
        let merged = ConfigMerger::merge_parsed::<usize>(None, "MERGE_TEST_BAD");
        let duration = ConfigMerger::merge_duration(None, "MERGE_TEST_BAD", Duration::ZERO);
        env::remove_var("MERGE_TEST_BAD");

        assert!(matches!(merged, Err(ConfigError::InvalidValue { .. })));
        assert!(duration.is_err());
    }

    #[test]
    #[serial]
    fn bool_parsing() {
        env::set_var("MERGE_TEST_BOOL", "TRUE");
        let upper = ConfigMerger::merge_bool(Some(false), "MERGE_TEST_BOOL", false);
        env::set_var("MERGE_TEST_BOOL", " false ");
        let lower = ConfigMerger::merge_bool(Some(true), "MERGE_TEST_BOOL", true);
        env::remove_var("MERGE_TEST_BOOL");
        let unset = ConfigMerger::merge_bool(Some(true), "MERGE_TEST_BOOL", false);

        assert!(upper.unwrap());
        assert!(!lower.unwrap());
        assert!(unset.unwrap());
    }

    #[test]
    #[serial]
    fn unrecognised_bool_is_an_error() {
        env::set_var("MERGE_TEST_BOOL", "yes");
        let merged = ConfigMerger::merge_bool(Some(true), "MERGE_TEST_BOOL", false);
        env::remove_var("MERGE_TEST_BOOL");

        match merged {
            Err(ConfigError::InvalidValue { var, value, .. }) => {
                assert_eq!(var, "MERGE_TEST_BOOL");
                assert_eq!(value, "yes");
            }
            other => panic!("expected an invalid value, got {:?}", other),
        }
    }
}
