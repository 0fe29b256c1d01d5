//! YAML suite configuration files.
//!
//! A suite file pins the target, timeouts, load scenarios and the stress
//! escalation plan so a benchmark can be version-controlled and replayed.
//! Every field is optional except `version`; environment variables and CLI
//! flags still override whatever the file sets.
//!
//! ```yaml
//! version: "1.0"
//! config:
//!   baseUrl: "http://localhost:8080/api"
//!   requestTimeout: "30s"
//! scenarios:
//!   - name: spike
//!     users: 100
//!     requestsPerUser: 2
//!     delay: "10ms"
//! loadTestScenarios: [light_load, spike]
//! stress:
//!   levels: [5, 10, 20]
//!   threshold: 0.6
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config_validation::{
    DurationValidator, LevelsValidator, RangeValidator, UrlValidator, ValidationContext,
    VersionValidator,
};

#[derive(Error, Debug)]
pub enum YamlConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Duration written either as whole seconds or as "250ms", "30s", "5m".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlDuration {
    Seconds(u64),
    String(String),
}

impl YamlDuration {
    pub fn to_std_duration(&self) -> Result<Duration, YamlConfigError> {
        match self {
            YamlDuration::Seconds(s) => Ok(Duration::from_secs(*s)),
            YamlDuration::String(s) => crate::utils::parse_duration_string(s)
                .map_err(|e| YamlConfigError::Validation(format!("Invalid duration '{}': {}", s, e))),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            YamlDuration::Seconds(_) => Ok(()),
            YamlDuration::String(s) => DurationValidator::validate(s).map_err(|e| e.to_string()),
        }
    }
}

/// Converts an optional YAML duration, propagating parse errors.
pub fn opt_duration(value: &Option<YamlDuration>) -> Result<Option<Duration>, YamlConfigError> {
    value.as_ref().map(YamlDuration::to_std_duration).transpose()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlGlobalConfig {
    pub base_url: Option<String>,
    pub request_timeout: Option<YamlDuration>,
    pub toggle_timeout: Option<YamlDuration>,
    pub mode_settle_delay: Option<YamlDuration>,
    pub worker_timeout: Option<YamlDuration>,
    pub suite_pause: Option<YamlDuration>,
    pub results_dir: Option<String>,
    pub skip_tls_verify: Option<bool>,
    pub custom_headers: Option<String>,
    pub resolve_target_addr: Option<String>,
    pub max_workers: Option<usize>,
    pub min_percentile_samples: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlScenario {
    pub name: String,
    pub users: usize,
    pub requests_per_user: usize,
    #[serde(default)]
    pub delay: Option<YamlDuration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlStress {
    pub levels: Option<Vec<usize>>,
    pub requests_per_user: Option<usize>,
    pub delay: Option<YamlDuration>,
    pub cooldown: Option<YamlDuration>,
    pub threshold: Option<f64>,
    pub worker_timeout: Option<YamlDuration>,
    pub endpoint: Option<String>,
}

/// Root of a suite file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlSuiteConfig {
    pub version: String,

    #[serde(default)]
    pub config: YamlGlobalConfig,

    /// Extra or replacement load scenarios.
    #[serde(default)]
    pub scenarios: Vec<YamlScenario>,

    /// Scenario names the load suite runs, in order.
    pub load_test_scenarios: Option<Vec<String>>,

    #[serde(default)]
    pub stress: YamlStress,
}

impl YamlSuiteConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, YamlConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse and validate a suite file.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, YamlConfigError> {
        let config: YamlSuiteConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), YamlConfigError> {
        let mut ctx = ValidationContext::new();

        ctx.enter("version");
        ctx.check(VersionValidator::validate(&self.version));
        ctx.exit();

        ctx.enter("config");
        if let Some(ref url) = self.config.base_url {
            ctx.enter("baseUrl");
            ctx.check(UrlValidator::validate(url));
            ctx.exit();
        }
        let durations = [
            ("requestTimeout", &self.config.request_timeout),
            ("toggleTimeout", &self.config.toggle_timeout),
            ("modeSettleDelay", &self.config.mode_settle_delay),
            ("workerTimeout", &self.config.worker_timeout),
            ("suitePause", &self.config.suite_pause),
        ];
        validate_durations(&mut ctx, &durations);
        if let Some(workers) = self.config.max_workers {
            ctx.enter("maxWorkers");
            ctx.check(RangeValidator::validate_positive_u64(workers as u64, "maxWorkers"));
            ctx.exit();
        }
        ctx.exit();

        ctx.enter("scenarios");
        for (idx, scenario) in self.scenarios.iter().enumerate() {
            ctx.enter(&format!("[{}]", idx));
            if scenario.name.trim().is_empty() {
                ctx.field_error("Scenario name cannot be empty".to_string());
            }
            ctx.check(RangeValidator::validate_positive_u64(scenario.users as u64, "users"));
            ctx.check(RangeValidator::validate_positive_u64(
                scenario.requests_per_user as u64,
                "requestsPerUser",
            ));
            validate_durations(&mut ctx, &[("delay", &scenario.delay)]);
            ctx.exit();
        }
        ctx.exit();

        if let Some(ref names) = self.load_test_scenarios {
            ctx.enter("loadTestScenarios");
            if names.is_empty() {
                ctx.field_error("at least one scenario name is required".to_string());
            }
            ctx.exit();
        }

        ctx.enter("stress");
        if let Some(ref levels) = self.stress.levels {
            ctx.check(LevelsValidator::validate(levels));
        }
        if let Some(n) = self.stress.requests_per_user {
            ctx.check(RangeValidator::validate_positive_u64(n as u64, "requestsPerUser"));
        }
        if let Some(threshold) = self.stress.threshold {
            ctx.check(RangeValidator::validate_f64(threshold, 0.0, 1.0, "threshold"));
        }
        validate_durations(
            &mut ctx,
            &[
                ("delay", &self.stress.delay),
                ("cooldown", &self.stress.cooldown),
                ("workerTimeout", &self.stress.worker_timeout),
            ],
        );
        ctx.exit();

        ctx.into_result()
            .map_err(|e| YamlConfigError::Validation(e.to_string()))
    }
}

fn validate_durations(ctx: &mut ValidationContext, fields: &[(&str, &Option<YamlDuration>)]) {
    for (name, value) in fields {
        if let Some(duration) = value {
            ctx.enter(name);
            if let Err(message) = duration.validate() {
                ctx.field_error(message);
            }
            ctx.exit();
        }
    }
}
