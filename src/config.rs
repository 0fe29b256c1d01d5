use std::path::{Path, PathBuf};
use tokio::time::Duration;
use thiserror::Error;

use crate::client::ClientConfig;
use crate::config_merge::{ConfigDefaults, ConfigMerger};
use crate::config_validation::{RangeValidator, UrlValidator, ValidationError, MAX_WORKER_TIMEOUT};
use crate::endpoint::load_test_endpoints;
use crate::escalation::{EscalationConfig, EscalationError};
use crate::orchestrator::OrchestratorSettings;
use crate::scenario::{ScenarioCatalog, ScenarioConfig, ScenarioError, DEFAULT_LOAD_SCENARIOS};
use crate::yaml_config::{opt_duration, YamlConfigError, YamlSuiteConfig};

/// Endpoint the stress escalation targets unless overridden.
pub const DEFAULT_STRESS_ENDPOINT: &str = "chat_simple";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var}='{value}' is invalid: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Yaml(#[from] YamlConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Escalation(#[from] EscalationError),

    #[error("unknown endpoint '{name}' (available: {available})")]
    UnknownEndpoint { name: String, available: String },
}

/// Values supplied on the command line. They win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub results_dir: Option<PathBuf>,
    pub no_save: bool,
    pub load_scenarios: Vec<String>,
    pub stress_endpoint: Option<String>,
    pub stress_levels: Option<Vec<usize>>,
}

/// Resolved configuration for a harness run.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub request_timeout: Duration,
    pub toggle_timeout: Duration,
    pub mode_settle_delay: Duration,
    pub worker_timeout: Duration,
    pub suite_pause: Duration,
    pub results_dir: PathBuf,
    pub save_results: bool,
    pub skip_tls_verify: bool,
    pub custom_headers: Option<String>,
    pub resolve_target_addr: Option<String>,
    pub metrics_port: Option<u16>,
    pub min_percentile_samples: usize,
    pub max_workers: Option<usize>,
    pub scenarios: ScenarioCatalog,
    pub load_scenarios: Vec<String>,
    pub escalation: EscalationConfig,
    pub stress_endpoint: String,
}

impl Config {
    /// Loads configuration from the environment, reading the suite file named
    /// by `SUITE_CONFIG` when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = ConfigMerger::merge_optional_string(None, "SUITE_CONFIG");
        Self::load(path.as_deref().map(Path::new))
    }

    /// Loads configuration from an explicit suite file (or none), with
    /// environment variables layered on top.
    pub fn load(suite_file: Option<&Path>) -> Result<Self, ConfigError> {
        match suite_file {
            Some(path) => {
                let yaml = YamlSuiteConfig::from_file(path)?;
                Self::from_yaml_with_env_overrides(&yaml)
            }
            None => Self::from_sources(None),
        }
    }

    pub fn from_yaml_with_env_overrides(yaml: &YamlSuiteConfig) -> Result<Self, ConfigError> {
        Self::from_sources(Some(yaml))
    }

    fn from_sources(yaml: Option<&YamlSuiteConfig>) -> Result<Self, ConfigError> {
        let defaults = ConfigDefaults::default();
        let global = yaml.map(|y| y.config.clone()).unwrap_or_default();

        let base_url = ConfigMerger::merge_string(global.base_url, "API_BASE_URL", &defaults.base_url);
        UrlValidator::validate(&base_url)?;

        let request_timeout = ConfigMerger::merge_duration(
            opt_duration(&global.request_timeout)?,
            "REQUEST_TIMEOUT",
            defaults.request_timeout,
        )?;
        let toggle_timeout = ConfigMerger::merge_duration(
            opt_duration(&global.toggle_timeout)?,
            "TOGGLE_TIMEOUT",
            defaults.toggle_timeout,
        )?;
        let mode_settle_delay = ConfigMerger::merge_duration(
            opt_duration(&global.mode_settle_delay)?,
            "MODE_SETTLE_DELAY",
            defaults.mode_settle_delay,
        )?;
        let worker_timeout = ConfigMerger::merge_duration(
            opt_duration(&global.worker_timeout)?,
            "WORKER_TIMEOUT",
            defaults.worker_timeout,
        )?;
        let suite_pause = ConfigMerger::merge_duration(
            opt_duration(&global.suite_pause)?,
            "SUITE_PAUSE",
            defaults.suite_pause,
        )?;

        let results_dir = PathBuf::from(ConfigMerger::merge_string(
            global.results_dir,
            "RESULTS_DIR",
            &defaults.results_dir,
        ));
        let skip_tls_verify =
            ConfigMerger::merge_bool(global.skip_tls_verify, "SKIP_TLS_VERIFY", defaults.skip_tls_verify)?;
        let custom_headers = ConfigMerger::merge_optional_string(global.custom_headers, "CUSTOM_HEADERS");
        let resolve_target_addr =
            ConfigMerger::merge_optional_string(global.resolve_target_addr, "RESOLVE_TARGET_ADDR");

        let metrics_port = ConfigMerger::merge_parsed::<u16>(None, "METRICS_PORT")?;
        let min_percentile_samples =
            ConfigMerger::merge_parsed(global.min_percentile_samples, "MIN_PERCENTILE_SAMPLES")?
                .unwrap_or(defaults.min_percentile_samples);
        let max_workers = ConfigMerger::merge_parsed(global.max_workers, "MAX_WORKERS")?;
        if max_workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                var: "MAX_WORKERS".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut scenarios = ScenarioCatalog::default();
        let mut load_scenarios: Vec<String> =
            DEFAULT_LOAD_SCENARIOS.iter().map(|s| s.to_string()).collect();
        let mut escalation = EscalationConfig::default();
        let mut stress_endpoint = DEFAULT_STRESS_ENDPOINT.to_string();

        if let Some(yaml) = yaml {
            for scenario in &yaml.scenarios {
                let delay = opt_duration(&scenario.delay)?.unwrap_or(Duration::ZERO);
                scenarios.insert(
                    &scenario.name,
                    ScenarioConfig::new(scenario.users, scenario.requests_per_user, delay),
                );
            }
            if let Some(ref names) = yaml.load_test_scenarios {
                load_scenarios = names.clone();
            }

            let stress = &yaml.stress;
            if let Some(ref levels) = stress.levels {
                escalation.levels = levels.clone();
            }
            if let Some(n) = stress.requests_per_user {
                escalation.requests_per_user = n;
            }
            if let Some(delay) = opt_duration(&stress.delay)? {
                escalation.inter_request_delay = delay;
            }
            if let Some(cooldown) = opt_duration(&stress.cooldown)? {
                escalation.cooldown = cooldown;
            }
            if let Some(threshold) = stress.threshold {
                escalation.threshold = threshold;
            }
            if let Some(timeout) = opt_duration(&stress.worker_timeout)? {
                escalation.worker_timeout = timeout;
            }
            if let Some(ref endpoint) = stress.endpoint {
                stress_endpoint = endpoint.clone();
            }
        }

        let config = Config {
            base_url,
            request_timeout,
            toggle_timeout,
            mode_settle_delay,
            worker_timeout,
            suite_pause,
            results_dir,
            save_results: true,
            skip_tls_verify,
            custom_headers,
            resolve_target_addr,
            metrics_port,
            min_percentile_samples,
            max_workers,
            scenarios,
            load_scenarios,
            escalation,
            stress_endpoint,
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides and re-validates.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(url) = overrides.base_url {
            UrlValidator::validate(&url)?;
            self.base_url = url;
        }
        if let Some(dir) = overrides.results_dir {
            self.results_dir = dir;
        }
        if overrides.no_save {
            self.save_results = false;
        }
        if !overrides.load_scenarios.is_empty() {
            self.load_scenarios = overrides.load_scenarios;
        }
        if let Some(endpoint) = overrides.stress_endpoint {
            self.stress_endpoint = endpoint;
        }
        if let Some(levels) = overrides.stress_levels {
            self.escalation.levels = levels;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        RangeValidator::validate_max_duration(self.worker_timeout, MAX_WORKER_TIMEOUT, "worker_timeout")?;
        RangeValidator::validate_max_duration(
            self.escalation.worker_timeout,
            MAX_WORKER_TIMEOUT,
            "stress.worker_timeout",
        )?;
        self.scenarios.validate()?;
        for name in &self.load_scenarios {
            self.scenarios.require(name)?;
        }
        self.escalation.validate()?;
        if !load_test_endpoints().iter().any(|e| e.name == self.stress_endpoint) {
            let available: Vec<String> = load_test_endpoints().into_iter().map(|e| e.name).collect();
            return Err(ConfigError::UnknownEndpoint {
                name: self.stress_endpoint.clone(),
                available: available.join(", "),
            });
        }
        Ok(())
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        let largest_scenario = self
            .scenarios
            .iter()
            .map(|(_, s)| s.concurrent_users)
            .max()
            .unwrap_or(0);
        let largest_level = self.escalation.levels.last().copied().unwrap_or(0);

        ClientConfig {
            skip_tls_verify: self.skip_tls_verify,
            resolve_target_addr: self.resolve_target_addr.clone(),
            custom_headers: self.custom_headers.clone(),
            default_timeout: None,
            max_idle_per_host: largest_scenario.max(largest_level),
        }
    }

    /// Settings for load-suite scenario runs.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            request_timeout: self.request_timeout,
            worker_timeout: self.worker_timeout,
            max_workers: self.max_workers,
            min_percentile_samples: self.min_percentile_samples,
        }
    }

    /// Settings for escalation levels, which carry their own deadline.
    pub fn escalation_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            worker_timeout: self.escalation.worker_timeout,
            ..self.orchestrator_settings()
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self, parsed_headers: &reqwest::header::HeaderMap) {
        println!("Configuration:");
        println!("  Target API: {}", self.base_url);
        println!("  Request timeout: {:?}", self.request_timeout);
        println!("  Toggle timeout: {:?}", self.toggle_timeout);
        println!("  Mode settle delay: {:?}", self.mode_settle_delay);
        println!("  Worker timeout: {:?}", self.worker_timeout);
        match self.max_workers {
            Some(n) => println!("  Worker pool: {} tasks", n),
            None => println!("  Worker pool: one task per user"),
        }
        println!("  Load scenarios: {}", self.load_scenarios.join(", "));
        println!(
            "  Stress levels: {:?} on {} (threshold {:.0}%)",
            self.escalation.levels,
            self.stress_endpoint,
            self.escalation.threshold * 100.0
        );
        if self.save_results {
            println!("  Results directory: {}", self.results_dir.display());
        } else {
            println!("  Results directory: (saving disabled)");
        }
        println!("  Skip TLS Verify: {}", self.skip_tls_verify);
        if let Some(port) = self.metrics_port {
            println!("  Metrics: http://0.0.0.0:{}/metrics", port);
        }

        if parsed_headers.is_empty() {
            println!("  Custom Headers: none");
        } else {
            println!("  Custom Headers:");
            for (name, value) in parsed_headers.iter() {
                println!(
                    "    {}: {}",
                    name,
                    value.to_str().unwrap_or("<non-ASCII or sensitive value>")
                );
            }
        }
    }
}

/// Environment variables read by [`Config`].
pub const ENV_VARS: &[&str] = &[
    "API_BASE_URL",
    "REQUEST_TIMEOUT",
    "TOGGLE_TIMEOUT",
    "MODE_SETTLE_DELAY",
    "WORKER_TIMEOUT",
    "MAX_WORKERS",
    "SUITE_PAUSE",
    "RESULTS_DIR",
    "SKIP_TLS_VERIFY",
    "CUSTOM_HEADERS",
    "RESOLVE_TARGET_ADDR",
    "METRICS_PORT",
    "MIN_PERCENTILE_SAMPLES",
    "SUITE_CONFIG",
];
