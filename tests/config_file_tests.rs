use serial_test::serial;
use std::env;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use rust_modebench::config::{Config, ConfigError, ConfigOverrides, ENV_VARS};

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

fn suite_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const SUITE: &str = r#"
version: "1.0"
config:
  baseUrl: "http://bench.internal:9000/api"
  requestTimeout: "45s"
  modeSettleDelay: "500ms"
  resultsDir: "out"
scenarios:
  - name: smoke
    users: 2
    requestsPerUser: 3
    delay: "50ms"
loadTestScenarios: [smoke, light_load]
stress:
  levels: [2, 4, 8]
  threshold: 0.8
  endpoint: predict_simple
"#;

#[test]
#[serial]
fn suite_file_named_by_env_is_loaded() {
    clear_env();
    let file = suite_file(SUITE);
    env::set_var("SUITE_CONFIG", file.path());

    let config = Config::from_env().unwrap();

    assert_eq!(config.base_url, "http://bench.internal:9000/api");
    assert_eq!(config.request_timeout, Duration::from_secs(45));
    assert_eq!(config.mode_settle_delay, Duration::from_millis(500));
    assert_eq!(config.results_dir.to_str(), Some("out"));
    assert_eq!(config.load_scenarios, vec!["smoke", "light_load"]);
    let smoke = config.scenarios.get("smoke").unwrap();
    assert_eq!(smoke.total_requests(), 6);
    assert_eq!(config.escalation.levels, vec![2, 4, 8]);
    assert_eq!(config.escalation.threshold, 0.8);
    assert_eq!(config.stress_endpoint, "predict_simple");
    clear_env();
}

#[test]
#[serial]
fn env_beats_file_and_flags_beat_env() {
    clear_env();
    let file = suite_file(SUITE);
    env::set_var("API_BASE_URL", "http://from-env:8080");
    env::set_var("REQUEST_TIMEOUT", "5s");

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.base_url, "http://from-env:8080");
    assert_eq!(config.request_timeout, Duration::from_secs(5));

    let config = config
        .with_overrides(ConfigOverrides {
            base_url: Some("http://from-flag:1234".to_string()),
            no_save: true,
            ..ConfigOverrides::default()
        })
        .unwrap();
    assert_eq!(config.base_url, "http://from-flag:1234");
    assert!(!config.save_results);
    clear_env();
}

#[test]
#[serial]
fn unknown_scenario_in_file_is_rejected() {
    clear_env();
    let file = suite_file(
        r#"
version: "1.0"
loadTestScenarios: [does_not_exist]
"#,
    );
    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
#[serial]
fn unknown_stress_endpoint_flag_is_rejected() {
    clear_env();
    let err = Config::load(None)
        .unwrap()
        .with_overrides(ConfigOverrides {
            stress_endpoint: Some("nope".to_string()),
            ..ConfigOverrides::default()
        })
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownEndpoint { .. }));
}

#[test]
#[serial]
fn missing_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
}
