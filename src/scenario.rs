//! Load scenarios: named concurrency profiles.
//!
//! A [`ScenarioConfig`] fixes how many virtual users run, how many sequential
//! requests each issues and how long each waits between requests. It is
//! immutable for the duration of one run.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::utils::serialize_secs;

/// Scenarios the load suite runs when no list is configured.
pub const DEFAULT_LOAD_SCENARIOS: [&str; 3] = ["light_load", "medium_load", "heavy_load"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("scenario '{0}' must have at least one concurrent user")]
    NoUsers(String),

    #[error("scenario '{0}' must issue at least one request per user")]
    NoRequests(String),

    #[error("unknown scenario '{name}'. Available: {available}")]
    Unknown { name: String, available: String },
}

/// One load profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScenarioConfig {
    pub concurrent_users: usize,
    pub requests_per_user: usize,

    /// Pause between consecutive requests of one user.
    #[serde(serialize_with = "serialize_secs")]
    pub inter_request_delay: Duration,
}

impl ScenarioConfig {
    pub fn new(concurrent_users: usize, requests_per_user: usize, inter_request_delay: Duration) -> Self {
        Self {
            concurrent_users,
            requests_per_user,
            inter_request_delay,
        }
    }

    /// Requests a full run of this scenario issues.
    pub fn total_requests(&self) -> usize {
        self.concurrent_users * self.requests_per_user
    }

    pub fn validate(&self, name: &str) -> Result<(), ScenarioError> {
        if self.concurrent_users == 0 {
            return Err(ScenarioError::NoUsers(name.to_string()));
        }
        if self.requests_per_user == 0 {
            return Err(ScenarioError::NoRequests(name.to_string()));
        }
        Ok(())
    }
}

/// Ordered collection of named scenarios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioCatalog {
    entries: Vec<(String, ScenarioConfig)>,
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        let ms = Duration::from_millis;
        Self {
            entries: vec![
                ("light_load".into(), ScenarioConfig::new(5, 10, ms(500))),
                ("medium_load".into(), ScenarioConfig::new(10, 20, ms(200))),
                ("heavy_load".into(), ScenarioConfig::new(20, 15, ms(100))),
                ("stress_test".into(), ScenarioConfig::new(50, 5, ms(50))),
            ],
        }
    }
}

impl ScenarioCatalog {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a scenario, replacing any existing one with the same name in place.
    pub fn insert(&mut self, name: &str, scenario: ScenarioConfig) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = scenario,
            None => self.entries.push((name.to_string(), scenario)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioConfig> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Look up a scenario, failing with the list of known names.
    pub fn require(&self, name: &str) -> Result<&ScenarioConfig, ScenarioError> {
        self.get(name).ok_or_else(|| ScenarioError::Unknown {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScenarioConfig)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.entries.iter().try_for_each(|(n, s)| s.validate(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_matches_profiles() {
        let catalog = ScenarioCatalog::default();
        assert_eq!(
            catalog.names(),
            vec!["light_load", "medium_load", "heavy_load", "stress_test"]
        );

        let heavy = catalog.get("heavy_load").unwrap();
        assert_eq!(heavy.concurrent_users, 20);
        assert_eq!(heavy.requests_per_user, 15);
        assert_eq!(heavy.inter_request_delay, Duration::from_millis(100));
        assert_eq!(heavy.total_requests(), 300);
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn default_load_scenarios_exist_in_catalog() {
        let catalog = ScenarioCatalog::default();
        for name in DEFAULT_LOAD_SCENARIOS {
            assert!(catalog.get(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut catalog = ScenarioCatalog::default();
        catalog.insert("light_load", ScenarioConfig::new(1, 1, Duration::ZERO));
        catalog.insert("spike", ScenarioConfig::new(100, 1, Duration::ZERO));

        assert_eq!(catalog.names()[0], "light_load");
        assert_eq!(catalog.get("light_load").unwrap().concurrent_users, 1);
        assert_eq!(catalog.names().last(), Some(&"spike"));
    }

    #[test]
    fn validation_rejects_zero_counts() {
        assert_eq!(
            ScenarioConfig::new(0, 5, Duration::ZERO).validate("x"),
            Err(ScenarioError::NoUsers("x".into()))
        );
        assert_eq!(
            ScenarioConfig::new(5, 0, Duration::ZERO).validate("y"),
            Err(ScenarioError::NoRequests("y".into()))
        );
    }

    #[test]
    fn require_lists_known_names() {
        let err = ScenarioCatalog::default().require("nope").unwrap_err();
        assert!(err.to_string().contains("light_load"));
    }
}
