//! Stress escalation: rerun a scenario at increasing concurrency until the
//! target breaks or the level list runs out.
//!
//! The machine has one running state per level and two terminal states. A
//! level whose success rate falls below the threshold is the breaking point;
//! no later level is attempted after it.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::endpoint::Endpoint;
use crate::metrics::STRESS_LEVEL_USERS;
use crate::orchestrator::{LoadRunner, LoadTestReport};
use crate::scenario::ScenarioConfig;
use crate::utils::serialize_secs;

#[derive(Error, Debug, PartialEq)]
pub enum EscalationError {
    #[error("escalation needs at least one concurrency level")]
    NoLevels,

    #[error("concurrency levels must be positive and strictly increasing, got {0:?}")]
    NotIncreasing(Vec<usize>),

    #[error("requests per user must be at least 1")]
    NoRequests,

    #[error("success threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationConfig {
    pub levels: Vec<usize>,
    pub requests_per_user: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub inter_request_delay: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub cooldown: Duration,
    pub threshold: f64,
    #[serde(serialize_with = "serialize_secs")]
    pub worker_timeout: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            levels: vec![5, 10, 20, 30, 40, 50],
            requests_per_user: 3,
            inter_request_delay: Duration::from_millis(100),
            cooldown: Duration::from_secs(2),
            threshold: 0.5,
            worker_timeout: Duration::from_secs(120),
        }
    }
}

impl EscalationConfig {
    pub fn validate(&self) -> Result<(), EscalationError> {
        if self.levels.is_empty() {
            return Err(EscalationError::NoLevels);
        }
        let increasing = self.levels[0] > 0 && self.levels.windows(2).all(|w| w[0] < w[1]);
        if !increasing {
            return Err(EscalationError::NotIncreasing(self.levels.clone()));
        }
        if self.requests_per_user == 0 {
            return Err(EscalationError::NoRequests);
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(EscalationError::ThresholdOutOfRange(self.threshold));
        }
        Ok(())
    }

    fn scenario_for(&self, users: usize) -> ScenarioConfig {
        ScenarioConfig::new(users, self.requests_per_user, self.inter_request_delay)
    }
}

/// Where the escalation stands after a level has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// Run the level at this index next.
    Running { level_index: usize },
    /// Terminal: the level at this index fell below the threshold.
    BreakingPoint { level_index: usize },
    /// Terminal: every level held.
    Exhausted,
}

impl EscalationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EscalationState::Running { .. })
    }

    /// Transition after the level at `level_index` finished with `success_rate`.
    pub fn after_level(
        level_index: usize,
        level_count: usize,
        success_rate: f64,
        threshold: f64,
    ) -> Self {
        if success_rate < threshold {
            EscalationState::BreakingPoint { level_index }
        } else if level_index + 1 < level_count {
            EscalationState::Running {
                level_index: level_index + 1,
            }
        } else {
            EscalationState::Exhausted
        }
    }
}

/// Summary of one escalation level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelOutcome {
    pub users: usize,
    pub total_requests: usize,
    pub failed_requests: usize,
    pub success_rate: f64,
    /// Over successful requests only.
    pub avg_response_time: f64,
    pub requests_per_second: f64,
}

impl LevelOutcome {
    fn from_report(users: usize, report: &LoadTestReport) -> Self {
        Self {
            users,
            total_requests: report.stats.total_requests,
            failed_requests: report.stats.failed_requests,
            success_rate: report.stats.success_rate,
            avg_response_time: report.stats.avg_success_response_time,
            requests_per_second: report.stats.requests_per_second,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationReport {
    pub endpoint: String,
    pub levels: Vec<LevelOutcome>,
    /// User count of the first level below the threshold, if any.
    pub breaking_point: Option<usize>,
    /// Highest level that stayed at or above the threshold.
    pub max_stable_users: Option<usize>,
}

impl EscalationReport {
    pub fn highest_level_attempted(&self) -> Option<usize> {
        self.levels.last().map(|l| l.users)
    }
}

pub struct StressEscalator<R: LoadRunner> {
    runner: R,
    config: EscalationConfig,
}

impl<R: LoadRunner> StressEscalator<R> {
    pub fn new(runner: R, config: EscalationConfig) -> Result<Self, EscalationError> {
        config.validate()?;
        Ok(Self { runner, config })
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub async fn run(&self, endpoint: &Endpoint) -> EscalationReport {
        let levels = &self.config.levels;
        let mut outcomes = Vec::with_capacity(levels.len());
        let mut state = EscalationState::Running { level_index: 0 };

        while let EscalationState::Running { level_index } = state {
            let users = levels[level_index];
            STRESS_LEVEL_USERS.set(users as i64);
            info!(endpoint = %endpoint.name, users, "Escalation level starting");

            let report = self
                .runner
                .run(endpoint, &self.config.scenario_for(users))
                .await;
            let outcome = LevelOutcome::from_report(users, &report);
            info!(
                users,
                success_rate = outcome.success_rate,
                avg_response_time = outcome.avg_response_time,
                "Escalation level finished"
            );
            outcomes.push(outcome);

            state = EscalationState::after_level(
                level_index,
                levels.len(),
                report.stats.success_rate,
                self.config.threshold,
            );

            if let EscalationState::BreakingPoint { .. } = state {
                warn!(users, threshold = self.config.threshold, "Breaking point reached");
            } else if !state.is_terminal() {
                tokio::time::sleep(self.config.cooldown).await;
            }
        }
        STRESS_LEVEL_USERS.set(0);

        let breaking_point = match state {
            EscalationState::BreakingPoint { level_index } => Some(levels[level_index]),
            _ => None,
        };
        let max_stable_users = outcomes
            .iter()
            .filter(|o| o.success_rate >= self.config.threshold)
            .map(|o| o.users)
            .max();

        EscalationReport {
            endpoint: endpoint.name.clone(),
            levels: outcomes,
            breaking_point,
            max_stable_users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EscalationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_levels() {
        let mut config = EscalationConfig {
            levels: vec![],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(EscalationError::NoLevels));

        config.levels = vec![10, 10, 20];
        assert!(matches!(
            config.validate(),
            Err(EscalationError::NotIncreasing(_))
        ));

        config.levels = vec![0, 5];
        assert!(matches!(
            config.validate(),
            Err(EscalationError::NotIncreasing(_))
        ));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let config = EscalationConfig {
            threshold: 1.5,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(EscalationError::ThresholdOutOfRange(1.5))
        );
    }

    #[test]
    fn transitions() {
        assert_eq!(
            EscalationState::after_level(0, 3, 0.9, 0.5),
            EscalationState::Running { level_index: 1 }
        );
        assert_eq!(
            EscalationState::after_level(1, 3, 0.49, 0.5),
            EscalationState::BreakingPoint { level_index: 1 }
        );
        assert_eq!(
            EscalationState::after_level(2, 3, 0.5, 0.5),
            EscalationState::Exhausted
        );
        assert!(EscalationState::Exhausted.is_terminal());
        assert!(!EscalationState::Running { level_index: 0 }.is_terminal());
    }
}
