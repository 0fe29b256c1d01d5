use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_modebench::endpoint::{load_test_endpoint, Endpoint};
use rust_modebench::errors::RequestError;
use rust_modebench::escalation::{EscalationConfig, StressEscalator};
use rust_modebench::issuer::{RequestIssuer, RequestResult};
use rust_modebench::orchestrator::{LoadOrchestrator, LoadRunner, LoadTestReport, OrchestratorSettings};
use rust_modebench::scenario::ScenarioConfig;
use rust_modebench::stats::AggregateStats;

/// Answers each level with a fixed success rate per user count.
struct ScriptedRunner {
    success_by_users: BTreeMap<usize, f64>,
}

impl ScriptedRunner {
    fn new(rates: &[(usize, f64)]) -> Self {
        Self {
            success_by_users: rates.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl LoadRunner for ScriptedRunner {
    async fn run(&self, endpoint: &Endpoint, scenario: &ScenarioConfig) -> LoadTestReport {
        let users = scenario.concurrent_users;

        let total = scenario.total_requests();
        let rate = self.success_by_users.get(&users).copied().unwrap_or(1.0);
        let successes = (total as f64 * rate).round() as usize;
        let results: Vec<RequestResult> = (0..total)
            .map(|n| RequestResult {
                success: n < successes,
                status_code: if n < successes { 200 } else { 500 },
                response_time: Duration::from_millis(20),
                response_size: 2,
                error: (n >= successes).then_some(RequestError::Status { status: 500 }),
                user_id: Some(n % users),
                request_num: Some(n / users),
            })
            .collect();

        LoadTestReport {
            endpoint: endpoint.name.clone(),
            scenario: *scenario,
            stats: AggregateStats::compute(&results, Duration::from_secs(1), 21),
            abandoned_workers: 0,
            results,
        }
    }
}

fn config(levels: Vec<usize>) -> EscalationConfig {
    EscalationConfig {
        levels,
        requests_per_user: 2,
        inter_request_delay: Duration::ZERO,
        cooldown: Duration::from_millis(10),
        threshold: 0.5,
        worker_timeout: Duration::from_secs(5),
    }
}

fn chat() -> Endpoint {
    load_test_endpoint("chat_simple").expect("chat_simple is a load endpoint")
}

#[tokio::test]
async fn stops_at_first_level_below_threshold() {
    let runner = ScriptedRunner::new(&[(5, 1.0), (10, 0.9), (20, 0.2), (30, 1.0)]);
    let escalator = StressEscalator::new(runner, config(vec![5, 10, 20, 30])).unwrap();

    let report = escalator.run(&chat()).await;

    assert_eq!(report.breaking_point, Some(20));
    assert_eq!(report.max_stable_users, Some(10));
    assert_eq!(report.levels.len(), 3);
    assert_eq!(report.highest_level_attempted(), Some(20));
    assert_eq!(report.levels[2].failed_requests, 32);
}

#[tokio::test]
async fn every_level_holding_means_no_breaking_point() {
    let runner = ScriptedRunner::new(&[]);
    let escalator = StressEscalator::new(runner, config(vec![2, 4, 6])).unwrap();

    let report = escalator.run(&chat()).await;

    assert_eq!(report.breaking_point, None);
    assert_eq!(report.max_stable_users, Some(6));
    assert_eq!(report.levels.iter().map(|l| l.users).collect::<Vec<_>>(), vec![2, 4, 6]);
}

#[tokio::test]
async fn exactly_at_threshold_is_stable() {
    let runner = ScriptedRunner::new(&[(4, 0.5)]);
    let escalator = StressEscalator::new(runner, config(vec![4, 8])).unwrap();

    let report = escalator.run(&chat()).await;
    assert_eq!(report.breaking_point, None);
    assert_eq!(report.levels.len(), 2);
}

#[tokio::test]
async fn failing_first_level_has_no_stable_level() {
    let runner = ScriptedRunner::new(&[(3, 0.0)]);
    let escalator = StressEscalator::new(runner, config(vec![3, 6])).unwrap();

    let report = escalator.run(&chat()).await;
    assert_eq!(report.breaking_point, Some(3));
    assert_eq!(report.max_stable_users, None);
    assert_eq!(report.levels.len(), 1);
}

#[test]
fn invalid_levels_are_rejected_up_front() {
    let runner = ScriptedRunner::new(&[]);
    assert!(StressEscalator::new(runner, config(vec![10, 5])).is_err());
}

#[tokio::test]
async fn erroring_server_breaks_on_the_first_level() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let issuer = RequestIssuer::new(reqwest::Client::new(), &server.uri());
    let runner = LoadOrchestrator::new(
        issuer,
        OrchestratorSettings {
            request_timeout: Duration::from_secs(5),
            worker_timeout: Duration::from_secs(10),
            max_workers: None,
            min_percentile_samples: 21,
        },
    );
    let escalator = StressEscalator::new(runner, config(vec![2, 4, 8])).unwrap();

    let report = escalator.run(&chat()).await;

    assert_eq!(report.levels.len(), 1);
    assert_eq!(report.breaking_point, Some(2));
    assert_eq!(report.levels[0].total_requests, 4);
    assert_eq!(report.levels[0].success_rate, 0.0);
}
