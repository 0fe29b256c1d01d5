//! Latency comparison of every endpoint category in both modes.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::endpoint::{analysis_cases, basic_endpoints, chat_cases, prediction_cases, Endpoint};
use crate::errors::HarnessError;
use crate::issuer::RequestIssuer;
use crate::report::{print_banner, print_section, ratio, timestamp};
use crate::stats::{success_rate, LatencySummary};
use crate::suite::{both_completed, for_each_mode, ModePhases, SuiteContext};
use crate::utils::{mean, serialize_secs};

pub const PERFORMANCE_ITERATIONS: usize = 5;
pub const PERFORMANCE_TIMEOUT: Duration = Duration::from_secs(60);
const SAMPLE_RESPONSES: usize = 2;

/// Figures for one case, over its successful iterations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseStats {
    pub success_rate: f64,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub median_time: f64,
    pub std_dev: f64,
    pub total_tests: usize,
    pub successful_tests: usize,
    pub sample_responses: Vec<Value>,
}

impl CaseStats {
    fn from_samples(times: &[Duration], samples: Vec<Value>, total_tests: usize) -> Self {
        let latency = LatencySummary::from_durations(times);
        Self {
            success_rate: success_rate(times.len(), total_tests),
            avg_time: latency.mean,
            min_time: latency.min,
            max_time: latency.max,
            median_time: latency.median,
            std_dev: latency.std_dev,
            total_tests,
            successful_tests: times.len(),
            sample_responses: samples,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    /// Mean of the case averages, counting only cases with a success.
    pub overall_avg_time: f64,
    pub overall_success_rate: f64,
    pub fastest_response: f64,
    pub slowest_response: f64,
    pub total_tests_run: usize,
}

impl PerformanceSummary {
    pub fn from_categories(categories: &BTreeMap<String, BTreeMap<String, CaseStats>>) -> Self {
        let cases: Vec<&CaseStats> = categories.values().flat_map(|c| c.values()).collect();
        let total_tests_run = cases.iter().map(|c| c.total_tests).sum();

        let averages: Vec<f64> = cases
            .iter()
            .filter(|c| c.success_rate > 0.0)
            .map(|c| c.avg_time)
            .collect();
        if averages.is_empty() {
            return Self {
                total_tests_run,
                ..Self::default()
            };
        }

        let rates: Vec<f64> = cases.iter().map(|c| c.success_rate).collect();
        Self {
            overall_avg_time: mean(&averages),
            overall_success_rate: mean(&rates),
            fastest_response: averages.iter().copied().fold(f64::INFINITY, f64::min),
            slowest_response: averages.iter().copied().fold(0.0, f64::max),
            total_tests_run,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModePerformance {
    pub categories: BTreeMap<String, BTreeMap<String, CaseStats>>,
    pub summary: PerformanceSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceComparison {
    /// AI minus Local overall average, in seconds.
    pub time_diff: f64,
    /// AI over Local overall average; 0 when Local has no successes.
    pub time_ratio: f64,
}

impl PerformanceComparison {
    pub fn between(local: &PerformanceSummary, ai: &PerformanceSummary) -> Self {
        Self {
            time_diff: ai.overall_avg_time - local.overall_avg_time,
            time_ratio: ratio(ai.overall_avg_time, local.overall_avg_time),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestSettings {
    pub iterations: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub timestamp: String,
    pub test_config: TestSettings,
    pub modes: ModePhases<ModePerformance>,
    pub comparison: Option<PerformanceComparison>,
}

/// Issue `endpoint` `iterations` times in sequence and summarize the successes.
/// A success is a 200 whose body parses as JSON.
pub async fn measure_case(
    issuer: &RequestIssuer,
    endpoint: &Endpoint,
    iterations: usize,
    timeout: Duration,
) -> CaseStats {
    let mut times = Vec::with_capacity(iterations);
    let mut samples = Vec::new();

    for iteration in 1..=iterations {
        let captured = issuer.issue_capture(endpoint, timeout).await;
        // An iteration only counts when the body is JSON as well.
        match captured.json() {
            Some(json) => {
                debug!(
                    case = %endpoint.name,
                    iteration,
                    secs = captured.result.response_time.as_secs_f64(),
                    "Iteration succeeded"
                );
                times.push(captured.result.response_time);
                if samples.len() < SAMPLE_RESPONSES {
                    samples.push(json);
                }
            }
            None => warn!(
                case = %endpoint.name,
                iteration,
                status = captured.result.status_code,
                error = ?captured.result.error,
                "Iteration failed"
            ),
        }
    }

    CaseStats::from_samples(&times, samples, iterations)
}

async fn measure_category(
    issuer: &RequestIssuer,
    label: &str,
    endpoints: Vec<Endpoint>,
    iterations: usize,
    timeout: Duration,
) -> BTreeMap<String, CaseStats> {
    print_section(&format!("Testing {}", label));
    let mut cases = BTreeMap::new();
    for endpoint in endpoints {
        let stats = measure_case(issuer, &endpoint, iterations, timeout).await;
        println!(
            "  {:<16} {:>5.0}% ok   avg {:.3}s",
            endpoint.name,
            stats.success_rate * 100.0,
            stats.avg_time
        );
        cases.insert(endpoint.name, stats);
    }
    cases
}

pub async fn run_mode(issuer: &RequestIssuer, iterations: usize, timeout: Duration) -> ModePerformance {
    let mut categories = BTreeMap::new();
    let plan = [
        ("basic", basic_endpoints()),
        ("predictions", prediction_cases()),
        ("analysis", analysis_cases()),
        ("chat", chat_cases()),
    ];
    for (label, endpoints) in plan {
        let cases = measure_category(issuer, label, endpoints, iterations, timeout).await;
        categories.insert(label.to_string(), cases);
    }
    let summary = PerformanceSummary::from_categories(&categories);
    ModePerformance {
        categories,
        summary,
    }
}

/// Runs the performance suite. An unreachable target is fatal.
pub async fn run(ctx: &SuiteContext) -> Result<PerformanceReport, HarnessError> {
    print_banner("PERFORMANCE SUITE");
    ctx.require_healthy().await?;

    let toggler = ctx.toggler(true);
    let modes = for_each_mode(&toggler, "Performance", move |_mode| {
        run_mode(&ctx.issuer, PERFORMANCE_ITERATIONS, PERFORMANCE_TIMEOUT)
    })
    .await;

    let comparison = both_completed(&modes)
        .map(|(local, ai)| PerformanceComparison::between(&local.summary, &ai.summary));

    let report = PerformanceReport {
        timestamp: timestamp(),
        test_config: TestSettings {
            iterations: PERFORMANCE_ITERATIONS,
            timeout: PERFORMANCE_TIMEOUT,
            base_url: ctx.issuer.base_url().to_string(),
        },
        modes,
        comparison,
    };
    print_report(&report);
    info!("Performance suite finished");
    Ok(report)
}

pub fn print_report(report: &PerformanceReport) {
    print_banner("PERFORMANCE SUMMARY");
    for (mode, outcome) in &report.modes {
        match outcome.completed() {
            Some(perf) => {
                let s = &perf.summary;
                println!("{} mode:", mode);
                println!("  Average time:     {:.3}s", s.overall_avg_time);
                println!("  Success rate:     {:.1}%", s.overall_success_rate * 100.0);
                println!("  Fastest case avg: {:.3}s", s.fastest_response);
                println!("  Slowest case avg: {:.3}s", s.slowest_response);
                println!("  Tests run:        {}", s.total_tests_run);
            }
            None => println!("{} mode: skipped", mode),
        }
    }
    if let Some(ref cmp) = report.comparison {
        println!("\nComparison:");
        println!(
            "  AI is {:+.3}s {} than Local",
            cmp.time_diff,
            if cmp.time_diff > 0.0 { "slower" } else { "faster" }
        );
        println!("  Ratio: AI takes {:.1}x the Local time", cmp.time_ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(rate: f64, avg: f64) -> CaseStats {
        CaseStats {
            success_rate: rate,
            avg_time: avg,
            total_tests: 5,
            ..CaseStats::default()
        }
    }

    #[tokio::test]
    async fn non_json_body_fails_the_iteration() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"teams":[]}"#))
            .mount(&server)
            .await;

        let issuer = RequestIssuer::new(reqwest::Client::new(), &server.uri());
        let timeout = Duration::from_secs(5);

        let plain = measure_case(&issuer, &Endpoint::get("health", "/health"), 3, timeout).await;
        assert_eq!(plain.successful_tests, 0);
        assert_eq!(plain.success_rate, 0.0);
        assert!(plain.sample_responses.is_empty());

        let json = measure_case(&issuer, &Endpoint::get("teams", "/teams"), 3, timeout).await;
        assert_eq!(json.successful_tests, 3);
        assert_eq!(json.sample_responses.len(), SAMPLE_RESPONSES);
    }

    #[test]
    fn case_stats_cover_successes_only() {
        let times = [Duration::from_millis(100), Duration::from_millis(300)];
        let stats = CaseStats::from_samples(&times, vec![], 5);
        assert_eq!(stats.successful_tests, 2);
        assert!((stats.success_rate - 0.4).abs() < 1e-9);
        assert!((stats.avg_time - 0.2).abs() < 1e-9);
        assert!((stats.median_time - 0.2).abs() < 1e-9);
        assert!(stats.std_dev > 0.0);
    }

    #[test]
    fn summary_ignores_cases_without_successes() {
        let mut categories = BTreeMap::new();
        categories.insert(
            "basic".to_string(),
            BTreeMap::from([
                ("health".to_string(), case(1.0, 0.1)),
                ("teams".to_string(), case(0.0, 0.0)),
            ]),
        );
        categories.insert(
            "chat".to_string(),
            BTreeMap::from([("chat_1".to_string(), case(0.5, 0.3))]),
        );

        let summary = PerformanceSummary::from_categories(&categories);
        assert!((summary.overall_avg_time - 0.2).abs() < 1e-9);
        assert!((summary.overall_success_rate - 0.5).abs() < 1e-9);
        assert!((summary.fastest_response - 0.1).abs() < 1e-9);
        assert!((summary.slowest_response - 0.3).abs() < 1e-9);
        assert_eq!(summary.total_tests_run, 15);
    }

    #[test]
    fn summary_of_total_failure_is_zero() {
        let categories = BTreeMap::from([(
            "basic".to_string(),
            BTreeMap::from([("health".to_string(), case(0.0, 0.0))]),
        )]);
        let summary = PerformanceSummary::from_categories(&categories);
        assert_eq!(summary.overall_avg_time, 0.0);
        assert_eq!(summary.fastest_response, 0.0);
        assert_eq!(summary.total_tests_run, 5);
    }

    #[test]
    fn comparison_ratio() {
        let local = PerformanceSummary {
            overall_avg_time: 0.5,
            ..Default::default()
        };
        let ai = PerformanceSummary {
            overall_avg_time: 2.0,
            ..Default::default()
        };
        let cmp = PerformanceComparison::between(&local, &ai);
        assert!((cmp.time_diff - 1.5).abs() < 1e-9);
        assert!((cmp.time_ratio - 4.0).abs() < 1e-9);
        assert_eq!(PerformanceComparison::between(&ai, &PerformanceSummary::default()).time_ratio, 0.0);
    }
}
