//! Load scenarios, endpoint burst and stress escalation, per mode.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::burst::{run_burst, BurstReport, DEFAULT_BURST_PER_ENDPOINT, DEFAULT_BURST_TIMEOUT};
use crate::config::ConfigError;
use crate::endpoint::{load_test_endpoint, load_test_endpoints, Endpoint};
use crate::errors::HarnessError;
use crate::escalation::{EscalationReport, StressEscalator};
use crate::orchestrator::{LoadOrchestrator, LoadRunner, LoadTestReport};
use crate::percentiles::format_percentile_table;
use crate::report::{print_banner, print_section, timestamp};
use crate::scenario::ScenarioConfig;
use crate::suite::{for_each_mode, ModePhases, SuiteContext};

/// Endpoint the load scenarios hammer.
pub const LOAD_ENDPOINT: &str = "predict_simple";
const SCENARIO_PAUSE: Duration = Duration::from_secs(1);
const BURST_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
pub struct ModeLoadResults {
    pub load_tests: BTreeMap<String, LoadTestReport>,
    pub concurrent_endpoints: BurstReport,
    pub stress_escalation: EscalationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadSuiteReport {
    pub timestamp: String,
    pub modes: ModePhases<ModeLoadResults>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressSuiteReport {
    pub timestamp: String,
    pub modes: ModePhases<EscalationReport>,
}

fn resolve_endpoint(name: &str) -> Result<Endpoint, ConfigError> {
    load_test_endpoint(name).ok_or_else(|| ConfigError::UnknownEndpoint {
        name: name.to_string(),
        available: load_test_endpoints()
            .into_iter()
            .map(|e| e.name)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn build_escalator(ctx: &SuiteContext) -> Result<StressEscalator<LoadOrchestrator>, HarnessError> {
    let runner = LoadOrchestrator::new(ctx.issuer.clone(), ctx.config.escalation_settings());
    StressEscalator::new(runner, ctx.config.escalation.clone())
        .map_err(|e| HarnessError::Config(e.into()))
}

/// The configured load scenarios, looked up before anything runs.
pub fn scenario_plan(ctx: &SuiteContext) -> Result<Vec<(String, ScenarioConfig)>, ConfigError> {
    ctx.config
        .load_scenarios
        .iter()
        .map(|name| Ok((name.clone(), *ctx.config.scenarios.require(name)?)))
        .collect()
}

/// Run each scenario in order against `endpoint`, pausing between them.
pub async fn run_scenarios<R: LoadRunner>(
    runner: &R,
    plan: &[(String, ScenarioConfig)],
    endpoint: &Endpoint,
) -> BTreeMap<String, LoadTestReport> {
    let mut reports = BTreeMap::new();
    for (idx, (name, scenario)) in plan.iter().enumerate() {
        print_section(&format!(
            "Scenario {}: {} users x {} requests",
            name, scenario.concurrent_users, scenario.requests_per_user
        ));

        let report = runner.run(endpoint, scenario).await;
        print_load_report(&report);
        reports.insert(name.clone(), report);

        if idx + 1 < plan.len() {
            tokio::time::sleep(SCENARIO_PAUSE).await;
        }
    }
    reports
}

async fn run_mode(
    ctx: &SuiteContext,
    plan: &[(String, ScenarioConfig)],
    escalator: &StressEscalator<LoadOrchestrator>,
    load_endpoint: &Endpoint,
    stress_endpoint: &Endpoint,
) -> ModeLoadResults {
    let runner = LoadOrchestrator::new(ctx.issuer.clone(), ctx.config.orchestrator_settings());
    let load_tests = run_scenarios(&runner, plan, load_endpoint).await;
    tokio::time::sleep(SCENARIO_PAUSE).await;

    print_section("Simultaneous endpoint burst");
    let concurrent_endpoints = run_burst(
        &ctx.issuer,
        &load_test_endpoints(),
        DEFAULT_BURST_PER_ENDPOINT,
        DEFAULT_BURST_TIMEOUT,
    )
    .await;
    print_burst_report(&concurrent_endpoints);
    tokio::time::sleep(BURST_PAUSE).await;

    print_section(&format!("Stress escalation on {}", stress_endpoint.name));
    let stress_escalation = escalator.run(stress_endpoint).await;
    print_escalation_report(&stress_escalation);

    ModeLoadResults {
        load_tests,
        concurrent_endpoints,
        stress_escalation,
    }
}

/// Runs the full load & stress suite.
pub async fn run(ctx: &SuiteContext) -> Result<LoadSuiteReport, HarnessError> {
    print_banner("LOAD & STRESS SUITE");
    let plan = &scenario_plan(ctx)?;
    let load_endpoint = &resolve_endpoint(LOAD_ENDPOINT)?;
    let stress_endpoint = &resolve_endpoint(&ctx.config.stress_endpoint)?;
    let escalator = &build_escalator(ctx)?;

    let toggler = ctx.toggler(false);
    let modes = for_each_mode(&toggler, "Load & stress", move |_mode| {
        run_mode(ctx, plan, escalator, load_endpoint, stress_endpoint)
    })
    .await;

    info!("Load & stress suite finished");
    Ok(LoadSuiteReport {
        timestamp: timestamp(),
        modes,
    })
}

/// Runs only the stress escalation, per mode.
pub async fn run_stress(ctx: &SuiteContext) -> Result<StressSuiteReport, HarnessError> {
    print_banner("STRESS ESCALATION");
    let stress_endpoint = &resolve_endpoint(&ctx.config.stress_endpoint)?;
    let escalator = &build_escalator(ctx)?;

    let toggler = ctx.toggler(false);
    let modes = for_each_mode(&toggler, "Stress", move |_mode| async move {
        let report = escalator.run(stress_endpoint).await;
        print_escalation_report(&report);
        report
    })
    .await;

    Ok(StressSuiteReport {
        timestamp: timestamp(),
        modes,
    })
}

pub fn print_load_report(report: &LoadTestReport) {
    let s = &report.stats;
    println!(
        "  {} requests, {:.1}% ok, {} timeouts, {:.2} req/s over {:.2}s",
        s.total_requests,
        s.success_rate * 100.0,
        s.timeouts,
        s.requests_per_second,
        s.total_duration.as_secs_f64()
    );
    println!(
        "  latency avg {:.3}s  min {:.3}s  max {:.3}s  median {:.3}s",
        s.avg_response_time, s.min_response_time, s.max_response_time, s.median_response_time
    );
    if s.percentiles.is_reported() {
        print!(
            "{}",
            format_percentile_table(
                &format!("{} latency", report.endpoint),
                &[(report.endpoint.clone(), s.percentiles)]
            )
        );
    }
    if report.abandoned_workers > 0 {
        println!("  {} users abandoned at the deadline", report.abandoned_workers);
    }
    for (category, count) in &s.errors_by_category {
        println!("  errors[{}] = {}", category, count);
    }
}

pub fn print_burst_report(report: &BurstReport) {
    for (name, summary) in &report.endpoints {
        println!(
            "  {:<16} {} requests  {:>5.1}% ok  avg {:.3}s  max {:.3}s",
            name,
            summary.requests,
            summary.success_rate * 100.0,
            summary.avg_response_time,
            summary.max_response_time
        );
    }
    println!(
        "  {} requests in {:.2}s",
        report.total_requests,
        report.total_duration.as_secs_f64()
    );
}

pub fn print_escalation_report(report: &EscalationReport) {
    for level in &report.levels {
        println!(
            "  {:>4} users  {:>5.1}% ok  avg {:.3}s  {:.2} req/s  {} failed",
            level.users,
            level.success_rate * 100.0,
            level.avg_response_time,
            level.requests_per_second,
            level.failed_requests
        );
    }
    match (report.breaking_point, report.max_stable_users) {
        (Some(bp), Some(stable)) => {
            println!("  Breaking point at {} users; stable up to {}", bp, stable)
        }
        (Some(bp), None) => println!("  Breaking point at {} users; no stable level", bp),
        (None, Some(stable)) => println!("  No breaking point; stable up to {} users", stable),
        (None, None) => println!("  No levels ran"),
    }
}
