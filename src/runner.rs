//! Master and budget runners: several suites in one process.

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use crate::errors::HarnessError;
use crate::escalation::EscalationReport;
use crate::load_suite::{self, LoadSuiteReport};
use crate::mode::Mode;
use crate::performance::{self, PerformanceReport};
use crate::quality_suite::{self, QualityReport};
use crate::quick;
use crate::report::{print_banner, timestamp};
use crate::suite::{both_completed, SuiteContext};
use crate::utils::serialize_secs;

const BUDGET_PAUSE: Duration = Duration::from_secs(5);
const LONG_RUN: Duration = Duration::from_secs(30 * 60);
const HIGH_CONCURRENCY_USERS: usize = 40;
const LOW_CONCURRENCY_USERS: usize = 20;

/// How one suite fared inside a multi-suite run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteRun {
    pub success: bool,
    #[serde(serialize_with = "serialize_secs")]
    pub execution_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one suite, save its report under `prefix` and record the outcome.
///
/// The report is returned alongside so later insights can read it.
pub async fn run_recorded<T, Fut>(ctx: &SuiteContext, prefix: &str, suite: Fut) -> (SuiteRun, Option<T>)
where
    T: Serialize,
    Fut: Future<Output = Result<T, HarnessError>>,
{
    let start = Instant::now();
    let outcome = suite
        .await
        .and_then(|report| ctx.save(prefix, &report).map(|file| (report, file)));
    let execution_time = start.elapsed();

    match outcome {
        Ok((report, results_file)) => {
            info!(suite = prefix, secs = execution_time.as_secs_f64(), "Suite completed");
            (
                SuiteRun {
                    success: true,
                    execution_time,
                    results_file,
                    error: None,
                },
                Some(report),
            )
        }
        Err(e) => {
            error!(suite = prefix, error = %e, "Suite failed");
            (
                SuiteRun {
                    success: false,
                    execution_time,
                    results_file: None,
                    error: Some(e.to_string()),
                },
                None,
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceInsight {
    pub local_avg_time: f64,
    pub ai_avg_time: f64,
    /// Positive when Local is faster.
    pub local_faster_by: f64,
    /// Positive when AI succeeds more often.
    pub ai_more_reliable_by: f64,
}

impl PerformanceInsight {
    pub fn from_report(report: &PerformanceReport) -> Option<Self> {
        let (local, ai) = both_completed(&report.modes)?;
        let (local, ai) = (&local.summary, &ai.summary);
        Some(Self {
            local_avg_time: local.overall_avg_time,
            ai_avg_time: ai.overall_avg_time,
            local_faster_by: ai.overall_avg_time - local.overall_avg_time,
            ai_more_reliable_by: ai.overall_success_rate - local.overall_success_rate,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityInsight {
    pub local_quality: f64,
    pub ai_quality: f64,
    pub quality_improvement: f64,
}

impl QualityInsight {
    pub fn from_report(report: &QualityReport) -> Option<Self> {
        let (local, ai) = both_completed(&report.modes)?;
        let local_quality = local.summary.overall_quality_score;
        let ai_quality = ai.summary.overall_quality_score;
        Some(Self {
            local_quality,
            ai_quality,
            quality_improvement: ai_quality - local_quality,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadInsight {
    /// Highest level that stayed above the success threshold; 0 when none did.
    pub max_concurrent_users: usize,
    pub breaking_point: Option<usize>,
}

impl From<&EscalationReport> for LoadInsight {
    fn from(report: &EscalationReport) -> Self {
        Self {
            max_concurrent_users: report.max_stable_users.unwrap_or(0),
            breaking_point: report.breaking_point,
        }
    }
}

fn load_insights(report: &LoadSuiteReport) -> BTreeMap<Mode, LoadInsight> {
    report
        .modes
        .iter()
        .filter_map(|(mode, outcome)| {
            outcome
                .completed()
                .map(|results| (*mode, LoadInsight::from(&results.stress_escalation)))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MasterSummary {
    pub suites_succeeded: usize,
    pub suites_failed: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub total_execution_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_insights: Option<PerformanceInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_insights: Option<QualityInsight>,
    pub load_insights: BTreeMap<Mode, LoadInsight>,
}

/// Plain-language advice derived from the summary.
pub fn recommendations(summary: &MasterSummary) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(ref perf) = summary.performance_insights {
        if perf.local_faster_by > 0.0 {
            out.push("Local mode is faster: prefer it for latency-sensitive clients".to_string());
        }
        if perf.ai_more_reliable_by > 0.05 {
            out.push("AI mode succeeds more often: prefer it for critical requests".to_string());
        }
    }

    if let Some(ref quality) = summary.quality_insights {
        if quality.quality_improvement > 0.2 {
            out.push("AI mode gives markedly better answers: worth it for premium traffic".to_string());
        } else if quality.quality_improvement < -0.1 {
            out.push("Local mode holds up on answer quality: a sound default".to_string());
        }
    }

    for (mode, load) in &summary.load_insights {
        let users = load.max_concurrent_users;
        if users >= HIGH_CONCURRENCY_USERS {
            out.push(format!("{} mode handles high concurrency ({}+ users)", mode.display_name(), users));
        } else if users < LOW_CONCURRENCY_USERS {
            out.push(format!(
                "{} mode is limited under concurrency (max {} users)",
                mode.display_name(),
                users
            ));
        }
    }

    if summary.total_execution_time > LONG_RUN {
        out.push("The full run is long: consider running suites individually".to_string());
    }

    if summary.suites_failed == 0 {
        out.push("All suites completed".to_string());
    } else {
        out.push(format!("{} suite(s) failed: check the logs", summary.suites_failed));
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterReport {
    pub timestamp: String,
    pub base_url: String,
    pub test_results: BTreeMap<String, SuiteRun>,
    pub summary: MasterSummary,
    pub recommendations: Vec<String>,
}

/// Runs performance, quality and load back to back, then derives insights.
pub async fn run_master(ctx: &SuiteContext) -> Result<MasterReport, HarnessError> {
    print_banner("FULL SUITE");
    ctx.require_healthy().await?;
    let pause = ctx.config.suite_pause;
    let mut runs = BTreeMap::new();

    let (run, perf) = run_recorded(ctx, "performance", performance::run(ctx)).await;
    runs.insert("performance".to_string(), run);
    info!(secs = pause.as_secs_f64(), "Pausing between suites");
    tokio::time::sleep(pause).await;

    let (run, quality) = run_recorded(ctx, "quality", quality_suite::run(ctx)).await;
    runs.insert("quality".to_string(), run);
    info!(secs = pause.as_secs_f64(), "Pausing between suites");
    tokio::time::sleep(pause).await;

    let (run, load) = run_recorded(ctx, "load_stress", load_suite::run(ctx)).await;
    runs.insert("load_stress".to_string(), run);

    let suites_succeeded = runs.values().filter(|r| r.success).count();
    let summary = MasterSummary {
        suites_succeeded,
        suites_failed: runs.len() - suites_succeeded,
        total_execution_time: runs.values().map(|r| r.execution_time).sum(),
        performance_insights: perf.as_ref().and_then(PerformanceInsight::from_report),
        quality_insights: quality.as_ref().and_then(QualityInsight::from_report),
        load_insights: load.as_ref().map(load_insights).unwrap_or_default(),
    };
    let recommendations = recommendations(&summary);

    let report = MasterReport {
        timestamp: timestamp(),
        base_url: ctx.issuer.base_url().to_string(),
        test_results: runs,
        summary,
        recommendations,
    };
    print_master_report(&report);
    Ok(report)
}

pub fn print_master_report(report: &MasterReport) {
    print_banner("FULL SUITE REPORT");
    let s = &report.summary;
    println!(
        "Suites: {} succeeded, {} failed, {:.1} min total",
        s.suites_succeeded,
        s.suites_failed,
        s.total_execution_time.as_secs_f64() / 60.0
    );
    for (name, run) in &report.test_results {
        let file = run
            .results_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {:<6} {:>8.1}s  {}",
            name,
            if run.success { "ok" } else { "FAILED" },
            run.execution_time.as_secs_f64(),
            file
        );
    }
    if let Some(ref perf) = s.performance_insights {
        println!(
            "\nPerformance: Local {:.3}s, AI {:.3}s (Local faster by {:+.3}s)",
            perf.local_avg_time, perf.ai_avg_time, perf.local_faster_by
        );
    }
    if let Some(ref quality) = s.quality_insights {
        println!(
            "Quality: Local {:.2}, AI {:.2} ({:+.2})",
            quality.local_quality, quality.ai_quality, quality.quality_improvement
        );
    }
    for (mode, load) in &s.load_insights {
        println!(
            "Load: {} mode stable up to {} concurrent users",
            mode.display_name(),
            load.max_concurrent_users
        );
    }
    println!("\nRecommendations:");
    for (idx, rec) in report.recommendations.iter().enumerate() {
        println!("  {}. {}", idx + 1, rec);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport {
    pub timestamp: String,
    pub quick: SuiteRun,
    pub mini_quality: SuiteRun,
    pub succeeded: usize,
}

/// Quick comparison, then the mini quality check.
pub async fn run_budget(ctx: &SuiteContext) -> BudgetReport {
    print_banner("BUDGET RUN");
    let (quick, _) = run_recorded(ctx, "quick", quick::run(ctx)).await;
    tokio::time::sleep(BUDGET_PAUSE).await;
    let (mini_quality, _) = run_recorded(ctx, "mini_quality", quality_suite::run_mini(ctx)).await;

    let succeeded = [&quick, &mini_quality].iter().filter(|r| r.success).count();
    println!("\n{}/2 budget suites succeeded", succeeded);
    BudgetReport {
        timestamp: timestamp(),
        quick,
        mini_quality,
        succeeded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> MasterSummary {
        MasterSummary {
            suites_succeeded: 3,
            ..Default::default()
        }
    }

    #[test]
    fn clean_run_reports_stability() {
        assert_eq!(recommendations(&summary()), vec!["All suites completed".to_string()]);
    }

    #[test]
    fn performance_and_quality_recommendations() {
        let mut s = summary();
        s.performance_insights = Some(PerformanceInsight {
            local_avg_time: 0.2,
            ai_avg_time: 3.0,
            local_faster_by: 2.8,
            ai_more_reliable_by: 0.1,
        });
        s.quality_insights = Some(QualityInsight {
            local_quality: 0.4,
            ai_quality: 0.9,
            quality_improvement: 0.5,
        });
        let recs = recommendations(&s);
        assert_eq!(recs.len(), 4);
        assert!(recs[0].starts_with("Local mode is faster"));
        assert!(recs[1].starts_with("AI mode succeeds more often"));
        assert!(recs[2].starts_with("AI mode gives markedly better answers"));
    }

    #[test]
    fn concurrency_recommendations_use_stable_users() {
        let mut s = summary();
        s.load_insights.insert(
            Mode::Local,
            LoadInsight {
                max_concurrent_users: 50,
                breaking_point: None,
            },
        );
        s.load_insights.insert(
            Mode::Ai,
            LoadInsight {
                max_concurrent_users: 10,
                breaking_point: Some(20),
            },
        );
        let recs = recommendations(&s);
        assert!(recs.iter().any(|r| r.contains("high concurrency (50+ users)")));
        assert!(recs.iter().any(|r| r.contains("limited under concurrency (max 10 users)")));
    }

    #[test]
    fn failures_and_long_runs_are_flagged() {
        let s = MasterSummary {
            suites_succeeded: 1,
            suites_failed: 2,
            total_execution_time: Duration::from_secs(45 * 60),
            ..Default::default()
        };
        let recs = recommendations(&s);
        assert!(recs.iter().any(|r| r.contains("run is long")));
        assert_eq!(recs.last().map(String::as_str), Some("2 suite(s) failed: check the logs"));
    }

    #[test]
    fn load_insight_without_stable_level_is_zero() {
        let report = EscalationReport {
            endpoint: "chat_simple".into(),
            levels: vec![],
            breaking_point: Some(5),
            max_stable_users: None,
        };
        let insight = LoadInsight::from(&report);
        assert_eq!(insight.max_concurrent_users, 0);
        assert_eq!(insight.breaking_point, Some(5));
    }
}
