//! Low-cost smoke comparison: a handful of requests per mode.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::endpoint::Endpoint;
use crate::errors::HarnessError;
use crate::issuer::RequestIssuer;
use crate::mode::Mode;
use crate::report::{print_banner, timestamp};
use crate::stats::{success_rate, LatencySummary};
use crate::suite::{both_completed, for_each_mode, ModePhases, SuiteContext};
use crate::utils::{mean, serialize_secs, truncate_chars};

pub const QUICK_REQUESTS_PER_ENDPOINT: usize = 2;
pub const QUICK_TIMEOUT: Duration = Duration::from_secs(15);
const QUICK_PAUSE: Duration = Duration::from_millis(300);
const ERROR_MESSAGE_CHARS: usize = 50;
/// Success-rate margin the verdict tolerates before preferring reliability.
const RELIABILITY_MARGIN: f64 = 0.1;

pub fn quick_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::get("health", "/health"),
        Endpoint::predict("predict", "Arsenal", "Chelsea"),
        Endpoint::chat("chat", "¿Quién ganará la Premier League?"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickEndpointResult {
    /// Mean over successes; absent when nothing succeeded.
    pub avg_time: Option<f64>,
    pub min_time: f64,
    pub max_time: f64,
    pub success_rate: f64,
    pub total_tests: usize,
    pub successful_tests: usize,
    pub failed_tests: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub batch_duration: Duration,
    pub throughput: f64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickModeResults {
    pub endpoints: BTreeMap<String, QuickEndpointResult>,
    #[serde(serialize_with = "serialize_secs")]
    pub mode_duration: Duration,
}

impl QuickModeResults {
    /// Mean of the endpoint averages that have one.
    pub fn overall_avg_time(&self) -> Option<f64> {
        let averages: Vec<f64> = self.endpoints.values().filter_map(|r| r.avg_time).collect();
        (!averages.is_empty()).then(|| mean(&averages))
    }

    pub fn overall_success_rate(&self) -> f64 {
        let rates: Vec<f64> = self.endpoints.values().map(|r| r.success_rate).collect();
        mean(&rates)
    }
}

/// Which mode won a head-to-head, if either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Local,
    Ai,
    Tie,
}

impl Winner {
    pub fn label(self) -> &'static str {
        match self {
            Winner::Local => "LOCAL",
            Winner::Ai => "AI",
            Winner::Tie => "TIE",
        }
    }
}

/// Lower average wins; a mode without any success always loses on speed.
pub fn speed_winner(local: Option<f64>, ai: Option<f64>) -> Winner {
    let local = local.unwrap_or(f64::INFINITY);
    let ai = ai.unwrap_or(f64::INFINITY);
    if local < ai {
        Winner::Local
    } else if ai < local {
        Winner::Ai
    } else {
        Winner::Tie
    }
}

pub fn reliability_winner(local: f64, ai: f64) -> Winner {
    if local > ai {
        Winner::Local
    } else if ai > local {
        Winner::Ai
    } else {
        Winner::Tie
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Local is faster and about as reliable.
    PreferLocal,
    /// AI is clearly more reliable.
    PreferAi,
    /// Local for latency-sensitive calls, AI where quality matters.
    Hybrid,
}

pub fn verdict(local_avg: Option<f64>, ai_avg: Option<f64>, local_success: f64, ai_success: f64) -> Verdict {
    let local_faster = speed_winner(local_avg, ai_avg) == Winner::Local;
    if local_faster && local_success >= ai_success - RELIABILITY_MARGIN {
        Verdict::PreferLocal
    } else if ai_success > local_success + RELIABILITY_MARGIN {
        Verdict::PreferAi
    } else {
        Verdict::Hybrid
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointWinners {
    pub speed: Winner,
    pub reliability: Winner,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickComparison {
    pub endpoint_winners: BTreeMap<String, EndpointWinners>,
    pub local_avg_time: Option<f64>,
    pub ai_avg_time: Option<f64>,
    pub local_success_rate: f64,
    pub ai_success_rate: f64,
    /// Gap between the two averages relative to the slower one, in percent.
    pub speed_difference_pct: Option<f64>,
    pub verdict: Verdict,
}

impl QuickComparison {
    pub fn between(local: &QuickModeResults, ai: &QuickModeResults) -> Self {
        let endpoint_winners = local
            .endpoints
            .iter()
            .filter_map(|(name, l)| {
                let a = ai.endpoints.get(name)?;
                Some((
                    name.clone(),
                    EndpointWinners {
                        speed: speed_winner(l.avg_time, a.avg_time),
                        reliability: reliability_winner(l.success_rate, a.success_rate),
                    },
                ))
            })
            .collect();

        let local_avg_time = local.overall_avg_time();
        let ai_avg_time = ai.overall_avg_time();
        let local_success_rate = local.overall_success_rate();
        let ai_success_rate = ai.overall_success_rate();
        let speed_difference_pct = match (local_avg_time, ai_avg_time) {
            (Some(l), Some(a)) if l.max(a) > 0.0 => Some((l - a).abs() / l.max(a) * 100.0),
            _ => None,
        };

        Self {
            endpoint_winners,
            local_avg_time,
            ai_avg_time,
            local_success_rate,
            ai_success_rate,
            speed_difference_pct,
            verdict: verdict(local_avg_time, ai_avg_time, local_success_rate, ai_success_rate),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickReport {
    pub timestamp: String,
    pub modes: ModePhases<QuickModeResults>,
    pub comparison: Option<QuickComparison>,
}

/// Issue `count` requests to `endpoint` with a short pause between them.
pub async fn test_endpoint(
    issuer: &RequestIssuer,
    endpoint: &Endpoint,
    count: usize,
    timeout: Duration,
    pause: Duration,
) -> QuickEndpointResult {
    let start = Instant::now();
    let mut times = Vec::with_capacity(count);
    let mut errors = Vec::new();

    for i in 0..count {
        let result = issuer.issue(endpoint, timeout).await;
        match result.error {
            None => times.push(result.response_time),
            Some(ref error) => errors.push(truncate_chars(&error.to_string(), ERROR_MESSAGE_CHARS)),
        }
        if i + 1 < count {
            tokio::time::sleep(pause).await;
        }
    }

    let batch_duration = start.elapsed();
    let latency = LatencySummary::from_durations(&times);
    let throughput = if batch_duration.is_zero() {
        0.0
    } else {
        count as f64 / batch_duration.as_secs_f64()
    };

    QuickEndpointResult {
        avg_time: (!times.is_empty()).then_some(latency.mean),
        min_time: latency.min,
        max_time: latency.max,
        success_rate: success_rate(times.len(), count),
        total_tests: count,
        successful_tests: times.len(),
        failed_tests: count - times.len(),
        batch_duration,
        throughput,
        errors,
    }
}

async fn run_mode(issuer: &RequestIssuer) -> QuickModeResults {
    let start = Instant::now();
    let mut endpoints = BTreeMap::new();
    for endpoint in quick_endpoints() {
        let result = test_endpoint(
            issuer,
            &endpoint,
            QUICK_REQUESTS_PER_ENDPOINT,
            QUICK_TIMEOUT,
            QUICK_PAUSE,
        )
        .await;
        println!(
            "  {:<8} avg {}  {:.0}% ok  {:.2} req/s",
            endpoint.name,
            format_avg(result.avg_time),
            result.success_rate * 100.0,
            result.throughput
        );
        endpoints.insert(endpoint.name, result);
    }
    QuickModeResults {
        endpoints,
        mode_duration: start.elapsed(),
    }
}

pub async fn run(ctx: &SuiteContext) -> Result<QuickReport, HarnessError> {
    print_banner("QUICK COMPARISON");
    let toggler = ctx.toggler(false);
    let modes = for_each_mode(&toggler, "Quick", move |_mode| run_mode(&ctx.issuer)).await;

    let comparison = both_completed(&modes).map(|(local, ai)| QuickComparison::between(local, ai));
    let report = QuickReport {
        timestamp: timestamp(),
        modes,
        comparison,
    };
    print_report(&report);
    info!("Quick comparison finished");
    Ok(report)
}

fn format_avg(avg: Option<f64>) -> String {
    avg.map_or_else(|| "n/a".to_string(), |v| format!("{:.3}s", v))
}

pub fn print_report(report: &QuickReport) {
    let Some(ref cmp) = report.comparison else {
        println!("\nComparison unavailable: a mode was skipped");
        return;
    };
    let (Some(local), Some(ai)) = (
        report.modes.get(&Mode::Local).and_then(|p| p.completed()),
        report.modes.get(&Mode::Ai).and_then(|p| p.completed()),
    ) else {
        return;
    };

    print_banner("QUICK SUMMARY");
    println!(
        "{:<8} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8}",
        "Endpoint", "Local", "AI", "Local%", "AI%", "Speed", "Reliab."
    );
    for (name, winners) in &cmp.endpoint_winners {
        let (l, a) = (&local.endpoints[name], &ai.endpoints[name]);
        println!(
            "{:<8} {:>10} {:>10} {:>7.0}% {:>7.0}% {:>8} {:>8}",
            name,
            format_avg(l.avg_time),
            format_avg(a.avg_time),
            l.success_rate * 100.0,
            a.success_rate * 100.0,
            winners.speed.label(),
            winners.reliability.label()
        );
    }

    println!("\nAverage time: Local {}, AI {}", format_avg(cmp.local_avg_time), format_avg(cmp.ai_avg_time));
    if let Some(pct) = cmp.speed_difference_pct {
        println!("Speed difference: {:.1}%", pct);
    }
    println!(
        "Success rate: Local {:.1}%, AI {:.1}%",
        cmp.local_success_rate * 100.0,
        cmp.ai_success_rate * 100.0
    );
    println!(
        "Mode durations: Local {:.1}s, AI {:.1}s",
        local.mode_duration.as_secs_f64(),
        ai.mode_duration.as_secs_f64()
    );

    let verdict = match cmp.verdict {
        Verdict::PreferLocal => "LOCAL is the better default (speed and reliability)",
        Verdict::PreferAi => "AI is the better default (clearly more reliable)",
        Verdict::Hybrid => "HYBRID: LOCAL for latency, AI for answer quality",
    };
    println!("\nVerdict: {}", verdict);
}
