//! Answer-quality comparison between modes, full and budget variants.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::endpoint::Endpoint;
use crate::errors::HarnessError;
use crate::issuer::RequestIssuer;
use crate::quality::{
    chat_flags, prediction_flags, score, simple_quality_score, ChatTopic, QualityChecks,
    QualityKind, SimpleKind,
};
use crate::quick::Winner;
use crate::report::{percent_change, print_banner, print_section, timestamp};
use crate::suite::{both_completed, for_each_mode, ModePhases, SuiteContext};
use crate::utils::{mean, serialize_secs, truncate_chars};

pub const QUALITY_TIMEOUT: Duration = Duration::from_secs(30);
pub const MINI_QUALITY_TIMEOUT: Duration = Duration::from_secs(25);
const CASE_PAUSE: Duration = Duration::from_secs(1);
const SAMPLE_CHARS: usize = 500;
/// Score gap below which the mini comparison calls the modes even.
const MINI_QUALITY_MARGIN: f64 = 0.05;

/// One scored request.
#[derive(Debug, Clone)]
pub struct QualityCase {
    pub name: &'static str,
    pub endpoint: Endpoint,
    pub kind: QualityKind,
}

/// The scored cases, grouped by category in run order.
pub fn quality_cases() -> Vec<(&'static str, Vec<QualityCase>)> {
    vec![
        (
            "predictions",
            vec![
                QualityCase {
                    name: "Liverpool vs Chelsea",
                    endpoint: Endpoint::predict("predict", "Liverpool", "Chelsea"),
                    kind: QualityKind::Prediction,
                },
                QualityCase {
                    name: "Arsenal vs Man City",
                    endpoint: Endpoint::predict("predict", "Arsenal", "Man City"),
                    kind: QualityKind::Prediction,
                },
            ],
        ),
        (
            "analysis",
            vec![
                QualityCase {
                    name: "Arsenal Analysis",
                    endpoint: Endpoint::analyze("analyze", "Arsenal"),
                    kind: QualityKind::Analysis,
                },
                QualityCase {
                    name: "Liverpool Analysis",
                    endpoint: Endpoint::analyze("analyze", "Liverpool"),
                    kind: QualityKind::Analysis,
                },
            ],
        ),
        (
            "chat",
            vec![
                QualityCase {
                    name: "Maximum Scorer Question",
                    endpoint: Endpoint::chat("chat", "¿Quién será el máximo goleador esta temporada?"),
                    kind: QualityKind::Chat(ChatTopic::TopScorer),
                },
                QualityCase {
                    name: "Team Comparison",
                    endpoint: Endpoint::chat("chat", "¿Quién ganaría entre Chelsea y Liverpool?"),
                    kind: QualityKind::Chat(ChatTopic::TeamComparison {
                        home: "Chelsea",
                        away: "Liverpool",
                    }),
                },
            ],
        ),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseQuality {
    #[serde(skip_serializing_if = "QualityChecks::is_empty")]
    pub scores: QualityChecks,
    pub total_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseQuality {
    /// Score a parsed response body.
    pub fn scored(kind: QualityKind, body: &Value) -> Self {
        let scores = kind.evaluate(body);
        let serialized = body.to_string();
        Self {
            total_score: score(&scores),
            scores,
            response_length: Some(serialized.chars().count()),
            sample_response: Some(truncate_chars(&serialized, SAMPLE_CHARS)),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitySummary {
    pub overall_quality_score: f64,
    pub category_scores: BTreeMap<String, f64>,
    pub total_tests: usize,
}

impl QualitySummary {
    /// Failed cases count as a score of 0.
    pub fn from_categories(categories: &BTreeMap<String, BTreeMap<String, CaseQuality>>) -> Self {
        let mut all = Vec::new();
        let mut category_scores = BTreeMap::new();
        for (category, cases) in categories {
            let scores: Vec<f64> = cases.values().map(|c| c.total_score).collect();
            category_scores.insert(category.clone(), mean(&scores));
            all.extend(scores);
        }
        Self {
            overall_quality_score: mean(&all),
            category_scores,
            total_tests: all.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeQuality {
    pub categories: BTreeMap<String, BTreeMap<String, CaseQuality>>,
    pub summary: QualitySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityComparison {
    /// AI minus Local overall score.
    pub quality_diff: f64,
    /// Relative change from Local to AI in percent; absent when Local scored 0.
    pub improvement_pct: Option<f64>,
}

impl QualityComparison {
    pub fn between(local: &QualitySummary, ai: &QualitySummary) -> Self {
        Self {
            quality_diff: ai.overall_quality_score - local.overall_quality_score,
            improvement_pct: percent_change(local.overall_quality_score, ai.overall_quality_score),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub timestamp: String,
    pub modes: ModePhases<ModeQuality>,
    pub comparison: Option<QualityComparison>,
}

pub async fn evaluate_case(issuer: &RequestIssuer, case: &QualityCase, timeout: Duration) -> CaseQuality {
    let captured = issuer.issue_capture(&case.endpoint, timeout).await;
    if let Some(ref error) = captured.result.error {
        warn!(case = case.name, error = %error, "Quality case failed");
        return CaseQuality::failed(error.to_string());
    }
    match captured.json() {
        Some(body) => CaseQuality::scored(case.kind, &body),
        None => CaseQuality::failed("response body is not JSON".to_string()),
    }
}

async fn run_mode(issuer: &RequestIssuer) -> ModeQuality {
    let mut categories = BTreeMap::new();
    for (category, cases) in quality_cases() {
        print_section(&format!("Quality: {}", category));
        let mut results = BTreeMap::new();
        for case in &cases {
            let quality = evaluate_case(issuer, case, QUALITY_TIMEOUT).await;
            match quality.error {
                Some(ref e) => println!("  {:<26} error: {}", case.name, e),
                None => println!("  {:<26} score {:.2}", case.name, quality.total_score),
            }
            results.insert(case.name.to_string(), quality);
            tokio::time::sleep(CASE_PAUSE).await;
        }
        categories.insert(category.to_string(), results);
    }
    let summary = QualitySummary::from_categories(&categories);
    ModeQuality {
        categories,
        summary,
    }
}

pub async fn run(ctx: &SuiteContext) -> Result<QualityReport, HarnessError> {
    print_banner("QUALITY SUITE");
    let toggler = ctx.toggler(true);
    let modes = for_each_mode(&toggler, "Quality", move |_mode| run_mode(&ctx.issuer)).await;

    let comparison = both_completed(&modes)
        .map(|(local, ai)| QualityComparison::between(&local.summary, &ai.summary));
    let report = QualityReport {
        timestamp: timestamp(),
        modes,
        comparison,
    };
    print_quality_report(&report);
    info!("Quality suite finished");
    Ok(report)
}

pub fn print_quality_report(report: &QualityReport) {
    print_banner("QUALITY SUMMARY");
    for (mode, outcome) in &report.modes {
        match outcome.completed() {
            Some(quality) => {
                let s = &quality.summary;
                println!(
                    "{} mode: {:.2} ({:.0}%) over {} tests",
                    mode,
                    s.overall_quality_score,
                    s.overall_quality_score * 100.0,
                    s.total_tests
                );
                for (category, value) in &s.category_scores {
                    println!("  {:<12} {:.2}", category, value);
                }
            }
            None => println!("{} mode: skipped", mode),
        }
    }
    if let Some(ref cmp) = report.comparison {
        println!(
            "\nAI scores {:+.2} points {}",
            cmp.quality_diff,
            if cmp.quality_diff > 0.0 { "better" } else { "worse" }
        );
        match cmp.improvement_pct {
            Some(pct) => println!("Relative change: {:+.1}%", pct),
            None => println!("Relative change: n/a (Local scored 0)"),
        }
    }
}

/// One budget probe scored on the 4-point scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiniProbe {
    pub quality_score: f64,
    pub response_time: f64,
    /// `success`, `error_<status>` or `exception`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MiniProbe {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiniModeSummary {
    pub average_quality: f64,
    pub average_response_time: f64,
    #[serde(serialize_with = "serialize_secs")]
    pub total_mode_time: Duration,
    pub successful_tests: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiniModeQuality {
    pub prediction: MiniProbe,
    pub chat: MiniProbe,
    pub mode_summary: MiniModeSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiniComparison {
    pub prediction_winner: Winner,
    pub chat_winner: Winner,
    pub quality_diff: f64,
    pub quality_advantage: Winner,
    pub faster: Winner,
}

impl MiniComparison {
    pub fn between(local: &MiniModeQuality, ai: &MiniModeQuality) -> Self {
        let quality_diff = ai.mode_summary.average_quality - local.mode_summary.average_quality;
        let quality_advantage = if quality_diff > MINI_QUALITY_MARGIN {
            Winner::Ai
        } else if quality_diff < -MINI_QUALITY_MARGIN {
            Winner::Local
        } else {
            Winner::Tie
        };
        Self {
            prediction_winner: higher(local.prediction.quality_score, ai.prediction.quality_score),
            chat_winner: higher(local.chat.quality_score, ai.chat.quality_score),
            quality_diff,
            quality_advantage,
            faster: higher(
                -local.mode_summary.average_response_time,
                -ai.mode_summary.average_response_time,
            ),
        }
    }
}

fn higher(local: f64, ai: f64) -> Winner {
    if local > ai {
        Winner::Local
    } else if ai > local {
        Winner::Ai
    } else {
        Winner::Tie
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MiniQualityReport {
    pub timestamp: String,
    pub modes: ModePhases<MiniModeQuality>,
    pub comparison: Option<MiniComparison>,
}

/// Issue one probe and score its text: the raw body for predictions, the
/// `response` field for chat.
pub async fn run_probe(
    issuer: &RequestIssuer,
    endpoint: &Endpoint,
    kind: SimpleKind,
    timeout: Duration,
) -> MiniProbe {
    let captured = issuer.issue_capture(endpoint, timeout).await;
    let result = &captured.result;
    let response_time = result.response_time.as_secs_f64();

    match result.error {
        None => {
            let body = captured.body.clone().unwrap_or_default();
            let (text, flags) = match kind {
                SimpleKind::Prediction => {
                    let flags = prediction_flags(&body);
                    (body, flags)
                }
                SimpleKind::Chat => {
                    let text = captured
                        .json()
                        .and_then(|v| v.get("response").and_then(Value::as_str).map(str::to_string))
                        .unwrap_or_default();
                    let flags = chat_flags(&text);
                    (text, flags)
                }
            };
            MiniProbe {
                quality_score: simple_quality_score(&text, kind),
                response_time,
                status: "success".to_string(),
                response_length: Some(text.chars().count()),
                flags,
                error: None,
            }
        }
        Some(ref error) => {
            let status = if result.status_code > 0 {
                format!("error_{}", result.status_code)
            } else {
                "exception".to_string()
            };
            MiniProbe {
                quality_score: 0.0,
                response_time,
                status,
                response_length: None,
                flags: BTreeMap::new(),
                error: Some(truncate_chars(&error.to_string(), 100)),
            }
        }
    }
}

pub fn mini_prediction_probe() -> Endpoint {
    Endpoint::predict("predict", "Arsenal", "Chelsea")
}

pub fn mini_chat_probe() -> Endpoint {
    Endpoint::chat(
        "chat",
        "¿Quién es mejor actualmente, Arsenal o Chelsea? Explica tu respuesta.",
    )
}

pub async fn run_mini_mode(issuer: &RequestIssuer, timeout: Duration, pause: Duration) -> MiniModeQuality {
    let start = Instant::now();
    let prediction = run_probe(issuer, &mini_prediction_probe(), SimpleKind::Prediction, timeout).await;
    println!(
        "  prediction  score {:.2} ({:.2}s) {}",
        prediction.quality_score, prediction.response_time, prediction.status
    );
    tokio::time::sleep(pause).await;
    let chat = run_probe(issuer, &mini_chat_probe(), SimpleKind::Chat, timeout).await;
    println!(
        "  chat        score {:.2} ({:.2}s) {}",
        chat.quality_score, chat.response_time, chat.status
    );

    let mode_summary = MiniModeSummary {
        average_quality: (prediction.quality_score + chat.quality_score) / 2.0,
        average_response_time: (prediction.response_time + chat.response_time) / 2.0,
        total_mode_time: start.elapsed(),
        successful_tests: [&prediction, &chat].iter().filter(|p| p.is_success()).count(),
    };
    MiniModeQuality {
        prediction,
        chat,
        mode_summary,
    }
}

pub async fn run_mini(ctx: &SuiteContext) -> Result<MiniQualityReport, HarnessError> {
    print_banner("MINI QUALITY CHECK");
    let toggler = ctx.toggler(false);
    let modes = for_each_mode(&toggler, "Mini quality", move |_mode| {
        run_mini_mode(&ctx.issuer, MINI_QUALITY_TIMEOUT, CASE_PAUSE)
    })
    .await;

    let comparison = both_completed(&modes).map(|(local, ai)| MiniComparison::between(local, ai));
    let report = MiniQualityReport {
        timestamp: timestamp(),
        modes,
        comparison,
    };
    print_mini_report(&report);
    Ok(report)
}

pub fn print_mini_report(report: &MiniQualityReport) {
    print_banner("MINI QUALITY SUMMARY");
    for (mode, outcome) in &report.modes {
        match outcome.completed() {
            Some(q) => println!(
                "{} mode: quality {:.3}/1.0, avg {:.3}s, {}/2 successful",
                mode,
                q.mode_summary.average_quality,
                q.mode_summary.average_response_time,
                q.mode_summary.successful_tests
            ),
            None => println!("{} mode: skipped", mode),
        }
    }
    if let Some(ref cmp) = report.comparison {
        println!(
            "\nPrediction winner: {}  Chat winner: {}",
            cmp.prediction_winner.label(),
            cmp.chat_winner.label()
        );
        match cmp.quality_advantage {
            Winner::Tie => println!("Quality: similar (difference {:.3})", cmp.quality_diff.abs()),
            winner => println!("Quality advantage: {} ({:+.3})", winner.label(), cmp.quality_diff),
        }
        println!("Faster: {}", cmp.faster.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn case_plan_covers_each_category_twice() {
        let plan = quality_cases();
        let names: Vec<&str> = plan.iter().map(|(c, _)| *c).collect();
        assert_eq!(names, vec!["predictions", "analysis", "chat"]);
        assert!(plan.iter().all(|(_, cases)| cases.len() == 2));
    }

    #[test]
    fn scored_case_truncates_sample() {
        let long = "a".repeat(800);
        let body = json!({ "response": long });
        let case = CaseQuality::scored(QualityKind::Chat(ChatTopic::TopScorer), &body);

        let sample = case.sample_response.unwrap();
        assert_eq!(sample.chars().count(), SAMPLE_CHARS + 3);
        assert!(sample.ends_with("..."));
        assert!(case.response_length.unwrap() > SAMPLE_CHARS);
        assert_eq!(case.scores.len(), 5);
    }

    #[test]
    fn summary_counts_failures_as_zero() {
        let mut categories = BTreeMap::new();
        categories.insert(
            "chat".to_string(),
            BTreeMap::from([
                (
                    "a".to_string(),
                    CaseQuality {
                        total_score: 0.8,
                        ..Default::default()
                    },
                ),
                ("b".to_string(), CaseQuality::failed("HTTP 500".into())),
            ]),
        );
        let summary = QualitySummary::from_categories(&categories);
        assert!((summary.overall_quality_score - 0.4).abs() < 1e-9);
        assert!((summary.category_scores["chat"] - 0.4).abs() < 1e-9);
        assert_eq!(summary.total_tests, 2);
    }

    #[test]
    fn quality_comparison() {
        let local = QualitySummary {
            overall_quality_score: 0.5,
            ..Default::default()
        };
        let ai = QualitySummary {
            overall_quality_score: 0.75,
            ..Default::default()
        };
        let cmp = QualityComparison::between(&local, &ai);
        assert!((cmp.quality_diff - 0.25).abs() < 1e-9);
        assert!((cmp.improvement_pct.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(
            QualityComparison::between(&QualitySummary::default(), &ai).improvement_pct,
            None
        );
    }

    fn probe(score: f64, secs: f64) -> MiniProbe {
        MiniProbe {
            quality_score: score,
            response_time: secs,
            status: "success".into(),
            response_length: Some(10),
            flags: BTreeMap::new(),
            error: None,
        }
    }

    fn mini(pred: f64, chat: f64, secs: f64) -> MiniModeQuality {
        MiniModeQuality {
            prediction: probe(pred, secs),
            chat: probe(chat, secs),
            mode_summary: MiniModeSummary {
                average_quality: (pred + chat) / 2.0,
                average_response_time: secs,
                total_mode_time: Duration::from_secs(1),
                successful_tests: 2,
            },
        }
    }

    #[test]
    fn mini_comparison() {
        let cmp = MiniComparison::between(&mini(0.5, 0.5, 0.1), &mini(1.0, 0.5, 2.0));
        assert_eq!(cmp.prediction_winner, Winner::Ai);
        assert_eq!(cmp.chat_winner, Winner::Tie);
        assert_eq!(cmp.quality_advantage, Winner::Ai);
        assert_eq!(cmp.faster, Winner::Local);

        let even = MiniComparison::between(&mini(0.5, 0.5, 1.0), &mini(0.52, 0.5, 1.0));
        assert_eq!(even.quality_advantage, Winner::Tie);
    }
}
