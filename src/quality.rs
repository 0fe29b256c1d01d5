//! Heuristic response-quality checks.
//!
//! Each evaluator returns a named set of pass/fail checks; the quality score is
//! the fraction that passed. The keyword lists match the Spanish-language
//! answers the target produces.

use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::collections::BTreeMap;
use tracing::warn;

/// Named pass/fail checks for one response.
pub type QualityChecks = BTreeMap<String, bool>;

lazy_static::lazy_static! {
    /// Any two-digit number from 10 to 99 appearing in the text.
    static ref TWO_DIGIT_NUMBER: Regex = Regex::new(r"[1-9][0-9]").unwrap();
}

const PLAYER_KEYWORDS: &[&str] = &["haaland", "salah", "kane", "núñez", "jesus", "isak", "watkins"];
const REASONING_WORDS: &[&str] = &["porque", "debido", "razón", "factor", "considera"];
const FACTOR_WORDS: &[&str] = &["forma", "entrenador", "plantilla", "lesiones", "histórico", "casa"];
const CONCLUSION_WORDS: &[&str] = &["concluyo", "considero", "creo", "favorito", "victoria"];
const CONTEXT_WORDS: &[&str] = &["entrenador", "manager", "2024", "temporada"];
const TEAM_WORDS: &[&str] = &["arsenal", "chelsea", "liverpool", "city"];

/// Which chat question a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTopic {
    TopScorer,
    TeamComparison { home: &'static str, away: &'static str },
}

/// Which heuristic a quality case is scored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityKind {
    Prediction,
    Analysis,
    Chat(ChatTopic),
}

impl QualityKind {
    pub fn evaluate(self, body: &Value) -> QualityChecks {
        match self {
            QualityKind::Prediction => evaluate_prediction(body),
            QualityKind::Analysis => evaluate_analysis(body),
            QualityKind::Chat(topic) => evaluate_chat(body, topic),
        }
    }
}

/// Fraction of checks that passed; 0 when there are none.
pub fn score(checks: &QualityChecks) -> f64 {
    if checks.is_empty() {
        0.0
    } else {
        checks.values().filter(|passed| **passed).count() as f64 / checks.len() as f64
    }
}

fn select<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    match JsonPath::parse(path) {
        Ok(json_path) => json_path.query(body).first(),
        Err(e) => {
            warn!(path, error = %e, "Invalid JSONPath in quality check");
            None
        }
    }
}

fn text_len(value: Option<&Value>) -> usize {
    value
        .and_then(Value::as_str)
        .map(|s| s.chars().count())
        .unwrap_or(0)
}

fn array_len(value: Option<&Value>) -> usize {
    value.and_then(Value::as_array).map(Vec::len).unwrap_or(0)
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn check(checks: &mut QualityChecks, name: &str, passed: bool) {
    checks.insert(name.to_string(), passed);
}

pub fn evaluate_prediction(body: &Value) -> QualityChecks {
    let mut checks = QualityChecks::new();
    let prediction = select(body, "$.prediction");

    let probability_paths = [
        "$.prediction.win_probability_home",
        "$.prediction.win_probability_draw",
        "$.prediction.win_probability_away",
    ];
    let probabilities: Vec<Option<f64>> = probability_paths
        .iter()
        .map(|p| select(body, p).and_then(Value::as_f64))
        .collect();
    let has_probabilities = probability_paths.iter().all(|p| select(body, p).is_some());
    check(&mut checks, "has_probabilities", has_probabilities);

    let reasoning_len = text_len(select(body, "$.prediction.reasoning"));
    check(&mut checks, "has_reasoning", reasoning_len > 50);

    let insights = array_len(select(body, "$.prediction.key_insights"));
    check(&mut checks, "has_insights", insights >= 2);

    let values: Vec<f64> = probabilities.iter().map(|p| p.unwrap_or(0.0)).collect();
    let sum: f64 = values.iter().sum();
    check(
        &mut checks,
        "realistic_probabilities",
        (0.95..=1.05).contains(&sum) && values.iter().all(|p| (0.0..=1.0).contains(p)),
    );

    let serialized_len = prediction
        .map(|p| p.to_string().chars().count())
        .unwrap_or(0);
    check(
        &mut checks,
        "detailed_analysis",
        reasoning_len > 100 && insights >= 3 && serialized_len > 300,
    );

    checks
}

pub fn evaluate_analysis(body: &Value) -> QualityChecks {
    let mut checks = QualityChecks::new();

    check(
        &mut checks,
        "has_strengths",
        array_len(select(body, "$.analysis.strengths")) >= 2,
    );
    check(
        &mut checks,
        "has_weaknesses",
        array_len(select(body, "$.analysis.weaknesses")) >= 1,
    );
    check(
        &mut checks,
        "has_key_players",
        array_len(select(body, "$.analysis.key_players")) >= 1,
    );
    check(
        &mut checks,
        "has_form_assessment",
        text_len(select(body, "$.analysis.recent_form")) > 10,
    );

    let serialized = select(body, "$.analysis")
        .map(|a| a.to_string().to_lowercase())
        .unwrap_or_default();
    check(
        &mut checks,
        "contextual_information",
        contains_any(&serialized, CONTEXT_WORDS),
    );

    checks
}

pub fn evaluate_chat(body: &Value, topic: ChatTopic) -> QualityChecks {
    let mut checks = QualityChecks::new();
    let raw = body.get("response").and_then(Value::as_str).unwrap_or("");
    let text = raw.to_lowercase();

    match topic {
        ChatTopic::TopScorer => {
            check(&mut checks, "mentions_players", contains_any(&text, PLAYER_KEYWORDS));
            check(&mut checks, "provides_reasoning", contains_any(&text, REASONING_WORDS));
            check(
                &mut checks,
                "includes_probabilities_or_stats",
                contains_any(&text, &["%", "probabilidad", "goles"])
                    || TWO_DIGIT_NUMBER.is_match(&text),
            );
        }
        ChatTopic::TeamComparison { home, away } => {
            check(
                &mut checks,
                "compares_both_teams",
                text.contains(&home.to_lowercase()) && text.contains(&away.to_lowercase()),
            );
            check(&mut checks, "provides_reasoning", contains_any(&text, REASONING_WORDS));
            check(
                &mut checks,
                "includes_probabilities_or_stats",
                contains_any(&text, &["%", "probabilidad"]),
            );
            check(&mut checks, "mentions_specific_factors", contains_any(&text, FACTOR_WORDS));
            check(&mut checks, "gives_conclusion", contains_any(&text, CONCLUSION_WORDS));
        }
    }

    check(
        &mut checks,
        "contextual_analysis",
        contains_any(&text, &["2024", "temporada"]),
    );
    check(&mut checks, "comprehensive_answer", raw.chars().count() > 200);

    checks
}

/// Kind of probe scored by the 4-point check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleKind {
    Prediction,
    Chat,
}

/// Coarse 4-point score used by the mini quality run.
pub fn simple_quality_score(text: &str, kind: SimpleKind) -> f64 {
    let lower = text.to_lowercase();
    let mut points = 0u8;

    if text.chars().count() > 50 {
        points += 1;
    }
    if contains_any(&lower, TEAM_WORDS) {
        points += 1;
    }

    match kind {
        SimpleKind::Prediction => {
            if contains_any(&lower, &["probabilidad", "%", "gana", "empate"]) {
                points += 1;
            }
            if contains_any(&lower, &["forma", "casa", "historia"]) {
                points += 1;
            }
        }
        SimpleKind::Chat => {
            if contains_any(&lower, &["creo", "considero", "porque", "debido"]) {
                points += 1;
            }
            if contains_any(&lower, &["2024", "temporada"]) {
                points += 1;
            }
        }
    }

    f64::from(points) / 4.0
}

/// Flags reported alongside the mini prediction score.
pub fn prediction_flags(text: &str) -> BTreeMap<String, bool> {
    let lower = text.to_lowercase();
    BTreeMap::from([
        (
            "has_probabilities".to_string(),
            contains_any(&lower, &["probability", "probabilidad", "%"]),
        ),
        (
            "mentions_teams".to_string(),
            lower.contains("arsenal") && lower.contains("chelsea"),
        ),
    ])
}

/// Flags reported alongside the mini chat score.
pub fn chat_flags(text: &str) -> BTreeMap<String, bool> {
    let lower = text.to_lowercase();
    BTreeMap::from([
        (
            "mentions_both_teams".to_string(),
            lower.contains("arsenal") && lower.contains("chelsea"),
        ),
        (
            "provides_reasoning".to_string(),
            contains_any(&lower, &["porque", "debido", "razón", "mejor"]),
        ),
        (
            "is_conversational".to_string(),
            text.chars().count() > 100,
        ),
    ])
}
