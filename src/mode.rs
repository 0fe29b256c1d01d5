//! Remote mode switching.
//!
//! Every suite measures the target twice: once with its local engine, once with
//! the AI backend. The switch is a side-effecting `POST /toggle-ai`. A failed
//! switch skips that mode's phase so nothing is ever measured against the wrong
//! mode.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::issuer::RequestIssuer;
use crate::metrics::MODE_TOGGLES_TOTAL;

/// Field name of the toggle payload, fixed by the target API.
const TOGGLE_FIELD: &str = "use_claude_ai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Local,
    Ai,
}

impl Mode {
    /// Measurement order used by every suite.
    pub const ALL: [Mode; 2] = [Mode::Local, Mode::Ai];

    pub fn use_ai(self) -> bool {
        matches!(self, Mode::Ai)
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Local => "local",
            Mode::Ai => "ai",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Mode::Local => "LOCAL",
            Mode::Ai => "AI",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToggleError {
    #[error("toggle request failed: {0}")]
    Transport(String),

    #[error("toggle rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("target did not acknowledge mode {expected}: reported {reported:?}")]
    NotAcknowledged {
        expected: bool,
        reported: Option<bool>,
    },
}

/// Outcome of one per-mode phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum PhaseOutcome<T> {
    Completed(T),
    Skipped { reason: String },
}

impl<T> PhaseOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            PhaseOutcome::Completed(value) => Some(value),
            PhaseOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PhaseOutcome::Skipped { .. })
    }
}

#[derive(Clone)]
pub struct ModeToggler {
    issuer: RequestIssuer,
    timeout: Duration,
    settle_delay: Duration,
    /// Require the response to confirm the new mode in `current_mode`.
    verify_ack: bool,
}

impl ModeToggler {
    pub fn new(issuer: RequestIssuer, timeout: Duration, settle_delay: Duration) -> Self {
        Self {
            issuer,
            timeout,
            settle_delay,
            verify_ack: false,
        }
    }

    pub fn verify_acknowledgement(mut self, verify: bool) -> Self {
        self.verify_ack = verify;
        self
    }

    pub async fn toggle(&self, mode: Mode) -> Result<(), ToggleError> {
        let result = self.send_toggle(mode).await;
        let label = if result.is_ok() { "ok" } else { "failed" };
        MODE_TOGGLES_TOTAL
            .with_label_values(&[mode.label(), label])
            .inc();
        result
    }

    async fn send_toggle(&self, mode: Mode) -> Result<(), ToggleError> {
        let expected = mode.use_ai();
        let response = self
            .issuer
            .client()
            .post(self.issuer.url_for("/toggle-ai"))
            .json(&json!({ TOGGLE_FIELD: expected }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToggleError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ToggleError::Rejected { status });
        }

        let body: Option<Value> = response.json().await.ok();
        let reported = body
            .as_ref()
            .and_then(|b| b.get("current_mode"))
            .and_then(Value::as_bool);

        check_acknowledgement(expected, reported, self.verify_ack)
    }

    /// Switch to `mode`, wait for it to settle, then run `phase`.
    ///
    /// A failed switch returns [`PhaseOutcome::Skipped`] without running it.
    pub async fn run_in_mode<F, Fut, T>(&self, mode: Mode, phase: F) -> PhaseOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.toggle(mode).await {
            Ok(()) => {
                info!(mode = %mode, "Mode switched");
                if !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                PhaseOutcome::Completed(phase().await)
            }
            Err(e) => {
                error!(mode = %mode, error = %e, "Failed to switch mode, skipping phase");
                PhaseOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// A reported mode must match; a missing one only fails under `strict`.
fn check_acknowledgement(
    expected: bool,
    reported: Option<bool>,
    strict: bool,
) -> Result<(), ToggleError> {
    match reported {
        Some(current) if current == expected => Ok(()),
        None if !strict => Ok(()),
        _ => Err(ToggleError::NotAcknowledged { expected, reported }),
    }
}
