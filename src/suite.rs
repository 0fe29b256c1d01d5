//! Pieces shared by every suite: the run context and the per-mode loop.

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::errors::HarnessError;
use crate::issuer::RequestIssuer;
use crate::mode::{Mode, ModeToggler, PhaseOutcome};
use crate::report::{print_banner, ResultWriter};

/// Per-mode phase outcomes, keyed `local` / `ai` when serialized.
pub type ModePhases<T> = BTreeMap<Mode, PhaseOutcome<T>>;

/// Timeout for the pre-flight health check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a suite needs to talk to the target and save results.
#[derive(Clone)]
pub struct SuiteContext {
    pub config: Config,
    pub issuer: RequestIssuer,
    pub writer: ResultWriter,
}

impl SuiteContext {
    pub fn new(config: Config, client: reqwest::Client) -> Self {
        let issuer = RequestIssuer::new(client, &config.base_url);
        let writer = if config.save_results {
            ResultWriter::new(config.results_dir.clone())
        } else {
            ResultWriter::disabled()
        };
        Self {
            config,
            issuer,
            writer,
        }
    }

    /// Toggler built from the configured timeouts.
    ///
    /// `strict` requires the target to report the new mode back.
    pub fn toggler(&self, strict: bool) -> ModeToggler {
        ModeToggler::new(
            self.issuer.clone(),
            self.config.toggle_timeout,
            self.config.mode_settle_delay,
        )
        .verify_acknowledgement(strict)
    }

    /// Fails with [`HarnessError::Unreachable`] unless `/health` answers 200.
    pub async fn require_healthy(&self) -> Result<(), HarnessError> {
        if self.issuer.check_health(HEALTH_TIMEOUT).await {
            info!(base_url = %self.issuer.base_url(), "Target is reachable");
            Ok(())
        } else {
            error!(base_url = %self.issuer.base_url(), "Target is unreachable");
            Err(HarnessError::Unreachable(self.issuer.base_url().to_string()))
        }
    }

    /// Save `value` under `prefix` when saving is enabled.
    pub fn save<T: Serialize>(&self, prefix: &str, value: &T) -> Result<Option<PathBuf>, HarnessError> {
        Ok(self.writer.write(prefix, value)?)
    }
}

/// Runs `phase` once per mode, Local first, skipping modes that fail to switch.
pub async fn for_each_mode<T, F, Fut>(toggler: &ModeToggler, suite: &str, mut phase: F) -> ModePhases<T>
where
    F: FnMut(Mode) -> Fut,
    Fut: Future<Output = T>,
{
    let mut phases = BTreeMap::new();
    for mode in Mode::ALL {
        print_banner(&format!("{} - {} mode", suite, mode));
        let outcome = toggler.run_in_mode(mode, || phase(mode)).await;
        if let PhaseOutcome::Skipped { ref reason } = outcome {
            println!("Skipped {} mode: {}", mode, reason);
        }
        phases.insert(mode, outcome);
    }
    phases
}

/// The completed Local and AI results, when both phases ran.
pub fn both_completed<T>(phases: &ModePhases<T>) -> Option<(&T, &T)> {
    let local = phases.get(&Mode::Local)?.completed()?;
    let ai = phases.get(&Mode::Ai)?.completed()?;
    Some((local, ai))
}
