use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigOverrides;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "rust_modebench",
    version,
    about = "Compares a football prediction service in its Local and AI modes: latency, answer quality and behaviour under load."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Base URL of the service under test (overrides API_BASE_URL)
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,

    /// YAML suite file (overrides SUITE_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for result files (overrides RESULTS_DIR)
    #[arg(long = "results-dir", global = true)]
    pub results_dir: Option<PathBuf>,

    /// Print reports without writing result files
    #[arg(long = "no-save", global = true)]
    pub no_save: bool,

    /// Debug-level logging when RUST_LOG is unset
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Dump the Prometheus metrics after the run
    #[arg(long = "print-metrics", global = true)]
    pub print_metrics: bool,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum Command {
    /// Latency of every endpoint category in both modes
    Performance,
    /// Heuristic answer-quality scores in both modes
    Quality,
    /// Two-probe quality check on a 4-point scale
    MiniQuality,
    /// Load scenarios, endpoint burst and stress escalation
    Load(LoadArgs),
    /// Stress escalation only
    Stress(StressArgs),
    /// Fast side-by-side comparison of three endpoints
    Quick,
    /// Performance, quality and load back to back with insights
    Suite,
    /// Quick comparison followed by the mini quality check
    Budget,
}

#[derive(Debug, Args, Clone, Default, PartialEq)]
pub struct LoadArgs {
    /// Scenario to run; repeat for several (default: light_load, medium_load, heavy_load)
    #[arg(long = "scenario")]
    pub scenarios: Vec<String>,
}

#[derive(Debug, Args, Clone, Default, PartialEq)]
pub struct StressArgs {
    /// Endpoint to escalate against (default: chat_simple)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Comma-separated user levels, e.g. 5,10,20
    #[arg(long, value_delimiter = ',')]
    pub levels: Option<Vec<usize>>,
}

impl Cli {
    /// Flags that layer over the environment and suite file.
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            base_url: self.base_url.clone(),
            results_dir: self.results_dir.clone(),
            no_save: self.no_save,
            ..ConfigOverrides::default()
        };
        match self.command {
            Command::Load(ref args) => overrides.load_scenarios = args.scenarios.clone(),
            Command::Stress(ref args) => {
                overrides.stress_endpoint = args.endpoint.clone();
                overrides.stress_levels = args.levels.clone();
            }
            _ => {}
        }
        overrides
    }
}
