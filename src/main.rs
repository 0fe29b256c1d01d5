use clap::Parser;
use std::sync::{Arc, Mutex};
use tracing::error;

use rust_modebench::cli::{Cli, Command};
use rust_modebench::client::build_client;
use rust_modebench::config::{Config, ENV_VARS};
use rust_modebench::errors::HarnessError;
use rust_modebench::logging::init_logging;
use rust_modebench::metrics::{gather_metrics_string, register_metrics, start_metrics_server};
use rust_modebench::suite::SuiteContext;
use rust_modebench::{load_suite, performance, quality_suite, quick, runner};

/// Prints the environment variables the harness reads.
fn print_config_help() {
    eprintln!("Environment variables (CLI flags win, then env, then the suite file):");
    for name in ENV_VARS {
        eprintln!("  {}", name);
    }
    eprintln!();
    eprintln!("Durations accept 500ms, 30s, 10m or 2h. LOG_FORMAT=json switches to JSON logs.");
}

/// Runs the chosen command and saves its report.
async fn dispatch(ctx: &SuiteContext, command: &Command) -> Result<(), HarnessError> {
    let saved = match command {
        Command::Performance => ctx.save("performance", &performance::run(ctx).await?)?,
        Command::Quality => ctx.save("quality", &quality_suite::run(ctx).await?)?,
        Command::MiniQuality => ctx.save("mini_quality", &quality_suite::run_mini(ctx).await?)?,
        Command::Load(_) => ctx.save("load_stress", &load_suite::run(ctx).await?)?,
        Command::Stress(_) => ctx.save("stress", &load_suite::run_stress(ctx).await?)?,
        Command::Quick => ctx.save("quick", &quick::run(ctx).await?)?,
        Command::Suite => ctx.save("master", &runner::run_master(ctx).await?)?,
        Command::Budget => {
            runner::run_budget(ctx).await;
            None
        }
    };
    if let Some(path) = saved {
        println!("\nResults saved to {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    register_metrics()?;

    let loaded = match cli.config.as_deref() {
        Some(path) => Config::load(Some(path)),
        None => Config::from_env(),
    };
    let config = match loaded.and_then(|c| c.with_overrides(cli.overrides())) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    let client_result = build_client(&config.to_client_config())?;
    config.print_summary(&client_result.parsed_headers);

    let registry_arc = Arc::new(Mutex::new(prometheus::default_registry().clone()));
    if let Some(port) = config.metrics_port {
        let registry = registry_arc.clone();
        tokio::spawn(async move {
            start_metrics_server(port, registry).await;
        });
    }

    let ctx = SuiteContext::new(config, client_result.client);
    let outcome = dispatch(&ctx, &cli.command).await;

    if cli.print_metrics {
        println!("\n--- FINAL METRICS ---\n{}", gather_metrics_string(&registry_arc));
        println!("--- END OF FINAL METRICS ---\n");
    }

    if let Err(e) = outcome {
        error!(error = %e, "Run aborted");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
