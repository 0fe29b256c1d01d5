//! Benchmark harness comparing a prediction service's Local and AI modes.

pub mod burst;
pub mod cli;
pub mod client;
pub mod config;
pub mod config_merge;
pub mod config_validation;
pub mod endpoint;
pub mod errors;
pub mod escalation;
pub mod issuer;
pub mod load_suite;
pub mod logging;
pub mod metrics;
pub mod mode;
pub mod orchestrator;
pub mod percentiles;
pub mod performance;
pub mod quality;
pub mod quality_suite;
pub mod quick;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod stats;
pub mod suite;
pub mod utils;
pub mod worker;
pub mod yaml_config;
