//! Latency percentiles using HDR Histogram.
//!
//! Samples are recorded in microseconds, from 1μs up to 10 minutes, with 3
//! significant digits. Percentiles are only reported once a batch reaches the
//! configured minimum sample count; smaller batches report the sentinel `0.0`
//! so a handful of requests never produces a misleading tail figure.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Default minimum number of samples before percentiles are reported.
pub const DEFAULT_MIN_PERCENTILE_SAMPLES: usize = 21;

const MAX_TRACKED_US: u64 = 600_000_000;

/// Percentile summary of one batch, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyPercentiles {
    /// Number of samples the figures were computed from.
    pub count: u64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p99_9: f64,
}

impl LatencyPercentiles {
    /// Compute percentiles over `samples`.
    ///
    /// Returns all-zero figures (with `count` still set) when there are fewer
    /// than `min_samples` samples.
    pub fn compute(samples: &[Duration], min_samples: usize) -> Self {
        let count = samples.len() as u64;
        if samples.is_empty() || samples.len() < min_samples {
            return Self {
                count,
                ..Self::default()
            };
        }

        let mut hist = match Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_US, 3) {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "Failed to create latency histogram");
                return Self {
                    count,
                    ..Self::default()
                };
            }
        };

        for sample in samples {
            let us = (sample.as_micros() as u64).clamp(1, MAX_TRACKED_US);
            if let Err(e) = hist.record(us) {
                warn!(latency_us = us, error = %e, "Failed to record latency in histogram");
            }
        }

        let at = |q: f64| hist.value_at_quantile(q) as f64 / 1_000_000.0;
        Self {
            count,
            p50: at(0.50),
            p90: at(0.90),
            p95: at(0.95),
            p99: at(0.99),
            p99_9: at(0.999),
        }
    }

    /// True when the figures are real rather than the sentinel.
    pub fn is_reported(&self) -> bool {
        self.p50 > 0.0 || self.p99_9 > 0.0
    }

    /// Format as a compact table row (milliseconds).
    pub fn format_table_row(&self, label: &str) -> String {
        format!(
            "{:<24} {:>8} {:>9.1} {:>9.1} {:>9.1} {:>9.1} {:>9.1}",
            label,
            self.count,
            self.p50 * 1000.0,
            self.p90 * 1000.0,
            self.p95 * 1000.0,
            self.p99 * 1000.0,
            self.p99_9 * 1000.0,
        )
    }
}

/// Render a percentile table for several labelled batches.
pub fn format_percentile_table(title: &str, rows: &[(String, LatencyPercentiles)]) -> String {
    if rows.is_empty() {
        return format!("\n## {}\n\nNo data available.\n", title);
    }

    let mut output = format!("\n## {}\n\n", title);
    output.push_str(&format!(
        "{:<24} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
        "Label", "Count", "P50(ms)", "P90(ms)", "P95(ms)", "P99(ms)", "P99.9(ms)"
    ));
    output.push_str(&format!("{}\n", "-".repeat(84)));

    for (label, stats) in rows {
        output.push_str(&stats.format_table_row(label));
        output.push('\n');
    }

    output
}
