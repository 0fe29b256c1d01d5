//! Summary statistics over batches of request results.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::issuer::RequestResult;
use crate::percentiles::LatencyPercentiles;
use crate::utils::{mean, serialize_secs};

/// Mean/min/max/median/std-dev over a list of latencies in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Sample standard deviation; 0 with fewer than two samples.
    pub std_dev: f64,
}

impl LatencySummary {
    pub fn from_secs(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let avg = mean(&sorted);
        let std_dev = if sorted.len() > 1 {
            let var = sorted.iter().map(|v| (v - avg).powi(2)).sum::<f64>()
                / (sorted.len() - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        Self {
            count: sorted.len(),
            mean: avg,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            median: median_of_sorted(&sorted),
            std_dev,
        }
    }

    pub fn from_durations(values: &[Duration]) -> Self {
        let secs: Vec<f64> = values.iter().map(Duration::as_secs_f64).collect();
        Self::from_secs(&secs)
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Successful / total, or 0 for an empty batch.
pub fn success_rate(successful: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64
    }
}

/// Aggregate view of one load run.
///
/// Latency figures other than `avg_success_response_time` cover every result,
/// failures included.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStats {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub timeouts: usize,
    pub success_rate: f64,

    #[serde(serialize_with = "serialize_secs")]
    pub total_duration: Duration,
    pub requests_per_second: f64,

    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub median_response_time: f64,
    pub percentile_95: f64,
    pub percentiles: LatencyPercentiles,

    /// Mean latency of successful requests only.
    pub avg_success_response_time: f64,

    pub errors_by_category: BTreeMap<String, usize>,
    pub failures: Vec<RequestResult>,
}

impl AggregateStats {
    pub fn compute(results: &[RequestResult], total_duration: Duration, min_samples: usize) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let timeouts = results.iter().filter(|r| r.is_timeout()).count();

        let all_times: Vec<Duration> = results.iter().map(|r| r.response_time).collect();
        let summary = LatencySummary::from_durations(&all_times);
        let percentiles = LatencyPercentiles::compute(&all_times, min_samples);

        let success_times: Vec<f64> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.response_time.as_secs_f64())
            .collect();

        let mut errors_by_category = BTreeMap::new();
        for error in results.iter().filter_map(|r| r.error.as_ref()) {
            *errors_by_category
                .entry(error.category().label().to_string())
                .or_insert(0) += 1;
        }

        let secs = total_duration.as_secs_f64();
        let requests_per_second = if secs > 0.0 { total as f64 / secs } else { 0.0 };

        Self {
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            timeouts,
            success_rate: success_rate(successful, total),
            total_duration,
            requests_per_second,
            avg_response_time: summary.mean,
            min_response_time: summary.min,
            max_response_time: summary.max,
            median_response_time: summary.median,
            percentile_95: percentiles.p95,
            percentiles,
            avg_success_response_time: mean(&success_times),
            errors_by_category,
            failures: results.iter().filter(|r| !r.success).cloned().collect(),
        }
    }
}

/// Per-endpoint figures from a simultaneous burst.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointSummary {
    pub requests: usize,
    pub success_rate: f64,
    /// Over successful requests only.
    pub avg_response_time: f64,
    pub max_response_time: f64,
}

impl EndpointSummary {
    pub fn from_results(results: &[RequestResult]) -> Self {
        let successful: Vec<f64> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.response_time.as_secs_f64())
            .collect();
        let summary = LatencySummary::from_secs(&successful);

        Self {
            requests: results.len(),
            success_rate: success_rate(successful.len(), results.len()),
            avg_response_time: summary.mean,
            max_response_time: summary.max,
        }
    }
}
