//! Simultaneous burst across several endpoints.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tracing::{error, info};

use crate::endpoint::Endpoint;
use crate::issuer::{RequestIssuer, RequestResult};
use crate::stats::EndpointSummary;
use crate::utils::serialize_secs;

pub const DEFAULT_BURST_PER_ENDPOINT: usize = 3;
pub const DEFAULT_BURST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct BurstReport {
    pub endpoints: BTreeMap<String, EndpointSummary>,
    pub total_requests: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub total_duration: Duration,
}

/// Fire `per_endpoint` requests at every endpoint at once and summarize each.
pub async fn run_burst(
    issuer: &RequestIssuer,
    endpoints: &[Endpoint],
    per_endpoint: usize,
    timeout: Duration,
) -> BurstReport {
    let start = Instant::now();
    let mut set = JoinSet::new();

    for endpoint in endpoints {
        let endpoint = Arc::new(endpoint.clone());
        for request_num in 0..per_endpoint {
            let issuer = issuer.clone();
            let endpoint = endpoint.clone();
            set.spawn(async move {
                let result = issuer.issue(&endpoint, timeout).await;
                (endpoint.name.clone(), request_num, result)
            });
        }
    }

    let mut grouped: BTreeMap<String, Vec<RequestResult>> = endpoints
        .iter()
        .map(|e| (e.name.clone(), Vec::new()))
        .collect();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, _request_num, result)) => grouped.entry(name).or_default().push(result),
            Err(e) => error!(error = %e, "Burst request task failed"),
        }
    }

    let endpoints: BTreeMap<String, EndpointSummary> = grouped
        .iter()
        .map(|(name, results)| (name.clone(), EndpointSummary::from_results(results)))
        .collect();
    let total_requests = grouped.values().map(Vec::len).sum();
    let total_duration = start.elapsed();

    info!(
        total_requests,
        duration_secs = total_duration.as_secs_f64(),
        "Endpoint burst complete"
    );

    BurstReport {
        endpoints,
        total_requests,
        total_duration,
    }
}
