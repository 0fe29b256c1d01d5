use std::sync::Arc;

use tokio::time::{self, Duration, Instant};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::errors::RequestError;
use crate::issuer::{RequestIssuer, RequestResult};
use crate::utils::deadline_after;

/// Configuration for one simulated user.
#[derive(Debug, Clone)]
pub struct UserConfig {
    pub user_id: usize,
    pub requests_per_user: usize,
    pub inter_request_delay: Duration,
    pub request_timeout: Duration,
    /// Hard stop for this user; no request may run past it.
    pub deadline: Instant,
}

/// Replays `requests_per_user` sequential requests for one virtual user.
///
/// Always returns exactly `requests_per_user` results. Every request timeout is
/// clipped to the deadline; a clipped timeout that fires is recorded as
/// `WorkerTimeout`, as is every request that can no longer start.
pub async fn run_user(
    issuer: RequestIssuer,
    endpoint: Arc<Endpoint>,
    config: UserConfig,
) -> Vec<RequestResult> {
    debug!(
        user_id = config.user_id,
        endpoint = %endpoint.name,
        requests = config.requests_per_user,
        "User starting"
    );

    let mut results = Vec::with_capacity(config.requests_per_user);

    for request_num in 0..config.requests_per_user {
        let now = Instant::now();
        if now >= config.deadline {
            warn!(
                user_id = config.user_id,
                completed = request_num,
                "User deadline reached, abandoning remaining requests"
            );
            results.extend((request_num..config.requests_per_user).map(|n| {
                RequestResult::abandoned(RequestError::WorkerTimeout, config.user_id, n)
            }));
            break;
        }

        let remaining = config.deadline - now;
        let clipped = remaining < config.request_timeout;
        let timeout = config.request_timeout.min(remaining);

        let mut result = issuer
            .issue(&endpoint, timeout)
            .await
            .with_origin(config.user_id, request_num);
        if clipped && result.error == Some(RequestError::Timeout) {
            result.error = Some(RequestError::WorkerTimeout);
        }
        results.push(result);

        let is_last = request_num + 1 == config.requests_per_user;
        if !is_last && !config.inter_request_delay.is_zero() {
            let wake = deadline_after(Instant::now(), config.inter_request_delay).min(config.deadline);
            time::sleep_until(wake).await;
        }
    }

    debug!(
        user_id = config.user_id,
        successes = results.iter().filter(|r| r.success).count(),
        "User finished"
    );
    results
}
