//! Single-request issuer.
//!
//! Wraps exactly one HTTP call: measures wall-clock latency, captures status,
//! body size and the failure tag. No retries; a failed call is recorded once.

use prometheus::Gauge;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::errors::RequestError;
use crate::metrics::{
    status_code_label, CONCURRENT_REQUESTS, REQUEST_DURATION_SECONDS, REQUEST_ERRORS_BY_CATEGORY,
    REQUEST_STATUS_CODES, REQUEST_TOTAL,
};
use crate::utils::serialize_secs;

/// Outcome of one issued request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestResult {
    pub success: bool,

    /// HTTP status, or 0 when no response arrived.
    pub status_code: u16,

    #[serde(serialize_with = "serialize_secs")]
    pub response_time: Duration,

    /// Body size in bytes.
    pub response_size: usize,

    pub error: Option<RequestError>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_num: Option<usize>,
}

impl RequestResult {
    /// A request that was never (fully) issued because its worker gave up.
    pub fn abandoned(error: RequestError, user_id: usize, request_num: usize) -> Self {
        Self {
            success: false,
            status_code: 0,
            response_time: Duration::ZERO,
            response_size: 0,
            error: Some(error),
            user_id: Some(user_id),
            request_num: Some(request_num),
        }
    }

    pub fn with_origin(mut self, user_id: usize, request_num: usize) -> Self {
        self.user_id = Some(user_id);
        self.request_num = Some(request_num);
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_ref().is_some_and(RequestError::is_timeout)
    }
}

/// A result plus the response body, for suites that inspect content.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub result: RequestResult,
    pub body: Option<String>,
}

impl CapturedResponse {
    /// Parse the body as JSON when the request succeeded.
    pub fn json(&self) -> Option<serde_json::Value> {
        if !self.result.success {
            return None;
        }
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
    }
}

/// Issues requests against a fixed base URL.
///
/// Cheap to clone: the client and base URL are shared.
#[derive(Clone)]
pub struct RequestIssuer {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl RequestIssuer {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Issue one request and record its outcome.
    pub async fn issue(&self, endpoint: &Endpoint, timeout: Duration) -> RequestResult {
        self.execute(endpoint, timeout, false).await.result
    }

    /// Issue one request and keep the body alongside the outcome.
    pub async fn issue_capture(&self, endpoint: &Endpoint, timeout: Duration) -> CapturedResponse {
        self.execute(endpoint, timeout, true).await
    }

    /// `GET /health` answered with 200.
    pub async fn check_health(&self, timeout: Duration) -> bool {
        let health = Endpoint::get("health", "/health");
        let result = self.issue(&health, timeout).await;
        if !result.success {
            warn!(
                base_url = %self.base_url,
                error = ?result.error,
                "Health check failed"
            );
        }
        result.success
    }

    async fn execute(&self, endpoint: &Endpoint, timeout: Duration, keep_body: bool) -> CapturedResponse {
        let url = self.url_for(&endpoint.path);
        let mut request = self
            .client
            .request(endpoint.method.clone(), &url)
            .timeout(timeout);
        if let Some(ref payload) = endpoint.payload {
            request = request.json(payload);
        }

        let in_flight = InFlight::start(&CONCURRENT_REQUESTS);
        REQUEST_TOTAL.inc();
        let start = Instant::now();

        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                REQUEST_STATUS_CODES
                    .with_label_values(&[status_code_label(status)])
                    .inc();
                match response.bytes().await {
                    Ok(bytes) => Ok((status, bytes)),
                    Err(e) => Err(RequestError::from_reqwest(&e)),
                }
            }
            Err(e) => {
                REQUEST_STATUS_CODES.with_label_values(&["error"]).inc();
                Err(RequestError::from_reqwest(&e))
            }
        };

        let response_time = start.elapsed();
        REQUEST_DURATION_SECONDS.observe(response_time.as_secs_f64());
        drop(in_flight);

        let captured = match outcome {
            Ok((status, bytes)) => {
                let error = (status != 200).then_some(RequestError::Status { status });
                let body = keep_body.then(|| String::from_utf8_lossy(&bytes).into_owned());
                CapturedResponse {
                    result: RequestResult {
                        success: error.is_none(),
                        status_code: status,
                        response_time,
                        response_size: bytes.len(),
                        error,
                        user_id: None,
                        request_num: None,
                    },
                    body,
                }
            }
            Err(error) => CapturedResponse {
                result: RequestResult {
                    success: false,
                    status_code: 0,
                    response_time,
                    response_size: 0,
                    error: Some(error),
                    user_id: None,
                    request_num: None,
                },
                body: None,
            },
        };

        if let Some(ref error) = captured.result.error {
            REQUEST_ERRORS_BY_CATEGORY
                .with_label_values(&[error.category().label()])
                .inc();
            debug!(
                endpoint = %endpoint.name,
                url = %url,
                error = %error,
                elapsed_ms = response_time.as_millis() as u64,
                "Request failed"
            );
        } else {
            debug!(
                endpoint = %endpoint.name,
                status_code = captured.result.status_code,
                elapsed_ms = response_time.as_millis() as u64,
                bytes = captured.result.response_size,
                "Request completed"
            );
        }

        captured
    }
}

/// Holds one slot of an in-flight gauge; the slot is released on drop, so an
/// aborted request still decrements it.
struct InFlight(Gauge);

impl InFlight {
    fn start(gauge: &Gauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aborted_request_releases_in_flight_slot() {
        let gauge = Gauge::new("test_in_flight", "in-flight test gauge").unwrap();
        let held = gauge.clone();
        let task = tokio::spawn(async move {
            let _slot = InFlight::start(&held);
            std::future::pending::<()>().await;
        });

        while gauge.get() < 1.0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(gauge.get(), 0.0);
    }

    #[test]
    fn url_joining_handles_slashes() {
        let issuer = RequestIssuer::new(reqwest::Client::new(), "http://localhost:8080/api/");
        assert_eq!(issuer.base_url(), "http://localhost:8080/api");
        assert_eq!(issuer.url_for("/health"), "http://localhost:8080/api/health");
        assert_eq!(issuer.url_for("chat"), "http://localhost:8080/api/chat");
    }

    #[test]
    fn abandoned_result_is_a_timeout_failure() {
        let result = RequestResult::abandoned(RequestError::WorkerTimeout, 3, 7);
        assert!(!result.success);
        assert!(result.is_timeout());
        assert_eq!(result.user_id, Some(3));
        assert_eq!(result.request_num, Some(7));
    }

    #[test]
    fn serializes_response_time_in_seconds() {
        let result = RequestResult {
            success: true,
            status_code: 200,
            response_time: Duration::from_millis(1500),
            response_size: 42,
            error: None,
            user_id: None,
            request_num: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["response_time"], 1.5);
        assert!(json.get("user_id").is_none());
    }
}
