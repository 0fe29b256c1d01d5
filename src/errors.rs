//! Error categorization and the harness error types.
//!
//! Every failed request is reduced to a [`RequestError`] tag so aggregation can
//! tell timeouts apart from HTTP failures and transport exceptions. Each tag maps
//! onto an [`ErrorCategory`] for metrics labels and report breakdowns.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::report::ReportError;

/// Categories of errors that can occur while driving the target API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// HTTP 4xx errors (client errors)
    ClientError,

    /// HTTP 5xx errors (server errors)
    ServerError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request timeout errors, including expired worker deadlines
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code.
    ///
    /// Only `200` counts as success for this harness; any other code is a
    /// failure, so `None` is returned for 200 alone.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Categorize a reqwest error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() || error.is_request() || error.is_body() || error.is_decode()
        {
            ErrorCategory::NetworkError
        } else if error.is_redirect() || error.is_builder() {
            ErrorCategory::ClientError
        } else {
            let error_msg = error.to_string().to_lowercase();

            if error_msg.contains("certificate")
                || error_msg.contains("tls")
                || error_msg.contains("ssl")
            {
                ErrorCategory::TlsError
            } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
                ErrorCategory::TimeoutError
            } else if error_msg.contains("dns")
                || error_msg.contains("resolve")
                || error_msg.contains("connect")
            {
                ErrorCategory::NetworkError
            } else {
                ErrorCategory::OtherError
            }
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Why a single request did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestError {
    /// The per-request timeout fired before a full response arrived.
    #[error("timeout")]
    Timeout,

    /// A response arrived with a status other than 200.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// The call failed before or while reading the response.
    #[error("{category}: {message}")]
    Transport {
        category: ErrorCategory,
        message: String,
    },

    /// The owning worker ran out of time before this request could complete.
    #[error("worker deadline exceeded")]
    WorkerTimeout,

    /// The owning worker task panicked; its requests are accounted as failures.
    #[error("worker panicked: {message}")]
    WorkerPanicked { message: String },
}

impl RequestError {
    /// Map a reqwest failure onto a tag, keeping timeouts distinct.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        match ErrorCategory::from_reqwest_error(error) {
            ErrorCategory::TimeoutError => RequestError::Timeout,
            category => RequestError::Transport {
                category,
                message: error.to_string(),
            },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RequestError::Timeout | RequestError::WorkerTimeout => ErrorCategory::TimeoutError,
            RequestError::Status { status } => {
                ErrorCategory::from_status_code(*status).unwrap_or(ErrorCategory::OtherError)
            }
            RequestError::Transport { category, .. } => *category,
            RequestError::WorkerPanicked { .. } => ErrorCategory::OtherError,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout | RequestError::WorkerTimeout)
    }
}

/// Top-level failure of a suite run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("target API is unreachable at {0}")]
    Unreachable(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] ClientError),

    #[error("failed to write results: {0}")]
    Report(#[from] ReportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_200_is_success() {
        assert_eq!(ErrorCategory::from_status_code(200), None);
        assert_eq!(
            ErrorCategory::from_status_code(201),
            Some(ErrorCategory::OtherError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(404),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(503),
            Some(ErrorCategory::ServerError)
        );
    }

    #[test]
    fn timeouts_share_a_category() {
        assert_eq!(RequestError::Timeout.category(), ErrorCategory::TimeoutError);
        assert_eq!(
            RequestError::WorkerTimeout.category(),
            ErrorCategory::TimeoutError
        );
        assert!(RequestError::WorkerTimeout.is_timeout());
        assert!(!RequestError::Status { status: 500 }.is_timeout());
    }

    #[test]
    fn status_error_category_follows_code() {
        assert_eq!(
            RequestError::Status { status: 429 }.category(),
            ErrorCategory::ClientError
        );
        assert_eq!(
            RequestError::Status { status: 502 }.category(),
            ErrorCategory::ServerError
        );
    }

    #[test]
    fn request_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(RequestError::Status { status: 503 }).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["status"], 503);

        let json = serde_json::to_value(RequestError::Timeout).unwrap();
        assert_eq!(json["kind"], "timeout");
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(ErrorCategory::TimeoutError.label(), "timeout_error");
        assert_eq!(ErrorCategory::TlsError.label(), "tls_error");
        assert!(ErrorCategory::ServerError.description().contains("5xx"));
    }
}
