use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::utils::parse_headers_with_escapes;

/// Errors raised while building the shared HTTP client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("RESOLVE_TARGET_ADDR ('{0}') is not in the expected format 'hostname:ip:port'")]
    ResolveFormat(String),

    #[error("RESOLVE_TARGET_ADDR: invalid address '{addr}': {reason}")]
    ResolveAddress { addr: String, reason: String },

    #[error("Invalid header format in CUSTOM_HEADERS: '{0}'. Expected 'Name:Value'.")]
    HeaderFormat(String),

    #[error("Invalid header '{name}': {reason}")]
    HeaderInvalid { name: String, reason: String },

    #[error(transparent)]
    Build(#[from] reqwest::Error),
}

/// Configuration for building the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub skip_tls_verify: bool,
    pub resolve_target_addr: Option<String>,
    pub custom_headers: Option<String>,
    /// Upper bound applied when a request carries no explicit timeout.
    pub default_timeout: Option<Duration>,
    /// Idle connections kept per host; sized to the largest user count.
    pub max_idle_per_host: usize,
}

/// Result of building the client, includes parsed headers for logging.
pub struct ClientBuildResult {
    pub client: reqwest::Client,
    pub parsed_headers: HeaderMap,
}

/// Builds the reqwest client shared by every issuer, toggler and worker.
pub fn build_client(config: &ClientConfig) -> Result<ClientBuildResult, ClientError> {
    let mut client_builder = reqwest::Client::builder();

    if let Some(ref resolve_str) = config.resolve_target_addr {
        if !resolve_str.is_empty() {
            client_builder = configure_dns_override(client_builder, resolve_str)?;
        }
    }

    let parsed_headers = configure_custom_headers(config.custom_headers.as_deref())?;
    if !parsed_headers.is_empty() {
        client_builder = client_builder.default_headers(parsed_headers.clone());
        info!(count = parsed_headers.len(), "Configured custom default headers");
    }

    if let Some(timeout) = config.default_timeout {
        client_builder = client_builder.timeout(timeout);
    }

    let max_idle = if config.max_idle_per_host == 0 {
        32
    } else {
        config.max_idle_per_host
    };
    client_builder = client_builder
        .pool_max_idle_per_host(max_idle)
        .pool_idle_timeout(Duration::from_secs(90));

    let client = if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder
            .danger_accept_invalid_certs(true)
            .build()?
    } else {
        client_builder.build()?
    };

    Ok(ClientBuildResult {
        client,
        parsed_headers,
    })
}

fn configure_dns_override(
    client_builder: reqwest::ClientBuilder,
    resolve_str: &str,
) -> Result<reqwest::ClientBuilder, ClientError> {
    let parts: Vec<&str> = resolve_str.split(':').map(str::trim).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(ClientError::ResolveFormat(resolve_str.to_string()));
    }

    let hostname = parts[0];
    let socket_addr_str = format!("{}:{}", parts[1], parts[2]);
    let socket_addr: SocketAddr =
        socket_addr_str
            .parse()
            .map_err(|e: std::net::AddrParseError| ClientError::ResolveAddress {
                addr: socket_addr_str.clone(),
                reason: e.to_string(),
            })?;

    info!(hostname, addr = %socket_addr, "Configured DNS override");
    Ok(client_builder.resolve(hostname, socket_addr))
}

fn configure_custom_headers(custom_headers_str: Option<&str>) -> Result<HeaderMap, ClientError> {
    let mut parsed_headers = HeaderMap::new();

    let headers_str = match custom_headers_str {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(parsed_headers),
    };

    for header_pair_str in parse_headers_with_escapes(headers_str) {
        let header_pair_str_trimmed = header_pair_str.trim();
        if header_pair_str_trimmed.is_empty() {
            continue;
        }

        let (name_str, value_str) = header_pair_str_trimmed
            .split_once(':')
            .map(|(n, v)| (n.trim(), v.trim()))
            .ok_or_else(|| ClientError::HeaderFormat(header_pair_str_trimmed.to_string()))?;

        if name_str.is_empty() {
            return Err(ClientError::HeaderFormat(
                header_pair_str_trimmed.to_string(),
            ));
        }

        let header_name =
            HeaderName::from_str(name_str).map_err(|e| ClientError::HeaderInvalid {
                name: name_str.to_string(),
                reason: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value_str).map_err(|e| ClientError::HeaderInvalid {
                name: name_str.to_string(),
                reason: e.to_string(),
            })?;

        parsed_headers.insert(header_name, header_value);
    }

    Ok(parsed_headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_default_client() {
        let result = build_client(&ClientConfig::default()).unwrap();
        assert!(result.parsed_headers.is_empty());
    }

    #[test]
    fn parses_custom_headers() {
        let config = ClientConfig {
            custom_headers: Some("X-Api-Key:secret,Accept:application/json\\,text/plain".into()),
            ..Default::default()
        };
        let result = build_client(&config).unwrap();
        assert_eq!(result.parsed_headers.len(), 2);
        assert_eq!(
            result.parsed_headers.get("accept").unwrap(),
            "application/json,text/plain"
        );
    }

    #[test]
    fn rejects_header_without_colon() {
        let config = ClientConfig {
            custom_headers: Some("NoColonHere".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ClientError::HeaderFormat(_))
        ));
    }

    #[test]
    fn rejects_malformed_resolve_override() {
        let config = ClientConfig {
            resolve_target_addr: Some("api.local:127.0.0.1".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ClientError::ResolveFormat(_))
        ));
    }

    #[test]
    fn accepts_resolve_override() {
        let config = ClientConfig {
            resolve_target_addr: Some("api.local:127.0.0.1:8080".into()),
            ..Default::default()
        };
        assert!(build_client(&config).is_ok());
    }
}
