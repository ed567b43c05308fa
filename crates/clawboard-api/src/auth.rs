//! Auth: one shared secret for writes, loopback-only unauthenticated reads.
//!
//! Only transport-level client identity counts as local. Forwarded headers
//! are honored for addressing when `trust_proxy` is on, but a forwarded
//! request never gains the loopback bypass: spoofable headers must not turn
//! a remote caller into a local one.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use secrecy::ExposeSecret;

use clawboard_types::ServerConfig;

use crate::error::ApiError;

pub const TOKEN_HEADER: &str = "x-clawboard-token";

fn provided_token<'a>(headers: &'a HeaderMap) -> Option<&'a str> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn validate_token(config: &ServerConfig, provided: Option<&str>) -> Result<(), ApiError> {
    let Some(configured) = &config.token else {
        return Err(ApiError::TokenUnavailable);
    };
    let expected = configured.expose_secret();
    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Whether the request's transport peer is loopback. A forwarded request
/// (when trust-proxy parsing is on) is by definition not local.
pub fn is_local_request(config: &ServerConfig, headers: &HeaderMap, peer: SocketAddr) -> bool {
    if config.trust_proxy
        && (headers.contains_key("x-forwarded-for") || headers.contains_key("x-real-ip"))
    {
        return false;
    }
    peer.ip().is_loopback()
}

/// Reads: loopback passes, everyone else needs the token.
pub fn ensure_read_access(
    config: &ServerConfig,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<(), ApiError> {
    if is_local_request(config, headers, peer) {
        return Ok(());
    }
    validate_token(config, provided_token(headers))
}

/// Writes always need the token.
pub fn ensure_write_access(config: &ServerConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    validate_token(config, provided_token(headers))
}

/// SSE auth: header token, loopback, or (for browsers that cannot set
/// headers) a query token validated against the shared secret.
pub fn ensure_stream_access(
    config: &ServerConfig,
    headers: &HeaderMap,
    peer: SocketAddr,
    query_token: Option<&str>,
) -> Result<(), ApiError> {
    if is_local_request(config, headers, peer) {
        return Ok(());
    }
    if provided_token(headers).is_some() {
        return validate_token(config, provided_token(headers));
    }
    validate_token(config, query_token.map(str::trim).filter(|t| !t.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(token: Option<&str>, trust_proxy: bool) -> ServerConfig {
        ServerConfig {
            token: token.map(SecretString::from),
            trust_proxy,
            ..ServerConfig::default()
        }
    }

    fn local() -> SocketAddr {
        "127.0.0.1:51000".parse().unwrap()
    }

    fn remote() -> SocketAddr {
        "203.0.113.9:51000".parse().unwrap()
    }

    fn headers_with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token.parse().unwrap());
        headers
    }

    #[test]
    fn writes_fail_closed_without_configured_token() {
        let config = config(None, false);
        assert!(matches!(
            ensure_write_access(&config, &HeaderMap::new()),
            Err(ApiError::TokenUnavailable)
        ));
    }

    #[test]
    fn writes_require_matching_token() {
        let config = config(Some("secret"), false);
        assert!(ensure_write_access(&config, &headers_with_token("secret")).is_ok());
        assert!(matches!(
            ensure_write_access(&config, &headers_with_token("wrong")),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            ensure_write_access(&config, &HeaderMap::new()),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn loopback_reads_skip_the_token() {
        let config = config(Some("secret"), false);
        assert!(ensure_read_access(&config, &HeaderMap::new(), local()).is_ok());
        assert!(matches!(
            ensure_read_access(&config, &HeaderMap::new(), remote()),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn forwarded_requests_never_count_as_local() {
        let config = config(Some("secret"), true);
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.1.2.3".parse().unwrap());
        // Transport peer is loopback (a proxy), but the request was
        // forwarded, so the loopback bypass must not apply.
        assert!(matches!(
            ensure_read_access(&config, &headers, local()),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn stream_accepts_query_token_for_remote_clients() {
        let config = config(Some("secret"), false);
        assert!(ensure_stream_access(&config, &HeaderMap::new(), remote(), Some("secret")).is_ok());
        assert!(matches!(
            ensure_stream_access(&config, &HeaderMap::new(), remote(), Some("wrong")),
            Err(ApiError::Unauthorized)
        ));
        assert!(ensure_stream_access(&config, &HeaderMap::new(), local(), None).is_ok());
    }
}
