//! Transport configuration
//!
//! One configuration value per documented knob: base URL (with
//! platform-aware fallback resolution), request timeout, retry bounds, the
//! proactive refresh-buffer window, and the stream reconnect delay.

use std::time::Duration;

/// Environment variable consulted before any platform fallback.
const BASE_URL_ENV: &str = "STRIDE_API_URL";

/// Production API origin.
const PRODUCTION_BASE_URL: &str = "https://api.stride.app/v1";

/// Local development origin used by debug builds.
const DEV_BASE_URL: &str = "http://localhost:8080/v1";

/// Configuration for the request pipeline and stream transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL for all endpoints (no trailing slash).
    pub base_url: String,
    /// Timeout bound for each discrete request.
    pub request_timeout: Duration,
    /// Maximum retries for gateway/network failures (2 retries = 3 attempts).
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Backoff delay cap.
    pub retry_max_delay: Duration,
    /// Proactive refresh window: refresh when the access token expires
    /// within this buffer.
    pub refresh_buffer: Duration,
    /// Fixed delay before the stream transport's single transient reconnect.
    pub stream_reconnect_delay: Duration,
    /// Value of the client identifier header attached to every request.
    pub client_id: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: resolve_base_url(),
            request_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(4),
            refresh_buffer: Duration::from_secs(300),
            stream_reconnect_delay: Duration::from_secs(2),
            client_id: "stride-desktop".to_string(),
        }
    }
}

impl TransportConfig {
    /// Join an endpoint path onto the configured base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Resolve the base URL: explicit environment override first, then a
/// build-profile default (debug builds talk to a local backend).
#[must_use]
pub fn resolve_base_url() -> String {
    if let Ok(url) = std::env::var(BASE_URL_ENV) {
        if !url.is_empty() {
            return url;
        }
    }

    if cfg!(debug_assertions) {
        DEV_BASE_URL.to_string()
    } else {
        PRODUCTION_BASE_URL.to_string()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration defaults.
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TransportConfig { base_url: "https://api.example.com".into(), ..Default::default() };
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_base_delay, Duration::from_secs(1));
        assert_eq!(config.retry_max_delay, Duration::from_secs(4));
        assert_eq!(config.refresh_buffer, Duration::from_secs(300));
    }

    #[test]
    fn url_joins_path_onto_base() {
        let config = TransportConfig { base_url: "https://api.example.com/v1".into(), ..Default::default() };
        assert_eq!(config.url("/goals"), "https://api.example.com/v1/goals");
    }
}
