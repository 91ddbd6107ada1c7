//! Request pipeline
//!
//! Builds, sends and classifies discrete requests. Auth recovery (401 →
//! refresh → retry once), account-status handling, gateway/network retries
//! with bounded backoff, and health reporting all live here so callers only
//! ever see a typed outcome.

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::types::{LogoutReason, RefreshError};
use crate::auth::SessionContext;
use crate::config::TransportConfig;
use crate::errors::{extract_error_message, ErrorClass, TransportError};
use crate::health::HealthMonitor;
use crate::retry::{RetryDecision, RetryPolicy};

use super::request::RequestSpec;

/// Client identifier header attached to every request.
const CLIENT_ID_HEADER: &str = "x-stride-client";

/// Discrete request transport.
pub struct RequestPipeline {
    http: Client,
    config: TransportConfig,
    policy: RetryPolicy,
    session: Arc<SessionContext>,
    health: Arc<HealthMonitor>,
}

impl RequestPipeline {
    /// Create a pipeline over the shared session and health monitor.
    ///
    /// # Errors
    /// Returns the builder error message if the HTTP client cannot be
    /// constructed.
    pub fn new(
        config: TransportConfig,
        session: Arc<SessionContext>,
        health: Arc<HealthMonitor>,
    ) -> Result<Self, String> {
        let http = Client::builder().build().map_err(|e| e.to_string())?;
        let policy =
            RetryPolicy::new(config.retry_base_delay, config.retry_max_delay, config.max_retries);
        Ok(Self { http, config, policy, session, health })
    }

    /// Send a request and classify its outcome.
    ///
    /// Retries are an explicit loop bounded by the retry policy; the 401
    /// recovery path retries at most once with the refreshed token.
    ///
    /// # Errors
    /// One [`TransportError`] variant per the classification rules.
    pub async fn send(&self, spec: &RequestSpec) -> Result<Value, TransportError> {
        if self.session.is_logging_out() && !spec.exempt {
            return Err(TransportError::AuthRequired);
        }

        let mut token = if spec.exempt {
            None
        } else {
            match self.session.tokens().access_token().await {
                Some(token) => Some(token),
                None => return Err(TransportError::AuthRequired),
            }
        };

        let mut attempt: u32 = 0;
        let mut auth_retried = false;

        loop {
            let response = match self.execute(spec, token.as_deref()).await {
                Ok(response) => response,
                Err(carrier @ TransportError::Timeout(_)) => return Err(carrier),
                Err(carrier) => {
                    match self.policy.decide(ErrorClass::NetworkError, attempt) {
                        RetryDecision::Retry(delay) => {
                            debug!(attempt, ?delay, "network failure; retrying");
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                        RetryDecision::Stop => {
                            self.health.report_offline(carrier.to_string());
                            return Err(carrier);
                        }
                    }
                }
            };

            let status = response.status();

            if status.is_success() {
                self.health.report_online();
                return parse_success_body(response).await;
            }

            if status == StatusCode::UNAUTHORIZED && !spec.exempt {
                if auth_retried {
                    // The refreshed token was rejected too; give up.
                    self.session.terminate(LogoutReason::ExpiredSession).await;
                    return Err(TransportError::AuthExpired);
                }
                match self.session.refresh().refresh_now().await {
                    Ok(new_token) => {
                        debug!(path = %spec.path, "retrying with refreshed token");
                        token = Some(new_token);
                        auth_retried = true;
                        continue;
                    }
                    Err(RefreshError::UserMissing) => {
                        self.session.terminate(LogoutReason::NotFound).await;
                        return Err(TransportError::UserMissing);
                    }
                    Err(RefreshError::NoRefreshToken) => {
                        self.session.terminate(LogoutReason::ExpiredSession).await;
                        return Err(TransportError::AuthExpired);
                    }
                    Err(RefreshError::Transient(reason)) => {
                        warn!(%reason, "refresh failed transiently; surfacing original 401");
                        return Err(TransportError::AuthExpired);
                    }
                }
            }

            if is_gateway_status(status) {
                match self.policy.decide(ErrorClass::GatewayError, attempt) {
                    RetryDecision::Retry(delay) => {
                        debug!(attempt, status = status.as_u16(), ?delay, "gateway error; retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    RetryDecision::Stop => {
                        let message = format!("{} returned status {}", spec.path, status.as_u16());
                        self.health.report_offline(message.clone());
                        return Err(TransportError::ServiceUnavailable(message));
                    }
                }
            }

            return self.classify_terminal(spec, status, response, token.is_some()).await;
        }
    }

    /// Send a request and deserialize the response body.
    ///
    /// # Errors
    /// As [`Self::send`], plus `Serialization` when the body does not match
    /// `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T, TransportError> {
        let value = self.send(spec).await?;
        serde_json::from_value(value)
            .map_err(|e| TransportError::Serialization(format!("unexpected response shape: {e}")))
    }

    /// Proactively refresh the access token when it expires within the
    /// configured buffer window.
    ///
    /// Intended for opportunistic call sites (app foreground, timer).
    /// Returns the current or refreshed access token, `None` when no
    /// session is stored.
    ///
    /// # Errors
    /// Propagates the refresh classification.
    pub async fn ensure_fresh_token(&self) -> Result<Option<String>, RefreshError> {
        self.session.refresh().ensure_fresh_token(self.config.refresh_buffer).await
    }

    /// Probe the exempt health endpoint.
    ///
    /// # Errors
    /// As [`Self::send`].
    pub async fn health_check(&self) -> Result<bool, TransportError> {
        match self.send(&RequestSpec::get("/health")).await {
            Ok(_) => Ok(true),
            Err(TransportError::ServiceUnavailable(_) | TransportError::NetworkUnavailable(_)) => {
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    async fn execute(
        &self,
        spec: &RequestSpec,
        token: Option<&str>,
    ) -> Result<Response, TransportError> {
        let url = self.config.url(&spec.path);
        let mut request = self
            .http
            .request(spec.method.clone(), &url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(CLIENT_ID_HEADER, &self.config.client_id);

        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        debug!(method = %spec.method, %url, "sending request");

        match tokio::time::timeout(self.config.request_timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(TransportError::NetworkUnavailable(error.to_string())),
            Err(_) => Err(TransportError::Timeout(self.config.request_timeout)),
        }
    }

    async fn classify_terminal(
        &self,
        spec: &RequestSpec,
        status: StatusCode,
        response: Response,
        had_token: bool,
    ) -> Result<Value, TransportError> {
        let body = read_body(response).await;

        if status == StatusCode::FORBIDDEN {
            if let Some(reason) = account_block_reason(body.as_ref()) {
                self.session.terminate(reason).await;
                return Err(TransportError::AccountBlocked { reason });
            }
        }

        if status == StatusCode::NOT_FOUND && spec.is_identity_endpoint() && had_token {
            self.session.terminate(LogoutReason::NotFound).await;
            return Err(TransportError::UserMissing);
        }

        let message = body
            .as_ref()
            .and_then(extract_error_message)
            .unwrap_or_else(|| format!("{} returned status {}", spec.path, status.as_u16()));

        if status.is_client_error() {
            let is_auth_status =
                status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
            if !is_auth_status {
                self.health.report_degraded(message.clone());
            }
            return Err(TransportError::Validation { status: status.as_u16(), message });
        }

        // Remaining 5xx (500/501): not a gateway signal, surfaced without
        // retry.
        self.health.report_degraded(message.clone());
        Err(TransportError::ServiceUnavailable(message))
    }
}

fn is_gateway_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Pull the blocked-account reason out of a 403 payload, if present.
fn account_block_reason(body: Option<&Value>) -> Option<LogoutReason> {
    let body = body?;
    let status = body
        .get("account_status")
        .or_else(|| body.get("status"))
        .and_then(Value::as_str)?;
    LogoutReason::from_account_status(status)
}

async fn parse_success_body(response: Response) -> Result<Value, TransportError> {
    let is_json = content_type_is_json(&response);
    let text = response
        .text()
        .await
        .map_err(|e| TransportError::NetworkUnavailable(e.to_string()))?;

    if text.is_empty() {
        return Ok(Value::Null);
    }
    if is_json {
        return serde_json::from_str(&text)
            .map_err(|e| TransportError::Serialization(format!("invalid response body: {e}")));
    }
    // Raw text responses are wrapped so callers always see an object.
    Ok(json!({ "message": text }))
}

async fn read_body(response: Response) -> Option<Value> {
    let text = response.text().await.ok()?;
    serde_json::from_str(&text).ok().or_else(|| {
        if text.is_empty() {
            None
        } else {
            Some(json!({ "message": text }))
        }
    })
}

fn content_type_is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

#[cfg(test)]
mod tests {
    //! Unit tests for request building and body handling; full recovery
    //! scenarios live in `tests/pipeline_integration.rs`.
    use std::time::Duration;

    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testing::TestHarness;

    #[tokio::test]
    async fn attaches_bearer_and_client_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/goals"))
            .and(header(AUTHORIZATION, "Bearer access-1"))
            .and(header(CLIENT_ID_HEADER, "stride-desktop"))
            .and(header(ACCEPT, "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let harness = TestHarness::authenticated(server.uri(), "access-1", "refresh-1").await;
        let body = harness.pipeline.send(&RequestSpec::get("/goals")).await.unwrap();
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn exempt_request_carries_no_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        // Unauthenticated session: only exempt endpoints may pass.
        let harness = TestHarness::unauthenticated(server.uri()).await;
        let body = harness.pipeline.send(&RequestSpec::get("/health")).await.unwrap();
        assert_eq!(body, json!({ "message": "ok" }));

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn missing_token_fails_fast_without_network() {
        let server = MockServer::start().await;
        let harness = TestHarness::unauthenticated(server.uri()).await;

        let result = harness.pipeline.send(&RequestSpec::get("/goals")).await;

        assert!(matches!(result, Err(TransportError::AuthRequired)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timeout_is_surfaced_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(1)
            .mount(&server)
            .await;

        let harness = TestHarness::builder(server.uri())
            .request_timeout(Duration::from_millis(100))
            .authenticated("access-1", "refresh-1")
            .build()
            .await;

        let result = harness.pipeline.send(&RequestSpec::get("/slow")).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn non_json_success_body_is_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain"))
            .and(header_exists(CLIENT_ID_HEADER))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("maintenance at midnight")
                    .insert_header(CONTENT_TYPE.as_str(), "text/plain"),
            )
            .mount(&server)
            .await;

        let harness = TestHarness::authenticated(server.uri(), "access-1", "refresh-1").await;
        let body = harness.pipeline.send(&RequestSpec::get("/plain")).await.unwrap();
        assert_eq!(body, json!({ "message": "maintenance at midnight" }));
    }

    #[tokio::test]
    async fn validation_error_extracts_nested_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/goals"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "error": { "detail": "Title must not be empty" }
            })))
            .mount(&server)
            .await;

        let harness = TestHarness::authenticated(server.uri(), "access-1", "refresh-1").await;
        let spec = RequestSpec::post("/goals", json!({ "title": "" }));
        let result = harness.pipeline.send(&spec).await;

        match result {
            Err(TransportError::Validation { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "Title must not be empty");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
