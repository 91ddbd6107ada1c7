//! HTTP auth collaborator
//!
//! [`AuthApi`] implementation that talks to the backend's refresh endpoint
//! and classifies failures for the coordinator. The refresh endpoint is
//! exempt: no bearer token is attached, the refresh credential travels in
//! the body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use super::traits::AuthApi;
use super::types::{RefreshError, TokenResponse};

/// Path of the refresh endpoint, relative to the base URL.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Body signature some backends return as a 500 when the user row is gone.
const USER_NOT_FOUND_SIGNATURE: &str = "user not found";

/// Auth service client for the refresh operation.
pub struct HttpAuthApi {
    http: Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Create a client against the given base URL.
    ///
    /// # Errors
    /// Returns the builder error message if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| e.to_string())?;
        Ok(Self { http, base_url: base_url.into() })
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshError> {
        let url = format!("{}{}", self.base_url, REFRESH_PATH);
        debug!(%url, "refreshing access token");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenResponse>()
                .await
                .map_err(|e| RefreshError::Transient(format!("invalid refresh response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "refresh endpoint rejected the request");

        if status == StatusCode::NOT_FOUND {
            return Err(RefreshError::UserMissing);
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR
            && body.to_lowercase().contains(USER_NOT_FOUND_SIGNATURE)
        {
            return Err(RefreshError::UserMissing);
        }

        Err(RefreshError::Transient(format!("refresh returned status {}", status.as_u16())))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for refresh-failure classification.
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn api(server: &MockServer) -> HttpAuthApi {
        HttpAuthApi::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn successful_refresh_parses_token_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(serde_json::json!({ "refresh_token": "r-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a-2",
                "refresh_token": "r-2",
                "expires_in": 900,
            })))
            .mount(&server)
            .await;

        let response = api(&server).refresh("r-1").await.unwrap();
        assert_eq!(response.access_token, "a-2");
        assert_eq!(response.refresh_token, "r-2");
        assert_eq!(response.expires_in, Some(900));
    }

    #[tokio::test]
    async fn not_found_classifies_as_user_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(api(&server).refresh("r-1").await, Err(RefreshError::UserMissing));
    }

    #[tokio::test]
    async fn user_not_found_signature_in_500_classifies_as_user_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(500).set_body_string("{\"error\":\"User not found\"}"),
            )
            .mount(&server)
            .await;

        assert_eq!(api(&server).refresh("r-1").await, Err(RefreshError::UserMissing));
    }

    #[tokio::test]
    async fn gateway_failure_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(api(&server).refresh("r-1").await, Err(RefreshError::Transient(_))));
    }
}
