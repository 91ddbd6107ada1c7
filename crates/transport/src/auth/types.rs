//! Auth types
//!
//! Token pair held by the store, the wire shape of refresh responses, the
//! classification of refresh failures, and the reasons forwarded to the
//! session-management collaborator on auto-logout.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh credential pair with optional expiry metadata.
///
/// Owned exclusively by [`crate::auth::TokenStore`]. `expires_at` is derived
/// from the refresh response's `expires_in` and drives the proactive refresh
/// check; when absent the access token is assumed valid until the backend
/// says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer credential attached to authenticated requests.
    pub access_token: String,

    /// Longer-lived credential used to mint a new access token.
    pub refresh_token: String,

    /// Absolute expiry of the access token (UTC), when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Create a pair, deriving `expires_at` from a lifetime in seconds.
    #[must_use]
    pub fn new(access_token: String, refresh_token: String, expires_in: Option<i64>) -> Self {
        let expires_at = expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        Self { access_token, refresh_token, expires_at }
    }

    /// Whether the access token is expired or expires within the buffer.
    ///
    /// Returns `false` when no expiry is known.
    #[must_use]
    pub fn is_expiring(&self, buffer_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + chrono::Duration::seconds(buffer_seconds) >= expires_at,
            None => false,
        }
    }
}

/// Token payload returned by the auth service's login/refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// New access token.
    pub access_token: String,
    /// New refresh token.
    pub refresh_token: String,
    /// Access token lifetime in seconds, when the backend reports one.
    pub expires_in: Option<i64>,
}

impl From<TokenResponse> for TokenPair {
    fn from(response: TokenResponse) -> Self {
        Self::new(response.access_token, response.refresh_token, response.expires_in)
    }
}

/// Reason forwarded to the session-management collaborator on auto-logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The session could not be refreshed (expired or revoked credentials).
    ExpiredSession,
    /// The backend no longer knows this user.
    NotFound,
    /// The account was disabled by an administrator.
    Disabled,
    /// The account was suspended.
    Suspended,
}

impl LogoutReason {
    /// Stable identifier used on the wire and in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExpiredSession => "expired_session",
            Self::NotFound => "not_found",
            Self::Disabled => "disabled",
            Self::Suspended => "suspended",
        }
    }

    /// Parse an account-status payload value (`disabled`/`suspended`).
    #[must_use]
    pub fn from_account_status(status: &str) -> Option<Self> {
        match status {
            "disabled" => Some(Self::Disabled),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of a failed refresh operation.
///
/// Only `UserMissing` and `NoRefreshToken` propagate to session
/// termination; `Transient` failures never log the user out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// 404 from the refresh endpoint, or a 500 carrying a user-not-found
    /// signature.
    UserMissing,
    /// No refresh credential is stored; the session cannot be recovered.
    NoRefreshToken,
    /// Network or gateway failure while refreshing; the session survives.
    Transient(String),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserMissing => write!(f, "user no longer exists"),
            Self::NoRefreshToken => write!(f, "no refresh token available"),
            Self::Transient(msg) => write!(f, "refresh failed transiently: {msg}"),
        }
    }
}

impl std::error::Error for RefreshError {}
