//! Transport error taxonomy
//!
//! Every call through the transport resolves to exactly one
//! [`TransportError`] variant. Each variant maps to an [`ErrorClass`] which
//! drives the retry policy; identity-class failures are additionally
//! forwarded to the session-management collaborator by the pipeline.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::auth::types::LogoutReason;

/// Coarse classification used by the retry policy.
///
/// Only `GatewayError` and `NetworkError` are ever retried; auth and client
/// failures have dedicated recovery paths or surface immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 2xx outcome.
    Success,
    /// HTTP 502/503/504 from an intermediary or overloaded backend.
    GatewayError,
    /// Connection-level failure (reset, TLS, DNS) or timeout.
    NetworkError,
    /// 401/403 and refresh-related failures.
    AuthError,
    /// Remaining 4xx and non-retryable conditions.
    ClientError,
}

/// Typed outcome of a failed transport operation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No token available for a non-exempt endpoint, or the logout gate is
    /// set.
    #[error("authentication required")]
    AuthRequired,

    /// A 401 survived the refresh-and-retry-once recovery path.
    #[error("session expired")]
    AuthExpired,

    /// 403 carrying a disabled/suspended account payload.
    #[error("account blocked: {reason}")]
    AccountBlocked {
        /// Account status reported by the backend.
        reason: LogoutReason,
    },

    /// 404 on an identity-bearing endpoint for a previously authenticated
    /// session.
    #[error("user no longer exists")]
    UserMissing,

    /// 502/503/504 with retries exhausted.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Connection-level failures with retries exhausted.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The request exceeded its timeout budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request body could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Any other 4xx, surfaced with the backend's message.
    #[error("request rejected ({status}): {message}")]
    Validation {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the structured error payload.
        message: String,
    },
}

impl TransportError {
    /// Classification used by [`crate::retry::RetryPolicy`].
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ServiceUnavailable(_) => ErrorClass::GatewayError,
            Self::NetworkUnavailable(_) | Self::Timeout(_) => ErrorClass::NetworkError,
            Self::AuthRequired | Self::AuthExpired | Self::AccountBlocked { .. } => {
                ErrorClass::AuthError
            }
            Self::UserMissing | Self::Serialization(_) | Self::Validation { .. } => {
                ErrorClass::ClientError
            }
        }
    }

    /// Whether this failure terminates the session (invokes auto-logout).
    #[must_use]
    pub fn is_identity_failure(&self) -> bool {
        matches!(self, Self::AuthExpired | Self::AccountBlocked { .. } | Self::UserMissing)
    }
}

/// Maximum nesting depth inspected when extracting an error message.
const EXTRACT_DEPTH_LIMIT: usize = 4;

/// Keys checked, in order, at each level of a structured error payload.
const MESSAGE_KEYS: [&str; 4] = ["message", "error", "detail", "next_steps"];

/// Extract a human-readable message from a structured error payload.
///
/// Walks the value tree depth-first, trying the well-known keys in order at
/// each object and descending into nested objects and arrays up to a fixed
/// depth bound so pathological payloads cannot cause unbounded recursion.
/// Returns `None` when nothing string-like is found.
#[must_use]
pub fn extract_error_message(payload: &Value) -> Option<String> {
    extract_at_depth(payload, 0)
}

fn extract_at_depth(value: &Value, depth: usize) -> Option<String> {
    if depth >= EXTRACT_DEPTH_LIMIT {
        return None;
    }

    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => {
            for key in MESSAGE_KEYS {
                if let Some(nested) = map.get(key) {
                    if let Some(message) = extract_at_depth(nested, depth + 1) {
                        return Some(message);
                    }
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| extract_at_depth(item, depth + 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the error taxonomy and message extraction.
    use serde_json::json;

    use super::*;

    #[test]
    fn classes_match_retry_contract() {
        assert_eq!(TransportError::ServiceUnavailable("503".into()).class(), ErrorClass::GatewayError);
        assert_eq!(TransportError::NetworkUnavailable("reset".into()).class(), ErrorClass::NetworkError);
        assert_eq!(TransportError::Timeout(Duration::from_secs(60)).class(), ErrorClass::NetworkError);
        assert_eq!(TransportError::AuthExpired.class(), ErrorClass::AuthError);
        assert_eq!(
            TransportError::Validation { status: 422, message: "bad".into() }.class(),
            ErrorClass::ClientError
        );
    }

    #[test]
    fn identity_failures_are_flagged() {
        assert!(TransportError::AuthExpired.is_identity_failure());
        assert!(TransportError::UserMissing.is_identity_failure());
        assert!(!TransportError::Timeout(Duration::from_secs(1)).is_identity_failure());
        assert!(!TransportError::ServiceUnavailable("x".into()).is_identity_failure());
    }

    #[test]
    fn extracts_top_level_message() {
        let payload = json!({ "message": "Email already taken" });
        assert_eq!(extract_error_message(&payload).as_deref(), Some("Email already taken"));
    }

    #[test]
    fn extracts_nested_message_in_key_order() {
        let payload = json!({
            "error": { "detail": "Quota exceeded" },
            "message": { "next_steps": ["Upgrade your plan"] },
        });
        // "message" wins over "error" at the top level.
        assert_eq!(extract_error_message(&payload).as_deref(), Some("Upgrade your plan"));
    }

    #[test]
    fn depth_bound_stops_pathological_payloads() {
        let payload = json!({
            "error": { "error": { "error": { "error": { "error": "too deep" } } } }
        });
        assert_eq!(extract_error_message(&payload), None);
    }

    #[test]
    fn ignores_non_string_leaves() {
        let payload = json!({ "message": 42, "detail": null });
        assert_eq!(extract_error_message(&payload), None);
    }
}
