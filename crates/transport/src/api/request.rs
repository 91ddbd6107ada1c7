//! Request specification
//!
//! Immutable description of one discrete call: endpoint path, method,
//! optional JSON body, and whether the endpoint is exempt from
//! authentication. Body serialization is centralized in
//! [`RequestSpec::json_body`] so encode faults surface as a typed error
//! instead of crashing the caller.

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::auth::REFRESH_PATH;
use crate::errors::TransportError;

/// Identity-bearing endpoints: a 404 here for an authenticated session
/// means the user no longer exists.
const IDENTITY_PATHS: [&str; 2] = [REFRESH_PATH, "/users/me"];

/// Endpoints that never require or attach a token.
const EXEMPT_PATHS: [&str; 5] =
    ["/auth/login", "/auth/signup", "/auth/password-reset", REFRESH_PATH, "/health"];

/// One discrete request: constructed per call, immutable, never persisted.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Endpoint path relative to the base URL.
    pub path: String,
    /// HTTP method.
    pub method: Method,
    /// JSON body, already serialized.
    pub body: Option<Value>,
    /// Exempt endpoints skip the logout gate and carry no bearer token.
    pub exempt: bool,
}

impl RequestSpec {
    /// A new spec; exemption is derived from the well-known endpoint list
    /// and can be overridden with [`Self::exempt`].
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let exempt = is_exempt_path(&path);
        Self { path, method, body: None, exempt }
    }

    /// GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// PUT request with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Mark the request exempt from authentication.
    #[must_use]
    pub fn exempt(mut self) -> Self {
        self.exempt = true;
        self
    }

    /// Whether this request targets an identity-bearing endpoint.
    #[must_use]
    pub fn is_identity_endpoint(&self) -> bool {
        IDENTITY_PATHS.contains(&self.path.as_str())
    }

    /// Serialize a request body, mapping encode faults to
    /// [`TransportError::Serialization`].
    ///
    /// # Errors
    /// Returns `Serialization` when the value cannot be encoded (e.g. a map
    /// with non-string keys).
    pub fn json_body<T: Serialize>(value: &T) -> Result<Value, TransportError> {
        serde_json::to_value(value).map_err(|e| TransportError::Serialization(e.to_string()))
    }
}

/// Whether a path belongs to the exempt endpoint set.
#[must_use]
pub fn is_exempt_path(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
}

#[cfg(test)]
mod tests {
    //! Unit tests for request specs.
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn auth_endpoints_are_exempt_by_default() {
        assert!(RequestSpec::post("/auth/login", serde_json::json!({})).exempt);
        assert!(RequestSpec::post(REFRESH_PATH, serde_json::json!({})).exempt);
        assert!(RequestSpec::get("/health").exempt);
        assert!(!RequestSpec::get("/goals").exempt);
    }

    #[test]
    fn identity_endpoints_are_recognized() {
        assert!(RequestSpec::get("/users/me").is_identity_endpoint());
        assert!(RequestSpec::post(REFRESH_PATH, serde_json::json!({})).is_identity_endpoint());
        assert!(!RequestSpec::get("/goals").is_identity_endpoint());
    }

    #[test]
    fn json_body_surfaces_encode_faults_as_typed_errors() {
        // Maps with non-string keys cannot be represented as JSON objects.
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], "value");

        let result = RequestSpec::json_body(&bad);
        assert!(matches!(result, Err(TransportError::Serialization(_))));
    }

    #[test]
    fn json_body_encodes_plain_structs() {
        #[derive(serde::Serialize)]
        struct Goal {
            title: String,
        }

        let body = RequestSpec::json_body(&Goal { title: "run".into() }).unwrap();
        assert_eq!(body, serde_json::json!({ "title": "run" }));
    }
}
