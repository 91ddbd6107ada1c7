//! Injected collaborator traits
//!
//! These traits abstract the durable key-value store, the auth service's
//! refresh call, and the application's session-management hook so the
//! transport can be exercised against in-memory doubles.

use async_trait::async_trait;

use super::types::{LogoutReason, RefreshError, TokenResponse};

/// Durable key-value storage for credentials and session flags.
///
/// How values persist is out of scope here; implementations range from the
/// platform keychain to an in-memory map for tests. The secure variants are
/// for sensitive values (remember-me email/flag) that must never land in
/// plain storage.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Read a value, `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, String>;

    /// Write a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), String>;

    /// Remove a value (idempotent).
    async fn remove(&self, key: &str) -> Result<(), String>;

    /// Read a sensitive value.
    async fn get_secure(&self, key: &str) -> Result<Option<String>, String>;

    /// Write a sensitive value.
    async fn set_secure(&self, key: &str, value: &str) -> Result<(), String>;

    /// Remove a sensitive value (idempotent).
    async fn remove_secure(&self, key: &str) -> Result<(), String>;
}

/// The auth service's refresh operation.
///
/// Implementations classify failures: a 404 (or a 500 with a
/// user-not-found signature) is `RefreshError::UserMissing`; everything
/// else transient.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshError>;
}

/// Application hook invoked on terminal identity failures.
#[async_trait]
pub trait SessionEvents: Send + Sync {
    /// The session is no longer valid; the user must re-authenticate.
    async fn handle_auto_logout(&self, reason: LogoutReason);
}
