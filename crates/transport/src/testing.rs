//! Test support
//!
//! In-memory collaborator doubles plus a wired-up harness for transport
//! tests. Lives in the library (not behind `cfg(test)`) so integration
//! tests under `tests/` can reuse it; nothing here is part of the stable
//! API surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::RequestPipeline;
use crate::auth::{
    AuthApi, HttpAuthApi, LogoutReason, RefreshError, SessionContext, SessionEvents, TokenPair,
    TokenResponse, TokenStorage,
};
use crate::config::TransportConfig;
use crate::health::HealthMonitor;

/// In-memory [`TokenStorage`] double.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    secure_values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a plain value, as if persisted by a previous run.
    pub fn seed(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    /// Snapshot of a plain value for assertions.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }
}

#[async_trait]
impl TokenStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn get_secure(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.secure_values.lock().get(key).cloned())
    }

    async fn set_secure(&self, key: &str, value: &str) -> Result<(), String> {
        self.secure_values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_secure(&self, key: &str) -> Result<(), String> {
        self.secure_values.lock().remove(key);
        Ok(())
    }
}

/// Storage double whose every operation fails, for broken-keychain paths.
pub struct FailingStorage;

#[async_trait]
impl TokenStorage for FailingStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>, String> {
        Err("storage unavailable".to_string())
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), String> {
        Err("storage unavailable".to_string())
    }

    async fn remove(&self, _key: &str) -> Result<(), String> {
        Err("storage unavailable".to_string())
    }

    async fn get_secure(&self, _key: &str) -> Result<Option<String>, String> {
        Err("storage unavailable".to_string())
    }

    async fn set_secure(&self, _key: &str, _value: &str) -> Result<(), String> {
        Err("storage unavailable".to_string())
    }

    async fn remove_secure(&self, _key: &str) -> Result<(), String> {
        Err("storage unavailable".to_string())
    }
}

enum RefreshBehavior {
    Succeed { token: String, delay: Duration },
    Fail { error: RefreshError, delay: Duration },
}

/// [`AuthApi`] double that counts refresh calls.
///
/// The optional delay widens the window in which concurrent callers can
/// pile onto one in-flight refresh.
pub struct CountingAuthApi {
    /// Number of refresh calls observed.
    pub calls: AtomicUsize,
    behavior: RefreshBehavior,
}

impl CountingAuthApi {
    /// Refreshes succeed immediately with the given access token.
    #[must_use]
    pub fn succeeding(token: &str) -> Self {
        Self::succeeding_with_delay(token, Duration::ZERO)
    }

    /// Refreshes succeed with the given access token after a delay.
    #[must_use]
    pub fn succeeding_with_delay(token: &str, delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            behavior: RefreshBehavior::Succeed { token: token.to_string(), delay },
        }
    }

    /// Refreshes fail with the given error after a delay.
    #[must_use]
    pub fn failing(error: RefreshError, delay: Duration) -> Self {
        Self { calls: AtomicUsize::new(0), behavior: RefreshBehavior::Fail { error, delay } }
    }
}

#[async_trait]
impl AuthApi for CountingAuthApi {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            RefreshBehavior::Succeed { token, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(TokenResponse {
                    access_token: token.clone(),
                    refresh_token: format!("{token}-refresh"),
                    expires_in: Some(3600),
                })
            }
            RefreshBehavior::Fail { error, delay } => {
                tokio::time::sleep(*delay).await;
                Err(error.clone())
            }
        }
    }
}

/// [`SessionEvents`] double recording every auto-logout notification.
#[derive(Default)]
pub struct RecordingSessionEvents {
    /// Number of auto-logout notifications received.
    pub calls: AtomicUsize,
    reasons: Mutex<Vec<LogoutReason>>,
}

impl RecordingSessionEvents {
    /// Fresh recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The reasons received so far, in order.
    #[must_use]
    pub fn reasons(&self) -> Vec<LogoutReason> {
        self.reasons.lock().clone()
    }
}

#[async_trait]
impl SessionEvents for RecordingSessionEvents {
    async fn handle_auto_logout(&self, reason: LogoutReason) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reasons.lock().push(reason);
    }
}

/// Fully wired transport against a mock backend.
pub struct TestHarness {
    /// Discrete request transport under test.
    pub pipeline: RequestPipeline,
    /// Shared session, for gate and token assertions.
    pub session: Arc<SessionContext>,
    /// Health monitor, for connectivity assertions.
    pub health: Arc<HealthMonitor>,
    /// Auto-logout recorder.
    pub events: Arc<RecordingSessionEvents>,
    /// Durable-storage double backing the session.
    pub storage: Arc<MemoryStorage>,
    /// Configuration the harness was built with.
    pub config: TransportConfig,
}

impl TestHarness {
    /// Builder against the given mock-backend base URL.
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> TestHarnessBuilder {
        TestHarnessBuilder {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(40),
            stream_reconnect_delay: Duration::from_millis(20),
            refresh_buffer: Duration::from_secs(300),
            pair: None,
        }
    }

    /// Harness with a stored token pair and an open gate.
    pub async fn authenticated(
        base_url: impl Into<String>,
        access_token: &str,
        refresh_token: &str,
    ) -> Self {
        Self::builder(base_url).authenticated(access_token, refresh_token).build().await
    }

    /// Harness with no stored credentials.
    pub async fn unauthenticated(base_url: impl Into<String>) -> Self {
        Self::builder(base_url).build().await
    }
}

/// Builder for [`TestHarness`]; backoff delays default to milliseconds so
/// retry scenarios stay fast.
pub struct TestHarnessBuilder {
    base_url: String,
    request_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
    stream_reconnect_delay: Duration,
    refresh_buffer: Duration,
    pair: Option<TokenPair>,
}

impl TestHarnessBuilder {
    /// Override the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the proactive refresh-buffer window.
    #[must_use]
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Override the retry count.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Store a token pair before the first request.
    #[must_use]
    pub fn authenticated(mut self, access_token: &str, refresh_token: &str) -> Self {
        self.pair =
            Some(TokenPair::new(access_token.to_string(), refresh_token.to_string(), Some(3600)));
        self
    }

    /// Wire everything together.
    ///
    /// # Panics
    /// Panics if the underlying HTTP clients cannot be built.
    pub async fn build(self) -> TestHarness {
        let config = TransportConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            retry_max_delay: self.retry_max_delay,
            stream_reconnect_delay: self.stream_reconnect_delay,
            refresh_buffer: self.refresh_buffer,
            ..TransportConfig::default()
        };

        let storage = Arc::new(MemoryStorage::new());
        let events = Arc::new(RecordingSessionEvents::new());
        let auth = HttpAuthApi::new(&self.base_url, self.request_timeout)
            .expect("auth client should build");
        let session = Arc::new(SessionContext::new(
            Arc::clone(&storage) as Arc<dyn TokenStorage>,
            Arc::new(auth),
            Arc::clone(&events) as Arc<dyn SessionEvents>,
        ));
        session.initialize().await;
        if let Some(pair) = self.pair {
            session.begin_session(pair).await;
        }

        let health = Arc::new(HealthMonitor::new());
        let pipeline =
            RequestPipeline::new(config.clone(), Arc::clone(&session), Arc::clone(&health))
                .expect("pipeline should build");

        TestHarness { pipeline, session, health, events, storage, config }
    }
}
