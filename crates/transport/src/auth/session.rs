//! Session context
//!
//! Process-scoped bundle of the logout gate, the token store, the refresh
//! coordinator and the injected session-management hook. Constructed once
//! at startup and injected into both transports, so tests get isolated
//! instances instead of hidden globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use super::refresh::RefreshCoordinator;
use super::store::TokenStore;
use super::traits::{AuthApi, SessionEvents, TokenStorage};
use super::types::{LogoutReason, TokenPair};

/// Process-scoped session state shared by both transports.
pub struct SessionContext {
    tokens: Arc<TokenStore>,
    refresh: RefreshCoordinator,
    events: Arc<dyn SessionEvents>,
    logout_gate: AtomicBool,
}

impl SessionContext {
    /// Wire up the session from its injected collaborators.
    #[must_use]
    pub fn new(
        storage: Arc<dyn TokenStorage>,
        auth: Arc<dyn AuthApi>,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(storage));
        let refresh = RefreshCoordinator::new(auth, Arc::clone(&tokens));
        Self { tokens, refresh, events, logout_gate: AtomicBool::new(false) }
    }

    /// Load persisted credentials; called once before the first request.
    ///
    /// A valid persisted token also re-opens the gate after an app restart.
    pub async fn initialize(&self) {
        self.tokens.initialize_cache().await;
        if self.tokens.is_authenticated().await {
            self.logout_gate.store(false, Ordering::SeqCst);
        }
    }

    /// The token store.
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// The refresh coordinator.
    #[must_use]
    pub fn refresh(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Whether the logout gate is set.
    ///
    /// While set, every non-exempt operation fails fast with
    /// `AuthRequired` without touching the network.
    #[must_use]
    pub fn is_logging_out(&self) -> bool {
        self.logout_gate.load(Ordering::SeqCst)
    }

    /// Begin a new session after login: store the pair, open the gate.
    pub async fn begin_session(&self, pair: TokenPair) {
        self.tokens.set_tokens(pair).await;
        self.logout_gate.store(false, Ordering::SeqCst);
        info!("session started");
    }

    /// User-initiated logout: set the gate first, then clear credentials.
    pub async fn begin_logout(&self) {
        self.logout_gate.store(true, Ordering::SeqCst);
        self.tokens.clear_tokens().await;
        info!("logout started");
    }

    /// Terminal identity failure: gate, clear credentials, notify the
    /// session-management collaborator.
    ///
    /// The gate transition deduplicates notification: concurrent waiters of
    /// one failed refresh all call this, but `handle_auto_logout` fires
    /// exactly once per session.
    pub async fn terminate(&self, reason: LogoutReason) {
        if self.logout_gate.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason = reason.as_str(), "terminating session");
        self.tokens.clear_tokens().await;
        self.events.handle_auto_logout(reason).await;
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the session context.
    use std::sync::atomic::Ordering as AtomicOrdering;

    use super::*;
    use crate::testing::{CountingAuthApi, MemoryStorage, RecordingSessionEvents};

    fn context(events: Arc<RecordingSessionEvents>) -> SessionContext {
        SessionContext::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(CountingAuthApi::succeeding("fresh")),
            events,
        )
    }

    #[tokio::test]
    async fn begin_session_opens_the_gate() {
        let events = Arc::new(RecordingSessionEvents::new());
        let session = context(Arc::clone(&events));
        session.initialize().await;

        session.begin_logout().await;
        assert!(session.is_logging_out());

        session.begin_session(TokenPair::new("a".into(), "r".into(), Some(3600))).await;
        assert!(!session.is_logging_out());
        assert!(session.tokens().is_authenticated().await);
    }

    #[tokio::test]
    async fn logout_sets_gate_before_clearing() {
        let events = Arc::new(RecordingSessionEvents::new());
        let session = context(Arc::clone(&events));
        session.initialize().await;
        session.begin_session(TokenPair::new("a".into(), "r".into(), Some(3600))).await;

        session.begin_logout().await;

        assert!(session.is_logging_out());
        assert!(!session.tokens().is_authenticated().await);
        // User-initiated logout never fires the auto-logout hook.
        assert!(events.reasons().is_empty());
    }

    #[tokio::test]
    async fn terminate_notifies_exactly_once() {
        let events = Arc::new(RecordingSessionEvents::new());
        let session = Arc::new(context(Arc::clone(&events)));
        session.initialize().await;
        session.begin_session(TokenPair::new("a".into(), "r".into(), Some(3600))).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move {
                session.terminate(LogoutReason::NotFound).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(events.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(events.reasons(), vec![LogoutReason::NotFound]);
        assert!(session.is_logging_out());
    }

    #[tokio::test]
    async fn restart_with_persisted_tokens_reopens_gate() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed("auth.access_token", "persisted");
        storage.seed("auth.refresh_token", "persisted-refresh");

        let events = Arc::new(RecordingSessionEvents::new());
        let session = SessionContext::new(
            storage,
            Arc::new(CountingAuthApi::succeeding("fresh")),
            events,
        );
        session.initialize().await;

        assert!(!session.is_logging_out());
        assert!(session.tokens().is_authenticated().await);
    }
}
