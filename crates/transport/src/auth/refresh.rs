//! Refresh coordinator
//!
//! Single-flight wrapper around the auth service's refresh call. However
//! many callers observe a 401 concurrently, exactly one refresh runs; all
//! waiters resolve with the token (or classified failure) of that same
//! operation, never a later one.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::store::TokenStore;
use super::traits::AuthApi;
use super::types::RefreshError;

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// Single-flight coordinator for token refresh.
pub struct RefreshCoordinator {
    auth: Arc<dyn AuthApi>,
    tokens: Arc<TokenStore>,
    inflight: Mutex<Option<SharedRefresh>>,
}

impl RefreshCoordinator {
    /// Create a coordinator over the auth collaborator and token store.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthApi>, tokens: Arc<TokenStore>) -> Self {
        Self { auth, tokens, inflight: Mutex::new(None) }
    }

    /// Reactive path: refresh now, joining any in-flight operation.
    ///
    /// Returns the access token produced by the refresh the caller awaited.
    pub async fn refresh_now(&self) -> Result<String, RefreshError> {
        let operation = {
            let mut slot = self.inflight.lock().await;
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight token refresh");
                existing.clone()
            } else {
                let auth = Arc::clone(&self.auth);
                let tokens = Arc::clone(&self.tokens);
                let created: SharedRefresh = run_refresh(auth, tokens).boxed().shared();
                *slot = Some(created.clone());
                created
            }
        };

        let result = operation.clone().await;

        // Drop the resolved operation so the next failure starts a fresh one.
        let mut slot = self.inflight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&operation)) {
            *slot = None;
        }

        result
    }

    /// Proactive path: refresh only when the access token expires within
    /// the buffer window.
    ///
    /// Invoked opportunistically (e.g. on app foreground) with the
    /// configured buffer, see [`crate::config::TransportConfig::refresh_buffer`].
    /// It joins the same single-flight operation as the reactive path but
    /// holds no lock over the request pipeline, so unrelated requests are
    /// never serialized behind the expiry check.
    pub async fn ensure_fresh_token(&self, buffer: Duration) -> Result<Option<String>, RefreshError> {
        let Some(pair) = self.tokens.current_pair().await else {
            return Ok(None);
        };

        let buffer_seconds = i64::try_from(buffer.as_secs()).unwrap_or(i64::MAX);
        if !pair.is_expiring(buffer_seconds) {
            return Ok(Some(pair.access_token));
        }

        debug!("access token expiring within buffer; refreshing proactively");
        self.refresh_now().await.map(Some)
    }
}

async fn run_refresh(auth: Arc<dyn AuthApi>, tokens: Arc<TokenStore>) -> Result<String, RefreshError> {
    let Some(refresh_token) = tokens.refresh_token().await else {
        warn!("refresh requested without a stored refresh token");
        return Err(RefreshError::NoRefreshToken);
    };

    match auth.refresh(&refresh_token).await {
        Ok(response) => {
            let pair: super::types::TokenPair = response.into();
            let access = pair.access_token.clone();
            tokens.set_tokens(pair).await;
            info!("access token refreshed");
            Ok(access)
        }
        Err(error) => {
            warn!(%error, "token refresh failed");
            Err(error)
        }
    }
}
