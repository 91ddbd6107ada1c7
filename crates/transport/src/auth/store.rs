//! Token store
//!
//! Holds the access/refresh pair in memory with durable storage behind it.
//! The in-memory mirror is the source of truth once populated; durable
//! storage only seeds it at process start and records updates for the next
//! launch. Durable failures are logged and swallowed so a broken keychain
//! never takes down an otherwise healthy session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::traits::TokenStorage;
use super::types::TokenPair;

const ACCESS_TOKEN_KEY: &str = "auth.access_token";
const REFRESH_TOKEN_KEY: &str = "auth.refresh_token";
const EXPIRES_AT_KEY: &str = "auth.expires_at";

/// In-memory + durable holder of the token pair.
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    cached: RwLock<Option<TokenPair>>,
    initialized: AtomicBool,
}

impl TokenStore {
    /// Create a store over the given durable storage.
    #[must_use]
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self { storage, cached: RwLock::new(None), initialized: AtomicBool::new(false) }
    }

    /// Load the persisted pair into memory.
    ///
    /// Called once at startup, before the first request. Missing values and
    /// storage failures both leave the cache empty; the latter is logged.
    pub async fn initialize_cache(&self) {
        let pair = self.read_durable().await;
        {
            let mut cached = self.cached.write().await;
            *cached = pair;
        }
        self.initialized.store(true, Ordering::SeqCst);

        if self.cached.read().await.is_some() {
            info!("token store initialized with persisted credentials");
        } else {
            debug!("token store initialized without credentials");
        }
    }

    /// Current access token, memory-first.
    ///
    /// Falls back to a durable read only while the cache is uninitialized.
    pub async fn access_token(&self) -> Option<String> {
        self.current_pair().await.map(|pair| pair.access_token)
    }

    /// Current refresh token, memory-first.
    pub async fn refresh_token(&self) -> Option<String> {
        self.current_pair().await.map(|pair| pair.refresh_token)
    }

    /// Current pair, memory-first with the uninitialized-cache fallback.
    pub async fn current_pair(&self) -> Option<TokenPair> {
        if let Some(pair) = self.cached.read().await.clone() {
            return Some(pair);
        }
        if self.initialized.load(Ordering::SeqCst) {
            return None;
        }
        self.read_durable().await
    }

    /// Whether a credential pair is held.
    pub async fn is_authenticated(&self) -> bool {
        self.current_pair().await.is_some()
    }

    /// Store a new pair: memory synchronously, then durable.
    ///
    /// The in-memory write completes before any suspension point, so a task
    /// reading immediately after this call observes the new pair even while
    /// the durable write is still in flight.
    pub async fn set_tokens(&self, pair: TokenPair) {
        {
            let mut cached = self.cached.write().await;
            *cached = Some(pair.clone());
        }
        self.initialized.store(true, Ordering::SeqCst);
        debug!("token pair updated in memory");

        if let Err(error) = self.write_durable(&pair).await {
            warn!(%error, "failed to persist tokens; in-memory pair remains authoritative");
        }
    }

    /// Clear both memory and durable storage (idempotent).
    pub async fn clear_tokens(&self) {
        {
            let mut cached = self.cached.write().await;
            *cached = None;
        }
        self.initialized.store(true, Ordering::SeqCst);

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY] {
            if let Err(error) = self.storage.remove(key).await {
                warn!(key, %error, "failed to remove persisted token value");
            }
        }
        info!("tokens cleared");
    }

    async fn read_durable(&self) -> Option<TokenPair> {
        let access = match self.storage.get(ACCESS_TOKEN_KEY).await {
            Ok(value) => value?,
            Err(error) => {
                warn!(%error, "durable read of access token failed");
                return None;
            }
        };
        let refresh = match self.storage.get(REFRESH_TOKEN_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(error) => {
                warn!(%error, "durable read of refresh token failed");
                return None;
            }
        };
        let expires_at = match self.storage.get(EXPIRES_AT_KEY).await {
            Ok(value) => value
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            Err(error) => {
                warn!(%error, "durable read of token expiry failed");
                None
            }
        };

        Some(TokenPair { access_token: access, refresh_token: refresh, expires_at })
    }

    async fn write_durable(&self, pair: &TokenPair) -> Result<(), String> {
        self.storage.set(ACCESS_TOKEN_KEY, &pair.access_token).await?;
        self.storage.set(REFRESH_TOKEN_KEY, &pair.refresh_token).await?;
        match pair.expires_at {
            Some(expires_at) => {
                self.storage.set(EXPIRES_AT_KEY, &expires_at.timestamp().to_string()).await?;
            }
            None => self.storage.remove(EXPIRES_AT_KEY).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the token store.
    use super::*;
    use crate::testing::{FailingStorage, MemoryStorage};

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair::new(access.into(), refresh.into(), Some(3600))
    }

    #[tokio::test]
    async fn set_then_get_returns_new_value_immediately() {
        let store = TokenStore::new(Arc::new(MemoryStorage::new()));
        store.initialize_cache().await;

        store.set_tokens(pair("access-1", "refresh-1")).await;
        assert_eq!(store.access_token().await.as_deref(), Some("access-1"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn initialize_cache_loads_persisted_pair() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed(ACCESS_TOKEN_KEY, "persisted-access");
        storage.seed(REFRESH_TOKEN_KEY, "persisted-refresh");

        let store = TokenStore::new(storage);
        store.initialize_cache().await;

        assert_eq!(store.access_token().await.as_deref(), Some("persisted-access"));
        assert!(store.is_authenticated().await);
    }

    #[tokio::test]
    async fn durable_failure_does_not_evict_memory() {
        let store = TokenStore::new(Arc::new(FailingStorage));
        store.initialize_cache().await;

        store.set_tokens(pair("memory-access", "memory-refresh")).await;

        // Durable write failed, but the cache stays authoritative.
        assert_eq!(store.access_token().await.as_deref(), Some("memory-access"));
    }

    #[tokio::test]
    async fn clear_tokens_is_idempotent() {
        let store = TokenStore::new(Arc::new(MemoryStorage::new()));
        store.initialize_cache().await;
        store.set_tokens(pair("a", "r")).await;

        store.clear_tokens().await;
        store.clear_tokens().await;

        assert!(store.access_token().await.is_none());
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn uninitialized_cache_falls_back_to_durable_read() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed(ACCESS_TOKEN_KEY, "durable-access");
        storage.seed(REFRESH_TOKEN_KEY, "durable-refresh");

        // No initialize_cache() call.
        let store = TokenStore::new(storage);
        assert_eq!(store.access_token().await.as_deref(), Some("durable-access"));
    }
}
