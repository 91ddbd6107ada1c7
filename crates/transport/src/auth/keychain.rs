//! Platform keychain storage
//!
//! [`TokenStorage`] implementation backed by the OS credential store via the
//! `keyring` crate (macOS Keychain, Windows Credential Manager, Linux
//! Secret Service). Plain and secure variants map to the same backend but
//! use distinct key namespaces so remember-me values never collide with
//! session credentials.

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use super::traits::TokenStorage;

const SECURE_PREFIX: &str = "secure.";

/// Keychain-backed durable storage namespaced by service name.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    /// Create storage under the given keychain service name
    /// (e.g. `"Stride"`).
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    fn entry(&self, key: &str) -> Result<Entry, String> {
        Entry::new(&self.service, key).map_err(|e| e.to_string())
    }

    fn read(&self, key: &str) -> Result<Option<String>, String> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(other) => Err(other.to_string()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), String> {
        self.entry(key)?.set_password(value).map_err(|e| e.to_string())
    }

    fn delete(&self, key: &str) -> Result<(), String> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(other) => Err(other.to_string()),
        }
    }
}

#[async_trait]
impl TokenStorage for KeyringStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        self.read(key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        debug!(key, "storing keychain value");
        self.write(key, value)
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        self.delete(key)
    }

    async fn get_secure(&self, key: &str) -> Result<Option<String>, String> {
        self.read(&format!("{SECURE_PREFIX}{key}"))
    }

    async fn set_secure(&self, key: &str, value: &str) -> Result<(), String> {
        debug!(key, "storing secure keychain value");
        self.write(&format!("{SECURE_PREFIX}{key}"), value)
    }

    async fn remove_secure(&self, key: &str) -> Result<(), String> {
        self.delete(&format!("{SECURE_PREFIX}{key}"))
    }
}
