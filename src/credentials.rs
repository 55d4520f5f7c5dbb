//! Read-only access to stored provider credentials.
//!
//! The pipeline never writes credentials. It reads them through the narrow
//! [`CredentialStore`] accessor, so the storage medium (environment, OS
//! keychain, settings file) stays the embedder's choice. Values are held as
//! [`SecretString`] and cannot appear in `Debug` output.

use crate::backend::ProviderId;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Process-wide credential lookup.
pub trait CredentialStore: Send + Sync {
    /// The stored credential for `provider`, if any.
    fn get(&self, provider: ProviderId) -> Option<SecretString>;
}

/// Reads credentials from environment variables ([`ProviderId::env_var`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn get(&self, provider: ProviderId) -> Option<SecretString> {
        std::env::var(provider.env_var())
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::from)
    }
}

/// In-memory store, written by a settings layer and read by the pipeline.
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<ProviderId, SecretString>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the credential for `provider`.
    pub fn set(&self, provider: ProviderId, key: impl Into<String>) {
        self.keys
            .write()
            .insert(provider, SecretString::from(key.into()));
    }

    /// Forget the credential for `provider`.
    pub fn remove(&self, provider: ProviderId) {
        self.keys.write().remove(&provider);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider: ProviderId) -> Option<SecretString> {
        self.keys
            .read()
            .get(&provider)
            .map(|k| SecretString::from(k.expose_secret().to_string()))
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("providers", &self.keys.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(store.get(ProviderId::Gemini).is_none());

        store.set(ProviderId::Gemini, "AIza-test");
        let key = store.get(ProviderId::Gemini).expect("stored key");
        assert_eq!(key.expose_secret(), "AIza-test");
        assert!(store.get(ProviderId::OpenRouter).is_none());

        store.remove(ProviderId::Gemini);
        assert!(store.get(ProviderId::Gemini).is_none());
    }

    #[test]
    fn test_memory_store_debug_hides_values() {
        let store = MemoryCredentialStore::new();
        store.set(ProviderId::OpenRouter, "sk-or-secret");
        let debug_output = format!("{:?}", store);
        assert!(debug_output.contains("OpenRouter"));
        assert!(!debug_output.contains("sk-or-secret"));
    }
}
