//! Provider factories and the registry that resolves a stage's backend.
//!
//! Each [`ProviderId`] maps to a [`BackendFactory`]. Resolving a provider
//! looks up its credential (an explicit override first, then the
//! [`CredentialStore`]) and asks the factory for a ready [`Backend`].
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults(Arc::new(EnvCredentialStore));
//! let backend = registry.resolve(ProviderId::Gemini, &ProviderSettings::default(), None)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use super::{Backend, GeminiBackend, OpenAiBackend, ProviderId};
use crate::config::ProviderSettings;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::PipelineError;

/// Creates backends for one provider.
pub trait BackendFactory: Send + Sync {
    /// The provider this factory serves.
    fn provider(&self) -> ProviderId;

    /// Build a backend using `credential` and the provider's `settings`.
    fn create(&self, credential: SecretString, settings: &ProviderSettings)
        -> Result<Arc<dyn Backend>>;
}

fn http_client(provider: ProviderId, settings: &ProviderSettings) -> Result<Client> {
    Client::builder()
        .timeout(settings.timeout())
        .build()
        .map_err(|e| {
            PipelineError::Configuration(format!(
                "failed to build HTTP client for {}: {}",
                provider, e
            ))
        })
}

/// Factory for [`GeminiBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiFactory;

impl BackendFactory for GeminiFactory {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn create(
        &self,
        credential: SecretString,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn Backend>> {
        let mut backend = GeminiBackend::new(http_client(self.provider(), settings)?, credential);
        if let Some(ref url) = settings.base_url {
            backend = backend.with_base_url(url.clone());
        }
        Ok(Arc::new(backend))
    }
}

/// Factory for [`OpenAiBackend`] pointed at OpenRouter (or `base_url`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRouterFactory;

impl BackendFactory for OpenRouterFactory {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenRouter
    }

    fn create(
        &self,
        credential: SecretString,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn Backend>> {
        let mut backend = OpenAiBackend::new(http_client(self.provider(), settings)?, credential);
        if let Some(ref url) = settings.base_url {
            backend = backend.with_base_url(url.clone());
        }
        Ok(Arc::new(backend))
    }
}

/// Registry of provider factories plus the credential source.
pub struct ProviderRegistry {
    factories: BTreeMap<ProviderId, Arc<dyn BackendFactory>>,
    credentials: Arc<dyn CredentialStore>,
}

impl ProviderRegistry {
    /// An empty registry reading credentials from `credentials`.
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            factories: BTreeMap::new(),
            credentials,
        }
    }

    /// A registry with the Gemini and OpenRouter factories registered.
    pub fn with_defaults(credentials: Arc<dyn CredentialStore>) -> Self {
        let mut registry = Self::new(credentials);
        registry.register(Arc::new(GeminiFactory));
        registry.register(Arc::new(OpenRouterFactory));
        registry
    }

    /// Register a factory, replacing any previous one for the same provider.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(factory.provider(), factory);
    }

    /// Providers with a registered factory.
    pub fn available(&self) -> Vec<ProviderId> {
        self.factories.keys().copied().collect()
    }

    /// Build a backend for `provider`.
    ///
    /// An explicit `credential` wins over the store. No credential from
    /// either source, or no factory for the provider, is a
    /// [`PipelineError::Configuration`].
    pub fn resolve(
        &self,
        provider: ProviderId,
        settings: &ProviderSettings,
        credential: Option<&SecretString>,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self.factories.get(&provider).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "no factory registered for provider '{}'. Available: {:?}",
                provider,
                self.available()
            ))
        })?;

        let key = match credential {
            Some(explicit) => SecretString::from(explicit.expose_secret().to_string()),
            None => self.credentials.get(provider).ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "no API key configured for provider '{}' (set {} or store one)",
                    provider,
                    provider.env_var()
                ))
            })?,
        };

        if key.expose_secret().trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "API key for provider '{}' is empty",
                provider
            )));
        }

        factory.create(key, settings)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::credentials::MemoryCredentialStore;
    use parking_lot::Mutex;

    /// Records the credential it was handed and returns a fixed mock.
    struct RecordingFactory {
        seen: Mutex<Option<String>>,
    }

    impl BackendFactory for RecordingFactory {
        fn provider(&self) -> ProviderId {
            ProviderId::OpenRouter
        }

        fn create(
            &self,
            credential: SecretString,
            _settings: &ProviderSettings,
        ) -> Result<Arc<dyn Backend>> {
            *self.seen.lock() = Some(credential.expose_secret().to_string());
            Ok(Arc::new(MockBackend::fixed("ok")))
        }
    }

    fn recording_registry(
        store: Arc<MemoryCredentialStore>,
    ) -> (ProviderRegistry, Arc<RecordingFactory>) {
        let factory = Arc::new(RecordingFactory {
            seen: Mutex::new(None),
        });
        let mut registry = ProviderRegistry::new(store);
        registry.register(factory.clone());
        (registry, factory)
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let registry = ProviderRegistry::with_defaults(Arc::new(MemoryCredentialStore::new()));
        let err = registry
            .resolve(ProviderId::Gemini, &ProviderSettings::default(), None)
            .err()
            .expect("expected a configuration error");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_unregistered_provider_is_configuration_error() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(ProviderId::Gemini, "AIza-key");
        let registry = ProviderRegistry::new(store);
        let err = registry
            .resolve(ProviderId::Gemini, &ProviderSettings::default(), None)
            .err()
            .expect("expected a configuration error");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_store_credential_is_used() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(ProviderId::OpenRouter, "sk-or-stored");
        let (registry, factory) = recording_registry(store);

        registry
            .resolve(ProviderId::OpenRouter, &ProviderSettings::default(), None)
            .unwrap();
        assert_eq!(factory.seen.lock().as_deref(), Some("sk-or-stored"));
    }

    #[test]
    fn test_explicit_credential_overrides_store() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(ProviderId::OpenRouter, "sk-or-stored");
        let (registry, factory) = recording_registry(store);

        let explicit = SecretString::from("sk-or-explicit".to_string());
        registry
            .resolve(ProviderId::OpenRouter, &ProviderSettings::default(), Some(&explicit))
            .unwrap();
        assert_eq!(factory.seen.lock().as_deref(), Some("sk-or-explicit"));
    }

    #[test]
    fn test_blank_credential_rejected() {
        let (registry, _) = recording_registry(Arc::new(MemoryCredentialStore::new()));
        let blank = SecretString::from("  ".to_string());
        let err = registry
            .resolve(ProviderId::OpenRouter, &ProviderSettings::default(), Some(&blank))
            .err()
            .expect("expected a configuration error");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_default_factories_build_backends() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(ProviderId::Gemini, "AIza-key");
        store.set(ProviderId::OpenRouter, "sk-or-key");
        let registry = ProviderRegistry::with_defaults(store);

        let settings = ProviderSettings {
            base_url: Some("http://localhost:9999".into()),
            timeout_secs: Some(5),
        };
        let gemini = registry.resolve(ProviderId::Gemini, &settings, None).unwrap();
        assert_eq!(gemini.name(), "gemini");
        let openrouter = registry
            .resolve(ProviderId::OpenRouter, &ProviderSettings::default(), None)
            .unwrap();
        assert_eq!(openrouter.name(), "openrouter");
        assert_eq!(registry.available(), vec![ProviderId::Gemini, ProviderId::OpenRouter]);
    }
}
