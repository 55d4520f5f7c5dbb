//! Pipeline configuration: which provider and model each stage uses.
//!
//! Built in code, or loaded from JSON (and YAML with the `yaml` feature).
//! Credentials are never part of this file; they come from a
//! [`CredentialStore`](crate::credentials::CredentialStore).
//!
//! ```json
//! {
//!   "stages": {
//!     "analyst":   {"provider": "gemini", "model": "gemini-2.5-flash"},
//!     "coder":     {"provider": "openrouter", "model": "anthropic/claude-sonnet-4"}
//!   },
//!   "providers": {
//!     "openrouter": {"timeout_secs": 300}
//!   }
//! }
//! ```

use crate::backend::ProviderId;
use crate::error::Result;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Model used for any stage the configuration does not mention.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Request timeout used when a provider has none configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider and model for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTarget {
    pub provider: ProviderId,
    pub model: String,
}

impl StageTarget {
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl Default for StageTarget {
    fn default() -> Self {
        Self::new(ProviderId::Gemini, DEFAULT_MODEL)
    }
}

/// Connection settings for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Override the provider's default API root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds. Default: 120.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Stage → target map plus per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stages: BTreeMap<Stage, StageTarget>,

    #[serde(default)]
    pub providers: BTreeMap<ProviderId, ProviderSettings>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every stage to the same provider and model.
    pub fn uniform(provider: ProviderId, model: impl Into<String>) -> Self {
        let model = model.into();
        let stages = Stage::ALL
            .iter()
            .map(|s| (*s, StageTarget::new(provider, model.clone())))
            .collect();
        Self {
            stages,
            providers: BTreeMap::new(),
        }
    }

    /// Set the target for one stage.
    pub fn with_stage(mut self, stage: Stage, target: StageTarget) -> Self {
        self.stages.insert(stage, target);
        self
    }

    /// Set connection settings for one provider.
    pub fn with_provider(mut self, provider: ProviderId, settings: ProviderSettings) -> Self {
        self.providers.insert(provider, settings);
        self
    }

    /// The target for `stage`, falling back to [`StageTarget::default`].
    pub fn target(&self, stage: Stage) -> StageTarget {
        self.stages.get(&stage).cloned().unwrap_or_default()
    }

    /// Settings for `provider`, falling back to defaults.
    pub fn provider_settings(&self, provider: ProviderId) -> ProviderSettings {
        self.providers.get(&provider).cloned().unwrap_or_default()
    }

    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a YAML configuration document.
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| crate::PipelineError::Configuration(format!("invalid YAML config: {}", e)))
    }
}
