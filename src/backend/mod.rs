//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over LLM providers, translating between
//! the normalized [`GenerationRequest`]/[`GenerationResult`] types and
//! provider-specific HTTP APIs. Built-in implementations:
//! [`GeminiBackend`], [`OpenAiBackend`], and [`MockBackend`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! StageRunner ──► GenerationRequest ──► Backend::generate_content() ──► GenerationResult
//!                                                │
//!                                    ┌───────────┴───────────┐
//!                               GeminiBackend           OpenAiBackend
//!                       :generateContent          /v1/chat/completions
//!                       native responseSchema     schema folded into system prompt
//! ```

pub mod factory;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use factory::{BackendFactory, GeminiFactory, OpenRouterFactory, ProviderRegistry};
pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MockFactory};
pub use openai::OpenAiBackend;

use crate::error::{ProviderCause, Result};
use crate::schema::Schema;
use crate::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Logical provider identifier, as used in stage configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Google Gemini `generateContent` API (schema-native).
    Gemini,
    /// OpenRouter, or any other OpenAI-compatible chat-completions API.
    OpenRouter,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenRouter => "openrouter",
        }
    }

    /// Environment variable [`EnvCredentialStore`](crate::credentials::EnvCredentialStore)
    /// reads this provider's key from.
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "GEMINI_API_KEY",
            ProviderId::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "openrouter" => Ok(ProviderId::OpenRouter),
            other => Err(PipelineError::Configuration(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

/// A normalized, provider-agnostic generation request.
///
/// Built once by a stage runner and never modified afterwards.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier (e.g. `"gemini-2.5-flash"`, `"openai/gpt-4o"`).
    pub model: String,

    /// Optional system instruction.
    pub system_instruction: Option<String>,

    /// The user prompt text.
    pub prompt: String,

    /// Structured-output schema, translated by each backend into its dialect.
    pub response_schema: Option<Schema>,

    /// Requested response mime type (e.g. `"application/json"`).
    pub response_mime_type: Option<String>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            prompt: prompt.into(),
            response_schema: None,
            response_mime_type: None,
        }
    }

    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.response_mime_type = Some(mime.into());
        self
    }

    /// The system instruction, if set and non-blank.
    pub(crate) fn system(&self) -> Option<&str> {
        self.system_instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Whether the caller asked for structured output.
    pub fn wants_json(&self) -> bool {
        self.response_schema.is_some()
            || self
                .response_mime_type
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(crate::stage::JSON_MIME_TYPE))
    }
}

/// Token accounting in canonical form.
///
/// If a provider omits its usage block entirely the result carries no
/// `TokenUsage` at all. If the block is present, a missing counter is 0 and a
/// missing total is `input + output`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64, total: u64) -> Self {
        Self {
            input,
            output,
            total,
        }
    }

    /// Build from provider counters, applying the missing-counter convention.
    pub fn from_counts(input: Option<u64>, output: Option<u64>, total: Option<u64>) -> Self {
        let input = input.unwrap_or(0);
        let output = output.unwrap_or(0);
        Self {
            input,
            output,
            total: total.unwrap_or(input + output),
        }
    }
}

/// A normalized generation result.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The generated text content.
    pub text: String,

    /// Token usage, `None` when the provider did not report any.
    pub usage: Option<TokenUsage>,
}

/// Abstraction over LLM providers.
///
/// Implementors translate a [`GenerationRequest`] into the provider's HTTP
/// API and hide every provider quirk behind this one call. Any transport,
/// auth, or malformed-response condition is reported as
/// [`PipelineError::Provider`].
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one request/response round trip.
    async fn generate_content(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Send a prepared request and decode the JSON body, mapping every failure
/// to a [`PipelineError::Provider`].
pub(crate) async fn send_json(
    provider: &str,
    model: &str,
    request: reqwest::RequestBuilder,
) -> Result<Value> {
    let fail = |cause| PipelineError::provider(provider, model, cause);

    let resp = request
        .send()
        .await
        .map_err(|e| fail(ProviderCause::Transport(e.to_string())))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| fail(ProviderCause::Transport(e.to_string())))?;

    if !status.is_success() {
        return Err(fail(ProviderCause::Status {
            status: status.as_u16(),
            body,
        }));
    }

    serde_json::from_str(&body).map_err(|e| {
        fail(ProviderCause::MalformedResponse(format!(
            "response body is not JSON: {}",
            e
        )))
    })
}

/// Read an unsigned counter from a JSON object field.
pub(crate) fn counter(value: &Value, field: &str) -> Option<u64> {
    value.get(field).and_then(|v| v.as_u64())
}
