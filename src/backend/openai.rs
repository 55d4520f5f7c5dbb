//! Backend for OpenAI-compatible chat-completions APIs.
//!
//! [`OpenAiBackend`] defaults to OpenRouter but covers any
//! `/v1/chat/completions` endpoint: OpenAI, vLLM, llama.cpp server,
//! LM Studio, Together AI, Groq, and so on.
//!
//! Many of the models behind these endpoints reject `response_format`
//! with a 400, so no native JSON flag is ever sent. Structured intent is
//! written into the system message instead: a directive demanding raw JSON,
//! followed by the [`Dialect::Loose`] rendering of the schema.

use super::{counter, send_json, Backend, GenerationRequest, GenerationResult, TokenUsage};
use crate::error::{ProviderCause, Result};
use crate::schema::{translate, Dialect};
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

/// Default API root (OpenRouter).
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api";

const JSON_DIRECTIVE: &str = "Respond with a single raw JSON document only. \
Do not wrap it in markdown code fences and do not add any text before or after it.";

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use codeshift::backend::OpenAiBackend;
/// use secrecy::SecretString;
///
/// let backend = OpenAiBackend::new(
///     reqwest::Client::new(),
///     SecretString::from("sk-or-...".to_string()),
/// )
/// .with_base_url("http://localhost:1234");
/// ```
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = self.api_key.expose_secret();
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &if key.chars().count() > 6 {
                    format!("{}***", key.chars().take(6).collect::<String>())
                } else {
                    "***".to_string()
                },
            )
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new(client: Client, api_key: SecretString) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    /// Point the backend at a different API root.
    ///
    /// A trailing `/v1` is stripped so that both `https://host` and
    /// `https://host/v1` work.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        let trimmed = url.trim_end_matches('/');
        self.base_url = trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string();
        self
    }

    /// Compose the system message, appending the JSON directive and schema
    /// when structured output was requested.
    fn system_message(request: &GenerationRequest) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(sys) = request.system() {
            parts.push(sys.to_string());
        }

        if request.wants_json() {
            let mut directive = JSON_DIRECTIVE.to_string();
            if let Some(ref schema) = request.response_schema {
                let rendered = serde_json::to_string_pretty(&translate(schema, Dialect::Loose))
                    .unwrap_or_default();
                directive.push_str("\nThe JSON must conform to this schema:\n");
                directive.push_str(&rendered);
            }
            parts.push(directive);
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Build the messages array for the request.
    fn build_messages(request: &GenerationRequest) -> Vec<Value> {
        let mut messages = Vec::new();
        if let Some(sys) = Self::system_message(request) {
            messages.push(json!({"role": "system", "content": sys}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        messages
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(request: &GenerationRequest) -> Value {
        // Deliberately no `response_format`, see module docs.
        json!({
            "model": request.model,
            "messages": Self::build_messages(request),
            "stream": false,
        })
    }

    /// Extract text and usage from a chat-completions response.
    fn parse_response(model: &str, json_resp: &Value) -> Result<GenerationResult> {
        let malformed = |msg: String| {
            PipelineError::provider("openrouter", model, ProviderCause::MalformedResponse(msg))
        };

        // OpenRouter reports some upstream failures inside a 200 response.
        if let Some(err) = json_resp.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            let status = err
                .get("code")
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(502);
            return Err(PipelineError::provider(
                "openrouter",
                model,
                ProviderCause::Status {
                    status,
                    body: message,
                },
            ));
        }

        let text = json_resp
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| malformed("missing choices[0].message.content".to_string()))?
            .to_string();

        let usage = json_resp.get("usage").map(|u| {
            TokenUsage::from_counts(
                counter(u, "prompt_tokens"),
                counter(u, "completion_tokens"),
                counter(u, "total_tokens"),
            )
        });

        Ok(GenerationResult { text, usage })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn generate_content(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(request);

        tracing::debug!(
            model = %request.model,
            wants_json = request.wants_json(),
            "sending chat completions request"
        );

        let http = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body);

        let json_resp = send_json(self.name(), &request.model, http).await?;
        Self::parse_response(&request.model, &json_resp)
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}
