//! Backend for Google's Gemini `generateContent` API.
//!
//! [`GeminiBackend`] is the schema-native provider: the translated
//! [`Dialect::Strict`] schema and the response mime type travel in
//! `generationConfig`, and the provider enforces them.
//!
//! Endpoint: `/v1beta/models/{model}:generateContent`.
//!
//! Gemma models served through the same API reject `systemInstruction`.
//! For those models the instruction is folded into the prompt body as a
//! delimited block instead. Callers never see the difference.

use super::{counter, send_json, Backend, GenerationRequest, GenerationResult, TokenUsage};
use crate::error::{ProviderCause, Result};
use crate::schema::{translate, Dialect};
use crate::stage::JSON_MIME_TYPE;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const SYSTEM_BLOCK_OPEN: &str = "[SYSTEM INSTRUCTIONS]";
const SYSTEM_BLOCK_CLOSE: &str = "[END SYSTEM INSTRUCTIONS]";

/// Backend for the Gemini API.
///
/// # Example
///
/// ```
/// use codeshift::backend::GeminiBackend;
/// use secrecy::SecretString;
///
/// let backend = GeminiBackend::new(
///     reqwest::Client::new(),
///     SecretString::from("AIza...".to_string()),
/// );
/// ```
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(client: Client, api_key: SecretString) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    /// Point the backend at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether the model belongs to the family that rejects `systemInstruction`.
    fn folds_system_instruction(model: &str) -> bool {
        model.to_ascii_lowercase().contains("gemma")
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            model.trim_start_matches("models/")
        )
    }

    /// Build the request body for `:generateContent`.
    fn build_body(request: &GenerationRequest) -> Value {
        let fold = Self::folds_system_instruction(&request.model);

        let prompt = match request.system() {
            Some(sys) if fold => format!(
                "{}\n{}\n{}\n\n{}",
                SYSTEM_BLOCK_OPEN, sys, SYSTEM_BLOCK_CLOSE, request.prompt
            ),
            _ => request.prompt.clone(),
        };

        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });

        if let Some(sys) = request.system() {
            if !fold {
                body["systemInstruction"] = json!({"parts": [{"text": sys}]});
            }
        }

        let mut generation = Map::new();
        if let Some(ref mime) = request.response_mime_type {
            generation.insert("responseMimeType".into(), json!(mime));
        }
        if let Some(ref schema) = request.response_schema {
            // responseSchema is only honored together with a JSON mime type.
            generation
                .entry("responseMimeType")
                .or_insert_with(|| json!(JSON_MIME_TYPE));
            generation.insert("responseSchema".into(), translate(schema, Dialect::Strict));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        body
    }

    /// Extract text and usage from a `generateContent` response.
    fn parse_response(model: &str, json_resp: &Value) -> Result<GenerationResult> {
        let malformed = |msg: String| {
            PipelineError::provider("gemini", model, ProviderCause::MalformedResponse(msg))
        };

        let candidate = json_resp
            .get("candidates")
            .and_then(|c| c.get(0))
            .ok_or_else(|| {
                let reason = json_resp
                    .pointer("/promptFeedback/blockReason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("none given");
                malformed(format!("no candidates returned (block reason: {})", reason))
            })?;

        // Thought-summary parts are flagged and never part of the answer.
        let text: String = candidate
            .pointer("/content/parts")
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter(|part| part.get("thought").and_then(|t| t.as_bool()) != Some(true))
                    .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            let finish = candidate
                .get("finishReason")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            return Err(malformed(format!(
                "candidate has no text (finish reason: {})",
                finish
            )));
        }

        let usage = json_resp.get("usageMetadata").map(|meta| {
            TokenUsage::from_counts(
                counter(meta, "promptTokenCount"),
                counter(meta, "candidatesTokenCount"),
                counter(meta, "totalTokenCount"),
            )
        });

        Ok(GenerationResult { text, usage })
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn generate_content(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let body = Self::build_body(request);
        let url = self.endpoint(&request.model);

        tracing::debug!(
            model = %request.model,
            folded_system = Self::folds_system_instruction(&request.model),
            has_schema = request.response_schema.is_some(),
            "sending generateContent request"
        );

        let http = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body);

        let json_resp = send_json(self.name(), &request.model, http).await?;
        Self::parse_response(&request.model, &json_resp)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn test_request(model: &str) -> GenerationRequest {
        GenerationRequest::new(model, "Convert this script.")
            .with_system("You are a migration expert.")
    }

    #[test]
    fn test_gemini_body_system_instruction() {
        let body = GeminiBackend::build_body(&test_request("gemini-2.5-flash"));

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Convert this script.");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a migration expert."
        );
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_gemma_folds_system_into_prompt() {
        let body = GeminiBackend::build_body(&test_request("gemma-3-27b-it"));

        assert!(body.get("systemInstruction").is_none());
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with(SYSTEM_BLOCK_OPEN));
        assert!(text.contains("You are a migration expert."));
        assert!(text.ends_with("Convert this script."));
    }

    #[test]
    fn test_gemma_detection_is_case_insensitive() {
        assert!(GeminiBackend::folds_system_instruction("models/Gemma-2-9B"));
        assert!(!GeminiBackend::folds_system_instruction("gemini-2.5-pro"));
    }

    #[test]
    fn test_schema_goes_into_generation_config() {
        let schema = Schema::object([("summary", Schema::string())]).require_all();
        let request = GenerationRequest::new("gemini-2.5-flash", "p").with_schema(schema);
        let body = GeminiBackend::build_body(&request);

        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["type"], "OBJECT");
        assert_eq!(config["responseSchema"]["properties"]["summary"]["type"], "STRING");
    }

    #[test]
    fn test_mime_type_without_schema() {
        let request = GenerationRequest::new("gemini-2.5-flash", "p").with_mime_type("text/plain");
        let body = GeminiBackend::build_body(&request);
        assert_eq!(body["generationConfig"]["responseMimeType"], "text/plain");
        assert!(body["generationConfig"].get("responseSchema").is_none());
    }

    #[test]
    fn test_endpoint_strips_models_prefix() {
        let backend = GeminiBackend::new(Client::new(), SecretString::from("k".to_string()))
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            backend.endpoint("models/gemini-2.5-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_parse_response_text_and_usage() {
        let resp = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "{\"a\": "},
                    {"text": "1}"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 40,
                "candidatesTokenCount": 8,
                "totalTokenCount": 48
            }
        });
        let result = GeminiBackend::parse_response("gemini-2.5-flash", &resp).unwrap();
        assert_eq!(result.text, "{\"a\": 1}");
        assert_eq!(result.usage, Some(TokenUsage::new(40, 8, 48)));
    }

    #[test]
    fn test_parse_response_missing_usage_is_unknown() {
        let resp = json!({"candidates": [{"content": {"parts": [{"text": "hi"}]}}]});
        let result = GeminiBackend::parse_response("gemini-2.5-flash", &resp).unwrap();
        assert!(result.usage.is_none());
    }

    #[test]
    fn test_parse_response_blocked_prompt() {
        let resp = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiBackend::parse_response("gemini-2.5-flash", &resp).unwrap_err();
        match err {
            PipelineError::Provider { provider, cause, .. } => {
                assert_eq!(provider, "gemini");
                assert!(matches!(
                    cause,
                    ProviderCause::MalformedResponse(ref m) if m.contains("SAFETY")
                ));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let backend = GeminiBackend::new(
            Client::new(),
            SecretString::from("AIzaSecret123".to_string()),
        );
        let debug_output = format!("{:?}", backend);
        assert!(!debug_output.contains("AIzaSecret123"));
        assert!(debug_output.contains("***"));
    }
}
