//! Stage runners: one provider round trip per stage.
//!
//! Each runner builds its prompt from borrowed inputs, resolves the backend
//! configured for the stage, records a `prompt` entry in the run log and
//! normalizes the response into the stage's output type. The `response`
//! entry is appended only once normalization succeeds.
//!
//! Runners never log their own failures. A failed stage comes back as a
//! [`StageFailure`]; the orchestrator owns the run state and turns it into
//! the single `error` entry for the stage.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use secrecy::SecretString;

use crate::backend::{GenerationRequest, ProviderId, ProviderRegistry, TokenUsage};
use crate::config::PipelineConfig;
use crate::output_parser::{self, ExtractionStrategy, ParseError};
use crate::prompt;
use crate::run_log::{LogEntry, LogKind, RunLog};
use crate::stage::Stage;
use crate::types::{AuditReport, FileMap, Plan, SourceInput};
use crate::PipelineError;

/// The raw side of one completed provider round trip.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub provider: ProviderId,
    pub model: String,
    pub text: String,
    pub elapsed: Duration,
    pub usage: Option<TokenUsage>,
}

/// Why a stage failed, plus the raw exchange when the provider did answer.
#[derive(Debug)]
pub struct StageFailure {
    pub error: PipelineError,
    pub exchange: Option<Exchange>,
}

impl StageFailure {
    /// The `error` log entry for this failure.
    ///
    /// When the provider answered, the entry carries the raw response text,
    /// the round-trip time and the token usage in place of a `response`
    /// entry.
    pub fn log_entry(&self, stage: Stage) -> LogEntry {
        match &self.exchange {
            None => LogEntry::new(stage, LogKind::Error, self.error.to_string()),
            Some(exchange) => LogEntry::new(
                stage,
                LogKind::Error,
                format!("{}\n\nraw response:\n{}", self.error, exchange.text),
            )
            .with_target(exchange.provider, exchange.model.clone())
            .with_duration(exchange.elapsed)
            .with_usage(exchange.usage),
        }
    }
}

impl From<PipelineError> for StageFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            exchange: None,
        }
    }
}

pub type StageResult<T> = std::result::Result<T, StageFailure>;

/// Everything a stage needs to reach its provider.
///
/// Borrowed from the orchestrator for the duration of one stage.
pub struct StageRunner<'a> {
    config: &'a PipelineConfig,
    registry: &'a ProviderRegistry,
    credentials: &'a HashMap<ProviderId, SecretString>,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        registry: &'a ProviderRegistry,
        credentials: &'a HashMap<ProviderId, SecretString>,
    ) -> Self {
        Self {
            config,
            registry,
            credentials,
        }
    }

    /// Run the Analyst stage.
    pub async fn analyst(&self, log: &mut RunLog, source: &SourceInput) -> StageResult<Plan> {
        let exchange = self
            .execute(Stage::Analyst, prompt::analyst_prompt(source), log)
            .await?;
        let parsed = output_parser::parse_json(&exchange.text);
        finish(Stage::Analyst, exchange, parsed, log)
    }

    /// Run the Architect stage. The output is free text.
    pub async fn architect(
        &self,
        log: &mut RunLog,
        source: &SourceInput,
        plan: &Plan,
        dependencies: &FileMap,
    ) -> StageResult<String> {
        let exchange = self
            .execute(
                Stage::Architect,
                prompt::architect_prompt(source, plan, dependencies),
                log,
            )
            .await?;
        let cleaned = output_parser::clean_response(&exchange.text);
        let parsed = if cleaned.is_empty() {
            Err(ParseError::EmptyResponse)
        } else {
            Ok(cleaned)
        };
        finish(Stage::Architect, exchange, parsed, log)
    }

    /// Run the Coder stage.
    pub async fn coder(
        &self,
        log: &mut RunLog,
        source: &SourceInput,
        plan: &Plan,
        architecture: &str,
        dependencies: &FileMap,
    ) -> StageResult<FileMap> {
        let exchange = self
            .execute(
                Stage::Coder,
                prompt::coder_prompt(source, plan, architecture, dependencies),
                log,
            )
            .await?;
        let parsed = output_parser::extract_files(&exchange.text);
        let extraction_result = finish(Stage::Coder, exchange, parsed, log)?;

        if extraction_result.strategy == ExtractionStrategy::Tolerant {
            log.append(LogEntry::new(
                Stage::Coder,
                LogKind::Info,
                format!(
                    "response ignored the files schema; recovered {} file(s) from headings",
                    extraction_result.files.len()
                ),
            ));
        }
        Ok(extraction_result.files)
    }

    /// Run the Auditor stage over the generated files.
    pub async fn auditor(
        &self,
        log: &mut RunLog,
        plan: &Plan,
        files: &FileMap,
    ) -> StageResult<AuditReport> {
        let exchange = self
            .execute(Stage::Auditor, prompt::auditor_prompt(plan, files), log)
            .await?;
        let parsed = output_parser::parse_json(&exchange.text);
        finish(Stage::Auditor, exchange, parsed, log)
    }

    /// Build the request, log it and call the stage's backend.
    async fn execute(
        &self,
        stage: Stage,
        prompt_text: String,
        log: &mut RunLog,
    ) -> StageResult<Exchange> {
        let target = self.config.target(stage);
        let settings = self.config.provider_settings(target.provider);
        let backend = self.registry.resolve(
            target.provider,
            &settings,
            self.credentials.get(&target.provider),
        )?;

        let mut request = GenerationRequest::new(target.model.clone(), prompt_text)
            .with_system(prompt::system_instruction(stage));
        if let Some(schema) = stage.response_schema() {
            request = request.with_schema(schema);
        }
        if let Some(mime) = stage.response_mime_type() {
            request = request.with_mime_type(mime);
        }

        log.append(
            LogEntry::new(stage, LogKind::Prompt, request.prompt.clone())
                .with_target(target.provider, target.model.clone()),
        );

        tracing::info!(
            stage = %stage,
            provider = %target.provider,
            model = %target.model,
            backend = backend.name(),
            "dispatching stage"
        );

        let started = Instant::now();
        let result = backend.generate_content(&request).await?;
        let elapsed = started.elapsed();

        tracing::info!(
            stage = %stage,
            duration_ms = elapsed.as_millis() as u64,
            total_tokens = result.usage.map(|u| u.total),
            "stage response received"
        );

        Ok(Exchange {
            provider: target.provider,
            model: target.model,
            text: result.text,
            elapsed,
            usage: result.usage,
        })
    }
}

/// Append the `response` entry if normalization worked, otherwise hand the
/// exchange back inside the failure.
fn finish<T>(
    stage: Stage,
    exchange: Exchange,
    parsed: std::result::Result<T, ParseError>,
    log: &mut RunLog,
) -> StageResult<T> {
    match parsed {
        Ok(value) => {
            log.append(
                LogEntry::new(stage, LogKind::Response, exchange.text)
                    .with_target(exchange.provider, exchange.model)
                    .with_duration(exchange.elapsed)
                    .with_usage(exchange.usage),
            );
            Ok(value)
        }
        Err(err) => Err(StageFailure {
            error: PipelineError::Extraction {
                stage,
                reason: err.to_string(),
            },
            exchange: Some(exchange),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockFactory, TokenUsage};
    use crate::credentials::MemoryCredentialStore;
    use std::sync::Arc;

    const PLAN_JSON: &str = r#"{"summary": "s", "variables": ["A"], "security_concerns": [],
        "migration_strategy": "m", "required_files": []}"#;

    fn harness(mock: Arc<MockBackend>) -> (PipelineConfig, ProviderRegistry) {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(ProviderId::Gemini, "test-key");
        let mut registry = ProviderRegistry::new(store);
        registry.register(Arc::new(MockFactory::new(ProviderId::Gemini, mock)));
        (PipelineConfig::default(), registry)
    }

    fn plan() -> Plan {
        serde_json::from_str(PLAN_JSON).unwrap()
    }

    #[tokio::test]
    async fn test_analyst_logs_prompt_then_response() {
        let mock = Arc::new(
            MockBackend::fixed(format!("<think>hm</think>```json\n{}\n```", PLAN_JSON))
                .with_usage(TokenUsage::new(10, 5, 15)),
        );
        let (config, registry) = harness(mock.clone());
        let creds = HashMap::new();
        let runner = StageRunner::new(&config, &registry, &creds);
        let mut log = RunLog::default();

        let plan = runner
            .analyst(&mut log, &SourceInput::new("a.sh", "echo"))
            .await
            .unwrap();
        assert_eq!(plan.variables, vec!["A".to_string()]);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, LogKind::Prompt);
        assert_eq!(entries[0].provider, Some(ProviderId::Gemini));
        assert_eq!(entries[1].kind, LogKind::Response);
        assert_eq!(entries[1].usage, Some(TokenUsage::new(10, 5, 15)));
        assert!(entries[1].duration_ms.is_some());

        let request = &mock.requests()[0];
        assert!(request.response_schema.is_some());
        assert_eq!(request.response_mime_type.as_deref(), Some("application/json"));
        assert!(request.system_instruction.is_some());
    }

    #[tokio::test]
    async fn test_architect_sends_no_schema() {
        let mock = Arc::new(MockBackend::fixed("```\nTwo modules: net and app.\n```"));
        let (config, registry) = harness(mock.clone());
        let creds = HashMap::new();
        let runner = StageRunner::new(&config, &registry, &creds);
        let mut log = RunLog::default();

        let arch = runner
            .architect(&mut log, &SourceInput::new("a.sh", "echo"), &plan(), &FileMap::new())
            .await
            .unwrap();
        assert_eq!(arch, "Two modules: net and app.");
        let request = &mock.requests()[0];
        assert!(request.response_schema.is_none());
        assert!(request.response_mime_type.is_none());
    }

    #[tokio::test]
    async fn test_coder_tolerant_fallback_adds_info_entry() {
        let mock = Arc::new(MockBackend::fixed(
            "## main.tf\n```hcl\nresource {}\n```\n## vars.tf\n```hcl\nvariable {}\n```",
        ));
        let (config, registry) = harness(mock);
        let creds = HashMap::new();
        let runner = StageRunner::new(&config, &registry, &creds);
        let mut log = RunLog::default();

        let files = runner
            .coder(
                &mut log,
                &SourceInput::new("a.sh", "echo"),
                &plan(),
                "arch",
                &FileMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        let kinds: Vec<LogKind> = log.entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![LogKind::Prompt, LogKind::Response, LogKind::Info]);
    }

    #[tokio::test]
    async fn test_unparseable_audit_is_extraction_error() {
        let mock = Arc::new(MockBackend::fixed("Looks fine to me!"));
        let (config, registry) = harness(mock);
        let creds = HashMap::new();
        let runner = StageRunner::new(&config, &registry, &creds);
        let mut log = RunLog::default();

        let failure = runner
            .auditor(&mut log, &plan(), &FileMap::new())
            .await
            .unwrap_err();
        match &failure.error {
            PipelineError::Extraction { stage, reason } => {
                assert_eq!(*stage, Stage::Auditor);
                assert!(reason.contains("Looks fine"));
            }
            other => panic!("expected extraction error, got {:?}", other),
        }
        // Only the prompt is logged; the raw reply travels with the failure.
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].kind, LogKind::Prompt);
        let exchange = failure.exchange.as_ref().unwrap();
        assert_eq!(exchange.text, "Looks fine to me!");

        let entry = failure.log_entry(Stage::Auditor);
        assert_eq!(entry.kind, LogKind::Error);
        assert!(entry.content.contains("raw response:\nLooks fine to me!"));
        assert!(entry.duration_ms.is_some());
        assert_eq!(entry.provider, Some(ProviderId::Gemini));
    }

    #[tokio::test]
    async fn test_missing_credential_sends_nothing() {
        let mock = Arc::new(MockBackend::fixed(PLAN_JSON));
        let mut registry = ProviderRegistry::new(Arc::new(MemoryCredentialStore::new()));
        registry.register(Arc::new(MockFactory::new(ProviderId::Gemini, mock.clone())));
        let config = PipelineConfig::default();
        let creds = HashMap::new();
        let runner = StageRunner::new(&config, &registry, &creds);
        let mut log = RunLog::default();

        let failure = runner
            .analyst(&mut log, &SourceInput::new("a.sh", "echo"))
            .await
            .unwrap_err();
        assert!(failure.error.is_configuration());
        assert!(failure.exchange.is_none());
        assert_eq!(mock.call_count(), 0);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_credential_unblocks_stage() {
        let mock = Arc::new(MockBackend::fixed(PLAN_JSON));
        let mut registry = ProviderRegistry::new(Arc::new(MemoryCredentialStore::new()));
        registry.register(Arc::new(MockFactory::new(ProviderId::Gemini, mock)));
        let config = PipelineConfig::default();
        let mut creds = HashMap::new();
        creds.insert(ProviderId::Gemini, SecretString::from("explicit".to_string()));
        let runner = StageRunner::new(&config, &registry, &creds);

        let plan = runner
            .analyst(&mut RunLog::default(), &SourceInput::new("a.sh", "echo"))
            .await
            .unwrap();
        assert_eq!(plan.summary, "s");
    }
}
