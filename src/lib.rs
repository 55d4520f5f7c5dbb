//! # Codeshift
//!
//! A four-stage, multi-provider LLM pipeline that migrates a source artifact
//! (a deploy script, a legacy config) into a set of generated files plus a
//! structured audit report.
//!
//! ```text
//! SourceInput ──► Analyst ──► (suspend for required files?) ──► Architect ──► Coder ──► Auditor ──► PipelineReport
//! ```
//!
//! ## Core Concepts
//!
//! - **[`Orchestrator`]**: the run state machine. `start` runs the Analyst
//!   and either suspends for dependency files or finishes the run; `resume`
//!   continues a suspended run.
//! - **[`Backend`](backend::Backend)**: one request/response round trip to a
//!   provider. [`GeminiBackend`](backend::GeminiBackend) sends schemas
//!   natively, [`OpenAiBackend`](backend::OpenAiBackend) (OpenRouter) folds
//!   them into the system prompt.
//! - **[`Schema`]**: one vendor-neutral output schema, translated into
//!   each provider's dialect.
//! - **[`output_parser`]**: cleans reasoning blocks and fences out of model
//!   text and extracts typed results, falling back to tolerant extraction
//!   when a model ignores the schema.
//! - **[`RunLog`]**: every prompt, response and error of a run, streamed to
//!   an optional [`EventHandler`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use codeshift::{FileMap, Orchestrator, PipelineConfig, RunOutcome, SourceInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys come from GEMINI_API_KEY / OPENROUTER_API_KEY.
//!     let mut orchestrator = Orchestrator::builder()
//!         .config(PipelineConfig::default())
//!         .build()?;
//!
//!     let source = SourceInput::new("deploy.sh", std::fs::read_to_string("deploy.sh")?);
//!     let report = match orchestrator.start(source).await? {
//!         RunOutcome::Completed(report) => report,
//!         RunOutcome::Suspended { required_files } => {
//!             let mut deps = FileMap::new();
//!             for name in required_files {
//!                 let content = std::fs::read_to_string(&name)?;
//!                 deps.insert(name, content);
//!             }
//!             orchestrator.resume(deps).await?
//!         }
//!     };
//!
//!     for (name, content) in &report.files {
//!         println!("--- {} ({} bytes)", name, content.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod output_parser;
pub mod prompt;
pub mod run_log;
pub mod runner;
pub mod schema;
pub mod stage;
pub mod types;

pub use backend::{
    Backend, GenerationRequest, GenerationResult, ProviderId, ProviderRegistry, TokenUsage,
};
pub use config::{PipelineConfig, ProviderSettings, StageTarget};
pub use credentials::{CredentialStore, EnvCredentialStore, MemoryCredentialStore};
pub use error::{PipelineError, ProviderCause, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, PipelineState, RunOutcome};
pub use run_log::{LogEntry, LogKind, RunLog};
pub use schema::{translate, Dialect, Schema};
pub use stage::Stage;
pub use types::{AuditReport, FileMap, Finding, PipelineReport, Plan, Severity, SourceInput};
