//! The pipeline orchestrator: sequencing, suspend/resume and the run log.
//!
//! ```text
//! Idle ──► Analyzing ──┬──────────────────────────────► Architecting ──► Coding ──► Auditing ──► Complete
//!                      └──► WaitingForDependencies ──────────┘
//!                                    (resume)
//!
//! any non-terminal state ──► Error
//! ```
//!
//! One [`Orchestrator`] drives one run at a time. `start` and `resume` take
//! `&mut self`, so two stages of the same run can never overlap. Stage
//! outputs are stored only once a stage has fully succeeded; a failure
//! leaves everything computed so far untouched and moves the run to
//! [`PipelineState::Error`].
//!
//! Dropping a pending `start` or `resume` future puts the run back where
//! the call found it (`Idle` or `WaitingForDependencies`), so the call can
//! simply be made again.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;

use crate::backend::{ProviderId, ProviderRegistry};
use crate::config::PipelineConfig;
use crate::credentials::EnvCredentialStore;
use crate::error::Result;
use crate::events::{emit, Event, EventHandler};
use crate::run_log::{LogEntry, LogKind, RunLog};
use crate::runner::{StageResult, StageRunner};
use crate::stage::Stage;
use crate::types::{FileMap, Plan, PipelineReport, SourceInput};
use crate::PipelineError;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Analyzing,
    /// The plan named external files; the run is suspended until `resume`.
    WaitingForDependencies,
    Architecting,
    Coding,
    Auditing,
    Complete,
    Error,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Analyzing => "analyzing",
            PipelineState::WaitingForDependencies => "waiting_for_dependencies",
            PipelineState::Architecting => "architecting",
            PipelineState::Coding => "coding",
            PipelineState::Auditing => "auditing",
            PipelineState::Complete => "complete",
            PipelineState::Error => "error",
        }
    }

    /// The stage whose round trip is in flight in this state.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Analyzing => Some(Stage::Analyst),
            PipelineState::Architecting => Some(Stage::Architect),
            PipelineState::Coding => Some(Stage::Coder),
            PipelineState::Auditing => Some(Stage::Auditor),
            _ => None,
        }
    }

    /// `Complete` and `Error` accept nothing but [`Orchestrator::reset`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Error)
    }

    /// The transition table. Everything not listed is rejected.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (*self, next) {
            (Idle, Analyzing)
            | (Analyzing, WaitingForDependencies)
            | (Analyzing, Architecting)
            | (WaitingForDependencies, Architecting)
            | (Architecting, Coding)
            | (Coding, Auditing)
            | (Auditing, Complete) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`Orchestrator::start`] returned control with.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The plan needs these files before the run can continue.
    Suspended { required_files: Vec<String> },
    /// The run finished without needing dependencies.
    Completed(PipelineReport),
}

/// Drives the four stages of one run.
///
/// # Example
///
/// ```ignore
/// let mut orchestrator = Orchestrator::builder()
///     .config(PipelineConfig::default())
///     .build()?;
///
/// let report = match orchestrator.start(SourceInput::new("deploy.sh", script)).await? {
///     RunOutcome::Completed(report) => report,
///     RunOutcome::Suspended { required_files } => {
///         orchestrator.resume(ask_user_for(required_files)).await?
///     }
/// };
/// ```
pub struct Orchestrator {
    config: PipelineConfig,
    registry: Arc<ProviderRegistry>,
    credentials: HashMap<ProviderId, SecretString>,
    state: PipelineState,
    log: RunLog,
    source: Option<SourceInput>,
    plan: Option<Plan>,
    /// Primary input entry plus any dependencies supplied on resume.
    input_files: FileMap,
    architecture: Option<String>,
    generated: Option<FileMap>,
    report: Option<PipelineReport>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("credential_overrides", &self.credentials.keys().collect::<Vec<_>>())
            .field("log", &self.log)
            .finish()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// The primary input plus every dependency supplied so far.
    pub fn input_files(&self) -> &FileMap {
        &self.input_files
    }

    pub fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    pub fn generated_files(&self) -> Option<&FileMap> {
        self.generated.as_ref()
    }

    pub fn report(&self) -> Option<&PipelineReport> {
        self.report.as_ref()
    }

    /// Begin a run. Only allowed from [`PipelineState::Idle`].
    ///
    /// Runs the Analyst stage, then either suspends (the plan lists
    /// required files) or carries on through to completion.
    pub async fn start(&mut self, source: SourceInput) -> Result<RunOutcome> {
        self.require(PipelineState::Idle, "start")?;

        let mut run = InFlight::new(self);
        let outcome = run.begin(source).await;
        run.settled();
        outcome
    }

    /// Continue a suspended run with caller-supplied dependency files.
    ///
    /// Only allowed from [`PipelineState::WaitingForDependencies`]. Files the
    /// plan asked for but `files` lacks are noted in the log and the run
    /// continues without them.
    pub async fn resume(&mut self, files: FileMap) -> Result<PipelineReport> {
        self.require(PipelineState::WaitingForDependencies, "resume")?;

        let missing: Vec<String> = self
            .plan
            .iter()
            .flat_map(|plan| plan.required_files.iter())
            .filter(|name| !files.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "resuming without some required files");
            self.log.append(LogEntry::new(
                Stage::Architect,
                LogKind::Info,
                format!("continuing without: {}", missing.join(", ")),
            ));
        }

        let mut inputs = self.input_files.clone();
        inputs.extend(files);

        let mut run = InFlight::new(self);
        let report = run.run_remaining(inputs).await;
        run.settled();
        report
    }

    /// Discard the run and return to [`PipelineState::Idle`].
    ///
    /// The event handler is kept; the log starts empty.
    pub fn reset(&mut self) {
        let from = self.state;
        self.log = RunLog::new(self.log.event_handler().clone());
        self.source = None;
        self.plan = None;
        self.input_files.clear();
        self.architecture = None;
        self.generated = None;
        self.report = None;
        self.state = PipelineState::Idle;

        if from != PipelineState::Idle {
            tracing::info!(from = %from, "pipeline reset");
            emit(
                self.log.event_handler(),
                Event::StageChanged {
                    from,
                    to: PipelineState::Idle,
                },
            );
        }
    }

    /// Analyst, then suspend or carry on.
    async fn begin(&mut self, source: SourceInput) -> Result<RunOutcome> {
        self.transition(PipelineState::Analyzing)?;

        let result = StageRunner::new(&self.config, &self.registry, &self.credentials)
            .analyst(&mut self.log, &source)
            .await;
        let plan = self.settle(Stage::Analyst, result)?;

        let mut inputs = FileMap::new();
        inputs.insert(source.filename.clone(), source.content.clone());
        self.input_files = inputs.clone();
        self.source = Some(source);
        self.plan = Some(plan.clone());

        if plan.needs_dependencies() {
            self.log.append(LogEntry::new(
                Stage::Analyst,
                LogKind::Info,
                format!(
                    "waiting for {} required file(s): {}",
                    plan.required_files.len(),
                    plan.required_files.join(", ")
                ),
            ));
            self.transition(PipelineState::WaitingForDependencies)?;
            return Ok(RunOutcome::Suspended {
                required_files: plan.required_files,
            });
        }

        self.run_remaining(inputs).await.map(RunOutcome::Completed)
    }

    /// Architect, Coder and Auditor, in order.
    ///
    /// `inputs` is the primary input plus dependencies; it replaces the
    /// run's file map once the Architect has succeeded.
    async fn run_remaining(&mut self, inputs: FileMap) -> Result<PipelineReport> {
        let (source, plan) = match (self.source.clone(), self.plan.clone()) {
            (Some(source), Some(plan)) => (source, plan),
            _ => return Err(self.invalid("continue")),
        };
        let dependencies: FileMap = inputs
            .iter()
            .filter(|(name, _)| **name != source.filename)
            .map(|(name, content)| (name.clone(), content.clone()))
            .collect();

        self.transition(PipelineState::Architecting)?;
        let result = StageRunner::new(&self.config, &self.registry, &self.credentials)
            .architect(&mut self.log, &source, &plan, &dependencies)
            .await;
        let architecture = self.settle(Stage::Architect, result)?;
        self.input_files = inputs;
        self.architecture = Some(architecture.clone());

        self.transition(PipelineState::Coding)?;
        let result = StageRunner::new(&self.config, &self.registry, &self.credentials)
            .coder(&mut self.log, &source, &plan, &architecture, &dependencies)
            .await;
        let files = self.settle(Stage::Coder, result)?;
        self.generated = Some(files.clone());

        self.transition(PipelineState::Auditing)?;
        let result = StageRunner::new(&self.config, &self.registry, &self.credentials)
            .auditor(&mut self.log, &plan, &files)
            .await;
        let audit = self.settle(Stage::Auditor, result)?;

        let report = PipelineReport {
            plan,
            architecture,
            files,
            audit,
        };
        self.report = Some(report.clone());
        self.transition(PipelineState::Complete)?;

        tracing::info!(
            files = report.files.len(),
            findings = report.audit.findings.len(),
            "pipeline complete"
        );
        Ok(report)
    }

    /// Pass a stage result through; on failure log it once and enter `Error`.
    fn settle<T>(&mut self, stage: Stage, result: StageResult<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(failure) => {
                tracing::error!(stage = %stage, error = %failure.error, "stage failed");
                self.log.append(failure.log_entry(stage));
                self.transition(PipelineState::Error)?;
                Err(failure.error)
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state,
            source: self.source.clone(),
            plan: self.plan.clone(),
            input_files: self.input_files.clone(),
            architecture: self.architecture.clone(),
            generated: self.generated.clone(),
            report: self.report.clone(),
        }
    }

    /// Put the run back to `checkpoint` after an abandoned call.
    ///
    /// Log entries appended in the meantime stay; an `info` entry marks
    /// where the call was dropped.
    fn restore(&mut self, checkpoint: Checkpoint) {
        let from = self.state;
        tracing::warn!(from = %from, to = %checkpoint.state, "call abandoned, restoring run state");
        if let Some(stage) = from.stage() {
            self.log.append(LogEntry::new(
                stage,
                LogKind::Info,
                format!("abandoned while {}; run returned to {}", from, checkpoint.state),
            ));
        }

        self.state = checkpoint.state;
        self.source = checkpoint.source;
        self.plan = checkpoint.plan;
        self.input_files = checkpoint.input_files;
        self.architecture = checkpoint.architecture;
        self.generated = checkpoint.generated;
        self.report = checkpoint.report;

        if from != self.state {
            emit(
                self.log.event_handler(),
                Event::StageChanged {
                    from,
                    to: self.state,
                },
            );
        }
    }

    fn require(&self, expected: PipelineState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> PipelineError {
        PipelineError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn transition(&mut self, to: PipelineState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(PipelineError::InvalidState {
                operation: "transition",
                state: format!("{} (to {})", from, to),
            });
        }
        self.state = to;
        tracing::info!(from = %from, to = %to, "pipeline state changed");
        emit(self.log.event_handler(), Event::StageChanged { from, to });
        Ok(())
    }
}

/// Run fields as an entry point found them.
struct Checkpoint {
    state: PipelineState,
    source: Option<SourceInput>,
    plan: Option<Plan>,
    input_files: FileMap,
    architecture: Option<String>,
    generated: Option<FileMap>,
    report: Option<PipelineReport>,
}

/// Exclusive access to an orchestrator for one `start`/`resume` call.
///
/// Restores the entry checkpoint when dropped before [`InFlight::settled`],
/// which happens when the caller discards the pending future.
struct InFlight<'a> {
    orchestrator: &'a mut Orchestrator,
    checkpoint: Option<Checkpoint>,
}

impl<'a> InFlight<'a> {
    fn new(orchestrator: &'a mut Orchestrator) -> Self {
        let checkpoint = Some(orchestrator.checkpoint());
        Self {
            orchestrator,
            checkpoint,
        }
    }

    /// The call ran to an outcome (success or `Error`); keep its state.
    fn settled(mut self) {
        self.checkpoint = None;
    }
}

impl Deref for InFlight<'_> {
    type Target = Orchestrator;

    fn deref(&self) -> &Orchestrator {
        &*self.orchestrator
    }
}

impl DerefMut for InFlight<'_> {
    fn deref_mut(&mut self) -> &mut Orchestrator {
        &mut *self.orchestrator
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            self.orchestrator.restore(checkpoint);
        }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: PipelineConfig,
    registry: Option<Arc<ProviderRegistry>>,
    credentials: HashMap<ProviderId, SecretString>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            registry: None,
            credentials: HashMap::new(),
            event_handler: None,
        }
    }

    /// Per-stage provider and model selection.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Provider registry. Default: Gemini and OpenRouter with keys from the
    /// environment.
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// A credential that takes precedence over the registry's store.
    pub fn credential(mut self, provider: ProviderId, key: SecretString) -> Self {
        self.credentials.insert(provider, key);
        self
    }

    /// Observer for state changes and log entries.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the orchestrator.
    ///
    /// Fails if a stage targets a provider the registry has no factory for.
    /// Credentials are checked per stage, right before its request.
    pub fn build(self) -> Result<Orchestrator> {
        let registry = self.registry.unwrap_or_else(|| {
            Arc::new(ProviderRegistry::with_defaults(Arc::new(EnvCredentialStore)))
        });

        let available = registry.available();
        for stage in Stage::ALL {
            let target = self.config.target(stage);
            if !available.contains(&target.provider) {
                return Err(PipelineError::Configuration(format!(
                    "stage '{}' targets provider '{}', which is not registered",
                    stage, target.provider
                )));
            }
        }

        Ok(Orchestrator {
            config: self.config,
            registry,
            credentials: self.credentials,
            state: PipelineState::Idle,
            log: RunLog::new(self.event_handler),
            source: None,
            plan: None,
            input_files: FileMap::new(),
            architecture: None,
            generated: None,
            report: None,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
