//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] returns pre-configured replies in order and records
//! every request it receives, allowing deterministic tests of stage runners
//! and the orchestrator.
//!
//! # Example
//!
//! ```
//! use codeshift::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec!["Hello, world!".to_string()]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use secrecy::SecretString;

use super::{Backend, BackendFactory, GenerationRequest, GenerationResult, ProviderId, TokenUsage};
use crate::config::ProviderSettings;
use crate::error::{ProviderCause, Result};
use crate::PipelineError;

/// A test backend that returns canned replies in order.
///
/// Cycles back to the beginning when all replies have been consumed.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<std::result::Result<String, ProviderCause>>,
    usage: Option<TokenUsage>,
    index: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockBackend {
    /// Create a mock backend with the given canned responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self::with_replies(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock from a mixed sequence of successes and failures.
    pub fn with_replies(replies: Vec<std::result::Result<String, ProviderCause>>) -> Self {
        assert!(!replies.is_empty(), "MockBackend requires at least one reply");
        Self {
            replies,
            usage: None,
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock whose every call fails with `cause`.
    pub fn failing(cause: ProviderCause) -> Self {
        Self::with_replies(vec![Err(cause)])
    }

    /// Report this usage on every successful reply.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_reply(&self) -> std::result::Result<String, ProviderCause> {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[idx].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn generate_content(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.requests.lock().push(request.clone());
        match self.next_reply() {
            Ok(text) => Ok(GenerationResult {
                text,
                usage: self.usage,
            }),
            Err(cause) => Err(PipelineError::provider(self.name(), &request.model, cause)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Factory that hands out one shared [`MockBackend`] for a provider slot.
///
/// Register it in a [`ProviderRegistry`](super::ProviderRegistry) to run the
/// orchestrator without network access. Credentials are still resolved
/// (and then ignored), so a missing key fails exactly as it would live.
#[derive(Debug, Clone)]
pub struct MockFactory {
    provider: ProviderId,
    backend: Arc<MockBackend>,
}

impl MockFactory {
    pub fn new(provider: ProviderId, backend: Arc<MockBackend>) -> Self {
        Self { provider, backend }
    }

    /// The shared backend, for inspecting recorded requests.
    pub fn backend(&self) -> &Arc<MockBackend> {
        &self.backend
    }
}

impl BackendFactory for MockFactory {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    fn create(
        &self,
        _credential: SecretString,
        _settings: &ProviderSettings,
    ) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = self.backend.clone();
        Ok(backend)
    }
}
