use crate::stage::Stage;
use thiserror::Error;

/// Why a provider round trip failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderCause {
    /// Connection refused, DNS failure, timeout, or an unreadable body.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered with a non-success status code.
    ///
    /// 401 and 403 land here as well; the body usually names the auth problem.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code (e.g. 400, 401, 429, 500).
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The response arrived but did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Errors produced by the pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing credential, unknown provider, or a client that could not be
    /// built. Raised before any request is sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A provider round trip failed.
    #[error("provider '{provider}' failed for model '{model}': {cause}")]
    Provider {
        /// Logical provider name (e.g. `"gemini"`).
        provider: String,
        /// Model identifier the request targeted.
        model: String,
        /// The underlying failure.
        cause: ProviderCause,
    },

    /// Output normalization produced nothing usable after every strategy.
    #[error("stage '{stage}' produced no usable output: {reason}")]
    Extraction {
        /// The stage whose output could not be normalized.
        stage: Stage,
        /// Parser error, including a truncated copy of the cleaned text.
        reason: String,
    },

    /// An orchestrator entry point was called in a state that does not allow it.
    #[error("cannot {operation} while the pipeline is {state}")]
    InvalidState {
        /// The rejected operation (e.g. `"resume"`).
        operation: &'static str,
        /// Display name of the current state.
        state: String,
    },

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Build a [`PipelineError::Provider`] from its parts.
    pub fn provider(
        provider: impl Into<String>,
        model: impl Into<String>,
        cause: ProviderCause,
    ) -> Self {
        PipelineError::Provider {
            provider: provider.into(),
            model: model.into(),
            cause,
        }
    }

    /// Whether this is a configuration problem rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
