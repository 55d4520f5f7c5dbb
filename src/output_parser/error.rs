//! Error types for output normalization.

/// Errors returned by output parsers.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The response was empty, or nothing was left after cleaning.
    #[error("empty LLM response")]
    EmptyResponse,

    /// No parsing strategy could extract the expected format.
    #[error("could not parse {expected_format} from LLM response: {text}")]
    Unparseable {
        /// The format the parser was trying to extract.
        expected_format: &'static str,
        /// A truncated copy of the cleaned LLM text.
        text: String,
    },

    /// JSON was extracted but failed to deserialize into the target type.
    #[error("JSON deserialization failed: {reason} (json: {raw_json})")]
    DeserializationFailed {
        /// The serde error message.
        reason: String,
        /// A truncated copy of the JSON that failed deserialization.
        raw_json: String,
    },

    /// Neither the strict nor the tolerant file strategy found a file.
    #[error("no files found in LLM response: {text}")]
    NoFiles {
        /// A truncated copy of the cleaned LLM text.
        text: String,
    },
}

/// Longest excerpt of model output carried in an error.
pub(crate) const EXCERPT_LEN: usize = 200;

/// Truncate a string to at most `max_len` characters, appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
