//! Typed JSON extraction from LLM responses.

use serde::de::DeserializeOwned;

use crate::output_parser::error::{truncate, ParseError, EXCERPT_LEN};
use crate::output_parser::extract::{clean_response, find_bracketed, strip_think_tags};

/// Parse an LLM response into a typed value.
///
/// Candidates, in order: the response with reasoning blocks removed, then
/// the fully [`clean_response`] text. The first keeps fences that sit
/// inside JSON string values intact. On each candidate:
/// 1. Direct deserialize
/// 2. Bracket-match a JSON object (`{...}`)
/// 3. Bracket-match a JSON array (`[...]`)
///
/// No repair is attempted. Valid JSON that does not fit `T` is a
/// [`ParseError::DeserializationFailed`].
///
/// # Examples
///
/// ```
/// use serde::Deserialize;
/// use codeshift::output_parser::parse_json;
///
/// #[derive(Deserialize, Debug, PartialEq)]
/// struct Verdict {
///     ok: bool,
/// }
///
/// let response = "<think>checking...</think>```json\n{\"ok\": true}\n```";
/// let verdict: Verdict = parse_json(response).unwrap();
/// assert!(verdict.ok);
/// ```
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, ParseError> {
    let cleaned = clean_response(response);
    if cleaned.is_empty() {
        return Err(ParseError::EmptyResponse);
    }
    let stripped = strip_think_tags(response);

    let mut shape_err = None;
    for text in [stripped.trim(), cleaned.as_str()] {
        match parse_candidate::<T>(text) {
            Ok(val) => return Ok(val),
            Err(Some(err)) => {
                shape_err.get_or_insert(err);
            }
            Err(None) => {}
        }
    }

    match shape_err {
        Some((reason, raw_json)) => Err(ParseError::DeserializationFailed { reason, raw_json }),
        None => Err(ParseError::Unparseable {
            expected_format: "JSON",
            text: truncate(&cleaned, EXCERPT_LEN),
        }),
    }
}

/// Try one candidate text. `Err(Some(..))` carries a shape mismatch
/// (reason, truncated JSON); `Err(None)` means no JSON was found.
fn parse_candidate<T: DeserializeOwned>(text: &str) -> Result<T, Option<(String, String)>> {
    let direct_err = match serde_json::from_str::<T>(text) {
        Ok(val) => return Ok(val),
        Err(e) => e,
    };

    // Valid JSON that just has the wrong shape is reported as such.
    if serde_json::from_str::<serde_json::Value>(text).is_ok() {
        return Err(Some((direct_err.to_string(), truncate(text, EXCERPT_LEN))));
    }

    let mut shape_err = None;
    for (open, close) in [('{', '}'), ('[', ']')] {
        let Some(candidate) = find_bracketed(text, open, close) else {
            continue;
        };
        match serde_json::from_str::<T>(candidate) {
            Ok(val) => return Ok(val),
            Err(e) if serde_json::from_str::<serde_json::Value>(candidate).is_ok() => {
                shape_err.get_or_insert((e.to_string(), truncate(candidate, EXCERPT_LEN)));
            }
            Err(_) => {}
        }
    }
    Err(shape_err)
}

/// Parse into a `serde_json::Value` when you don't know the schema.
pub fn parse_json_value(response: &str) -> Result<serde_json::Value, ParseError> {
    parse_json(response)
}
