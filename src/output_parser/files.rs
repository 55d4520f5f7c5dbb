//! File-map extraction from coder output.
//!
//! Providers differ in how faithfully they honor the files schema, so
//! extraction runs an ordered list of strategies and keeps the first one
//! that finds at least one file:
//!
//! 1. [`ExtractionStrategy::Strict`]: the cleaned text is JSON with a
//!    `files` collection.
//! 2. [`ExtractionStrategy::Tolerant`]: Markdown headings naming a file,
//!    each followed by a fenced block holding its content.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::output_parser::error::{truncate, ParseError, EXCERPT_LEN};
use crate::output_parser::extract::{clean_response, find_bracketed, strip_think_tags};
use crate::types::FileMap;

lazy_static! {
    /// `## File: `name``, then (after optional blank lines) a fenced block.
    static ref HEADING_FENCE_PATTERN: Regex = Regex::new(
        r"(?m)^[ \t]*#{1,6}[ \t]+(?:(?i:file):[ \t]*)?`?([^`\n]+?)`?[ \t]*\r?\n(?:[ \t]*\r?\n)*[ \t]*```[^\n]*\n((?s:.*?))\r?\n?[ \t]*```"
    ).unwrap();
}

/// Keys accepted for a file entry's name, in priority order.
const NAME_KEYS: [&str; 3] = ["filename", "name", "path"];

/// Which strategy produced a [`FileExtraction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    Strict,
    Tolerant,
}

/// The files found in a response and how they were found.
#[derive(Debug, Clone, PartialEq)]
pub struct FileExtraction {
    pub files: FileMap,
    pub strategy: ExtractionStrategy,
}

type Strategy = fn(&str) -> FileMap;

const STRATEGIES: [(ExtractionStrategy, Strategy); 2] = [
    (ExtractionStrategy::Strict, strict_files),
    (ExtractionStrategy::Tolerant, tolerant_files),
];

/// Extract a file map from a coder response.
///
/// # Examples
///
/// ```
/// use codeshift::output_parser::{extract_files, ExtractionStrategy};
///
/// let response = "## File: `main.py`\n```python\nprint('hi')\n```";
/// let extraction = extract_files(response).unwrap();
/// assert_eq!(extraction.strategy, ExtractionStrategy::Tolerant);
/// assert_eq!(extraction.files["main.py"], "print('hi')");
/// ```
pub fn extract_files(response: &str) -> Result<FileExtraction, ParseError> {
    if response.trim().is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    for (strategy, run) in STRATEGIES {
        let files = run(response);
        if files.is_empty() {
            tracing::debug!(?strategy, "file strategy found nothing");
            continue;
        }
        if strategy == ExtractionStrategy::Tolerant {
            tracing::warn!(
                count = files.len(),
                "response did not match the files schema, recovered files from headings"
            );
        }
        return Ok(FileExtraction { files, strategy });
    }

    Err(ParseError::NoFiles {
        text: truncate(&clean_response(response), EXCERPT_LEN),
    })
}

/// Strategy 1: a JSON document with a top-level `files` collection.
///
/// The reasoning-stripped text is tried before the fully cleaned text so
/// that fences inside file contents (Markdown files, docs) survive.
fn strict_files(response: &str) -> FileMap {
    let stripped = strip_think_tags(response);
    let cleaned = clean_response(response);
    let files = [stripped.trim(), cleaned.as_str()]
        .into_iter()
        .filter_map(|text| {
            serde_json::from_str::<Value>(text).ok().or_else(|| {
                find_bracketed(text, '{', '}').and_then(|s| serde_json::from_str(s).ok())
            })
        })
        .map(|document| files_collection(&document))
        .find(|files| !files.is_empty())
        .unwrap_or_default();
    files
}

fn files_collection(document: &Value) -> FileMap {
    match document.get("files") {
        Some(Value::Array(entries)) => entries.iter().filter_map(file_entry).collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, content)| Some((name.clone(), content.as_str()?.to_string())))
            .filter(|(name, _)| !name.trim().is_empty())
            .collect(),
        _ => FileMap::new(),
    }
}

fn file_entry(entry: &Value) -> Option<(String, String)> {
    let name = NAME_KEYS
        .iter()
        .find_map(|key| entry.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|n| !n.is_empty())?;
    let content = entry.get("content")?.as_str()?;
    Some((name.to_string(), content.to_string()))
}

/// Strategy 2: heading-style filename markers followed by fenced blocks.
///
/// Runs on the reasoning-stripped text with fences intact.
fn tolerant_files(response: &str) -> FileMap {
    let text = strip_think_tags(response);
    HEADING_FENCE_PATTERN
        .captures_iter(&text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim();
            if name.is_empty() {
                return None;
            }
            let content = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            Some((name.to_string(), content.to_string()))
        })
        .collect()
}
