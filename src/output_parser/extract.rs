//! Text cleaning shared by every parser.
//!
//! Every parser calls [`clean_response`] first. [`strip_think_tags`] is also
//! used on its own by the tolerant file strategy, which needs the fences
//! left in place.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// A Markdown fence delimiter with its optional language tag.
    static ref FENCE_PATTERN: Regex = Regex::new(r"```[A-Za-z0-9_+.\-]*").unwrap();
}

/// Strip reasoning blocks and fence delimiters, then trim.
///
/// Repeats until the text stops changing, so cleaning already-clean text is
/// a no-op.
///
/// # Examples
///
/// ```
/// use codeshift::output_parser::clean_response;
///
/// let raw = "<think>plan the answer</think>\n```json\n{\"a\": 1}\n```";
/// assert_eq!(clean_response(raw), "{\"a\": 1}");
/// assert_eq!(clean_response(&clean_response(raw)), clean_response(raw));
/// ```
pub fn clean_response(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let next = strip_code_fences(&strip_think_tags(&current))
            .trim()
            .to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Remove every fence delimiter (```` ``` ```` plus language tag), keeping
/// the fenced content.
pub fn strip_code_fences(text: &str) -> String {
    FENCE_PATTERN.replace_all(text, "").into_owned()
}

/// Strip all `<think>...</think>` and `<thinking>...</thinking>` blocks from text.
///
/// Handles complete blocks, incomplete blocks (no closing tag),
/// and multiple sequential blocks.
///
/// # Examples
///
/// ```
/// use codeshift::output_parser::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>reasoning</think>result"), "result");
/// assert_eq!(strip_think_tags("<think>no closing tag"), "");
/// assert_eq!(strip_think_tags("<thinking>also works</thinking>done"), "done");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let result = strip_tag_variant(text, "<think>", "</think>");
    strip_tag_variant(&result, "<thinking>", "</thinking>")
}

fn strip_tag_variant(text: &str, open: &str, close: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find(open) {
        if let Some(end_offset) = result[start..].find(close) {
            let end = start + end_offset + close.len();
            result = format!("{}{}", &result[..start], &result[end..]);
        } else {
            // Unclosed: the rest of the text is reasoning.
            result.truncate(start);
            break;
        }
    }
    result
}

/// Find a bracketed substring by matching open/close delimiters.
///
/// Handles nesting and ignores delimiters inside JSON strings. Prefers the
/// last top-level region, which is more likely to be the answer than an
/// example quoted earlier in the text.
///
/// # Examples
///
/// ```
/// use codeshift::output_parser::extract::find_bracketed;
///
/// let input = r#"Result: {"a": [1, 2]}"#;
/// assert_eq!(find_bracketed(input, '{', '}'), Some(r#"{"a": [1, 2]}"#));
/// ```
pub fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let mut best: Option<&str> = None;
    let mut scan_from = 0;

    while let Some(offset) = text[scan_from..].find(open) {
        let start = scan_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escape_next = false;
        let mut found_end = None;

        for (i, ch) in text[start..].char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }
            if ch == '\\' && in_string {
                escape_next = true;
                continue;
            }
            if ch == '"' {
                in_string = !in_string;
                continue;
            }
            if in_string {
                continue;
            }
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    found_end = Some(start + i);
                    break;
                }
            }
        }

        match found_end {
            Some(end) => {
                best = Some(&text[start..=end]);
                scan_from = end + close.len_utf8();
            }
            None => break,
        }
    }

    best
}
