//! # Output Normalizer
//!
//! Turns raw model text into typed stage outputs. Handles reasoning blocks,
//! markdown fences, JSON buried in prose, and coder output that ignores the
//! files schema, without an additional LLM call.
//!
//! ## Parsers Available
//!
//! | Parser | Use Case |
//! |--------|----------|
//! | [`parse_json`] | Extract typed JSON (plan, audit report) |
//! | [`parse_json_value`] | Extract untyped JSON |
//! | [`extract_files`] | Extract a file map, strict then tolerant |
//!
//! ## Shared Utilities
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`clean_response`] | Strip reasoning blocks and fences, trim |
//! | [`strip_think_tags`] | Remove `<think>` blocks from text |

pub mod error;
pub mod extract;
pub mod files;
pub mod json;

pub use error::ParseError;
pub use extract::{clean_response, strip_code_fences, strip_think_tags};
pub use files::{extract_files, ExtractionStrategy, FileExtraction};
pub use json::{parse_json, parse_json_value};
