//! The four pipeline stages and the output contract each one declares.

use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mime type requested from providers for structured stages.
pub const JSON_MIME_TYPE: &str = "application/json";

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Reads the source and produces the [`Plan`](crate::types::Plan).
    Analyst,
    /// Turns the plan into a free-text architecture description.
    Architect,
    /// Generates the output [`FileMap`](crate::types::FileMap).
    Coder,
    /// Reviews generated files and reports findings.
    Auditor,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Analyst, Stage::Architect, Stage::Coder, Stage::Auditor];

    /// Stable lowercase tag used in logs and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyst => "analyst",
            Stage::Architect => "architect",
            Stage::Coder => "coder",
            Stage::Auditor => "auditor",
        }
    }

    /// The structured-output schema this stage asks the provider for.
    ///
    /// `None` means the stage's output is plain text.
    pub fn response_schema(&self) -> Option<Schema> {
        match self {
            Stage::Analyst => Some(plan_schema()),
            Stage::Architect => None,
            Stage::Coder => Some(files_schema()),
            Stage::Auditor => Some(audit_schema()),
        }
    }

    /// The response mime type this stage asks for, if any.
    pub fn response_mime_type(&self) -> Option<&'static str> {
        match self {
            Stage::Architect => None,
            _ => Some(JSON_MIME_TYPE),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn string_list(description: &str) -> Schema {
    Schema::array(Schema::string()).describe(description)
}

fn plan_schema() -> Schema {
    Schema::object([
        (
            "summary",
            Schema::string().describe("What the source does, in a few sentences"),
        ),
        (
            "variables",
            string_list("Variables, parameters and settings found in the source"),
        ),
        (
            "security_concerns",
            string_list("Security problems in the source"),
        ),
        (
            "migration_strategy",
            Schema::string().describe("How the source should be migrated"),
        ),
        (
            "required_files",
            string_list("Names of external files the source depends on but were not provided"),
        ),
    ])
    .require_all()
}

fn files_schema() -> Schema {
    Schema::object([(
        "files",
        Schema::array(
            Schema::object([
                ("filename", Schema::string().describe("Relative path of the file")),
                ("content", Schema::string().describe("Full file content")),
            ])
            .require_all(),
        ),
    )])
    .require_all()
}

fn audit_schema() -> Schema {
    Schema::object([
        (
            "comments",
            Schema::string().describe("Overall review comments"),
        ),
        (
            "findings",
            Schema::array(
                Schema::object([
                    (
                        "severity",
                        Schema::string().one_of(["Critical", "High", "Medium", "Low"]),
                    ),
                    ("title", Schema::string()),
                    ("description", Schema::string()),
                    (
                        "location",
                        Schema::string().describe("File and line or section"),
                    ),
                ])
                .require_all(),
            ),
        ),
    ])
    .require_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{translate, Dialect};

    #[test]
    fn test_stage_tags() {
        let tags: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(tags, vec!["analyst", "architect", "coder", "auditor"]);
        assert_eq!(Stage::Coder.to_string(), "coder");
    }

    #[test]
    fn test_plan_schema_requires_five_fields() {
        let schema = Stage::Analyst.response_schema().expect("analyst schema");
        let strict = translate(&schema, Dialect::Strict);
        let required = strict["required"].as_array().expect("required list");
        assert_eq!(required.len(), 5);
    }

    #[test]
    fn test_architect_is_plain_text() {
        assert!(Stage::Architect.response_schema().is_none());
        assert!(Stage::Architect.response_mime_type().is_none());
        assert_eq!(Stage::Coder.response_mime_type(), Some(JSON_MIME_TYPE));
    }

    #[test]
    fn test_audit_schema_restricts_severity() {
        let schema = Stage::Auditor.response_schema().expect("auditor schema");
        let loose = translate(&schema, Dialect::Loose);
        let severity = &loose["properties"]["findings"]["items"]["properties"]["severity"];
        assert_eq!(severity["enum"].as_array().map(|v| v.len()), Some(4));
    }

    #[test]
    fn test_stage_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Auditor).unwrap(), "\"auditor\"");
        let stage: Stage = serde_json::from_str("\"architect\"").unwrap();
        assert_eq!(stage, Stage::Architect);
    }
}
