use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Filename → file content.
///
/// Used for the primary input entry, user-supplied dependencies, and the
/// generated output set.
pub type FileMap = BTreeMap<String, String>;

/// The primary input: one named source artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInput {
    /// Logical filename of the source (e.g. `"deploy.sh"`).
    pub filename: String,

    /// Full source text.
    pub content: String,
}

impl SourceInput {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Output of the Analyst stage. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub summary: String,
    pub variables: Vec<String>,
    pub security_concerns: Vec<String>,
    pub migration_strategy: String,

    /// External files the source depends on. Non-empty suspends the run.
    pub required_files: Vec<String>,
}

impl Plan {
    /// Whether the run has to wait for caller-supplied files.
    pub fn needs_dependencies(&self) -> bool {
        !self.required_files.is_empty()
    }
}

/// Finding severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Models are inconsistent about casing ("HIGH", "high", "High").
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(serde::de::Error::unknown_variant(
                &raw,
                &["Critical", "High", "Medium", "Low"],
            )),
        }
    }
}

/// One issue reported by the Auditor stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub location: String,
}

/// Output of the Auditor stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub comments: String,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    /// Number of findings at the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Everything a completed run hands to the packaging collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub plan: Plan,

    /// Architect stage output.
    pub architecture: String,

    /// Generated files.
    pub files: FileMap,

    pub audit: AuditReport,
}
