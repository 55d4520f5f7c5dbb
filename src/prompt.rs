//! Prompt construction for the four stages.
//!
//! Prompts are assembled from `## Heading` sections. Inputs are borrowed and
//! never modified; every builder is a pure function of its arguments.

use crate::stage::Stage;
use crate::types::{FileMap, Plan, SourceInput};

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// Render files as `### File: `name`` headings with fenced contents.
///
/// Uses the same layout the tolerant file extractor recognizes, so models
/// that echo the style produce recoverable output.
pub fn file_listing(files: &FileMap) -> String {
    files
        .iter()
        .map(|(name, content)| format!("### File: `{}`\n```\n{}\n```", name, content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None.".to_string()
    } else {
        numbered_list(items)
    }
}

/// The system instruction for a stage.
pub fn system_instruction(stage: Stage) -> &'static str {
    match stage {
        Stage::Analyst => {
            "You are a senior engineer analyzing a legacy source artifact before migrating it. \
             Identify what it does, its variables and settings, its security problems, a \
             migration strategy, and every external file it references that was not provided."
        }
        Stage::Architect => {
            "You are a software architect. Design the target structure for the migration: \
             the files to produce, their responsibilities, and how they fit together. \
             Answer in prose; do not write the code."
        }
        Stage::Coder => {
            "You are an expert engineer. Write every file of the migrated implementation, \
             complete and ready to use, following the architecture you are given."
        }
        Stage::Auditor => {
            "You are a security and quality auditor. Review the generated files against the \
             migration plan and report concrete findings with a severity and a location."
        }
    }
}

fn plan_sections(plan: &Plan) -> Vec<String> {
    vec![
        section("Summary", &plan.summary),
        section("Variables", &list_or_none(&plan.variables)),
        section("Security Concerns", &list_or_none(&plan.security_concerns)),
        section("Migration Strategy", &plan.migration_strategy),
    ]
}

fn source_section(source: &SourceInput) -> String {
    section(
        "Source",
        &format!("### File: `{}`\n```\n{}\n```", source.filename, source.content),
    )
}

/// Analyst prompt: the source artifact alone.
pub fn analyst_prompt(source: &SourceInput) -> String {
    [
        source_section(source),
        section(
            "Task",
            "Analyze the source above. List in `required_files` only files it loads, \
             includes or sources that are not shown here; leave it empty otherwise.",
        ),
    ]
    .join("\n\n")
}

/// Architect prompt: source, plan and any supplied dependencies.
pub fn architect_prompt(source: &SourceInput, plan: &Plan, dependencies: &FileMap) -> String {
    let mut parts = vec![source_section(source)];
    parts.extend(plan_sections(plan));
    if !dependencies.is_empty() {
        parts.push(section("Dependencies", &file_listing(dependencies)));
    }
    parts.push(section("Task", "Describe the target architecture for this migration."));
    parts.join("\n\n")
}

/// Coder prompt: everything the architect saw plus the architecture.
pub fn coder_prompt(
    source: &SourceInput,
    plan: &Plan,
    architecture: &str,
    dependencies: &FileMap,
) -> String {
    let mut parts = vec![source_section(source)];
    parts.extend(plan_sections(plan));
    if !dependencies.is_empty() {
        parts.push(section("Dependencies", &file_listing(dependencies)));
    }
    parts.push(section("Architecture", architecture));
    parts.push(section(
        "Task",
        "Write every file of the implementation. Return each file with its relative \
         filename and full content.",
    ));
    parts.join("\n\n")
}

/// Auditor prompt: the plan and the generated files.
pub fn auditor_prompt(plan: &Plan, files: &FileMap) -> String {
    let mut parts = plan_sections(plan);
    parts.push(section("Generated Files", &file_listing(files)));
    parts.push(section(
        "Task",
        "Audit the generated files. Report each problem as a finding; use an empty list \
         if there are none.",
    ));
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output_parser::extract_files;

    fn sample_plan() -> Plan {
        Plan {
            summary: "Deploys a web app".into(),
            variables: vec!["APP_ENV".into(), "PORT".into()],
            security_concerns: vec![],
            migration_strategy: "Port to Terraform".into(),
            required_files: vec!["env.sh".into()],
        }
    }

    #[test]
    fn test_numbered_list() {
        let items = vec!["First".to_string(), "Second".to_string()];
        assert_eq!(numbered_list(&items), "1. First\n2. Second");
        assert_eq!(numbered_list(&[]), "");
    }

    #[test]
    fn test_section() {
        assert_eq!(section("Context", "Some knowledge"), "## Context\nSome knowledge");
    }

    #[test]
    fn test_analyst_prompt_contains_source() {
        let source = SourceInput::new("deploy.sh", "source ./env.sh\necho $PORT");
        let prompt = analyst_prompt(&source);
        assert!(prompt.contains("### File: `deploy.sh`"));
        assert!(prompt.contains("echo $PORT"));
    }

    #[test]
    fn test_plan_sections_render_lists() {
        let source = SourceInput::new("deploy.sh", "x");
        let prompt = architect_prompt(&source, &sample_plan(), &FileMap::new());
        assert!(prompt.contains("## Variables\n1. APP_ENV\n2. PORT"));
        assert!(prompt.contains("## Security Concerns\nNone."));
        assert!(!prompt.contains("## Dependencies"));
    }

    #[test]
    fn test_coder_prompt_includes_dependencies_and_architecture() {
        let source = SourceInput::new("deploy.sh", "x");
        let mut deps = FileMap::new();
        deps.insert("env.sh".into(), "export PORT=80".into());
        let prompt = coder_prompt(&source, &sample_plan(), "Two modules.", &deps);
        assert!(prompt.contains("## Dependencies\n### File: `env.sh`"));
        assert!(prompt.contains("## Architecture\nTwo modules."));
    }

    #[test]
    fn test_file_listing_is_recoverable() {
        let mut files = FileMap::new();
        files.insert("main.tf".into(), "resource \"x\" \"y\" {}".into());
        files.insert("vars.tf".into(), "variable \"port\" {}".into());
        let recovered = extract_files(&file_listing(&files)).unwrap();
        assert_eq!(recovered.files, files);
    }

    #[test]
    fn test_every_stage_has_a_system_instruction() {
        for stage in Stage::ALL {
            assert!(!system_instruction(stage).is_empty());
        }
    }
}
