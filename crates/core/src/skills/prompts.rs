//! Prompt templates bundled at compile time, and the functions that fill
//! them in.

use crate::state::{ArtifactSpec, WhiteboardMap};

/// Architect - decomposes a task into ordered files
pub const ARCHITECT: &str = include_str!("defaults/architect.md");

/// Update protocol - appended to every artifact prompt
pub const UPDATE_PROTOCOL: &str = include_str!("defaults/update_protocol.md");

/// Architect system prompt with the artifact record schema filled in.
///
/// The schema is generated from [`ArtifactSpec`], the same type the plan
/// parser deserializes.
pub fn architect_system_prompt() -> String {
    let schema = schemars::schema_for!(ArtifactSpec);
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
    ARCHITECT.replace("{{RECORD_SCHEMA}}", &schema)
}

/// Generation prompt for one artifact with its projected context
pub fn artifact_prompt(spec: &ArtifactSpec, context: &WhiteboardMap) -> String {
    let mut prompt = format!(
        "FILE: {}\n\nGENERATION INSTRUCTIONS:\n{}",
        spec.file_name(),
        spec.instructions.trim()
    );

    if !context.is_empty() {
        prompt.push_str("\n\nAVAILABLE SHARED INFORMATION (from previous files):\n");
        for (key, value) in context {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
    }

    if !spec.constraints.trim().is_empty() {
        prompt.push_str(&format!("\n\nREQUIREMENTS:\n{}", spec.constraints.trim()));
    }

    if !spec.writes.is_empty() {
        let keys: Vec<&str> = spec.writes.iter().map(String::as_str).collect();
        prompt.push_str(&format!(
            "\n\nTHIS FILE MUST DEFINE THESE SHARED KEYS: {}",
            keys.join(", ")
        ));
    }

    prompt.push_str("\n\n");
    prompt.push_str(UPDATE_PROTOCOL);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ArtifactSpec {
        ArtifactSpec {
            name: "style".to_string(),
            kind: "css".to_string(),
            order: 2,
            writes: ["class_names".to_string()].into_iter().collect(),
            reads: ["html_ids".to_string()].into_iter().collect(),
            instructions: "Style the landing page".to_string(),
            constraints: "Mobile first".to_string(),
        }
    }

    #[test]
    fn test_architect_prompt_embeds_record_schema() {
        let prompt = architect_system_prompt();
        assert!(!prompt.contains("{{RECORD_SCHEMA}}"));
        assert!(prompt.contains("shared_state_writes"));
        assert!(prompt.contains("\"extension\""));
    }

    #[test]
    fn test_artifact_prompt_carries_instructions_context_and_constraints() {
        let context = json!({"html_ids": ["#hero", "#footer"]})
            .as_object()
            .cloned()
            .unwrap();
        let prompt = artifact_prompt(&spec(), &context);

        assert!(prompt.starts_with("FILE: style.css"));
        assert!(prompt.contains("Style the landing page"));
        assert!(prompt.contains("- html_ids: [\"#hero\",\"#footer\"]"));
        assert!(prompt.contains("REQUIREMENTS:\nMobile first"));
        assert!(prompt.contains("class_names"));
        assert!(prompt.contains("SHARED_STATE_UPDATE:"));
    }

    #[test]
    fn test_artifact_prompt_omits_empty_context() {
        let prompt = artifact_prompt(&spec(), &WhiteboardMap::new());
        assert!(!prompt.contains("AVAILABLE SHARED INFORMATION"));
    }
}
