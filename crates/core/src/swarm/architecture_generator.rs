//! # Architecture Generator
//!
//! Renders `architecture.md`, a human-readable overview of an accepted
//! plan: artifacts in generation order, the whiteboard keys each one reads
//! and writes, and a mermaid graph of key flow between artifacts.

use crate::errors::PipelineWarning;
use crate::state::ArchitecturePlan;
use std::collections::BTreeMap;

/// Generate the markdown overview for `plan`
pub fn generate_architecture(
    plan: &ArchitecturePlan,
    task: &str,
    warnings: &[PipelineWarning],
) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", plan.project_name));
    md.push_str(&format!(
        "_Generated plan with {} artifact(s)_\n\n",
        plan.len()
    ));

    md.push_str("## Task\n\n");
    md.push_str(task.trim());
    md.push_str("\n\n");

    md.push_str("## Artifacts\n\n");
    md.push_str("| Order | File | Reads | Writes |\n");
    md.push_str("|------:|------|-------|--------|\n");
    for spec in &plan.artifacts {
        md.push_str(&format!(
            "| {} | `{}` | {} | {} |\n",
            spec.order,
            spec.file_name(),
            key_list(spec.reads.iter()),
            key_list(spec.writes.iter()),
        ));
    }
    md.push('\n');

    // First writer of each key, in generation order
    let mut writers: BTreeMap<&str, usize> = BTreeMap::new();
    let mut edges = Vec::new();
    for (index, spec) in plan.artifacts.iter().enumerate() {
        for key in &spec.reads {
            if let Some(&from) = writers.get(key.as_str()) {
                edges.push((from, index, key.as_str()));
            }
        }
        for key in &spec.writes {
            writers.entry(key.as_str()).or_insert(index);
        }
    }

    md.push_str("## Key Flow\n\n");
    if edges.is_empty() {
        md.push_str("_No artifact reads keys written by another_\n\n");
    } else {
        md.push_str("```mermaid\ngraph LR\n");
        for (from, to, key) in &edges {
            md.push_str(&format!(
                "    a{}[\"{}\"] -- {} --> a{}[\"{}\"]\n",
                from,
                plan.artifacts[*from].file_name(),
                key,
                to,
                plan.artifacts[*to].file_name()
            ));
        }
        md.push_str("```\n\n");
    }

    if !warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warning in warnings {
            md.push_str(&format!("- {}\n", warning));
        }
        md.push('\n');
    }

    md
}

fn key_list<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    let keys: Vec<String> = keys.map(|k| format!("`{}`", k)).collect();
    if keys.is_empty() {
        "-".to_string()
    } else {
        keys.join(", ")
    }
}
