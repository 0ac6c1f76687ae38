//! # Architecture Plan
//!
//! Data model for the ordered artifact specifications produced by the
//! architecture phase, plus acceptance validation.
//!
//! Records are persisted with the field names the architect is asked to emit
//! (`extension`, `shared_state_writes`, `content`, ...). Shorter aliases are
//! accepted on input, and scalar-vs-list mistakes are tolerated because the
//! plan comes from model output.

use crate::errors::PipelineWarning;
use schemars::JsonSchema;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

/// One artifact to generate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactSpec {
    /// File name without extension; may contain relative `/` segments
    pub name: String,
    /// File extension, without the leading dot
    #[serde(
        rename = "extension",
        alias = "kind",
        default,
        deserialize_with = "de_extension"
    )]
    #[schemars(with = "String")]
    pub kind: String,
    /// Creation order; unique positive integer
    #[serde(deserialize_with = "de_order")]
    #[schemars(with = "u32")]
    pub order: u32,
    /// Whiteboard keys this artifact defines
    #[serde(
        rename = "shared_state_writes",
        alias = "writes",
        default,
        deserialize_with = "de_keys"
    )]
    #[schemars(with = "Vec<String>")]
    pub writes: BTreeSet<String>,
    /// Whiteboard keys this artifact needs from earlier artifacts
    #[serde(
        rename = "shared_state_reads",
        alias = "reads",
        default,
        deserialize_with = "de_keys"
    )]
    #[schemars(with = "Vec<String>")]
    pub reads: BTreeSet<String>,
    /// Complete generation prompt for this artifact
    #[serde(
        rename = "content",
        alias = "instructions",
        default,
        deserialize_with = "de_text"
    )]
    #[schemars(with = "String")]
    pub instructions: String,
    /// Functional and non-functional requirements
    #[serde(
        rename = "details",
        alias = "constraints",
        default,
        deserialize_with = "de_text"
    )]
    #[schemars(with = "String")]
    pub constraints: String,
}

impl ArtifactSpec {
    /// `name.kind`, or just `name` when the kind is empty
    pub fn file_name(&self) -> String {
        if self.kind.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.kind)
        }
    }
}

/// The ordered set of artifact specifications for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitecturePlan {
    pub project_name: String,
    #[serde(rename = "files", alias = "artifacts")]
    pub artifacts: Vec<ArtifactSpec>,
}

/// Outcome of checking a plan's invariants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanValidation {
    /// Violations that make the plan unusable
    pub errors: Vec<String>,
    /// Soft contract violations
    pub warnings: Vec<PipelineWarning>,
}

impl PlanValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ArchitecturePlan {
    /// Build a plan with artifacts sorted by `order`
    pub fn new(project_name: impl Into<String>, mut artifacts: Vec<ArtifactSpec>) -> Self {
        artifacts.sort_by_key(|a| a.order);
        Self {
            project_name: project_name.into(),
            artifacts,
        }
    }

    /// Interpret a parsed architect response.
    ///
    /// Accepts `{"instructs": {"files": [...]}}`, `{"files": [...]}` or a bare
    /// array of records.
    pub fn from_document(document: &Value) -> Result<Self, String> {
        let records = locate_records(document).ok_or_else(|| {
            "response has no artifact list (expected 'instructs.files')".to_string()
        })?;

        let artifacts = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                ArtifactSpec::deserialize(record)
                    .map_err(|e| format!("artifact record #{} is invalid: {}", i + 1, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let project_name = ["project_name", "name"]
            .iter()
            .find_map(|field| {
                document
                    .get(field)
                    .or_else(|| document.get("instructs").and_then(|i| i.get(field)))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("Project_{}_Files", artifacts.len()));

        Ok(Self::new(project_name, artifacts))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Sequence position of the artifact with the given file name
    pub fn position_of(&self, file_name: &str) -> Option<usize> {
        self.artifacts
            .iter()
            .position(|a| a.file_name() == file_name)
    }

    /// Check ordering, naming and dependency soundness.
    ///
    /// Unique positive orders, unique safe file names and a non-empty
    /// artifact list are hard requirements. A read key that no strictly
    /// earlier artifact writes is only a warning.
    pub fn validate(&self) -> PlanValidation {
        let mut report = PlanValidation::default();

        if self.artifacts.is_empty() {
            report.errors.push("plan contains no artifacts".to_string());
            return report;
        }

        let mut orders: HashMap<u32, &str> = HashMap::new();
        let mut names: HashSet<String> = HashSet::new();
        for spec in &self.artifacts {
            if spec.order == 0 {
                report
                    .errors
                    .push(format!("{} has order 0; orders start at 1", spec.name));
            }
            if let Some(previous) = orders.insert(spec.order, &spec.name) {
                report.errors.push(format!(
                    "order {} is used by both {} and {}",
                    spec.order, previous, spec.name
                ));
            }
            if let Err(reason) = check_artifact_name(&spec.name) {
                report
                    .errors
                    .push(format!("artifact name '{}' {}", spec.name, reason));
            }
            if spec.kind.contains(['/', '\\']) {
                report
                    .errors
                    .push(format!("extension '{}' is not a plain extension", spec.kind));
            }
            if !names.insert(spec.file_name()) {
                report
                    .errors
                    .push(format!("{} is declared more than once", spec.file_name()));
            }
        }

        let mut ordered: Vec<&ArtifactSpec> = self.artifacts.iter().collect();
        ordered.sort_by_key(|a| a.order);

        let mut written: BTreeSet<&str> = BTreeSet::new();
        for spec in ordered {
            for key in &spec.reads {
                if !written.contains(key.as_str()) {
                    report.warnings.push(PipelineWarning::UnsatisfiedRead {
                        artifact: spec.file_name(),
                        key: key.clone(),
                    });
                }
            }
            written.extend(spec.writes.iter().map(String::as_str));
        }

        report
    }
}

/// A generated artifact with its marker-stripped content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub spec: ArtifactSpec,
    pub content: String,
    pub produced_keys: BTreeSet<String>,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        self.spec.file_name()
    }
}

fn locate_records(document: &Value) -> Option<&Vec<Value>> {
    match document {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("instructs")
            .and_then(|instructs| instructs.get("files"))
            .or_else(|| map.get("files"))
            .or_else(|| map.get("artifacts"))
            .and_then(Value::as_array),
        _ => None,
    }
}

fn check_artifact_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("is empty");
    }
    if name.starts_with('/') || name.contains('\\') || name.contains(':') {
        return Err("must be a relative path");
    }
    if name
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err("contains an empty, '.' or '..' path segment");
    }
    Ok(())
}

fn de_order<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("order must be a positive integer, got {}", value)))
}

fn de_keys<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let keys = match value {
        Value::Null => BTreeSet::new(),
        Value::String(s) => std::iter::once(s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        other => {
            return Err(de::Error::custom(format!(
                "expected a list of keys, got {}",
                other
            )))
        }
    };
    Ok(keys)
}

fn de_extension<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().trim_start_matches('.').to_string())
        .unwrap_or_default())
}

fn de_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => format!("- {}", s),
                other => format!("- {}", other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, order: u32, writes: &[&str], reads: &[&str]) -> ArtifactSpec {
        ArtifactSpec {
            name: name.to_string(),
            kind: "js".to_string(),
            order,
            writes: writes.iter().map(|s| s.to_string()).collect(),
            reads: reads.iter().map(|s| s.to_string()).collect(),
            instructions: format!("write {}", name),
            constraints: String::new(),
        }
    }

    #[test]
    fn test_from_document_accepts_instructs_files() {
        let doc = json!({
            "instructs": {
                "files": [
                    {
                        "name": "style",
                        "extension": ".css",
                        "order": 2,
                        "shared_state_writes": [],
                        "shared_state_reads": ["html_ids"],
                        "content": "Style the page",
                        "details": "Responsive"
                    },
                    {
                        "name": "index",
                        "extension": "html",
                        "order": 1,
                        "shared_state_writes": ["html_ids"],
                        "shared_state_reads": [],
                        "content": "Build the page",
                        "details": "Semantic markup"
                    }
                ]
            }
        });

        let plan = ArchitecturePlan::from_document(&doc).unwrap();
        assert_eq!(plan.project_name, "Project_2_Files");
        assert_eq!(plan.artifacts[0].file_name(), "index.html");
        assert_eq!(plan.artifacts[1].file_name(), "style.css");
        assert!(plan.artifacts[1].reads.contains("html_ids"));
        assert_eq!(plan.artifacts[0].instructions, "Build the page");
        assert_eq!(plan.artifacts[0].constraints, "Semantic markup");
    }

    #[test]
    fn test_from_document_tolerates_loose_fields() {
        let doc = json!([
            {
                "name": "app",
                "kind": "py",
                "order": "1",
                "writes": "api_routes",
                "instructions": "Write the app",
                "constraints": ["fast", "small"]
            }
        ]);

        let plan = ArchitecturePlan::from_document(&doc).unwrap();
        let app = &plan.artifacts[0];
        assert_eq!(app.order, 1);
        assert_eq!(app.kind, "py");
        assert!(app.writes.contains("api_routes"));
        assert!(app.reads.is_empty());
        assert_eq!(app.constraints, "- fast\n- small");
    }

    #[test]
    fn test_from_document_uses_declared_project_name() {
        let doc = json!({"project_name": "Todo App", "files": [
            {"name": "index", "extension": "html", "order": 1}
        ]});
        let plan = ArchitecturePlan::from_document(&doc).unwrap();
        assert_eq!(plan.project_name, "Todo App");
    }

    #[test]
    fn test_from_document_rejects_missing_file_list() {
        let err = ArchitecturePlan::from_document(&json!({"plan": "nope"})).unwrap_err();
        assert!(err.contains("instructs.files"));
    }

    #[test]
    fn test_from_document_rejects_negative_order() {
        let doc = json!({"files": [{"name": "a", "extension": "js", "order": -1}]});
        let err = ArchitecturePlan::from_document(&doc).unwrap_err();
        assert!(err.contains("#1"));
    }

    #[test]
    fn test_persisted_shape_round_trips() {
        let plan = ArchitecturePlan::new("demo", vec![spec("app", 1, &["a"], &[])]);
        let json = serde_json::to_value(&plan).unwrap();
        assert!(json["files"][0]["shared_state_writes"].is_array());
        assert_eq!(json["files"][0]["extension"], "js");

        let back: ArchitecturePlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_validate_accepts_sound_plan() {
        let plan = ArchitecturePlan::new(
            "demo",
            vec![spec("a", 1, &["a"], &[]), spec("b", 2, &["b"], &["a"])],
        );
        let report = plan.validate();
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_validate_warns_on_unsatisfied_reads() {
        let plan = ArchitecturePlan::new(
            "demo",
            vec![
                spec("a", 1, &["a"], &["later"]),
                spec("b", 2, &["later"], &["x"]),
            ],
        );
        let report = plan.validate();
        assert!(report.is_valid());
        assert_eq!(
            report.warnings,
            vec![
                PipelineWarning::UnsatisfiedRead {
                    artifact: "a.js".to_string(),
                    key: "later".to_string()
                },
                PipelineWarning::UnsatisfiedRead {
                    artifact: "b.js".to_string(),
                    key: "x".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_orders_and_names() {
        let plan = ArchitecturePlan::new(
            "demo",
            vec![spec("a", 1, &[], &[]), spec("a", 1, &[], &[])],
        );
        let report = plan.validate();
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_validate_rejects_unsafe_names_and_zero_order() {
        let plan = ArchitecturePlan::new(
            "demo",
            vec![spec("../escape", 0, &[], &[]), spec("src/ok", 1, &[], &[])],
        );
        let report = plan.validate();
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().any(|e| e.contains("order 0")));
        assert!(report.errors.iter().any(|e| e.contains("../escape")));
    }

    #[test]
    fn test_validate_rejects_empty_plan() {
        let plan = ArchitecturePlan::new("demo", Vec::new());
        assert!(!plan.validate().is_valid());
    }
}
