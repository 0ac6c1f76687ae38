//! # Run Manifest
//!
//! Types for the `run.json` checkpoint: which artifacts are committed, the
//! current stage and the warnings collected so far. A stage of `complete`
//! is the run-completion marker.
//!
//! Each record keeps the updates its step merged, so the committed
//! whiteboard is a replay of the records in order. Writing `run.json`
//! commits a step's artifact and whiteboard effects together.

use crate::errors::PipelineWarning;
use crate::state::{ArtifactSpec, WhiteboardMap, WhiteboardStore};
use crate::swarm::pipeline::PipelineStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Record of one committed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub kind: String,
    pub order: u32,
    #[serde(default)]
    pub produced_keys: BTreeSet<String>,
    /// Entries this step merged into the whiteboard
    #[serde(default)]
    pub updates: WhiteboardMap,
    /// Path relative to the artifact directory
    pub file: String,
    pub bytes: usize,
    pub completed_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn new(spec: &ArtifactSpec, updates: &WhiteboardMap, bytes: usize) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind.clone(),
            order: spec.order,
            produced_keys: updates.keys().cloned().collect(),
            updates: updates.clone(),
            file: spec.file_name(),
            bytes,
            completed_at: Utc::now(),
        }
    }
}

/// The machine-readable state of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub task: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub stage: PipelineStage,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: Vec<ArtifactRecord>,
    #[serde(default)]
    pub warnings: Vec<PipelineWarning>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl RunManifest {
    pub fn new(task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task: task.into(),
            project_name: String::new(),
            stage: PipelineStage::Idle,
            started_at: now,
            updated_at: now,
            completed: Vec::new(),
            warnings: Vec::new(),
            last_error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage == PipelineStage::Complete
    }

    /// Highest `order` among committed artifacts
    pub fn highest_completed_order(&self) -> Option<u32> {
        self.completed.iter().map(|r| r.order).max()
    }

    pub fn is_committed(&self, file_name: &str) -> bool {
        self.completed.iter().any(|r| r.file == file_name)
    }

    /// Add or replace the record for an artifact
    pub fn record(&mut self, record: ArtifactRecord) {
        self.completed.retain(|r| r.file != record.file);
        self.completed.push(record);
        self.completed.sort_by_key(|r| r.order);
    }

    /// Keep only the records for `files`. Returns whether any were dropped.
    pub fn retain_committed(&mut self, files: &BTreeSet<String>) -> bool {
        let before = self.completed.len();
        self.completed.retain(|r| files.contains(&r.file));
        self.completed.len() != before
    }

    /// Whiteboard as of the last committed step
    pub fn whiteboard(&self) -> WhiteboardStore {
        let mut board = WhiteboardStore::new();
        for record in &self.completed {
            board.merge(&record.updates);
        }
        board
    }

    /// Append warnings not already recorded
    pub fn add_warnings<'a, I>(&mut self, warnings: I)
    where
        I: IntoIterator<Item = &'a PipelineWarning>,
    {
        for warning in warnings {
            if !self.warnings.contains(warning) {
                self.warnings.push(warning.clone());
            }
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, order: u32) -> ArtifactSpec {
        ArtifactSpec {
            name: name.to_string(),
            kind: "rs".to_string(),
            order,
            writes: BTreeSet::new(),
            reads: BTreeSet::new(),
            instructions: String::new(),
            constraints: String::new(),
        }
    }

    #[test]
    fn test_highest_completed_order() {
        let mut manifest = RunManifest::new("task");
        assert_eq!(manifest.highest_completed_order(), None);

        manifest.record(ArtifactRecord::new(&spec("b", 3), &WhiteboardMap::new(), 10));
        manifest.record(ArtifactRecord::new(&spec("a", 1), &WhiteboardMap::new(), 10));
        assert_eq!(manifest.highest_completed_order(), Some(3));
        assert_eq!(manifest.completed[0].file, "a.rs");
        assert!(manifest.is_committed("b.rs"));
        assert!(!manifest.is_committed("c.rs"));
    }

    #[test]
    fn test_rerecording_replaces_previous_record() {
        let mut manifest = RunManifest::new("task");
        manifest.record(ArtifactRecord::new(&spec("a", 1), &WhiteboardMap::new(), 10));
        manifest.record(ArtifactRecord::new(&spec("a", 1), &WhiteboardMap::new(), 20));
        assert_eq!(manifest.completed.len(), 1);
        assert_eq!(manifest.completed[0].bytes, 20);
    }

    fn updates(value: serde_json::Value) -> WhiteboardMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_whiteboard_replays_records_in_order() {
        let mut manifest = RunManifest::new("task");
        manifest.record(ArtifactRecord::new(
            &spec("b", 2),
            &updates(serde_json::json!({"x": "second", "y": 2})),
            1,
        ));
        manifest.record(ArtifactRecord::new(
            &spec("a", 1),
            &updates(serde_json::json!({"x": "first"})),
            1,
        ));
        assert!(manifest.completed[0].produced_keys.contains("x"));

        let board = manifest.whiteboard();
        assert_eq!(board.get("x"), Some(&serde_json::json!("second")));
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_retain_committed_drops_other_records() {
        let mut manifest = RunManifest::new("task");
        manifest.record(ArtifactRecord::new(&spec("a", 1), &updates(serde_json::json!({"x": 1})), 1));
        manifest.record(ArtifactRecord::new(&spec("b", 2), &updates(serde_json::json!({"y": 2})), 1));

        let keep: BTreeSet<String> = ["a.rs".to_string()].into();
        assert!(manifest.retain_committed(&keep));
        assert!(!manifest.retain_committed(&keep));
        assert_eq!(manifest.highest_completed_order(), Some(1));
        assert!(!manifest.whiteboard().contains("y"));
    }

    #[test]
    fn test_warnings_are_deduplicated() {
        let warning = PipelineWarning::UnsatisfiedRead {
            artifact: "a.rs".to_string(),
            key: "x".to_string(),
        };
        let mut manifest = RunManifest::new("task");
        manifest.add_warnings(&[warning.clone()]);
        manifest.add_warnings(&[warning]);
        assert_eq!(manifest.warnings.len(), 1);
    }

    #[test]
    fn test_completion_marker() {
        let mut manifest = RunManifest::new("task");
        assert!(!manifest.is_complete());
        manifest.stage = PipelineStage::Complete;

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["stage"]["stage"], "complete");
        let back: RunManifest = serde_json::from_value(json).unwrap();
        assert!(back.is_complete());
    }
}
