//! # Checkpoints
//!
//! Durable state of a run under the base path:
//!
//! ```text
//! matrioska_checkpoints/architecture.json   plan
//! matrioska_checkpoints/architecture.md     overview
//! matrioska_checkpoints/shared_state.json   whiteboard
//! matrioska_checkpoints/run.json            run manifest
//! matrioska_checkpoints/transcript.log      prompt/response log
//! matrioska_artifacts/<name>.<kind>         artifact contents
//! ```
//!
//! Every write is write-temp-then-rename. Missing files read back as "no
//! checkpoint yet", never as errors.

use super::io::{atomic_write, read_json, write_json, ARTIFACT_DIR, CHECKPOINT_DIR};
use super::json::RunManifest;
use super::specs::{ArchitecturePlan, Artifact, ArtifactSpec};
use super::whiteboard::{WhiteboardMap, WhiteboardStore};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

const PLAN_FILE: &str = "architecture.json";
const OVERVIEW_FILE: &str = "architecture.md";
const WHITEBOARD_FILE: &str = "shared_state.json";
const MANIFEST_FILE: &str = "run.json";
const TRANSCRIPT_FILE: &str = "transcript.log";

/// Reads and writes the checkpoint and artifact directories
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    base: PathBuf,
}

impl CheckpointManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.base.join(CHECKPOINT_DIR)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.base.join(ARTIFACT_DIR)
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.checkpoint_dir().join(TRANSCRIPT_FILE)
    }

    pub fn artifact_path(&self, spec: &ArtifactSpec) -> PathBuf {
        self.artifact_dir().join(spec.file_name())
    }

    pub async fn save_plan(&self, plan: &ArchitecturePlan) -> Result<()> {
        write_json(&self.checkpoint_dir().join(PLAN_FILE), plan).await
    }

    /// Persisted plan, re-sorted by `order`
    pub async fn load_plan(&self) -> Result<Option<ArchitecturePlan>> {
        let plan: Option<ArchitecturePlan> =
            read_json(&self.checkpoint_dir().join(PLAN_FILE)).await?;
        Ok(plan.map(|p| ArchitecturePlan::new(p.project_name, p.artifacts)))
    }

    pub async fn save_overview(&self, markdown: &str) -> Result<()> {
        atomic_write(
            &self.checkpoint_dir().join(OVERVIEW_FILE),
            markdown.as_bytes(),
        )
        .await
    }

    pub async fn save_whiteboard(&self, whiteboard: &WhiteboardStore) -> Result<()> {
        write_json(
            &self.checkpoint_dir().join(WHITEBOARD_FILE),
            &whiteboard.snapshot(),
        )
        .await
    }

    /// Persisted whiteboard, or an empty one on first run
    pub async fn load_whiteboard(&self) -> Result<WhiteboardStore> {
        let entries: Option<WhiteboardMap> =
            read_json(&self.checkpoint_dir().join(WHITEBOARD_FILE)).await?;
        Ok(entries.map(WhiteboardStore::from).unwrap_or_default())
    }

    /// Write the artifact's clean content. Returns the file path.
    pub async fn save_artifact(&self, artifact: &Artifact) -> Result<PathBuf> {
        let path = self.artifact_path(&artifact.spec);
        atomic_write(&path, artifact.content.as_bytes())
            .await
            .with_context(|| format!("Failed to save artifact {}", artifact.file_name()))?;
        Ok(path)
    }

    pub async fn load_artifact_content(&self, spec: &ArtifactSpec) -> Result<Option<String>> {
        let path = self.artifact_path(spec);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read artifact: {:?}", path)),
        }
    }

    pub async fn save_manifest(&self, manifest: &RunManifest) -> Result<()> {
        write_json(&self.checkpoint_dir().join(MANIFEST_FILE), manifest).await
    }

    pub async fn load_manifest(&self) -> Result<Option<RunManifest>> {
        read_json(&self.checkpoint_dir().join(MANIFEST_FILE)).await
    }

    /// Remove every checkpoint and artifact
    pub async fn reset(&self) -> Result<()> {
        for dir in [self.checkpoint_dir(), self.artifact_dir()] {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => tracing::info!(path = ?dir, "Removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {:?}", dir));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn spec(name: &str, kind: &str, order: u32) -> ArtifactSpec {
        ArtifactSpec {
            name: name.to_string(),
            kind: kind.to_string(),
            order,
            writes: BTreeSet::new(),
            reads: BTreeSet::new(),
            instructions: "write it".to_string(),
            constraints: String::new(),
        }
    }

    #[tokio::test]
    async fn test_first_run_has_no_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(dir.path());

        let plan = tokio_test::assert_ok!(checkpoints.load_plan().await);
        assert!(plan.is_none());
        assert!(checkpoints.load_whiteboard().await.unwrap().is_empty());
        assert!(checkpoints.load_manifest().await.unwrap().is_none());
        assert!(checkpoints
            .load_artifact_content(&spec("a", "js", 1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_plan_round_trip_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(dir.path());

        let plan = ArchitecturePlan {
            project_name: "demo".to_string(),
            artifacts: vec![spec("b", "js", 2), spec("a", "html", 1)],
        };
        checkpoints.save_plan(&plan).await.unwrap();

        let loaded = checkpoints.load_plan().await.unwrap().unwrap();
        assert_eq!(loaded.artifacts[0].file_name(), "a.html");
        assert_eq!(loaded.artifacts[1].file_name(), "b.js");

        let raw = fs::read_to_string(dir.path().join(CHECKPOINT_DIR).join(PLAN_FILE))
            .await
            .unwrap();
        assert!(raw.contains("shared_state_writes"));
    }

    #[tokio::test]
    async fn test_whiteboard_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(dir.path());

        let mut board = WhiteboardStore::new();
        board.merge(&json!({"a": 1, "ids": ["#x"]}).as_object().cloned().unwrap());
        checkpoints.save_whiteboard(&board).await.unwrap();

        assert_eq!(checkpoints.load_whiteboard().await.unwrap(), board);
    }

    #[tokio::test]
    async fn test_artifact_in_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(dir.path());

        let artifact = Artifact {
            spec: spec("src/main", "rs", 1),
            content: "fn main() {}".to_string(),
            produced_keys: BTreeSet::new(),
        };
        let path = checkpoints.save_artifact(&artifact).await.unwrap();
        assert_eq!(path, dir.path().join(ARTIFACT_DIR).join("src/main.rs"));
        assert_eq!(
            checkpoints
                .load_artifact_content(&artifact.spec)
                .await
                .unwrap()
                .as_deref(),
            Some("fn main() {}")
        );
    }

    #[tokio::test]
    async fn test_reset_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(dir.path());

        checkpoints
            .save_manifest(&RunManifest::new("task"))
            .await
            .unwrap();
        checkpoints.save_overview("# plan").await.unwrap();
        checkpoints
            .save_artifact(&Artifact {
                spec: spec("a", "txt", 1),
                content: "x".to_string(),
                produced_keys: BTreeSet::new(),
            })
            .await
            .unwrap();

        checkpoints.reset().await.unwrap();
        assert!(!checkpoints.checkpoint_dir().exists());
        assert!(!checkpoints.artifact_dir().exists());

        // Idempotent
        checkpoints.reset().await.unwrap();
    }
}
