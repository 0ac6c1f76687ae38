//! # Pipeline Orchestrator
//!
//! Drives a run from task description to committed artifacts:
//!
//! 1. Restore the persisted plan, or synthesize and persist a new one.
//! 2. Reload committed artifacts and the whiteboard.
//! 3. For each remaining artifact in ascending `order`: project its reads,
//!    generate, extract updates, merge, then persist the artifact and the
//!    run manifest. The manifest carries the step's updates, so its write
//!    commits the artifact and its whiteboard effects together.
//!
//! Generation is strictly sequential. Only the orchestrator mutates the
//! whiteboard, and only after a generation call has fully returned.
//! Cancellation is honoured between steps and while a generation call is in
//! flight, never between merge and persistence.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::{PipelineError, PipelineWarning};
use crate::models::{GenerationOptions, ModelConfig};
use crate::skills::{ArchitectSkill, BuilderSkill, TextGenerator, TranscriptGenerator};
use crate::state::{
    resolve_base_path, ArchitecturePlan, Artifact, ArtifactRecord, ArtifactSpec,
    CheckpointManager, RunManifest, WhiteboardMap, WhiteboardStore,
};

use super::architecture_generator::generate_architecture;
use super::events::{PipelineEvent, PipelineEventKind};
use super::pipeline::{Pipeline, PipelineStage};

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Model used for every generation call
    pub model: ModelConfig,
    /// Sampling for the architecture call
    pub architect_options: GenerationOptions,
    /// Sampling for artifact calls
    pub artifact_options: GenerationOptions,
    /// Root of the checkpoint and artifact directories
    pub base_path: Option<PathBuf>,
    /// Discard all checkpoints and synthesize a new plan
    pub force_architecture: bool,
    /// Unsatisfied reads reject the plan instead of warning
    pub strict_reads: bool,
    /// Append prompts and responses to `transcript.log`
    pub transcript: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            architect_options: GenerationOptions::default(),
            artifact_options: GenerationOptions::default(),
            base_path: None,
            force_architecture: false,
            strict_reads: false,
            transcript: true,
        }
    }
}

/// Commands accepted while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorCommand {
    /// Stop before the current artifact is committed
    Cancel,
}

/// Outcome of a run that got past plan acceptance
#[derive(Debug)]
pub struct PipelineRun {
    pub plan: ArchitecturePlan,
    /// Committed artifacts in generation order
    pub artifacts: Vec<Artifact>,
    /// Whiteboard snapshot after the last committed step
    pub whiteboard: WhiteboardMap,
    pub stage: PipelineStage,
    /// Fatal error that stopped the run
    pub error: Option<PipelineError>,
    /// Highest `order` committed so far, across resumes
    pub highest_completed_order: Option<u32>,
    /// Warnings recorded for this run, across resumes
    pub warnings: Vec<PipelineWarning>,
    pub events: Vec<PipelineEvent>,
    /// Whether every artifact is committed
    pub success: bool,
}

impl PipelineRun {
    pub fn artifact(&self, file_name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.file_name() == file_name)
    }
}

/// Everything a run carries between steps
struct RunState {
    plan: ArchitecturePlan,
    manifest: RunManifest,
    whiteboard: WhiteboardStore,
    artifacts: Vec<Artifact>,
}

/// The pipeline orchestrator
pub struct Orchestrator {
    config: OrchestratorConfig,
    generator: Arc<dyn TextGenerator>,
    checkpoints: CheckpointManager,
    pipeline: Pipeline,
    events: Vec<PipelineEvent>,
    next_seq: u64,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    command_rx: Option<mpsc::Receiver<OrchestratorCommand>>,
}

impl Orchestrator {
    /// Create an orchestrator over `generator`.
    ///
    /// With `config.transcript` set, the generator is wrapped so every call
    /// is appended to the transcript log.
    pub fn new(config: OrchestratorConfig, generator: Arc<dyn TextGenerator>) -> Self {
        let checkpoints = CheckpointManager::new(resolve_base_path(config.base_path.as_deref()));
        let generator: Arc<dyn TextGenerator> = if config.transcript {
            Arc::new(TranscriptGenerator::new(
                generator,
                checkpoints.transcript_path(),
            ))
        } else {
            generator
        };

        Self {
            config,
            generator,
            checkpoints,
            pipeline: Pipeline::new(),
            events: Vec::new(),
            next_seq: 0,
            event_tx: None,
            command_rx: None,
        }
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Set command channel for cancellation
    pub fn with_command_channel(mut self, rx: mpsc::Receiver<OrchestratorCommand>) -> Self {
        self.command_rx = Some(rx);
        self
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn stage(&self) -> PipelineStage {
        self.pipeline.stage
    }

    /// Emit an event
    async fn emit(&mut self, mut event: PipelineEvent) {
        event.seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run (or resume) the pipeline for `task`.
    ///
    /// Returns `Err` only when no plan could be established. Failures during
    /// generation come back as a [`PipelineRun`] with `error` set, so the
    /// committed prefix and `highest_completed_order` stay observable.
    #[tracing::instrument(skip(self), fields(task_preview = %task.chars().take(50).collect::<String>()))]
    pub async fn run(&mut self, task: &str) -> Result<PipelineRun, PipelineError> {
        self.pipeline = Pipeline::new();
        self.events.clear();
        self.next_seq = 0;

        self.emit(
            PipelineEvent::new(PipelineEventKind::RunStarted, "Run started").with_data(json!({
                "base_path": self.checkpoints.base_path().display().to_string(),
            })),
        )
        .await;

        let mut state = match self.setup(task).await {
            Ok(state) => state,
            Err(error) => {
                tracing::error!(kind = error.kind(), "Run aborted before generation: {}", error);
                self.emit(
                    PipelineEvent::new(PipelineEventKind::RunFailed, error.to_string())
                        .with_data(json!({"kind": error.kind()})),
                )
                .await;
                return Err(error);
            }
        };

        let start = state.artifacts.len();
        self.pipeline.plan_ready(state.plan.len());
        self.pipeline.start_at(start);

        if self.pipeline.is_success() && state.manifest.is_complete() {
            tracing::info!(
                artifacts = state.artifacts.len(),
                "Run already complete; nothing to generate"
            );
            self.emit(PipelineEvent::new(
                PipelineEventKind::RunCompleted,
                "Run already complete",
            ))
            .await;
            return Ok(self.finish(state, None));
        }

        if start > 0 {
            tracing::info!(
                resume_at = ?state.plan.artifacts.get(start).map(|a| a.order),
                committed = start,
                "Resuming interrupted run"
            );
        }

        while let PipelineStage::Generating(position) = self.pipeline.stage {
            let spec = state.plan.artifacts[position].clone();
            match self
                .step(position, &spec, &mut state.whiteboard, &mut state.manifest)
                .await
            {
                Ok(artifact) => state.artifacts.push(artifact),
                Err(error) => {
                    self.record_failure(&error, &mut state.manifest).await;
                    return Ok(self.finish(state, Some(error)));
                }
            }
        }

        if !state.manifest.is_complete() {
            state.manifest.stage = PipelineStage::Complete;
            state.manifest.touch();
            if let Err(e) = self.checkpoints.save_manifest(&state.manifest).await {
                let error = PipelineError::persistence("save run manifest", e);
                self.record_failure(&error, &mut state.manifest).await;
                return Ok(self.finish(state, Some(error)));
            }
        }

        tracing::info!(
            artifacts = state.artifacts.len(),
            keys = state.whiteboard.len(),
            "Run complete"
        );
        self.emit(
            PipelineEvent::new(PipelineEventKind::RunCompleted, "Run complete").with_data(json!({
                "artifacts": state.artifacts.len(),
                "warnings": state.manifest.warnings.len(),
            })),
        )
        .await;

        Ok(self.finish(state, None))
    }

    /// Establish the plan, manifest, whiteboard and committed artifacts
    async fn setup(&mut self, task: &str) -> Result<RunState, PipelineError> {
        if self.config.force_architecture {
            return self.synthesize(task).await;
        }

        let restored = self
            .checkpoints
            .load_plan()
            .await
            .map_err(|e| PipelineError::persistence("load plan", e))?;

        match restored {
            Some(plan) => self.restore(task, plan).await,
            None => self.synthesize(task).await,
        }
    }

    async fn synthesize(&mut self, task: &str) -> Result<RunState, PipelineError> {
        tracing::info!("Synthesizing architecture");
        let outcome = ArchitectSkill::new(self.generator.clone(), self.config.architect_options)
            .with_strict_reads(self.config.strict_reads)
            .run(task)
            .await?;
        let plan = outcome.plan;

        // The previous run survives until a replacement plan is accepted
        if self.config.force_architecture {
            tracing::info!("Forcing a new architecture; clearing checkpoints");
            self.checkpoints
                .reset()
                .await
                .map_err(|e| PipelineError::persistence("reset checkpoints", e))?;
        }

        let mut manifest = RunManifest::new(task.trim());
        manifest.project_name = plan.project_name.clone();
        manifest.stage = PipelineStage::PlanReady;
        manifest.add_warnings(&outcome.warnings);

        let whiteboard = WhiteboardStore::new();
        self.checkpoints
            .save_plan(&plan)
            .await
            .map_err(|e| PipelineError::persistence("save plan", e))?;
        self.checkpoints
            .save_whiteboard(&whiteboard)
            .await
            .map_err(|e| PipelineError::persistence("save whiteboard", e))?;
        self.checkpoints
            .save_manifest(&manifest)
            .await
            .map_err(|e| PipelineError::persistence("save run manifest", e))?;

        let overview = generate_architecture(&plan, task, &outcome.warnings);
        if let Err(e) = self.checkpoints.save_overview(&overview).await {
            tracing::warn!("Failed to write architecture overview: {:#}", e);
        }

        self.emit(
            PipelineEvent::new(
                PipelineEventKind::PlanSynthesized,
                format!("Planned {} artifact(s)", plan.len()),
            )
            .with_data(json!({
                "project_name": plan.project_name,
                "artifacts": plan.artifacts.iter().map(ArtifactSpec::file_name).collect::<Vec<_>>(),
            })),
        )
        .await;
        for warning in &outcome.warnings {
            self.emit_warning(warning).await;
        }

        Ok(RunState {
            plan,
            manifest,
            whiteboard,
            artifacts: Vec::new(),
        })
    }

    async fn restore(&mut self, task: &str, plan: ArchitecturePlan) -> Result<RunState, PipelineError> {
        let report = plan.validate();
        if !report.is_valid() {
            return Err(PipelineError::PlanSynthesis(format!(
                "persisted plan is invalid: {}",
                report.errors.join("; ")
            )));
        }

        let manifest = self
            .checkpoints
            .load_manifest()
            .await
            .map_err(|e| PipelineError::persistence("load run manifest", e))?;

        let mut manifest = manifest.unwrap_or_else(|| {
            let mut manifest = RunManifest::new(task.trim());
            manifest.project_name = plan.project_name.clone();
            manifest.stage = PipelineStage::PlanReady;
            manifest.add_warnings(&report.warnings);
            manifest
        });

        if manifest.task.trim() != task.trim() {
            tracing::warn!(
                recorded = %manifest.task,
                "Task differs from the persisted run; continuing the persisted plan (use force to re-plan)"
            );
        }

        let artifacts = self.restore_artifacts(&plan, &manifest).await?;

        let committed: BTreeSet<String> = artifacts.iter().map(Artifact::file_name).collect();
        if manifest.retain_committed(&committed) {
            tracing::warn!(
                committed = artifacts.len(),
                "Dropping manifest records past the restored prefix"
            );
            manifest.stage = if artifacts.is_empty() {
                PipelineStage::PlanReady
            } else if artifacts.len() == plan.len() {
                PipelineStage::Complete
            } else {
                PipelineStage::Generating(artifacts.len())
            };
            manifest.touch();
            self.checkpoints
                .save_manifest(&manifest)
                .await
                .map_err(|e| PipelineError::persistence("save run manifest", e))?;
        }

        // Only what run.json records is committed; the whiteboard file follows it
        let whiteboard = manifest.whiteboard();
        let on_disk = self.checkpoints.load_whiteboard().await.ok();
        if on_disk.as_ref() != Some(&whiteboard) {
            tracing::warn!(
                keys = whiteboard.len(),
                "Whiteboard file does not match the committed steps; rewriting it"
            );
            self.checkpoints
                .save_whiteboard(&whiteboard)
                .await
                .map_err(|e| PipelineError::persistence("save whiteboard", e))?;
        }

        tracing::info!(
            project = %plan.project_name,
            committed = artifacts.len(),
            total = plan.len(),
            "Restored persisted plan"
        );
        self.emit(
            PipelineEvent::new(
                PipelineEventKind::PlanRestored,
                format!(
                    "Restored plan: {}/{} artifact(s) committed",
                    artifacts.len(),
                    plan.len()
                ),
            )
            .with_data(json!({
                "project_name": plan.project_name,
                "committed": artifacts.len(),
                "highest_completed_order": manifest.highest_completed_order(),
            })),
        )
        .await;

        Ok(RunState {
            plan,
            manifest,
            whiteboard,
            artifacts,
        })
    }

    /// Committed prefix of the plan, with contents read back from disk
    async fn restore_artifacts(
        &self,
        plan: &ArchitecturePlan,
        manifest: &RunManifest,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let mut artifacts = Vec::new();
        for spec in &plan.artifacts {
            let file_name = spec.file_name();
            let Some(record) = manifest.completed.iter().find(|r| r.file == file_name) else {
                break;
            };

            let content = self
                .checkpoints
                .load_artifact_content(spec)
                .await
                .map_err(|e| PipelineError::persistence(format!("load {}", file_name), e))?;
            let Some(content) = content else {
                tracing::warn!(artifact = %file_name, "Committed artifact missing on disk; regenerating");
                break;
            };

            artifacts.push(Artifact {
                spec: spec.clone(),
                content,
                produced_keys: record.produced_keys.clone(),
            });
        }
        Ok(artifacts)
    }

    /// Generate and commit the artifact at `position`
    async fn step(
        &mut self,
        position: usize,
        spec: &ArtifactSpec,
        whiteboard: &mut WhiteboardStore,
        manifest: &mut RunManifest,
    ) -> Result<Artifact, PipelineError> {
        let file_name = spec.file_name();

        if self.cancel_requested() {
            return Err(PipelineError::Cancelled {
                artifact: file_name,
            });
        }

        manifest.stage = PipelineStage::Generating(position);
        manifest.touch();
        self.checkpoints
            .save_manifest(manifest)
            .await
            .map_err(|e| PipelineError::persistence("save run manifest", e))?;

        tracing::info!(artifact = %file_name, order = spec.order, "Generating artifact");
        self.emit(
            PipelineEvent::new(
                PipelineEventKind::ArtifactStarted,
                format!("Generating {}", file_name),
            )
            .with_artifact(&file_name)
            .with_data(json!({"order": spec.order, "position": position})),
        )
        .await;

        let builder = BuilderSkill::new(self.generator.clone(), self.config.artifact_options);
        let output = tokio::select! {
            result = builder.run(spec, whiteboard) => result?,
            _ = wait_for_cancel(self.command_rx.as_mut()) => {
                return Err(PipelineError::Cancelled { artifact: file_name.clone() });
            }
        };

        // Merge and persistence form one unit; no cancellation past here
        let mut next_board = whiteboard.clone();
        let produced = next_board.merge(&output.updates);
        let artifact = Artifact {
            spec: spec.clone(),
            content: output.content,
            produced_keys: produced.clone(),
        };

        self.checkpoints
            .save_artifact(&artifact)
            .await
            .map_err(|e| PipelineError::persistence(format!("save {}", file_name), e))?;

        let mut next = self.pipeline.clone();
        next.advance();
        let mut next_manifest = manifest.clone();
        next_manifest.record(ArtifactRecord::new(
            spec,
            &output.updates,
            artifact.content.len(),
        ));
        next_manifest.add_warnings(&output.warnings);
        next_manifest.stage = next.stage;
        next_manifest.last_error = None;
        next_manifest.touch();
        self.checkpoints
            .save_manifest(&next_manifest)
            .await
            .map_err(|e| PipelineError::persistence("save run manifest", e))?;

        *manifest = next_manifest;
        *whiteboard = next_board;
        self.pipeline = next;

        if let Err(e) = self.checkpoints.save_whiteboard(whiteboard).await {
            tracing::warn!(artifact = %file_name, "Failed to mirror whiteboard file: {:#}", e);
        }

        for warning in &output.warnings {
            self.emit_warning(warning).await;
        }
        if !produced.is_empty() {
            self.emit(
                PipelineEvent::new(
                    PipelineEventKind::WhiteboardUpdated,
                    format!("{} key(s) written", produced.len()),
                )
                .with_artifact(&file_name)
                .with_data(json!({"keys": produced})),
            )
            .await;
        }

        tracing::info!(
            artifact = %file_name,
            bytes = artifact.content.len(),
            keys = produced.len(),
            "Artifact committed"
        );
        self.emit(
            PipelineEvent::new(
                PipelineEventKind::ArtifactCompleted,
                format!("Committed {}", file_name),
            )
            .with_artifact(&file_name)
            .with_data(json!({
                "order": spec.order,
                "bytes": artifact.content.len(),
            })),
        )
        .await;

        Ok(artifact)
    }

    async fn emit_warning(&mut self, warning: &PipelineWarning) {
        self.emit(
            PipelineEvent::new(PipelineEventKind::Warning, warning.to_string())
                .with_artifact(warning.artifact())
                .with_data(serde_json::to_value(warning).unwrap_or_default()),
        )
        .await;
    }

    /// Non-blocking check for a pending cancel
    fn cancel_requested(&mut self) -> bool {
        match self.command_rx.as_mut() {
            Some(rx) => matches!(rx.try_recv(), Ok(OrchestratorCommand::Cancel)),
            None => false,
        }
    }

    /// Move to `Failed(i)` and record the error in the manifest
    async fn record_failure(&mut self, error: &PipelineError, manifest: &mut RunManifest) {
        self.pipeline.fail();
        manifest.stage = self.pipeline.stage;
        manifest.last_error = Some(error.to_string());
        manifest.touch();
        if let Err(e) = self.checkpoints.save_manifest(manifest).await {
            tracing::warn!("Failed to record run failure: {:#}", e);
        }

        let kind = match error {
            PipelineError::Cancelled { .. } => {
                tracing::warn!(stage = %self.pipeline.stage, "Run cancelled");
                PipelineEventKind::RunCancelled
            }
            _ => {
                tracing::error!(stage = %self.pipeline.stage, kind = error.kind(), "Run failed: {}", error);
                PipelineEventKind::RunFailed
            }
        };
        self.emit(
            PipelineEvent::new(kind, error.to_string()).with_data(json!({
                "kind": error.kind(),
                "highest_completed_order": manifest.highest_completed_order(),
            })),
        )
        .await;
    }

    fn finish(&self, state: RunState, error: Option<PipelineError>) -> PipelineRun {
        PipelineRun {
            highest_completed_order: state.manifest.highest_completed_order(),
            warnings: state.manifest.warnings,
            whiteboard: state.whiteboard.snapshot(),
            plan: state.plan,
            artifacts: state.artifacts,
            stage: self.pipeline.stage,
            error,
            events: self.events.clone(),
            success: self.pipeline.is_success(),
        }
    }
}

/// Resolves when a cancel arrives; pending forever without a channel
async fn wait_for_cancel(rx: Option<&mut mpsc::Receiver<OrchestratorCommand>>) {
    if let Some(rx) = rx {
        if let Some(OrchestratorCommand::Cancel) = rx.recv().await {
            return;
        }
    }
    std::future::pending::<()>().await
}
