//! # Builder Skill
//!
//! Generates one artifact: projects the declared reads off the whiteboard,
//! builds the request, calls the generator and splits the response into
//! clean content and whiteboard updates.
//!
//! The skill only reads the whiteboard. Merging the returned updates is the
//! orchestrator's job, after the call has fully returned.

use crate::errors::{PipelineError, PipelineWarning};
use crate::models::GenerationOptions;
use crate::skills::llm_helpers::{GenerationRequest, TextGenerator};
use crate::skills::prompts;
use crate::skills::update_extractor::{extract_updates, ExtractionStatus};
use crate::state::{ArtifactSpec, WhiteboardMap, WhiteboardStore};
use std::sync::Arc;

/// Result of one generation step, not yet merged or persisted
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Marker-stripped content
    pub content: String,
    pub updates: WhiteboardMap,
    pub status: ExtractionStatus,
    pub warnings: Vec<PipelineWarning>,
}

pub struct BuilderSkill {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
}

impl BuilderSkill {
    pub fn new(generator: Arc<dyn TextGenerator>, options: GenerationOptions) -> Self {
        Self { generator, options }
    }

    /// Request for `spec` with only its declared reads as context.
    ///
    /// Also returns the declared reads absent from the whiteboard.
    pub fn prepare(
        spec: &ArtifactSpec,
        whiteboard: &WhiteboardStore,
    ) -> (GenerationRequest, Vec<String>) {
        let context = whiteboard.project(&spec.reads);
        let missing = whiteboard.missing(&spec.reads);
        let request = GenerationRequest::new(prompts::artifact_prompt(spec, &context));
        (request, missing)
    }

    #[tracing::instrument(skip_all, fields(artifact = %spec.file_name(), order = spec.order))]
    pub async fn run(
        &self,
        spec: &ArtifactSpec,
        whiteboard: &WhiteboardStore,
    ) -> Result<BuildOutput, PipelineError> {
        let artifact = spec.file_name();
        let mut warnings = Vec::new();

        let (request, missing) = Self::prepare(spec, whiteboard);
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Generating with partial context");
            warnings.push(PipelineWarning::ContextProjection {
                artifact: artifact.clone(),
                missing,
            });
        }

        let raw = self
            .generator
            .generate(&request, &self.options)
            .await
            .map_err(|source| PipelineError::Generation {
                artifact: artifact.clone(),
                source,
            })?;

        let extraction = extract_updates(&raw);
        if let Some(reason) = extraction.warning() {
            tracing::warn!(reason = %reason, "Update payload problem");
            warnings.push(PipelineWarning::UpdateParse {
                artifact: artifact.clone(),
                reason,
            });
        }

        let undeclared: Vec<String> = extraction
            .updates
            .keys()
            .filter(|key| !spec.writes.contains(key.as_str()))
            .cloned()
            .collect();
        if !undeclared.is_empty() {
            tracing::debug!(keys = ?undeclared, "Undeclared whiteboard writes");
            warnings.push(PipelineWarning::UndeclaredWrite {
                artifact,
                keys: undeclared,
            });
        }

        Ok(BuildOutput {
            content: extraction.content,
            updates: extraction.updates,
            status: extraction.status,
            warnings,
        })
    }
}
