//! # Architect Skill
//!
//! Turns a free-text task into an [`ArchitecturePlan`] with a single
//! generation call. The response is parsed permissively, interpreted as a
//! plan document and validated. No partial plan is ever accepted.

use crate::errors::{PipelineError, PipelineWarning};
use crate::models::GenerationOptions;
use crate::skills::json_repair::parse_permissive;
use crate::skills::llm_helpers::{GenerationRequest, TextGenerator};
use crate::skills::prompts;
use crate::state::ArchitecturePlan;
use std::sync::Arc;

/// An accepted plan and its soft contract violations
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: ArchitecturePlan,
    pub warnings: Vec<PipelineWarning>,
    /// Response needed the repair pass before it parsed
    pub repaired: bool,
}

/// Plan synthesis over any [`TextGenerator`]
pub struct ArchitectSkill {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    strict_reads: bool,
}

impl ArchitectSkill {
    pub fn new(generator: Arc<dyn TextGenerator>, options: GenerationOptions) -> Self {
        Self {
            generator,
            options,
            strict_reads: false,
        }
    }

    /// Treat unsatisfied reads as fatal plan errors
    pub fn with_strict_reads(mut self, strict: bool) -> Self {
        self.strict_reads = strict;
        self
    }

    /// Request and accept a plan for `task`
    pub async fn run(&self, task: &str) -> Result<PlanOutcome, PipelineError> {
        let request =
            GenerationRequest::new(task.trim()).with_system(prompts::architect_system_prompt());

        let response = self
            .generator
            .generate(&request, &self.options)
            .await
            .map_err(|e| PipelineError::PlanSynthesis(format!("architect call failed: {:#}", e)))?;

        let outcome = accept_plan(&response, self.strict_reads)?;
        tracing::info!(
            project = %outcome.plan.project_name,
            artifacts = outcome.plan.len(),
            warnings = outcome.warnings.len(),
            repaired = outcome.repaired,
            "Plan accepted"
        );
        Ok(outcome)
    }
}

/// Parse, interpret and validate an architect response
pub fn accept_plan(response: &str, strict_reads: bool) -> Result<PlanOutcome, PipelineError> {
    let parsed = parse_permissive(response)
        .map_err(|e| PipelineError::PlanSynthesis(format!("response is not a plan: {:#}", e)))?;

    let plan = ArchitecturePlan::from_document(&parsed.value).map_err(PipelineError::PlanSynthesis)?;

    let report = plan.validate();
    if !report.is_valid() {
        return Err(PipelineError::PlanSynthesis(report.errors.join("; ")));
    }

    if strict_reads && !report.warnings.is_empty() {
        let violations: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
        return Err(PipelineError::PlanSynthesis(format!(
            "strict reads: {}",
            violations.join("; ")
        )));
    }

    for warning in &report.warnings {
        tracing::warn!(artifact = warning.artifact(), "{}", warning);
    }

    Ok(PlanOutcome {
        plan,
        warnings: report.warnings,
        repaired: parsed.repaired,
    })
}
