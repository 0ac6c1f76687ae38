//! # Pipeline Stages
//!
//! The run state machine:
//!
//! ```text
//! Idle → PlanReady → Generating(0) → … → Generating(n-1) → Complete
//!                              ↘ Failed(i)
//! ```
//!
//! `Generating(i)` and `Failed(i)` carry the sequence position of the
//! artifact being worked on.

use serde::{Deserialize, Serialize};

/// Stage of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "position", rename_all = "snake_case")]
pub enum PipelineStage {
    /// No plan yet
    #[default]
    Idle,
    /// Plan accepted and persisted, nothing generated
    PlanReady,
    /// Generating the artifact at this position
    Generating(usize),
    /// Every artifact committed
    Complete,
    /// Run stopped at this position; earlier positions stay committed
    Failed(usize),
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::PlanReady => write!(f, "plan ready"),
            Self::Generating(i) => write!(f, "generating #{}", i + 1),
            Self::Complete => write!(f, "complete"),
            Self::Failed(i) => write!(f, "failed at #{}", i + 1),
        }
    }
}

/// The pipeline state machine
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    /// Current stage
    pub stage: PipelineStage,
    /// Number of artifacts in the accepted plan
    pub total: usize,
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan accepted with `total` artifacts
    pub fn plan_ready(&mut self, total: usize) {
        self.total = total;
        self.stage = PipelineStage::PlanReady;
    }

    /// Jump to `position` when resuming a run.
    ///
    /// Positions at or past the end complete the run.
    pub fn start_at(&mut self, position: usize) {
        self.stage = if position >= self.total {
            PipelineStage::Complete
        } else {
            PipelineStage::Generating(position)
        };
    }

    /// Advance to the next stage
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            PipelineStage::Idle => PipelineStage::Idle,
            PipelineStage::PlanReady if self.total == 0 => PipelineStage::Complete,
            PipelineStage::PlanReady => PipelineStage::Generating(0),
            PipelineStage::Generating(i) if i + 1 >= self.total => PipelineStage::Complete,
            PipelineStage::Generating(i) => PipelineStage::Generating(i + 1),
            PipelineStage::Complete => PipelineStage::Complete,
            PipelineStage::Failed(i) => PipelineStage::Failed(i),
        };
    }

    /// Fail the pipeline at the current position
    pub fn fail(&mut self) {
        self.stage = PipelineStage::Failed(self.position().unwrap_or(0));
    }

    /// Position of the artifact being worked on, if any
    pub fn position(&self) -> Option<usize> {
        match self.stage {
            PipelineStage::Generating(i) | PipelineStage::Failed(i) => Some(i),
            _ => None,
        }
    }

    /// Check if pipeline is complete
    pub fn is_complete(&self) -> bool {
        matches!(
            self.stage,
            PipelineStage::Complete | PipelineStage::Failed(_)
        )
    }

    /// Check if pipeline succeeded
    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_advance() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.stage, PipelineStage::Idle);

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Idle);

        pipeline.plan_ready(2);
        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Generating(0));

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Generating(1));

        pipeline.advance();
        assert!(pipeline.is_success());
        assert!(pipeline.is_complete());
    }

    #[test]
    fn test_fail_keeps_position() {
        let mut pipeline = Pipeline::new();
        pipeline.plan_ready(3);
        pipeline.start_at(1);
        assert_eq!(pipeline.position(), Some(1));

        pipeline.fail();
        assert_eq!(pipeline.stage, PipelineStage::Failed(1));
        assert!(pipeline.is_complete());
        assert!(!pipeline.is_success());

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Failed(1));
    }

    #[test]
    fn test_start_past_the_end_completes() {
        let mut pipeline = Pipeline::new();
        pipeline.plan_ready(2);
        pipeline.start_at(2);
        assert!(pipeline.is_success());
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_value(PipelineStage::Generating(3)).unwrap();
        assert_eq!(json, serde_json::json!({"stage": "generating", "position": 3}));

        let json = serde_json::to_value(PipelineStage::Complete).unwrap();
        assert_eq!(json, serde_json::json!({"stage": "complete"}));

        let back: PipelineStage =
            serde_json::from_value(serde_json::json!({"stage": "failed", "position": 1})).unwrap();
        assert_eq!(back, PipelineStage::Failed(1));
    }
}
