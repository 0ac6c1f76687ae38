//! # Pipeline Orchestration
//!
//! Drives a run through its stages.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Task → Architect → Plan ─┬→ Builder(1) → merge → commit
//!                          ├→ Builder(2) → merge → commit
//!                          └→ …                        → Complete
//! ```

pub mod architecture_generator;
pub mod coordinator;
pub mod events;
pub mod pipeline;

pub use architecture_generator::generate_architecture;
pub use coordinator::{Orchestrator, OrchestratorCommand, OrchestratorConfig, PipelineRun};
pub use events::{PipelineEvent, PipelineEventKind};
pub use pipeline::{Pipeline, PipelineStage};
