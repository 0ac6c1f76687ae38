//! # Matrioska Skills
//!
//! The generation-side building blocks the orchestrator composes.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator
//!   ├── ArchitectSkill  task -> ArchitecturePlan (one call)
//!   └── BuilderSkill    spec + whiteboard -> content + updates (one call per artifact)
//!         ├── prompts           request text
//!         ├── update_extractor  trailing SHARED_STATE_UPDATE block
//!         └── json_repair       permissive payload parsing
//! ```
//!
//! Both skills talk to the model through [`TextGenerator`].

pub mod json_repair;
pub mod llm_helpers;
pub mod prompts;
pub mod update_extractor;

pub mod architect_skill;
pub mod builder_skill;

pub use architect_skill::{accept_plan, ArchitectSkill, PlanOutcome};
pub use builder_skill::{BuildOutput, BuilderSkill};
pub use llm_helpers::{
    create_generator, GenerationRequest, HttpGenerator, TextGenerator, TranscriptGenerator,
};
pub use update_extractor::{extract_updates, Extraction, ExtractionStatus, UPDATE_MARKER};
