//! # Matrioska Core
//!
//! Dependency-ordered generation pipeline: a task is decomposed into an
//! ordered plan of artifacts, and each artifact is generated with only the
//! whiteboard entries it declared it reads.
//!
//! ## Architecture
//!
//! - `models` - Provider and sampling configuration
//! - `errors` - Fatal errors and recoverable warnings
//! - `skills/` - Plan synthesis, artifact generation, update extraction
//! - `state/` - Plan model, whiteboard and checkpoints
//! - `swarm/` - Run state machine and orchestrator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matrioska_core::skills::create_generator;
//! use matrioska_core::swarm::{Orchestrator, OrchestratorConfig};
//!
//! let config = OrchestratorConfig::default();
//! let generator = create_generator(&config.model)?;
//! let mut orchestrator = Orchestrator::new(config, generator);
//! let run = orchestrator.run("Build a landing page with a contact form").await?;
//! ```

pub mod errors;
pub mod models;
pub mod skills;
pub mod state;
pub mod swarm;

#[cfg(test)]
mod testing;

pub use errors::{PipelineError, PipelineWarning};
