pub mod checkpoint;
pub mod io;
pub mod json;
pub mod specs;
pub mod whiteboard;

pub use checkpoint::CheckpointManager;
pub use io::resolve_base_path;
pub use json::{ArtifactRecord, RunManifest};
pub use specs::{ArchitecturePlan, Artifact, ArtifactSpec, PlanValidation};
pub use whiteboard::{WhiteboardMap, WhiteboardStore};
