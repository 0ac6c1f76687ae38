//! # Pipeline Errors and Warnings
//!
//! Fatal errors halt forward progress of a run. Warnings are recorded in the
//! run manifest and the run result but never interrupt the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal pipeline failures
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Architecture phase produced no acceptable plan
    #[error("plan synthesis failed: {0}")]
    PlanSynthesis(String),

    /// The text generation call itself failed
    #[error("generation failed for {artifact}: {source:#}")]
    Generation {
        artifact: String,
        #[source]
        source: anyhow::Error,
    },

    /// A checkpoint could not be written or read back
    #[error("persistence failed ({context}): {source:#}")]
    Persistence {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Operator cancelled the run before `artifact` was committed
    #[error("run cancelled before {artifact} was committed")]
    Cancelled { artifact: String },
}

impl PipelineError {
    pub fn persistence(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Persistence {
            context: context.into(),
            source,
        }
    }

    /// Short machine-friendly label, used in events and the run manifest
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlanSynthesis(_) => "plan_synthesis",
            Self::Generation { .. } => "generation",
            Self::Persistence { .. } => "persistence",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Recoverable conditions surfaced in run metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// A declared read key is not written by any strictly earlier artifact
    UnsatisfiedRead { artifact: String, key: String },
    /// Declared read keys were absent from the whiteboard at projection time
    ContextProjection {
        artifact: String,
        missing: Vec<String>,
    },
    /// The update marker was present but its payload could not be used
    UpdateParse { artifact: String, reason: String },
    /// The generator wrote keys the artifact never declared
    UndeclaredWrite { artifact: String, keys: Vec<String> },
}

impl PipelineWarning {
    pub fn artifact(&self) -> &str {
        match self {
            Self::UnsatisfiedRead { artifact, .. }
            | Self::ContextProjection { artifact, .. }
            | Self::UpdateParse { artifact, .. }
            | Self::UndeclaredWrite { artifact, .. } => artifact,
        }
    }
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsatisfiedRead { artifact, key } => write!(
                f,
                "{} reads '{}' but no earlier artifact declares it as a write",
                artifact, key
            ),
            Self::ContextProjection { artifact, missing } => write!(
                f,
                "{} requested keys missing from the whiteboard: {}",
                artifact,
                missing.join(", ")
            ),
            Self::UpdateParse { artifact, reason } => {
                write!(f, "{} update block ignored: {}", artifact, reason)
            }
            Self::UndeclaredWrite { artifact, keys } => write!(
                f,
                "{} wrote undeclared keys: {}",
                artifact,
                keys.join(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_serialization_is_tagged() {
        let warning = PipelineWarning::UpdateParse {
            artifact: "app.js".to_string(),
            reason: "truncated".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "update_parse");
        assert_eq!(json["artifact"], "app.js");

        let back: PipelineWarning = serde_json::from_value(json).unwrap();
        assert_eq!(back, warning);
    }

    #[test]
    fn test_error_display_keeps_cause() {
        let err = PipelineError::Generation {
            artifact: "index.html".to_string(),
            source: anyhow::anyhow!("connection reset"),
        };
        let text = err.to_string();
        assert!(text.contains("index.html"));
        assert!(text.contains("connection reset"));
        assert_eq!(err.kind(), "generation");
    }
}
