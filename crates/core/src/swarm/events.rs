//! # Pipeline Events
//!
//! Progress notifications emitted by the orchestrator. They are sent to an
//! optional channel as they happen and kept in the run result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of pipeline event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// Run started
    RunStarted,
    /// A new plan was accepted and persisted
    PlanSynthesized,
    /// A persisted plan was loaded for resume
    PlanRestored,
    /// Generation of one artifact started
    ArtifactStarted,
    /// Artifact content and its updates are committed
    ArtifactCompleted,
    /// Keys were merged into the whiteboard
    WhiteboardUpdated,
    /// Recoverable problem
    Warning,
    /// Every artifact committed
    RunCompleted,
    /// Run stopped on a fatal error
    RunFailed,
    /// Run stopped by the operator
    RunCancelled,
}

/// An event in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Position in the run's event stream
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: PipelineEventKind,
    /// Human-readable summary
    pub message: String,
    /// Artifact file name, when the event concerns one
    #[serde(default)]
    pub artifact: Option<String>,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl PipelineEvent {
    pub fn new(kind: PipelineEventKind, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            artifact: None,
            data: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = PipelineEvent::new(PipelineEventKind::ArtifactStarted, "Generating")
            .with_artifact("index.html")
            .with_data(serde_json::json!({"order": 1}));

        assert_eq!(event.artifact.as_deref(), Some("index.html"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "artifact_started");
        assert_eq!(json["data"]["order"], 1);
    }
}
