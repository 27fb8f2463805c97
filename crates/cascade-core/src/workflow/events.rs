//! Canonical event protocol for workflow execution.
//!
//! `WorkflowEvent` is the single source of truth for everything the engine
//! emits. Transport layers consume these events and forward them verbatim;
//! events from concurrent runs sharing one connection are disambiguated by
//! `run_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kinds emitted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkflowStart,
    StageStart,
    StageProgress,
    StageComplete,
    StageFailed,
    WorkflowComplete,
    WorkflowFailed,
}

/// The eight pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InputReception,
    IntentDetection,
    ModelSelection,
    ToolSelection,
    ToolExecution,
    ContextRetrieval,
    ResponseGeneration,
    PostProcessing,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::InputReception,
        Stage::IntentDetection,
        Stage::ModelSelection,
        Stage::ToolSelection,
        Stage::ToolExecution,
        Stage::ContextRetrieval,
        Stage::ResponseGeneration,
        Stage::PostProcessing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::InputReception => "input_reception",
            Self::IntentDetection => "intent_detection",
            Self::ModelSelection => "model_selection",
            Self::ToolSelection => "tool_selection",
            Self::ToolExecution => "tool_execution",
            Self::ContextRetrieval => "context_retrieval",
            Self::ResponseGeneration => "response_generation",
            Self::PostProcessing => "post_processing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One event in a run's stream. Immutable once emitted; ordered per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event: EventKind,
    /// Stage name, or "workflow" for run-level events.
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub message: String,
    /// Measured latency in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(run_id: &str, event: EventKind, step: impl Into<String>) -> Self {
        Self {
            event,
            step: step.into(),
            node: None,
            message: String::new(),
            latency: None,
            data: None,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency = Some(latency_ms);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether this event terminates its run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event,
            EventKind::WorkflowComplete | EventKind::WorkflowFailed
        )
    }
}

/// Overall run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One end-to-end execution of the pipeline for a single input.
///
/// Owned exclusively by the engine task for its lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub id: String,
    pub stages: Vec<StageResult>,
    pub state: RunState,
}

impl WorkflowRun {
    pub fn new(id: String) -> Self {
        Self {
            id,
            stages: Vec::new(),
            state: RunState::Pending,
        }
    }
}
