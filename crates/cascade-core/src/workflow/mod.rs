//! Workflow engine
//!
//! The eight-stage pipeline, its event protocol, and per-run state.

pub mod engine;
pub mod events;

pub use engine::{EngineConfig, RunHandle, WorkflowEngine};
pub use events::{EventKind, RunState, Stage, StageResult, WorkflowEvent, WorkflowRun};

// Consumers hold a run's cancellation token without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
