//! The eight-stage workflow engine.
//!
//! `WorkflowEngine::start()` spawns one tokio task per run and returns the
//! run's event receiver plus a cancellation token. The engine produces events
//! into the channel; the transport layer drains and forwards them, so
//! pipeline pace is decoupled from delivery pace.
//!
//! Stages within one run execute strictly sequentially; distinct runs execute
//! concurrently with fully isolated per-run state. Cancellation is
//! cooperative, checked at stage boundaries; in-flight tool and model calls
//! are bounded by hard timeouts instead of being force-killed. Every run
//! emits exactly one terminal event.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{GenerateOptions, ModelBackend};
use crate::error::{CascadeError, Result};
use crate::router::{Intent, ModelRouter, RoutingResult};
use crate::tools::{ToolContext, ToolExecutor, ToolResult};

use super::events::{EventKind, RunState, Stage, StageResult, WorkflowEvent, WorkflowRun};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard bound on the response-generation backend call.
    pub generate_timeout: Duration,
    /// Cap on the assembled context block.
    pub max_context_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generate_timeout: Duration::from_secs(60),
            max_context_chars: 4000,
        }
    }
}

/// Handle to a running workflow.
pub struct RunHandle {
    pub run_id: String,
    pub events: mpsc::UnboundedReceiver<WorkflowEvent>,
    pub cancel: CancellationToken,
}

/// Orchestrates the eight-stage pipeline, emitting events per state change.
#[derive(Clone)]
pub struct WorkflowEngine {
    router: Arc<ModelRouter>,
    tools: Arc<ToolExecutor>,
    backend: Arc<dyn ModelBackend>,
    config: EngineConfig,
    working_dir: PathBuf,
}

/// Data threaded through the stages of one run.
#[derive(Default)]
struct PipelineData {
    input: String,
    model_override: Option<String>,
    intent: Option<Intent>,
    confidence: f64,
    routing: Option<RoutingResult>,
    plan: Vec<(String, Value)>,
    tool_results: Vec<ToolResult>,
    context: String,
    response: String,
    payload: Option<Value>,
}

impl WorkflowEngine {
    pub fn new(
        router: Arc<ModelRouter>,
        tools: Arc<ToolExecutor>,
        backend: Arc<dyn ModelBackend>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            router,
            tools,
            backend,
            config: EngineConfig::default(),
            working_dir,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Start a run. The pipeline executes on a spawned task; the caller
    /// drains the returned receiver. Cancelling the token stops the run at
    /// the next stage boundary.
    pub fn start(&self, input: String, model_override: Option<String>) -> RunHandle {
        let run_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = RunTask {
            engine: WorkflowEngine::clone(self),
            run: WorkflowRun::new(run_id.clone()),
            tx,
            cancel: cancel.clone(),
        };

        let data = PipelineData {
            input,
            model_override,
            ..Default::default()
        };

        tokio::spawn(async move {
            task.run(data).await;
        });

        RunHandle {
            run_id,
            events: rx,
            cancel,
        }
    }

    async fn execute_stage(
        &self,
        stage: Stage,
        data: &mut PipelineData,
        tx: &mpsc::UnboundedSender<WorkflowEvent>,
        run_id: &str,
    ) -> Result<String> {
        match stage {
            Stage::InputReception => {
                let trimmed = data.input.trim().to_string();
                if trimmed.is_empty() {
                    return Err(CascadeError::Validation("empty input".into()));
                }
                let detail = format!("received {} chars", trimmed.len());
                data.input = trimmed;
                Ok(detail)
            }

            Stage::IntentDetection => {
                let (intent, confidence) = self.router.detect_intent(&data.input);
                data.intent = Some(intent);
                data.confidence = confidence;
                Ok(format!("intent {intent} (confidence {confidence:.2})"))
            }

            Stage::ModelSelection => {
                let routing = self
                    .router
                    .route_with_override(&data.input, data.model_override.as_deref())
                    .await?;
                if routing.used_fallback {
                    let _ = tx.send(
                        WorkflowEvent::new(run_id, EventKind::StageProgress, stage.name())
                            .with_message(format!(
                                "primary model unavailable, fell back to {}",
                                routing.model
                            )),
                    );
                }
                let detail = format!("selected {}", routing.model);
                data.routing = Some(routing);
                Ok(detail)
            }

            Stage::ToolSelection => {
                data.plan = self.select_tools(data);
                let names: Vec<&str> = data.plan.iter().map(|(name, _)| name.as_str()).collect();
                if names.is_empty() {
                    Ok("no tools required".to_string())
                } else {
                    Ok(format!("selected {}", names.join(", ")))
                }
            }

            Stage::ToolExecution => {
                let ctx = ToolContext::new(self.working_dir.clone());
                let plan = std::mem::take(&mut data.plan);
                for (name, params) in plan {
                    let result = self.tools.execute(&name, params, &ctx).await?;
                    let _ = tx.send(
                        WorkflowEvent::new(run_id, EventKind::StageProgress, stage.name())
                            .with_node(name.as_str())
                            .with_latency(result.latency_ms)
                            .with_message(format!("{name} finished")),
                    );
                    data.tool_results.push(result);
                }
                Ok(format!("{} tool(s) executed", data.tool_results.len()))
            }

            Stage::ContextRetrieval => {
                data.context = self.assemble_context(&data.tool_results);
                Ok(format!("context assembled ({} chars)", data.context.len()))
            }

            Stage::ResponseGeneration => {
                let Some(routing) = data.routing.as_ref() else {
                    return Err(CascadeError::Execution("no model selected".into()));
                };

                let prompt = if data.context.is_empty() {
                    data.input.clone()
                } else {
                    format!("Context:\n{}\n\nRequest: {}", data.context, data.input)
                };

                let options = GenerateOptions {
                    timeout: self.config.generate_timeout,
                    ..Default::default()
                };

                let start = Instant::now();
                data.response = self
                    .backend
                    .generate(&prompt, &routing.model, &options)
                    .await?;
                let latency = start.elapsed();

                // Slow-but-successful is a soft warning, never a failure.
                if self.router.is_slow(latency) {
                    let _ = tx.send(
                        WorkflowEvent::new(run_id, EventKind::StageProgress, stage.name())
                            .with_latency(latency.as_millis() as u64)
                            .with_message(format!(
                                "slow model response ({} ms)",
                                latency.as_millis()
                            )),
                    );
                }

                Ok(format!("{} chars generated", data.response.len()))
            }

            Stage::PostProcessing => {
                let response = data.response.trim().to_string();
                let routing = data.routing.as_ref();
                data.payload = Some(json!({
                    "response": response,
                    "model": routing.map(|r| r.model.clone()),
                    "intent": data.intent,
                    "confidence": data.confidence,
                    "used_fallback": routing.map(|r| r.used_fallback).unwrap_or(false),
                    "tools": data.tool_results,
                }));
                data.response = response;
                Ok("payload assembled".to_string())
            }
        }
    }

    /// Deterministic intent → tool-plan mapping.
    ///
    /// Search derives a glob from the query. Shell intent does not synthesize
    /// commands here; deciding what to run is the model's job, and launch_app
    /// stays behind its Dangerous gate for explicit invocations.
    fn select_tools(&self, data: &PipelineData) -> Vec<(String, Value)> {
        match data.intent {
            Some(Intent::Search) => {
                let pattern = derive_search_pattern(&data.input);
                vec![(
                    "search_local".to_string(),
                    json!({"pattern": pattern, "max_results": 50}),
                )]
            }
            _ => Vec::new(),
        }
    }

    fn assemble_context(&self, results: &[ToolResult]) -> String {
        let mut context = String::new();
        for result in results {
            let rendered = match &result.output {
                Some(output) => output.to_string(),
                None => result.error.clone().unwrap_or_default(),
            };
            context.push_str(&format!("[{}] {}\n", result.tool_name, rendered));
            if context.len() >= self.config.max_context_chars {
                context.truncate(self.config.max_context_chars);
                break;
            }
        }
        context.trim_end().to_string()
    }
}

/// One spawned pipeline execution. Owns the run for its lifetime.
struct RunTask {
    engine: WorkflowEngine,
    run: WorkflowRun,
    tx: mpsc::UnboundedSender<WorkflowEvent>,
    cancel: CancellationToken,
}

impl RunTask {
    fn emit(&self, event: WorkflowEvent) {
        // A dropped receiver means the consumer went away; keep running so
        // side effects and state stay consistent.
        let _ = self.tx.send(event);
    }

    fn stage_start_message(stage: Stage) -> &'static str {
        match stage {
            Stage::InputReception => "Processing user input",
            Stage::IntentDetection => "Detecting user intent",
            Stage::ModelSelection => "Selecting model",
            Stage::ToolSelection => "Selecting required tools",
            Stage::ToolExecution => "Executing tools",
            Stage::ContextRetrieval => "Retrieving context",
            Stage::ResponseGeneration => "Generating response",
            Stage::PostProcessing => "Post-processing response",
        }
    }

    async fn run(mut self, mut data: PipelineData) {
        let run_id = self.run.id.clone();
        tracing::info!(run_id = %run_id, "Workflow run started");

        self.run.state = RunState::Running;
        self.emit(
            WorkflowEvent::new(&run_id, EventKind::WorkflowStart, "workflow")
                .with_message("workflow started"),
        );

        for stage in Stage::ALL {
            // Cooperative cancellation checkpoint.
            if self.cancel.is_cancelled() {
                self.run.state = RunState::Cancelled;
                tracing::info!(run_id = %run_id, stage = %stage, "Workflow run cancelled");
                self.emit(
                    WorkflowEvent::new(&run_id, EventKind::WorkflowFailed, "workflow")
                        .with_message("run cancelled by client")
                        .with_data(json!({"error": "cancelled"})),
                );
                return;
            }

            self.emit(
                WorkflowEvent::new(&run_id, EventKind::StageStart, stage.name())
                    .with_message(Self::stage_start_message(stage)),
            );

            let start = Instant::now();
            match self
                .engine
                .execute_stage(stage, &mut data, &self.tx, &run_id)
                .await
            {
                Ok(detail) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    self.run.stages.push(StageResult {
                        stage,
                        success: true,
                        latency_ms,
                        detail: Some(detail.clone()),
                    });
                    self.emit(
                        WorkflowEvent::new(&run_id, EventKind::StageComplete, stage.name())
                            .with_latency(latency_ms)
                            .with_message(detail),
                    );
                }
                Err(e) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    tracing::warn!(run_id = %run_id, stage = %stage, error = %e, "Stage failed");
                    self.run.stages.push(StageResult {
                        stage,
                        success: false,
                        latency_ms,
                        detail: Some(e.to_string()),
                    });
                    self.emit(
                        WorkflowEvent::new(&run_id, EventKind::StageFailed, stage.name())
                            .with_latency(latency_ms)
                            .with_message(e.to_string())
                            .with_data(json!({"error": e.code()})),
                    );

                    self.run.state = RunState::Failed;
                    self.emit(
                        WorkflowEvent::new(&run_id, EventKind::WorkflowFailed, "workflow")
                            .with_message(format!("failed at {}: {e}", stage.name()))
                            .with_data(json!({"error": e.code(), "stage": stage.name()})),
                    );
                    return;
                }
            }
        }

        self.run.state = RunState::Completed;
        tracing::info!(run_id = %run_id, "Workflow run complete");
        self.emit(
            WorkflowEvent::new(&run_id, EventKind::WorkflowComplete, "workflow")
                .with_message("workflow complete")
                .with_data(data.payload.take().unwrap_or_else(|| json!({}))),
        );
    }
}

/// Derive a filename glob from a search query.
///
/// Takes the longest word that is not query scaffolding:
/// "find my config file" → `*config*`.
fn derive_search_pattern(input: &str) -> String {
    const SCAFFOLDING: [&str; 14] = [
        "find", "search", "locate", "where", "look", "for", "my", "the", "a", "an", "in", "of",
        "file", "files",
    ];

    input
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !SCAFFOLDING.contains(&w.to_lowercase().as_str()))
        .max_by_key(|w| w.len())
        .map(|w| format!("*{}*", w.to_lowercase()))
        .unwrap_or_else(|| "*".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{ApprovalHandler, PermissionManager, RiskLevel};
    use crate::tools::register_builtin_tools;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StaticBackend {
        models: Vec<String>,
    }

    #[async_trait]
    impl crate::backend::ModelBackend for StaticBackend {
        async fn generate(
            &self,
            _prompt: &str,
            model: &str,
            _options: &GenerateOptions,
        ) -> Result<String> {
            Ok(format!("response from {model}"))
        }

        async fn list_available(&self) -> Result<Vec<String>> {
            Ok(self.models.clone())
        }
    }

    struct AllowAll;

    #[async_trait]
    impl ApprovalHandler for AllowAll {
        async fn request_approval(&self, _level: RiskLevel, _op: &str, _desc: &str) -> bool {
            true
        }
    }

    fn engine_with(models: &[&str], working_dir: PathBuf) -> Arc<WorkflowEngine> {
        let backend = Arc::new(StaticBackend {
            models: models.iter().map(ToString::to_string).collect(),
        });
        let router = Arc::new(ModelRouter::new(backend.clone()));
        let permissions =
            Arc::new(PermissionManager::new(Arc::new(AllowAll)).with_audit_log(None));
        let mut tools = ToolExecutor::new(permissions);
        register_builtin_tools(&mut tools);

        Arc::new(WorkflowEngine::new(
            router,
            Arc::new(tools),
            backend,
            working_dir,
        ))
    }

    async fn collect(mut handle: RunHandle) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            events.push(event);
        }
        events
    }

    fn assert_ordering_invariants(events: &[WorkflowEvent]) {
        // Exactly one terminal event, and it comes last.
        let terminals: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_terminal())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(terminals.len(), 1, "expected exactly one terminal event");
        assert_eq!(terminals[0], events.len() - 1);

        // No stage complete/failed before its start.
        for stage in Stage::ALL {
            let start = events
                .iter()
                .position(|e| e.event == EventKind::StageStart && e.step == stage.name());
            let end = events.iter().position(|e| {
                matches!(e.event, EventKind::StageComplete | EventKind::StageFailed)
                    && e.step == stage.name()
            });
            if let Some(end) = end {
                let start = start.expect("stage end without start");
                assert!(start < end, "stage {} ended before it started", stage.name());
            }
        }
    }

    #[tokio::test]
    async fn search_query_runs_all_eight_stages_to_completion() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[app]\n").unwrap();

        let engine = engine_with(
            &["mini:3b", "coder:14b", "conversational:20b", "general:7b"],
            dir.path().to_path_buf(),
        );
        let handle = engine.start("find my config file".to_string(), None);
        let events = collect(handle).await;

        assert_ordering_invariants(&events);

        let completes = events
            .iter()
            .filter(|e| e.event == EventKind::StageComplete)
            .count();
        assert_eq!(completes, 8);

        let terminal = events.last().unwrap();
        assert_eq!(terminal.event, EventKind::WorkflowComplete);
        let data = terminal.data.as_ref().unwrap();
        assert_eq!(data["used_fallback"], false);
        assert!(data["response"]
            .as_str()
            .unwrap()
            .starts_with("response from"));

        // The search tool ran and found the file.
        let tool_progress = events
            .iter()
            .find(|e| e.event == EventKind::StageProgress && e.step == "tool_execution")
            .expect("tool execution progress event");
        assert_eq!(tool_progress.node.as_deref(), Some("search_local"));
    }

    #[tokio::test]
    async fn empty_input_fails_at_the_first_stage() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(&["general:7b"], dir.path().to_path_buf());
        let handle = engine.start("   ".to_string(), None);
        let events = collect(handle).await;

        assert_ordering_invariants(&events);

        let failed = events
            .iter()
            .find(|e| e.event == EventKind::StageFailed)
            .unwrap();
        assert_eq!(failed.step, "input_reception");
        assert_eq!(failed.data.as_ref().unwrap()["error"], "validation_error");

        let terminal = events.last().unwrap();
        assert_eq!(terminal.event, EventKind::WorkflowFailed);
    }

    #[tokio::test]
    async fn exhausted_models_fail_model_selection() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(&[], dir.path().to_path_buf());
        let handle = engine.start("refactor this function".to_string(), None);
        let events = collect(handle).await;

        assert_ordering_invariants(&events);

        let failed = events
            .iter()
            .find(|e| e.event == EventKind::StageFailed)
            .unwrap();
        assert_eq!(failed.step, "model_selection");
        assert_eq!(failed.data.as_ref().unwrap()["error"], "model_unavailable");
    }

    #[tokio::test]
    async fn fallback_selection_is_visible_in_the_payload() {
        let dir = TempDir::new().unwrap();
        // Code model missing; chain falls back to general:7b.
        let engine = engine_with(&["general:7b", "mini:3b"], dir.path().to_path_buf());
        let handle = engine.start("refactor this function".to_string(), None);
        let events = collect(handle).await;

        let terminal = events.last().unwrap();
        assert_eq!(terminal.event, EventKind::WorkflowComplete);
        let data = terminal.data.as_ref().unwrap();
        assert_eq!(data["used_fallback"], true);
        assert_eq!(data["model"], "general:7b");
    }

    #[tokio::test]
    async fn cancellation_yields_exactly_one_terminal_event() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(&["general:7b"], dir.path().to_path_buf());

        let handle = engine.start("explain this".to_string(), None);
        // Cancel before the spawned task gets to run (current-thread runtime).
        handle.cancel.cancel();
        let events = collect(handle).await;

        assert_ordering_invariants(&events);
        let terminal = events.last().unwrap();
        assert_eq!(terminal.event, EventKind::WorkflowFailed);
        assert!(terminal.message.contains("cancelled"));
    }

    #[test]
    fn search_pattern_derivation_picks_the_meaningful_word() {
        assert_eq!(derive_search_pattern("find my config file"), "*config*");
        assert_eq!(derive_search_pattern("find the log files"), "*log*");
        assert_eq!(derive_search_pattern("find"), "*");
    }
}
