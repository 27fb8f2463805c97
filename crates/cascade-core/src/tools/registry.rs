//! Permission-gated tool executor.
//!
//! Every execution is wrapped by the permission check as an explicit
//! interceptor: the gate runs before any side effect and carries the tool's
//! human-readable action description for prompting. A hard per-call timeout
//! bounds every tool so a hung operation cannot stall a run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CascadeError, Result};
use crate::permissions::{PermissionManager, RiskLevel};

/// Default tool execution timeout.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Context for tool execution.
pub struct ToolContext {
    pub working_dir: PathBuf,
    /// Optional per-call timeout override.
    pub timeout: Option<Duration>,
    /// Maximum file size tools will read.
    pub max_file_size: u64,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl ToolContext {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    /// Resolve a path relative to the working directory (absolute paths pass through).
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.working_dir.join(p)
        }
    }
}

/// What a tool produced.
///
/// `success=false` with an error string covers failures that are results
/// rather than errors, e.g. a nonzero exit code with captured stderr.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(output: Value, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
        }
    }
}

/// Result of one tool invocation, consumed by the engine to build events.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Parse tool parameters, mapping serde failures to a validation error.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| CascadeError::Validation(format!("invalid parameters: {e}")))
}

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id). Doubles as the permission operation key.
    fn name(&self) -> &str;

    /// Risk classification used by the permission gate.
    fn risk_level(&self) -> RiskLevel;

    /// Human-readable action description for prompting, e.g. "Edit file: /tmp/a".
    fn describe(&self, params: &Value) -> String;

    /// Execute the tool. The permission gate has already run.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutcome>;
}

/// Executor holding the registered tools and the permission gate.
pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
    permissions: Arc<PermissionManager>,
    default_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(permissions: Arc<PermissionManager>) -> Self {
        Self {
            tools: HashMap::new(),
            permissions,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute a tool by name: permission gate, then timeout-bounded execution.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| CascadeError::Execution(format!("unknown tool: {name}")))?;

        // Gate before any side effect.
        let description = tool.describe(&params);
        self.permissions
            .check(tool.risk_level(), tool.name(), &description)
            .await?;

        let timeout = ctx.timeout.unwrap_or(self.default_timeout);
        let start = Instant::now();

        let outcome = match tokio::time::timeout(timeout, tool.execute(params, ctx)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!(tool = name, error = %e, "Tool execution failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(tool = name, timeout_secs = timeout.as_secs(), "Tool timed out");
                return Err(CascadeError::Timeout(timeout));
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(tool = name, latency_ms, success = outcome.success, "Tool completed");

        Ok(ToolResult {
            tool_name: name.to_string(),
            success: outcome.success,
            output: Some(outcome.output),
            error: outcome.error,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{ApprovalHandler, DenyAll};
    use serde_json::json;

    struct AllowAll;

    #[async_trait]
    impl ApprovalHandler for AllowAll {
        async fn request_approval(&self, _level: RiskLevel, _op: &str, _desc: &str) -> bool {
            true
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn risk_level(&self) -> RiskLevel {
            RiskLevel::Safe
        }

        fn describe(&self, _params: &Value) -> String {
            "Sleep forever".to_string()
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolOutcome> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutcome::success(json!({})))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn risk_level(&self) -> RiskLevel {
            RiskLevel::Dangerous
        }

        fn describe(&self, _params: &Value) -> String {
            "Echo params".to_string()
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutcome> {
            Ok(ToolOutcome::success(params))
        }
    }

    fn allowing_executor() -> ToolExecutor {
        let permissions =
            Arc::new(PermissionManager::new(Arc::new(AllowAll)).with_audit_log(None));
        ToolExecutor::new(permissions)
    }

    #[tokio::test]
    async fn unknown_tool_is_an_execution_error() {
        let executor = allowing_executor();
        let err = executor
            .execute("nope", json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Execution(_)));
    }

    #[tokio::test]
    async fn timeout_converts_to_timeout_error() {
        let mut executor = allowing_executor();
        executor.register(Arc::new(SlowTool));

        let ctx = ToolContext {
            timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let err = executor.execute("slow", json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, CascadeError::Timeout(_)));
    }

    #[tokio::test]
    async fn gate_runs_before_execution() {
        let permissions =
            Arc::new(PermissionManager::new(Arc::new(DenyAll)).with_audit_log(None));
        let mut executor = ToolExecutor::new(permissions);
        executor.register(Arc::new(EchoTool));

        let err = executor
            .execute("echo", json!({"x": 1}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn result_carries_name_and_latency() {
        let mut executor = allowing_executor();
        executor.register(Arc::new(EchoTool));

        let result = executor
            .execute("echo", json!({"x": 1}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result.tool_name, "echo");
        assert!(result.success);
        assert_eq!(result.output.unwrap()["x"], 1);
    }
}
