//! Launch tool - run an external application with captured output

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::{CascadeError, Result};
use crate::permissions::RiskLevel;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

/// Default hard timeout for a launched process.
const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LaunchAppTool;

#[derive(Deserialize)]
struct Params {
    name: String,
    #[serde(default)]
    args: Vec<String>,
    timeout_secs: Option<u64>,
}

#[async_trait]
impl Tool for LaunchAppTool {
    fn name(&self) -> &str {
        "launch_app"
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Dangerous
    }

    fn describe(&self, params: &Value) -> String {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("?");
        format!("Launch application: {name}")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let params: Params = parse_params(params)?;
        let timeout = params
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LAUNCH_TIMEOUT);

        // Resolve before spawning so a missing binary fails fast.
        let binary = which::which(&params.name).map_err(|_| {
            CascadeError::Execution(format!("application not found: {}", params.name))
        })?;

        let mut command = Command::new(&binary);
        command
            .args(&params.args)
            .current_dir(&ctx.working_dir)
            // Dropping the output future on timeout kills the child.
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| CascadeError::Timeout(timeout))?
            .map_err(|e| CascadeError::Execution(format!("failed to run {}: {e}", params.name)))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let payload = json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        });

        if output.status.success() {
            Ok(ToolOutcome::success(payload))
        } else {
            // A nonzero exit is a result, not an error.
            let reason = if stderr.trim().is_empty() {
                format!("exit code {exit_code}")
            } else {
                stderr.trim().to_string()
            };
            Ok(ToolOutcome::failure(payload, reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext::default()
    }

    #[tokio::test]
    async fn missing_binary_is_an_execution_error() {
        let err = LaunchAppTool
            .execute(json!({"name": "definitely-not-a-real-binary-xyz"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Execution(_)));
    }

    #[tokio::test]
    async fn stdout_is_captured_on_success() {
        let outcome = LaunchAppTool
            .execute(json!({"name": "echo", "args": ["hello"]}), &ctx())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.output["exit_code"], 0);
        assert_eq!(outcome.output["stdout"], "hello\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_thrown() {
        let outcome = LaunchAppTool
            .execute(json!({"name": "sh", "args": ["-c", "exit 3"]}), &ctx())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.output["exit_code"], 3);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn hung_process_converts_to_timeout() {
        let err = LaunchAppTool
            .execute(
                json!({"name": "sh", "args": ["-c", "sleep 30"], "timeout_secs": 1}),
                &ctx(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CascadeError::Timeout(_)));
    }
}
