//! Create tool - write a new file, creating parent directories

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::error::{CascadeError, Result};
use crate::permissions::RiskLevel;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};
use crate::tools::validate::validate_syntax;

pub struct CreateFileTool;

#[derive(Deserialize)]
struct Params {
    path: String,
    content: String,
    #[serde(default)]
    overwrite: bool,
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Modify
    }

    fn describe(&self, params: &Value) -> String {
        let path = params.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        format!("Create file: {path}")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let params: Params = parse_params(params)?;
        let path = ctx.resolve_path(&params.path);

        if path.exists() && !params.overwrite {
            return Err(CascadeError::Execution(format!(
                "file already exists: {}",
                path.display()
            )));
        }

        validate_syntax(&path, &params.content)?;

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CascadeError::Execution(format!("failed to create directory: {e}")))?;
        }

        fs::write(&path, &params.content)
            .await
            .map_err(|e| CascadeError::Execution(format!("failed to write file: {e}")))?;

        Ok(ToolOutcome::success(json!({
            "message": format!("Created {}", path.display()),
            "bytes_written": params.content.len(),
        })))
    }
}
