//! Read tool - read a file's contents with a size cap

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::error::{CascadeError, Result};
use crate::permissions::RiskLevel;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct ReadFileTool;

#[derive(Deserialize)]
struct Params {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    fn describe(&self, params: &Value) -> String {
        let path = params.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        format!("Read file: {path}")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let params: Params = parse_params(params)?;
        let path = ctx.resolve_path(&params.path);

        if !path.exists() {
            return Err(CascadeError::FileNotFound(path));
        }
        if !path.is_file() {
            return Err(CascadeError::Execution(format!(
                "not a file: {}",
                path.display()
            )));
        }

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| CascadeError::Execution(format!("failed to stat file: {e}")))?;
        if metadata.len() > ctx.max_file_size {
            return Err(CascadeError::Execution(format!(
                "file too large ({} bytes): {}",
                metadata.len(),
                path.display()
            )));
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| CascadeError::Execution(format!("failed to read file: {e}")))?;

        Ok(ToolOutcome::success(json!({
            "content": content,
            "bytes": metadata.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_file_contents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();

        let ctx = ToolContext::new(dir.path().to_path_buf());
        let outcome = ReadFileTool
            .execute(json!({"path": "hello.txt"}), &ctx)
            .await
            .unwrap();

        assert_eq!(outcome.output["content"], "hi there");
    }

    #[tokio::test]
    async fn missing_file_fails_with_file_not_found() {
        let ctx = ToolContext::new(TempDir::new().unwrap().path().to_path_buf());
        let err = ReadFileTool
            .execute(json!({"path": "nope.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.txt"), "0123456789").unwrap();

        let ctx = ToolContext {
            working_dir: dir.path().to_path_buf(),
            max_file_size: 4,
            ..Default::default()
        };
        let err = ReadFileTool
            .execute(json!({"path": "big.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Execution(_)));
    }
}
