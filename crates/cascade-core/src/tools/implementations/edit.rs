//! Edit tool - overwrite an existing file with validation and backups

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::error::{CascadeError, Result};
use crate::permissions::RiskLevel;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};
use crate::tools::validate::validate_syntax;

pub struct EditFileTool;

#[derive(Deserialize)]
struct Params {
    path: String,
    content: String,
    #[serde(default = "default_true")]
    create_backup: bool,
    #[serde(default = "default_true")]
    validate_syntax: bool,
}

fn default_true() -> bool {
    true
}

/// First free backup path: `<path>.bak`, then `<path>.bak.1`, `<path>.bak.2`, …
fn next_backup_path(path: &Path) -> PathBuf {
    let base = format!("{}.bak", path.display());
    let mut candidate = PathBuf::from(&base);
    let mut counter = 1u32;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{base}.{counter}"));
        counter += 1;
    }
    candidate
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Modify
    }

    fn describe(&self, params: &Value) -> String {
        let path = params.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        format!("Edit file: {path}")
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

        // Validation happens before anything touches the disk.
        if params.validate_syntax {
            validate_syntax(&path, &params.content)?;
        }

        let backup = if params.create_backup {
            let backup_path = next_backup_path(&path);
            fs::copy(&path, &backup_path).await.map_err(|e| {
                CascadeError::Execution(format!("failed to create backup: {e}"))
            })?;
            Some(backup_path)
        } else {
            None
        };

        // A failed write leaves the backup in place and reports failure.
        fs::write(&path, &params.content)
            .await
            .map_err(|e| CascadeError::Execution(format!("failed to write file: {e}")))?;

        Ok(ToolOutcome::success(json!({
            "message": format!("Edited {}", path.display()),
            "backup": backup.map(|b| b.display().to_string()),
            "bytes_written": params.content.len(),
        })))
    }
}
