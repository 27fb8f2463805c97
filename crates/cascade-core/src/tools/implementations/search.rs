//! Search tool - find local files matching a glob pattern

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{CascadeError, Result};
use crate::permissions::RiskLevel;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

fn default_max_results() -> usize {
    100
}

pub struct SearchLocalTool;

#[derive(Deserialize)]
struct Params {
    pattern: String,
    directory: Option<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

#[async_trait]
impl Tool for SearchLocalTool {
    fn name(&self) -> &str {
        "search_local"
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    fn describe(&self, params: &Value) -> String {
        let pattern = params.get("pattern").and_then(|v| v.as_str()).unwrap_or("?");
        format!("Search local files: {pattern}")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let params: Params = parse_params(params)?;
        let directory = ctx.resolve_path(params.directory.as_deref().unwrap_or("."));

        if !directory.exists() {
            return Err(CascadeError::FileNotFound(directory));
        }
        if !directory.is_dir() {
            return Err(CascadeError::Execution(format!(
                "not a directory: {}",
                directory.display()
            )));
        }

        let full_pattern = directory.join(&params.pattern).to_string_lossy().to_string();
        let max_results = params.max_results;

        // Glob walking is blocking I/O; keep it off the event-dispatch path.
        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let paths = glob::glob(&full_pattern)
                .map_err(|e| CascadeError::Validation(format!("invalid glob pattern: {e}")))?;
            Ok(paths
                .filter_map(|entry| entry.ok())
                .take(max_results)
                .map(|p| p.display().to_string())
                .collect())
        })
        .await
        .map_err(|e| CascadeError::Execution(format!("search task failed: {e}")))??;

        Ok(ToolOutcome::success(json!({
            "matches": matches,
            "count": matches.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_matching_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.toml"), "").unwrap();
        std::fs::write(dir.path().join("other.txt"), "").unwrap();

        let ctx = ToolContext::new(dir.path().to_path_buf());
        let outcome = SearchLocalTool
            .execute(json!({"pattern": "*.toml"}), &ctx)
            .await
            .unwrap();

        assert_eq!(outcome.output["count"], 1);
        let first = outcome.output["matches"][0].as_str().unwrap();
        assert!(first.ends_with("app.toml"));
    }

    #[tokio::test]
    async fn missing_directory_fails_with_file_not_found() {
        let ctx = ToolContext::new(TempDir::new().unwrap().path().to_path_buf());
        let err = SearchLocalTool
            .execute(json!({"pattern": "*", "directory": "no-such-dir"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn results_are_capped() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.log")), "").unwrap();
        }

        let ctx = ToolContext::new(dir.path().to_path_buf());
        let outcome = SearchLocalTool
            .execute(json!({"pattern": "*.log", "max_results": 2}), &ctx)
            .await
            .unwrap();

        assert_eq!(outcome.output["count"], 2);
    }
}
