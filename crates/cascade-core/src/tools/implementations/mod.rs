//! Built-in tool implementations

pub mod create;
pub mod edit;
pub mod launch;
pub mod read;
pub mod search;

use std::sync::Arc;

use crate::tools::registry::ToolExecutor;

pub use create::CreateFileTool;
pub use edit::EditFileTool;
pub use launch::LaunchAppTool;
pub use read::ReadFileTool;
pub use search::SearchLocalTool;

/// Register all built-in tools on an executor.
pub fn register_builtin_tools(executor: &mut ToolExecutor) {
    executor.register(Arc::new(ReadFileTool));
    executor.register(Arc::new(SearchLocalTool));
    executor.register(Arc::new(EditFileTool));
    executor.register(Arc::new(CreateFileTool));
    executor.register(Arc::new(LaunchAppTool));
}
