//! Tool implementations for Cascade
//!
//! Provides the permission-gated tool executor and all built-in tools.

pub mod implementations;
pub mod registry;
pub mod validate;

pub use implementations::register_builtin_tools;
pub use registry::{parse_params, Tool, ToolContext, ToolExecutor, ToolOutcome, ToolResult};
