//! Error taxonomy for the Cascade engine.
//!
//! Every failure a stage, tool, router, or transport can surface maps to one
//! of these variants. Stage failures are converted into `workflow_failed`
//! events carrying the variant's machine code and message.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CascadeError {
    /// The primary model and the entire fallback chain are unavailable.
    #[error("no models available: {0}")]
    ModelUnavailable(String),

    /// The user or policy rejected a gated operation.
    #[error("permission denied for {operation}: {reason}")]
    PermissionDenied { operation: String, reason: String },

    /// Syntax validation failed before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A tool targeted a path that does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A tool or model-backend call exceeded its hard bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Generic tool failure.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The transport exhausted its reconnect policy.
    #[error("transport disconnected after {attempts} failed attempts")]
    TransportDisconnected { attempts: u32 },
}

impl CascadeError {
    /// Stable machine-readable code, used in failure events and API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Validation(_) => "validation_error",
            Self::FileNotFound(_) => "file_not_found",
            Self::Timeout(_) => "timeout",
            Self::Execution(_) => "execution_error",
            Self::TransportDisconnected { .. } => "transport_disconnected",
        }
    }
}

pub type Result<T> = std::result::Result<T, CascadeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            CascadeError::ModelUnavailable("x".into()).code(),
            "model_unavailable"
        );
        assert_eq!(
            CascadeError::Validation("bad json".into()).code(),
            "validation_error"
        );
        assert_eq!(
            CascadeError::Timeout(Duration::from_secs(30)).code(),
            "timeout"
        );
    }

    #[test]
    fn display_includes_context() {
        let err = CascadeError::PermissionDenied {
            operation: "launch_app".into(),
            reason: "rejected by policy".into(),
        };
        let text = err.to_string();
        assert!(text.contains("launch_app"));
        assert!(text.contains("rejected by policy"));
    }
}
