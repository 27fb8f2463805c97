//! Cascade core library
//!
//! A streaming task-execution engine: one request flows through eight
//! ordered stages, each emitting typed progress events to a live consumer.
//! The pipeline leans on two subsystems, an intent-based model router with
//! availability caching and fallback, and a permission-gated tool executor.
//! It reaches the inference service only through the narrow
//! [`backend::ModelBackend`] interface.

pub mod backend;
pub mod error;
pub mod permissions;
pub mod router;
pub mod tools;
pub mod transport;
pub mod workflow;

pub use error::{CascadeError, Result};
