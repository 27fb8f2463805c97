//! Request/response types for the REST API

use serde::{Deserialize, Serialize};

use cascade_core::router::Intent;

/// One model in the list endpoint.
#[derive(Serialize)]
pub struct ModelResponse {
    pub name: String,
    pub available: bool,
    /// Intents this model serves as primary, if any.
    pub intents: Vec<Intent>,
}

#[derive(Serialize)]
pub struct ModelsListResponse {
    pub models: Vec<ModelResponse>,
    pub fallback_chain: Vec<String>,
}

/// Route preview request.
#[derive(Deserialize)]
pub struct RoutePreviewRequest {
    pub input: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Route preview response mirrors the engine's routing result.
#[derive(Serialize)]
pub struct RoutePreviewResponse {
    pub intent: Intent,
    pub model: String,
    pub confidence: f64,
    pub used_fallback: bool,
}
