//! Model listing endpoint

use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Json, Router};

use cascade_core::router::Intent;

use crate::error::AppError;
use crate::types::{ModelResponse, ModelsListResponse};
use crate::AppState;

/// Build the models router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_models))
}

/// List every model the router can select, with live availability.
async fn list_models(State(state): State<AppState>) -> Result<Json<ModelsListResponse>, AppError> {
    let config = state.router.config();

    // Collect the union of intent-table and fallback-chain models,
    // keyed by name so each model appears once.
    let mut intents_by_model: BTreeMap<String, Vec<Intent>> = BTreeMap::new();
    for (&intent, model) in &config.intent_models {
        intents_by_model.entry(model.clone()).or_default().push(intent);
    }
    for model in &config.fallback_chain {
        intents_by_model.entry(model.clone()).or_default();
    }

    let mut models = Vec::new();
    for (name, mut intents) in intents_by_model {
        intents.sort_by_key(|i| i.as_str().to_string());
        let available = state.router.check_availability(&name).await;
        models.push(ModelResponse {
            name,
            available,
            intents,
        });
    }

    Ok(Json(ModelsListResponse {
        models,
        fallback_chain: config.fallback_chain.clone(),
    }))
}
