//! Cascade Server
//!
//! Self-hosted API server streaming workflow execution over WebSocket.
//! This is a library crate; the server is started via `start_server()`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{http::Method, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use cascade_core::backend::{HttpBackend, ModelBackend};
use cascade_core::permissions::{DenyAll, PermissionManager};
use cascade_core::router::ModelRouter;
use cascade_core::tools::{register_builtin_tools, ToolExecutor};
use cascade_core::workflow::{CancellationToken, WorkflowEngine};

pub mod error;
pub mod routes;
pub mod types;
pub mod ws;

/// Configuration for starting the server.
pub struct ServerConfig {
    /// Port to listen on (default: 3000).
    pub port: u16,
    /// Working directory for tool operations.
    pub working_dir: PathBuf,
    /// Base URL of the model backend.
    pub backend_url: String,
    /// Operation keys auto-approved at the Modify permission level.
    pub preapproved_operations: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            backend_url: std::env::var("CASCADE_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            preapproved_operations: vec!["edit_file".to_string(), "create_file".to_string()],
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ModelRouter>,
    pub tools: Arc<ToolExecutor>,
    pub engine: Arc<WorkflowEngine>,
    /// Active runs, for cancellation by run id. Entries are removed when a
    /// run reaches its terminal event.
    pub active_runs: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

/// Build the Axum router and shared state.
pub fn build_router(config: &ServerConfig) -> (Router, AppState) {
    let backend: Arc<dyn ModelBackend> = Arc::new(HttpBackend::new(config.backend_url.clone()));
    let router = Arc::new(ModelRouter::new(backend.clone()));

    // Headless policy: Safe auto-approved, pre-approved Modify operations
    // allowed, everything else denied.
    let permissions = Arc::new(
        PermissionManager::new(Arc::new(DenyAll))
            .with_preapproved(config.preapproved_operations.clone()),
    );
    let mut tools = ToolExecutor::new(permissions);
    register_builtin_tools(&mut tools);
    let tools = Arc::new(tools);

    let engine = Arc::new(WorkflowEngine::new(
        router.clone(),
        tools.clone(),
        backend,
        config.working_dir.clone(),
    ));

    let state = AppState {
        router,
        tools,
        engine,
        active_runs: Arc::new(RwLock::new(HashMap::new())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws/workflow", get(ws::workflow::handler))
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// Start the Cascade server and block until shutdown.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let (app, _state) = build_router(&config);

    tracing::info!("Cascade server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Cascade Server"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: HashMap::from([
            ("workflow".to_string(), true),
            ("tools".to_string(), true),
        ]),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    features: HashMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::workflow::EventKind;

    fn unreachable_config() -> ServerConfig {
        ServerConfig {
            backend_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn workflow_fails_cleanly_when_backend_is_unreachable() {
        let (_app, state) = build_router(&unreachable_config());

        let mut handle = state.engine.start("find my config file".to_string(), None);
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            events.push(event);
        }

        let terminal = events.last().unwrap();
        assert_eq!(terminal.event, EventKind::WorkflowFailed);
        assert_eq!(
            events.iter().filter(|e| e.is_terminal()).count(),
            1,
            "exactly one terminal event"
        );

        let failed = events
            .iter()
            .find(|e| e.event == EventKind::StageFailed)
            .unwrap();
        assert_eq!(failed.step, "model_selection");
    }

    #[tokio::test]
    async fn concurrent_runs_have_isolated_run_ids() {
        let (_app, state) = build_router(&unreachable_config());

        let first = state.engine.start("explain this".to_string(), None);
        let second = state.engine.start("explain that".to_string(), None);
        assert_ne!(first.run_id, second.run_id);
    }
}
