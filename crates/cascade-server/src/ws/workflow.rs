//! WebSocket workflow streaming.
//!
//! Protocol: the client sends `ControlMessage`s
//! (`{"action":"execute_workflow","input":...,"model":...}` /
//! `{"action":"cancel_workflow","run_id":...}`); the server streams
//! `WorkflowEvent`s. One connection can drive several concurrent runs;
//! events interleave and carry `run_id` for disambiguation, each run's own
//! events staying in generation order.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use cascade_core::transport::ControlMessage;

use crate::AppState;

const MAX_MESSAGE_SIZE: usize = 64 * 1024;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn error_frame(message: impl std::fmt::Display) -> String {
    json!({ "event": "error", "message": message.to_string() }).to_string()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();

    // One sender task serializes all outbound traffic; engine runs feed it
    // through this channel so delivery pace never blocks the pipeline.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let sender_handle = tokio::spawn(async move {
        let mut sink = ws_sink;
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Runs started over this connection, for cleanup on disconnect.
    let mut connection_runs: Vec<String> = Vec::new();

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(ref text) if text.len() > MAX_MESSAGE_SIZE => {
                tracing::warn!("Rejected oversized control message ({} bytes)", text.len());
                let _ = out_tx.send(error_frame("control message too large"));
            }
            Message::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
                Ok(ControlMessage::ExecuteWorkflow { input, model }) => {
                    let handle = state.engine.start(input, model);
                    let run_id = handle.run_id.clone();
                    tracing::info!(run_id = %run_id, "Workflow started over WebSocket");

                    connection_runs.push(run_id.clone());
                    state
                        .active_runs
                        .write()
                        .await
                        .insert(run_id.clone(), handle.cancel.clone());

                    let forward_tx = out_tx.clone();
                    let active_runs = state.active_runs.clone();
                    let mut events = handle.events;
                    tokio::spawn(async move {
                        while let Some(event) = events.recv().await {
                            let terminal = event.is_terminal();
                            match serde_json::to_string(&event) {
                                Ok(frame) => {
                                    if forward_tx.send(frame).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, "Failed to serialize event")
                                }
                            }
                            if terminal {
                                break;
                            }
                        }
                        active_runs.write().await.remove(&run_id);
                    });
                }
                Ok(ControlMessage::CancelWorkflow { run_id }) => {
                    let runs = state.active_runs.read().await;
                    match runs.get(&run_id) {
                        Some(token) => {
                            tracing::info!(run_id = %run_id, "Cancellation requested");
                            token.cancel();
                        }
                        None => {
                            let _ = out_tx.send(error_frame(format!("unknown run: {run_id}")));
                        }
                    }
                }
                Err(e) => {
                    let _ = out_tx.send(error_frame(format!("invalid control message: {e}")));
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // The consumer is gone; stop this connection's runs at their next
    // stage boundary.
    {
        let runs = state.active_runs.read().await;
        for run_id in &connection_runs {
            if let Some(token) = runs.get(run_id) {
                token.cancel();
            }
        }
    }

    drop(out_tx);
    let _ = sender_handle.await;
    tracing::debug!("Workflow socket closed");
}
