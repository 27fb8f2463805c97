//! Client-side WebSocket transport.
//!
//! Streams `WorkflowEvent`s from the server and sends `ControlMessage`s the
//! other way. Transient drops are absorbed by a bounded reconnect policy:
//! exponential backoff from 1 s doubling to a 30 s cap, giving up after 10
//! consecutive failures. While disconnected, outbound messages queue in
//! submission order and flush in order immediately after reconnect.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::{CascadeError, Result};
use crate::transport::protocol::ControlMessage;
use crate::workflow::events::WorkflowEvent;

/// Give up after this many consecutive failed reconnect attempts.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Backoff before reconnect attempt `attempt` (zero-based): 1 s, 2 s, 4 s, …
/// capped at 30 s.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(5);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct EventTransport {
    url: String,
    stream: Option<WsStream>,
    outbound: VecDeque<ControlMessage>,
}

impl EventTransport {
    /// Create a transport and establish the initial connection.
    pub async fn connect(url: impl Into<String>) -> Result<Self> {
        let mut transport = Self::disconnected(url);
        transport.reconnect().await?;
        Ok(transport)
    }

    /// Create a transport without connecting. Messages queue until
    /// [`reconnect`](Self::reconnect) succeeds.
    pub fn disconnected(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
            outbound: VecDeque::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Control messages waiting for a connection, in submission order.
    pub fn pending(&self) -> Vec<ControlMessage> {
        self.outbound.iter().cloned().collect()
    }

    /// Send a control message, queueing it if the connection is down.
    ///
    /// Queued messages are flushed in submission order before this one.
    pub async fn send(&mut self, message: ControlMessage) -> Result<()> {
        self.outbound.push_back(message);

        if self.stream.is_none() {
            self.reconnect().await?;
        }

        self.flush_outbound().await
    }

    /// Receive the next workflow event, reconnecting on transient drops.
    ///
    /// Returns `Ok(None)` if the server closed the connection cleanly.
    pub async fn next_event(&mut self) -> Result<Option<WorkflowEvent>> {
        loop {
            if self.stream.is_none() {
                self.reconnect().await?;
            }

            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            match stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping undecodable event frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    self.stream = None;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Connection dropped, reconnecting");
                    self.stream = None;
                }
            }
        }
    }

    /// Re-establish the connection under the backoff policy, then flush the
    /// outbound queue in order. Surfaces `TransportDisconnected` only after
    /// the policy is exhausted, not on each transient drop.
    pub async fn reconnect(&mut self) -> Result<()> {
        for attempt in 0..MAX_RECONNECT_ATTEMPTS {
            tokio::time::sleep(reconnect_delay(attempt)).await;

            match connect_async(self.url.as_str()).await {
                Ok((stream, _response)) => {
                    tracing::debug!(url = %self.url, attempt, "Transport connected");
                    self.stream = Some(stream);
                    return self.flush_outbound().await;
                }
                Err(e) => {
                    tracing::debug!(url = %self.url, attempt, error = %e, "Connect attempt failed");
                }
            }
        }

        Err(CascadeError::TransportDisconnected {
            attempts: MAX_RECONNECT_ATTEMPTS,
        })
    }

    async fn flush_outbound(&mut self) -> Result<()> {
        while let Some(message) = self.outbound.front() {
            let Some(stream) = self.stream.as_mut() else {
                // Still disconnected; leave the queue intact.
                return Ok(());
            };

            let text = serde_json::to_string(message)
                .map_err(|e| CascadeError::Execution(format!("unserializable message: {e}")))?;

            match stream.send(Message::Text(text)).await {
                Ok(()) => {
                    self.outbound.pop_front();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Send failed, message stays queued");
                    self.stream = None;
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_one_second_to_the_cap() {
        let delays: Vec<u64> = (0..MAX_RECONNECT_ATTEMPTS)
            .map(|attempt| reconnect_delay(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30, 30, 30]);
    }

    #[test]
    fn attempts_are_bounded() {
        assert_eq!(MAX_RECONNECT_ATTEMPTS, 10);
    }

    #[test]
    fn messages_queue_in_submission_order_while_disconnected() {
        let mut transport = EventTransport::disconnected("ws://localhost:9/ws/workflow");

        // Queue directly; flushing is a no-op without a connection.
        transport.outbound.push_back(ControlMessage::ExecuteWorkflow {
            input: "first".into(),
            model: None,
        });
        transport.outbound.push_back(ControlMessage::CancelWorkflow {
            run_id: "r1".into(),
        });
        transport.outbound.push_back(ControlMessage::ExecuteWorkflow {
            input: "third".into(),
            model: None,
        });

        let pending = transport.pending();
        assert_eq!(pending.len(), 3);
        assert!(
            matches!(&pending[0], ControlMessage::ExecuteWorkflow { input, .. } if input == "first")
        );
        assert!(matches!(&pending[1], ControlMessage::CancelWorkflow { run_id } if run_id == "r1"));
        assert!(
            matches!(&pending[2], ControlMessage::ExecuteWorkflow { input, .. } if input == "third")
        );
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn flush_without_connection_keeps_the_queue() {
        let mut transport = EventTransport::disconnected("ws://localhost:9/ws/workflow");
        transport.outbound.push_back(ControlMessage::CancelWorkflow {
            run_id: "r1".into(),
        });

        transport.flush_outbound().await.unwrap();
        assert_eq!(transport.pending().len(), 1);
    }
}
