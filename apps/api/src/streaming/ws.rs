//! WebSocket transport adapter — the bidirectional push channel between a
//! client and the streaming gateway.
//!
//! Each socket gets a fresh connection id; that id scopes stream exclusivity.
//! Inbound `commit` messages start a generation (implicitly cancelling a
//! previous one on the same connection); inbound `cancel` messages tear the
//! live one down. Outbound turn events are serialized to the socket by a
//! dedicated writer task so relays never contend on the sink.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;
use crate::streaming::gateway::TurnEvent;

/// Why the client committed the utterance.
#[derive(Debug, Clone, Copy, Deserialize)]
pub enum CommitReason {
    #[serde(rename = "isFinal")]
    IsFinal,
    #[serde(rename = "silence_detected")]
    SilenceDetected,
    #[serde(rename = "manual_button")]
    ManualButton,
    #[serde(rename = "max_duration")]
    MaxDuration,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum ClientMessage {
    Commit {
        turn_id: String,
        text: String,
        reason: CommitReason,
        #[allow(dead_code)]
        timestamp: i64,
    },
    Cancel {
        turn_id: String,
    },
}

fn default_principal() -> String {
    "anonymous".to_string()
}

#[derive(Deserialize)]
pub struct WsQuery {
    /// Authenticated principal. Token-based identity is handled upstream of
    /// this service; here it only addresses log lines and events.
    #[serde(default = "default_principal")]
    pub user: String,
}

/// GET /ws/interview
pub async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, query.user))
}

async fn handle_connection(socket: WebSocket, state: AppState, principal: String) {
    let connection_id = Uuid::new_v4().to_string();
    info!(%connection_id, principal = %principal, "WebSocket connection established");

    let (mut sink, mut inbound) = socket.split();
    let (events, mut event_rx) = mpsc::unbounded_channel::<TurnEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = inbound.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // ignore binary, ping, pong
            Err(_) => break,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Commit {
                turn_id,
                text,
                reason,
                ..
            }) => {
                info!(
                    principal = %principal,
                    %connection_id,
                    %turn_id,
                    ?reason,
                    chars = text.chars().count(),
                    "Commit received"
                );
                state
                    .gateway
                    .start_stream(&connection_id, &turn_id, text, events.clone());
            }
            Ok(ClientMessage::Cancel { turn_id }) => {
                info!(principal = %principal, %connection_id, %turn_id, "Cancel received");
                if state.gateway.cancel_stream(&connection_id) {
                    let _ = events.send(TurnEvent::cancelled(&turn_id, "Conversation cancelled"));
                } else {
                    warn!(%connection_id, "Cancel received but no live stream");
                }
            }
            Err(e) => {
                warn!(%connection_id, error = %e, "Malformed client message");
                let _ = events.send(TurnEvent::error(
                    "unknown",
                    format!("Failed to process request: {e}"),
                ));
            }
        }
    }

    // Socket gone: tear down any live stream for this connection.
    state.gateway.cancel_stream(&connection_id);
    info!(%connection_id, "WebSocket connection closed");
    drop(events);
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_message_parses() {
        let raw = r#"{"type": "commit", "turnId": "t-1",
                      "text": "my answer", "reason": "isFinal",
                      "timestamp": 1700000000000}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::Commit { turn_id, text, .. } => {
                assert_eq!(turn_id, "t-1");
                assert_eq!(text, "my answer");
            }
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn test_cancel_message_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "cancel", "turnId": "t-1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Cancel { turn_id } if turn_id == "t-1"));
    }

    #[test]
    fn test_all_commit_reasons_parse() {
        for reason in ["isFinal", "silence_detected", "manual_button", "max_duration"] {
            let raw = format!(
                r#"{{"type": "commit", "turnId": "t", "text": "x",
                     "reason": "{reason}", "timestamp": 0}}"#
            );
            assert!(serde_json::from_str::<ClientMessage>(&raw).is_ok(), "{reason}");
        }
    }

    #[test]
    fn test_missing_field_is_rejected() {
        // commit without text
        let raw = r#"{"type": "commit", "turnId": "t-1", "reason": "isFinal", "timestamp": 0}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());

        let raw = r#"{"type": "unknown"}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }
}
