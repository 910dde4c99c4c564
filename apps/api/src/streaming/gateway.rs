//! Streaming gateway — at most one live upstream generation per connection.
//!
//! Starting a stream atomically replaces (and cancels) any stream already
//! registered for the connection: the old handle is cancelled under the same
//! map guard that registers the new one, so two near-simultaneous starts
//! serialize with the second always winning. The handle is registered before
//! the upstream call is issued, so a racing cancel cannot slip past it.
//!
//! Cancellation is cooperative: once a handle's token is cancelled, its relay
//! task emits no further events for that turn. Removal from the registry
//! happens exactly once — on natural completion, on error, or on explicit
//! cancel, whichever comes first. Completion-side removal is guarded by the
//! stream id so that a stale stream never removes its successor's handle.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::streaming::upstream::CompletionStream;

/// Outbound event for one turn, serialized to the client verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TurnEvent {
    AiToken {
        turn_id: String,
        timestamp: i64,
        token: String,
    },
    AiDone {
        turn_id: String,
        timestamp: i64,
        full_text: String,
        token_count: usize,
    },
    AiError {
        turn_id: String,
        timestamp: i64,
        error: String,
    },
    AiCancelled {
        turn_id: String,
        timestamp: i64,
        message: String,
    },
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl TurnEvent {
    fn token(turn_id: &str, token: String) -> Self {
        TurnEvent::AiToken {
            turn_id: turn_id.to_string(),
            timestamp: now_millis(),
            token,
        }
    }

    fn done(turn_id: &str, full_text: String, token_count: usize) -> Self {
        TurnEvent::AiDone {
            turn_id: turn_id.to_string(),
            timestamp: now_millis(),
            full_text,
            token_count,
        }
    }

    pub fn error(turn_id: &str, error: String) -> Self {
        TurnEvent::AiError {
            turn_id: turn_id.to_string(),
            timestamp: now_millis(),
            error,
        }
    }

    pub fn cancelled(turn_id: &str, message: &str) -> Self {
        TurnEvent::AiCancelled {
            turn_id: turn_id.to_string(),
            timestamp: now_millis(),
            message: message.to_string(),
        }
    }
}

/// The live, cancellable reference to one in-flight generation. Owned
/// exclusively by the registry entry for its connection.
struct StreamHandle {
    /// Distinguishes this handle from earlier and later streams on the same
    /// connection; guards completion-side removal.
    stream_id: Uuid,
    turn_id: String,
    cancel: CancellationToken,
}

/// Registry plus orchestration for per-connection streaming relays.
#[derive(Clone)]
pub struct StreamGateway {
    streams: Arc<DashMap<String, StreamHandle>>,
    upstream: Arc<dyn CompletionStream>,
}

impl StreamGateway {
    pub fn new(upstream: Arc<dyn CompletionStream>) -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            upstream,
        }
    }

    /// Starts a generation for `connection_id`, replacing any stream already
    /// live on that connection. Returns immediately; tokens, completion, and
    /// errors arrive on `events` in upstream emission order.
    pub fn start_stream(
        &self,
        connection_id: &str,
        turn_id: &str,
        prompt: String,
        events: mpsc::UnboundedSender<TurnEvent>,
    ) {
        let stream_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let handle = StreamHandle {
            stream_id,
            turn_id: turn_id.to_string(),
            cancel: cancel.clone(),
        };

        info!(connection_id, turn_id, "Starting stream");

        // Cancel-then-register under one map guard: the previous stream stops
        // emitting before the new handle becomes visible.
        match self.streams.entry(connection_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                debug!(
                    connection_id,
                    superseded_turn = %occupied.get().turn_id,
                    "Replacing live stream"
                );
                occupied.get().cancel.cancel();
                occupied.insert(handle);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
            }
        }

        let upstream = Arc::clone(&self.upstream);
        let streams = Arc::clone(&self.streams);
        let connection = connection_id.to_string();
        let turn = turn_id.to_string();

        tokio::spawn(async move {
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                opened = upstream.open(&prompt) => opened,
            };

            let mut tokens = match opened {
                Ok(rx) => rx,
                Err(e) => {
                    streams.remove_if(&connection, |_, h| h.stream_id == stream_id);
                    if !cancel.is_cancelled() {
                        error!(turn_id = %turn, "Stream failed to open: {e}");
                        let _ = events.send(TurnEvent::error(&turn, e.to_string()));
                    }
                    return;
                }
            };

            let mut full_text = String::new();
            let mut token_count = 0usize;

            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(turn_id = %turn, "Stream cancelled; relay stopped");
                        return;
                    }
                    item = tokens.recv() => item,
                };

                match item {
                    Some(Ok(token)) => {
                        if cancel.is_cancelled() {
                            return;
                        }
                        full_text.push_str(&token);
                        token_count += 1;
                        if events.send(TurnEvent::token(&turn, token)).is_err() {
                            // Client side gone; nothing left to relay to.
                            streams.remove_if(&connection, |_, h| h.stream_id == stream_id);
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        streams.remove_if(&connection, |_, h| h.stream_id == stream_id);
                        if !cancel.is_cancelled() {
                            error!(turn_id = %turn, "Stream error: {e}");
                            let _ = events.send(TurnEvent::error(&turn, e.to_string()));
                        }
                        return;
                    }
                    None => {
                        streams.remove_if(&connection, |_, h| h.stream_id == stream_id);
                        if !cancel.is_cancelled() {
                            info!(
                                turn_id = %turn,
                                chars = full_text.chars().count(),
                                "Stream complete"
                            );
                            let _ = events.send(TurnEvent::done(&turn, full_text, token_count));
                        }
                        return;
                    }
                }
            }
        });
    }

    /// Cancels the live stream for `connection_id`, if any. Returns whether a
    /// live stream was actually cancelled. After this returns true, no further
    /// events are emitted for the cancelled turn.
    pub fn cancel_stream(&self, connection_id: &str) -> bool {
        match self.streams.remove(connection_id) {
            Some((_, handle)) => {
                info!(connection_id, turn_id = %handle.turn_id, "Cancelling stream");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::upstream::UpstreamError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// One scripted upstream response: tokens paced by `delay`, optionally
    /// ending in an error instead of natural completion.
    struct Script {
        tokens: Vec<&'static str>,
        delay: Duration,
        fail_after: bool,
    }

    struct ScriptedUpstream {
        scripts: Mutex<VecDeque<Script>>,
    }

    impl ScriptedUpstream {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
            })
        }
    }

    #[async_trait]
    impl CompletionStream for ScriptedUpstream {
        async fn open(
            &self,
            _prompt: &str,
        ) -> Result<mpsc::Receiver<Result<String, UpstreamError>>, UpstreamError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected upstream call");
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                for token in script.tokens {
                    tokio::time::sleep(script.delay).await;
                    if tx.send(Ok(token.to_string())).await.is_err() {
                        return;
                    }
                }
                if script.fail_after {
                    let _ = tx
                        .send(Err(UpstreamError::Network("connection reset".into())))
                        .await;
                }
            });
            Ok(rx)
        }
    }

    fn events_channel() -> (
        mpsc::UnboundedSender<TurnEvent>,
        mpsc::UnboundedReceiver<TurnEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_tokens_relayed_in_order_then_done() {
        let upstream = ScriptedUpstream::new(vec![Script {
            tokens: vec!["Hel", "lo", "!"],
            delay: Duration::from_millis(1),
            fail_after: false,
        }]);
        let gateway = StreamGateway::new(upstream);
        let (tx, rx) = events_channel();

        gateway.start_stream("conn-1", "turn-1", "hi".into(), tx);
        let events = collect(rx).await;

        let tokens: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::AiToken { token, .. } => Some(token.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["Hel", "lo", "!"]);

        match events.last().unwrap() {
            TurnEvent::AiDone {
                turn_id,
                full_text,
                token_count,
                ..
            } => {
                assert_eq!(turn_id, "turn-1");
                assert_eq!(full_text, "Hello!");
                assert_eq!(*token_count, 3);
            }
            other => panic!("expected AiDone, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_error_emits_ai_error() {
        let upstream = ScriptedUpstream::new(vec![Script {
            tokens: vec!["partial"],
            delay: Duration::from_millis(1),
            fail_after: true,
        }]);
        let gateway = StreamGateway::new(upstream);
        let (tx, rx) = events_channel();

        gateway.start_stream("conn-1", "turn-1", "hi".into(), tx);
        let events = collect(rx).await;

        assert!(matches!(events.last(), Some(TurnEvent::AiError { .. })));
        assert!(!events.iter().any(|e| matches!(e, TurnEvent::AiDone { .. })));
    }

    #[tokio::test]
    async fn test_cancel_without_live_stream_returns_false() {
        let gateway = StreamGateway::new(ScriptedUpstream::new(vec![]));
        assert!(!gateway.cancel_stream("conn-1"));
    }

    #[tokio::test]
    async fn test_cancel_stops_further_events() {
        let upstream = ScriptedUpstream::new(vec![Script {
            tokens: vec!["a"; 100],
            delay: Duration::from_millis(5),
            fail_after: false,
        }]);
        let gateway = StreamGateway::new(upstream);
        let (tx, mut rx) = events_channel();

        gateway.start_stream("conn-1", "turn-1", "hi".into(), tx);

        // Wait for the first token, then cancel mid-stream.
        let first = rx.recv().await.expect("first event");
        assert!(matches!(first, TurnEvent::AiToken { .. }));
        assert!(gateway.cancel_stream("conn-1"));

        let rest = collect(rx).await;
        assert!(
            !rest
                .iter()
                .any(|e| matches!(e, TurnEvent::AiDone { .. } | TurnEvent::AiError { .. })),
            "no terminal event may follow a cancel"
        );
        // A second cancel finds nothing.
        assert!(!gateway.cancel_stream("conn-1"));
    }

    #[tokio::test]
    async fn test_client_disconnect_unregisters_handle() {
        let upstream = ScriptedUpstream::new(vec![Script {
            tokens: vec!["a"; 50],
            delay: Duration::from_millis(2),
            fail_after: false,
        }]);
        let gateway = StreamGateway::new(upstream);
        let (tx, rx) = events_channel();

        gateway.start_stream("conn-1", "turn-1", "hi".into(), tx);
        // Client goes away mid-stream: the relay's next send fails and the
        // handle must leave the registry with it.
        drop(rx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(
            !gateway.cancel_stream("conn-1"),
            "stale handle left registered after client disconnect"
        );
    }

    #[tokio::test]
    async fn test_second_start_supersedes_first() {
        let upstream = ScriptedUpstream::new(vec![
            Script {
                tokens: vec!["slow"; 50],
                delay: Duration::from_millis(5),
                fail_after: false,
            },
            Script {
                tokens: vec!["b1", "b2"],
                delay: Duration::from_millis(1),
                fail_after: false,
            },
        ]);
        let gateway = StreamGateway::new(upstream);
        let (tx_a, rx_a) = events_channel();
        let (tx_b, rx_b) = events_channel();

        gateway.start_stream("conn-1", "turn-a", "first".into(), tx_a);
        tokio::time::sleep(Duration::from_millis(12)).await;
        gateway.start_stream("conn-1", "turn-b", "second".into(), tx_b);

        let events_b = collect(rx_b).await;
        match events_b.last().unwrap() {
            TurnEvent::AiDone {
                turn_id, full_text, ..
            } => {
                assert_eq!(turn_id, "turn-b");
                assert_eq!(full_text, "b1b2");
            }
            other => panic!("expected AiDone for turn-b, got {other:?}"),
        }

        // The superseded stream must never reach a terminal event.
        let events_a = collect(rx_a).await;
        assert!(
            !events_a
                .iter()
                .any(|e| matches!(e, TurnEvent::AiDone { .. } | TurnEvent::AiError { .. })),
            "superseded stream emitted a terminal event"
        );
    }

    #[tokio::test]
    async fn test_streams_on_different_connections_are_independent() {
        let upstream = ScriptedUpstream::new(vec![
            Script {
                tokens: vec!["x"],
                delay: Duration::from_millis(1),
                fail_after: false,
            },
            Script {
                tokens: vec!["y"],
                delay: Duration::from_millis(1),
                fail_after: false,
            },
        ]);
        let gateway = StreamGateway::new(upstream);
        let (tx1, rx1) = events_channel();
        let (tx2, rx2) = events_channel();

        gateway.start_stream("conn-1", "turn-1", "p1".into(), tx1);
        gateway.start_stream("conn-2", "turn-2", "p2".into(), tx2);

        let done1 = collect(rx1).await;
        let done2 = collect(rx2).await;
        assert!(matches!(done1.last(), Some(TurnEvent::AiDone { .. })));
        assert!(matches!(done2.last(), Some(TurnEvent::AiDone { .. })));
    }

    #[test]
    fn test_event_wire_format() {
        let event = TurnEvent::token("t-1", "hi".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ai_token");
        assert_eq!(json["turnId"], "t-1");
        assert_eq!(json["token"], "hi");
        assert!(json["timestamp"].is_i64());

        let done = TurnEvent::done("t-1", "hi there".into(), 2);
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "ai_done");
        assert_eq!(json["fullText"], "hi there");
        assert_eq!(json["tokenCount"], 2);
    }
}
