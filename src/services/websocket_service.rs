//! Lifecycle of one viewer WebSocket session.
//!
//! Every session gets a dedicated writer task draining its outbound queue and
//! a receive loop owned by the upgrade handler. Both stop together: the
//! connection manager cancels the session token, the writer closes the queue,
//! or the socket itself goes away.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{dto::ws::ClientMessage, services::snapshot_service, state::SharedState};

/// Handle the full lifecycle of an individual viewer connection.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    match_id: Uuid,
    client_id: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound frames flowing even while we await
    // inbound ones. A send that errors or overruns the configured timeout
    // marks the whole session dead.
    let send_timeout = state.config().send_timeout();
    let writer_state = state.clone();
    let writer_client = client_id.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match timeout(send_timeout, sender.send(message)).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(client_id = %writer_client, "websocket send timed out");
                }
            }
            // Disconnecting fires the session token, which unblocks the
            // receive loop below.
            writer_state.connections().disconnect(&writer_client);
            break;
        }
    });

    let initial = match snapshot_service::initial_load(&state, match_id).await {
        Ok(message) => message,
        Err(err) => {
            warn!(match_id = %match_id, error = %err, "refusing session: initial load failed");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // Queued before the session joins the broadcast stream, so the snapshot
    // is always the first frame on the wire.
    match serde_json::to_string(&initial) {
        Ok(json) => {
            let _ = outbound_tx.send(Message::Text(json.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize initial load"),
    }

    let session = state
        .connections()
        .connect(match_id, client_id.clone(), outbound_tx.clone());
    info!(client_id = %client_id, match_id = %match_id, "viewer connected");

    // When the token fires the manager has already dropped this session
    // (heartbeat reap, writer failure, or a reconnect replacing it), so the
    // teardown below must not disconnect by client id again.
    let mut detached = false;
    loop {
        tokio::select! {
            _ = session.cancel_token().cancelled() => {
                detached = true;
                break;
            }
            frame = receiver.next() => {
                let Some(frame) = frame else { break };
                let message = match frame {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(client_id = %client_id, error = %err, "websocket error");
                        break;
                    }
                };
                session.mark_alive();
                match message {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Pong) => {}
                        Ok(ClientMessage::Unknown) => {
                            debug!(client_id = %client_id, "ignoring unknown client message");
                        }
                        Err(err) => {
                            debug!(client_id = %client_id, error = %err, "unparseable client message");
                        }
                    },
                    Message::Ping(payload) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Message::Close(frame) => {
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Message::Binary(_) | Message::Pong(_) => {}
                }
            }
        }
    }

    if !detached {
        state.connections().disconnect(&client_id);
    }
    info!(client_id = %client_id, match_id = %match_id, "viewer disconnected");

    drop(session);
    finalize(writer_task, outbound_tx).await;
}

/// Ping every session on the configured interval and reap the silent ones.
pub async fn run_heartbeat(state: SharedState) {
    let period = state.config().heartbeat_interval();
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let reaped = state
            .connections()
            .sweep(state.config().heartbeat_miss_limit());
        if !reaped.is_empty() {
            info!(count = reaped.len(), "reaped unresponsive sessions");
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_reaps_a_silent_session() {
        let state = AppState::new(AppConfig::default());
        let match_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = state.connections().connect(match_id, "board".into(), tx);

        tokio::spawn(run_heartbeat(state.clone()));
        settle().await;

        // Default tuning: 30s interval, three unanswered pings tolerated.
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(30)).await;
            settle().await;
        }

        for _ in 0..3 {
            assert!(text_of(rx.try_recv().unwrap()).contains("\"ping\""));
        }
        assert_eq!(state.connections().session_count(), 0);
        assert!(session.cancel_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn answered_heartbeats_keep_the_session_alive() {
        let state = AppState::new(AppConfig::default());
        let match_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = state.connections().connect(match_id, "board".into(), tx);

        tokio::spawn(run_heartbeat(state.clone()));
        settle().await;

        for _ in 0..6 {
            tokio::time::advance(Duration::from_secs(30)).await;
            settle().await;
            assert!(text_of(rx.try_recv().unwrap()).contains("\"ping\""));
            session.mark_alive();
        }
        assert_eq!(state.connections().session_count(), 1);
    }
}
