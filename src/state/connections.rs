use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use axum::extract::ws::Message;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::ws::ServerMessage;

/// Change in which matches this process has live viewers for.
///
/// The cross-process bridge consumes these to keep its channel subscriptions
/// aligned with local interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestUpdate {
    /// First session for the match appeared.
    Subscribed(Uuid),
    /// Last session for the match went away.
    Unsubscribed(Uuid),
}

/// One live WebSocket session.
///
/// Delivery goes through an unbounded per-session queue drained by the
/// session's writer task, so a slow consumer never blocks a broadcast.
pub struct Session {
    client_id: String,
    match_id: Uuid,
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    missed_pongs: AtomicU32,
}

impl Session {
    /// Identifier the client connected under.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Match this session is watching.
    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    /// Token fired when the manager drops the session.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Reset the heartbeat debt. Called for any inbound frame.
    pub fn mark_alive(&self) {
        self.missed_pongs.store(0, Ordering::Release);
    }

    fn enqueue(&self, message: Message) -> bool {
        self.outbound.send(message).is_ok()
    }
}

/// Registry of WebSocket sessions grouped by match.
pub struct ConnectionManager {
    sessions: DashMap<String, Arc<Session>>,
    by_match: DashMap<Uuid, DashSet<String>>,
    interest: mpsc::UnboundedSender<InterestUpdate>,
}

impl ConnectionManager {
    /// Build a manager together with the interest feed for the bridge.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InterestUpdate>) {
        let (interest, interest_rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions: DashMap::new(),
                by_match: DashMap::new(),
                interest,
            },
            interest_rx,
        )
    }

    /// Register a session and return its handle.
    ///
    /// A client id that is already connected replaces its previous session;
    /// the old one is cancelled, matching how consoles reconnect after a
    /// network blip without waiting for the old socket to be reaped.
    pub fn connect(
        &self,
        match_id: Uuid,
        client_id: String,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Arc<Session> {
        let session = Arc::new(Session {
            client_id: client_id.clone(),
            match_id,
            outbound,
            cancel: CancellationToken::new(),
            missed_pongs: AtomicU32::new(0),
        });

        if let Some(previous) = self.sessions.insert(client_id.clone(), session.clone()) {
            warn!(client_id = %client_id, "replacing an existing session for this client id");
            previous.cancel.cancel();
            self.detach(previous.match_id, &client_id);
        }

        let watchers = self
            .by_match
            .entry(match_id)
            .or_insert_with(DashSet::new)
            .downgrade();
        watchers.insert(client_id);
        if watchers.len() == 1 {
            let _ = self.interest.send(InterestUpdate::Subscribed(match_id));
        }

        session
    }

    /// Drop a session. Safe to call more than once for the same client id.
    pub fn disconnect(&self, client_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(client_id) else {
            return false;
        };
        session.cancel.cancel();
        self.detach(session.match_id, client_id);
        debug!(client_id = %client_id, match_id = %session.match_id, "session closed");
        true
    }

    fn detach(&self, match_id: Uuid, client_id: &str) {
        if let Some(watchers) = self.by_match.get(&match_id) {
            watchers.remove(client_id);
            if !watchers.is_empty() {
                return;
            }
        }
        let removed = self
            .by_match
            .remove_if(&match_id, |_, watchers| watchers.is_empty())
            .is_some();
        if removed {
            let _ = self.interest.send(InterestUpdate::Unsubscribed(match_id));
        }
    }

    /// Serialize the message once and enqueue it to every session of the match.
    ///
    /// Sessions whose queue is gone are dropped along the way, so a broadcast
    /// doubles as a sweep for half-dead sockets.
    pub fn broadcast(&self, match_id: Uuid, message: &ServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        let Some(watchers) = self.by_match.get(&match_id) else {
            return;
        };
        let client_ids: Vec<String> = watchers.iter().map(|id| id.clone()).collect();
        drop(watchers);

        for client_id in client_ids {
            let Some(session) = self.sessions.get(&client_id).map(|s| s.value().clone()) else {
                continue;
            };
            if !session.enqueue(frame.clone()) {
                self.disconnect(&client_id);
            }
        }
    }

    /// Enqueue a heartbeat ping to every session and reap the ones that have
    /// exceeded `miss_limit` unanswered pings. Returns the reaped client ids.
    pub fn sweep(&self, miss_limit: u32) -> Vec<String> {
        let Some(frame) = encode(&ServerMessage::Ping) else {
            return Vec::new();
        };

        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut reaped = Vec::new();
        for session in sessions {
            let missed = session.missed_pongs.fetch_add(1, Ordering::AcqRel) + 1;
            if missed > miss_limit || !session.enqueue(frame.clone()) {
                self.disconnect(session.client_id());
                reaped.push(session.client_id().to_owned());
            }
        }
        reaped
    }

    /// Matches with at least one live session, e.g. for bridge resubscribes.
    pub fn active_matches(&self) -> Vec<Uuid> {
        self.by_match.iter().map(|entry| *entry.key()).collect()
    }

    /// Total number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of live sessions watching the given match.
    pub fn watcher_count(&self, match_id: Uuid) -> usize {
        self.by_match
            .get(&match_id)
            .map(|watchers| watchers.len())
            .unwrap_or(0)
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dto::clock::ClockSnapshot,
        state::clock::{ClockKind, ClockStatus},
    };

    fn update(match_id: Uuid, value: u64) -> ServerMessage {
        ServerMessage::GameclockUpdate(ClockSnapshot {
            match_id,
            kind: ClockKind::Game,
            value,
            status: ClockStatus::Running,
        })
    }

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_watcher_of_the_match() {
        let (manager, _interest) = ConnectionManager::new();
        let match_id = Uuid::new_v4();
        let other_match = Uuid::new_v4();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();
        manager.connect(match_id, "viewer-a".into(), tx_a);
        manager.connect(match_id, "viewer-b".into(), tx_b);
        manager.connect(other_match, "viewer-c".into(), tx_c);

        manager.broadcast(match_id, &update(match_id, 884));

        let a = text_of(rx_a.try_recv().unwrap());
        let b = text_of(rx_b.try_recv().unwrap());
        assert_eq!(a, b, "all watchers must see the identical payload");
        assert!(a.contains("\"gameclock-update\""));
        assert!(rx_c.try_recv().is_err(), "other matches must stay quiet");
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (manager, _interest) = ConnectionManager::new();
        let match_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = manager.connect(match_id, "viewer-a".into(), tx);

        assert!(manager.disconnect("viewer-a"));
        assert!(!manager.disconnect("viewer-a"));
        assert!(session.cancel_token().is_cancelled());
        assert_eq!(manager.session_count(), 0);
        assert_eq!(manager.watcher_count(match_id), 0);
    }

    #[tokio::test]
    async fn broadcast_drops_sessions_with_a_dead_queue() {
        let (manager, _interest) = ConnectionManager::new();
        let match_id = Uuid::new_v4();

        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        manager.connect(match_id, "gone".into(), tx_dead);
        manager.connect(match_id, "here".into(), tx_live);
        drop(rx_dead);

        manager.broadcast(match_id, &update(match_id, 500));

        assert!(rx_live.try_recv().is_ok());
        assert_eq!(manager.session_count(), 1, "the dead session must be reaped");
    }

    #[tokio::test]
    async fn reconnect_replaces_the_previous_session() {
        let (manager, _interest) = ConnectionManager::new();
        let match_id = Uuid::new_v4();

        let (tx_old, _rx_old) = mpsc::unbounded_channel();
        let old = manager.connect(match_id, "board".into(), tx_old);
        let (tx_new, mut rx_new) = mpsc::unbounded_channel();
        manager.connect(match_id, "board".into(), tx_new);

        assert!(old.cancel_token().is_cancelled());
        assert_eq!(manager.session_count(), 1);

        manager.broadcast(match_id, &update(match_id, 42));
        assert!(rx_new.try_recv().is_ok());
    }

    #[tokio::test]
    async fn interest_follows_first_and_last_watcher() {
        let (manager, mut interest) = ConnectionManager::new();
        let match_id = Uuid::new_v4();

        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        manager.connect(match_id, "viewer-a".into(), tx_a);
        manager.connect(match_id, "viewer-b".into(), tx_b);

        assert_eq!(
            interest.try_recv().unwrap(),
            InterestUpdate::Subscribed(match_id)
        );
        assert!(
            interest.try_recv().is_err(),
            "the second watcher must not resubscribe"
        );

        manager.disconnect("viewer-a");
        assert!(interest.try_recv().is_err());
        manager.disconnect("viewer-b");
        assert_eq!(
            interest.try_recv().unwrap(),
            InterestUpdate::Unsubscribed(match_id)
        );
    }

    #[tokio::test]
    async fn sweep_reaps_after_the_miss_limit() {
        let (manager, _interest) = ConnectionManager::new();
        let match_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = manager.connect(match_id, "viewer".into(), tx);

        for _ in 0..3 {
            assert!(manager.sweep(3).is_empty());
        }
        // Three pings went out unanswered.
        for _ in 0..3 {
            assert!(text_of(rx.try_recv().unwrap()).contains("\"ping\""));
        }

        let reaped = manager.sweep(3);
        assert_eq!(reaped, vec!["viewer".to_owned()]);
        assert_eq!(manager.session_count(), 0);
        assert!(session.cancel_token().is_cancelled());

        // A pong in time keeps the session alive indefinitely.
        let (tx, _rx) = mpsc::unbounded_channel();
        let revived = manager.connect(match_id, "viewer".into(), tx);
        for _ in 0..5 {
            revived.mark_alive();
            assert!(manager.sweep(3).is_empty());
        }
    }
}
