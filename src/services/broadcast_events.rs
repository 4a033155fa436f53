use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        clock::ClockSnapshot,
        match_view::{EventFeedSnapshot, MatchSnapshot},
        ws::{BridgeEnvelope, ServerMessage},
    },
    state::{
        SharedState,
        cache::CacheKind,
        clock::ClockId,
        fanout::match_channel,
        registry::ClockUpdate,
    },
};

/// Drain a clock's update queue, delivering every committed mutation to local
/// watchers and to peer processes.
///
/// One dispatcher runs per registered clock; it receives the queue reserved at
/// registration, so messages leave in exactly the order the mutators pushed
/// them. It must not hold the clock entry itself: the queue only closes once
/// every sender is gone, which is what ends this loop after eviction.
pub async fn run_update_dispatcher(
    state: SharedState,
    id: ClockId,
    mut updates: broadcast::Receiver<ClockUpdate>,
) {
    loop {
        match updates.recv().await {
            Ok(update) => publish(&state, &ServerMessage::clock_update(snapshot_of(update))),
            Err(RecvError::Lagged(missed)) => {
                // Watchers resync from the next update; readings self-correct.
                warn!(clock = %id, missed, "clock update dispatcher lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!(clock = %id, "clock update dispatcher stopped");
}

/// Invalidate the match header cache, then fan the refreshed header out.
///
/// Entry point for the match CRUD layer once it has persisted a change.
pub fn publish_match_update(state: &SharedState, snapshot: MatchSnapshot) {
    state.cache().invalidate(CacheKind::Match, snapshot.id);
    publish(state, &ServerMessage::MatchUpdate(snapshot));
}

/// Invalidate the event feed cache, then fan the refreshed feed out.
///
/// Entry point for the event CRUD layer and the stats importer.
pub fn publish_event_update(state: &SharedState, feed: EventFeedSnapshot) {
    state.cache().invalidate(CacheKind::Event, feed.match_id);
    publish(state, &ServerMessage::EventUpdate(feed));
}

/// Deliver a match-scoped message to local sessions and mirror it to peers.
pub fn publish(state: &SharedState, message: &ServerMessage) {
    let Some(match_id) = message.match_id() else {
        return;
    };

    state.connections().broadcast(match_id, message);
    mirror(state, match_id, message);
}

fn snapshot_of(update: ClockUpdate) -> ClockSnapshot {
    ClockSnapshot {
        match_id: update.id.match_id,
        kind: update.id.kind,
        value: update.value,
        status: update.status,
    }
}

/// Hand a copy of the message to the pub/sub bridge, when one is attached.
fn mirror(state: &SharedState, match_id: Uuid, message: &ServerMessage) {
    let fanout = state.fanout();
    if !fanout.bridge_enabled() {
        return;
    }

    let envelope = BridgeEnvelope {
        origin: fanout.origin(),
        message: message.clone(),
    };
    match serde_json::to_string(&envelope) {
        Ok(payload) => fanout.publish(match_channel(match_id), payload),
        Err(err) => warn!(error = %err, "failed to serialize bridge envelope"),
    }
}
