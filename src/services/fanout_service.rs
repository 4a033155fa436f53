//! Redis pub/sub bridge mirroring match updates between processes.
//!
//! Each process publishes its own updates on per-match channels and
//! subscribes to the channels of matches it has local viewers for. Received
//! envelopes from other processes are re-applied locally: cache invalidation
//! first, then a broadcast to the local sessions. Envelopes stamped with this
//! process's own origin id are dropped, they already went out locally.

use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    dto::ws::BridgeEnvelope,
    state::{
        SharedState,
        connections::InterestUpdate,
        fanout::{BridgeCommand, match_channel},
    },
};

/// Delay before the first reconnect attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Ceiling for the reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Upper bound of the random jitter added to each reconnect delay.
const BACKOFF_JITTER_MS: u64 = 250;

/// How one bridge session over a live connection ended.
enum SessionEnd {
    /// Both feeds closed; the process is going away.
    Shutdown,
    /// The server dropped us after a working session.
    ConnectionLost,
}

/// Attach the bridge to the fanout bus and spawn its worker.
///
/// Must be called at most once, before updates start flowing; without it the
/// process runs standalone and publishes stay local.
pub fn spawn_bridge(state: SharedState, redis_url: String) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    state.fanout().attach_bridge(commands_tx);

    let Some(interest_rx) = state.take_interest_rx() else {
        warn!("interest stream already claimed; pub/sub bridge not started");
        return;
    };

    tokio::spawn(run_bridge(state, redis_url, commands_rx, interest_rx));
}

/// Drive the bridge, reconnecting with capped exponential backoff.
///
/// Publishes queued while disconnected are dropped rather than replayed:
/// clock updates are superseded within a second and replaying a stale burst
/// after a reconnect would rewind every remote viewer.
async fn run_bridge(
    state: SharedState,
    redis_url: String,
    mut commands: mpsc::UnboundedReceiver<BridgeCommand>,
    mut interest: mpsc::UnboundedReceiver<InterestUpdate>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match connect_and_serve(&state, &redis_url, &mut commands, &mut interest).await {
            Ok(SessionEnd::Shutdown) => {
                info!("pub/sub bridge stopped");
                return;
            }
            Ok(SessionEnd::ConnectionLost) => {
                // A working session resets the backoff ladder.
                backoff = INITIAL_BACKOFF;
            }
            Err(err) => {
                warn!(error = %err, "pub/sub connection attempt failed");
            }
        }

        let delay = backoff + jitter();
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting to pub/sub");
        drain_while_offline(&mut commands, &mut interest, delay).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Connect to Redis and relay until either side goes away.
async fn connect_and_serve(
    state: &SharedState,
    redis_url: &str,
    commands: &mut mpsc::UnboundedReceiver<BridgeCommand>,
    interest: &mut mpsc::UnboundedReceiver<InterestUpdate>,
) -> Result<SessionEnd, redis::RedisError> {
    let client = redis::Client::open(redis_url)?;
    let mut publisher = client.get_multiplexed_tokio_connection().await?;
    let (mut sink, mut stream) = client.get_async_pubsub().await?.split();

    // Viewers may have arrived while we were offline; align subscriptions
    // with the matches that currently have local sessions.
    for match_id in state.connections().active_matches() {
        sink.subscribe(match_channel(match_id)).await?;
    }
    info!("pub/sub bridge connected");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(BridgeCommand::Publish { channel, payload }) = command else {
                    return Ok(SessionEnd::Shutdown);
                };
                if let Err(err) = redis::cmd("PUBLISH")
                    .arg(&channel)
                    .arg(&payload)
                    .query_async::<()>(&mut publisher)
                    .await
                {
                    warn!(error = %err, channel = %channel, "pub/sub publish failed");
                    return Ok(SessionEnd::ConnectionLost);
                }
            }
            update = interest.recv() => {
                let Some(update) = update else {
                    return Ok(SessionEnd::Shutdown);
                };
                let result = match update {
                    InterestUpdate::Subscribed(match_id) => {
                        debug!(match_id = %match_id, "subscribing to match channel");
                        sink.subscribe(match_channel(match_id)).await
                    }
                    InterestUpdate::Unsubscribed(match_id) => {
                        debug!(match_id = %match_id, "unsubscribing from match channel");
                        sink.unsubscribe(match_channel(match_id)).await
                    }
                };
                if let Err(err) = result {
                    warn!(error = %err, "pub/sub subscription change failed");
                    return Ok(SessionEnd::ConnectionLost);
                }
            }
            message = stream.next() => {
                let Some(message) = message else {
                    warn!("pub/sub message stream ended");
                    return Ok(SessionEnd::ConnectionLost);
                };
                match message.get_payload::<String>() {
                    Ok(payload) => handle_bridge_payload(state, &payload),
                    Err(err) => warn!(error = %err, "unreadable pub/sub payload"),
                }
            }
        }
    }
}

/// Apply one envelope received off a match channel.
///
/// Invalidation happens before the local broadcast, the same order local
/// writers use, so a read racing the delivery never serves the old snapshot.
fn handle_bridge_payload(state: &SharedState, payload: &str) {
    let envelope: BridgeEnvelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "dropping malformed bridge envelope");
            return;
        }
    };

    if envelope.origin == state.fanout().origin() {
        return;
    }
    let Some(match_id) = envelope.message.match_id() else {
        return;
    };

    if let Some(kind) = envelope.message.invalidates() {
        state.cache().invalidate(kind, match_id);
    }
    state.connections().broadcast(match_id, &envelope.message);
}

/// Sit out the backoff delay while keeping both feeds drained.
///
/// Interest updates arriving now are safe to discard: the next session
/// resubscribes from [`crate::state::ConnectionManager::active_matches`],
/// which already reflects them.
async fn drain_while_offline(
    commands: &mut mpsc::UnboundedReceiver<BridgeCommand>,
    interest: &mut mpsc::UnboundedReceiver<InterestUpdate>,
    delay: Duration,
) {
    let deadline = tokio::time::Instant::now() + delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return,
            command = commands.recv() => {
                if command.is_none() {
                    return;
                }
            }
            update = interest.recv() => {
                if update.is_none() {
                    return;
                }
            }
        }
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..=BACKOFF_JITTER_MS))
}
