use std::sync::OnceLock;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of the per-match pub/sub channels.
pub const CHANNEL_PREFIX: &str = "gridiron:match:";

/// Pub/sub channel carrying updates for one match.
pub fn match_channel(match_id: Uuid) -> String {
    format!("{CHANNEL_PREFIX}{match_id}")
}

/// Command handed to the bridge worker.
#[derive(Debug)]
pub enum BridgeCommand {
    /// Publish an already serialized envelope on a channel.
    Publish {
        /// Target channel, see [`match_channel`].
        channel: String,
        /// Serialized [`crate::dto::ws::BridgeEnvelope`].
        payload: String,
    },
}

/// Hand-off point between update producers and the cross-process bridge.
///
/// The bus always exists; the bridge is attached once at startup when a
/// pub/sub backend is configured. Without one, publishes stay local and the
/// process serves its own sessions only.
pub struct FanoutBus {
    origin: Uuid,
    bridge: OnceLock<mpsc::UnboundedSender<BridgeCommand>>,
}

impl FanoutBus {
    /// Create a bus with a fresh origin id for this process.
    pub fn new() -> Self {
        Self {
            origin: Uuid::new_v4(),
            bridge: OnceLock::new(),
        }
    }

    /// Origin id stamped into outgoing envelopes so this process can drop
    /// its own messages when they echo back off the channel.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// Wire the bridge worker in. Later calls are ignored.
    pub fn attach_bridge(&self, commands: mpsc::UnboundedSender<BridgeCommand>) {
        if self.bridge.set(commands).is_err() {
            warn!("bridge already attached, ignoring the new handle");
        }
    }

    /// True when a bridge worker has been attached.
    pub fn bridge_enabled(&self) -> bool {
        self.bridge.get().is_some()
    }

    /// Queue an envelope for cross-process publication.
    ///
    /// A missing bridge means single-process mode; a closed one means the
    /// worker is gone and local delivery is all that remains. Neither is an
    /// error for the caller.
    pub fn publish(&self, channel: String, payload: String) {
        let Some(commands) = self.bridge.get() else {
            return;
        };
        if commands
            .send(BridgeCommand::Publish { channel, payload })
            .is_err()
        {
            debug!("bridge worker is gone, update delivered locally only");
        }
    }
}

impl Default for FanoutBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_a_bridge_is_a_local_no_op() {
        let bus = FanoutBus::new();
        assert!(!bus.bridge_enabled());
        bus.publish(match_channel(Uuid::new_v4()), "{}".into());
    }

    #[tokio::test]
    async fn publish_reaches_the_attached_bridge() {
        let bus = FanoutBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.attach_bridge(tx);
        assert!(bus.bridge_enabled());

        let match_id = Uuid::new_v4();
        bus.publish(match_channel(match_id), "{\"origin\":null}".into());

        let BridgeCommand::Publish { channel, payload } = rx.recv().await.unwrap();
        assert_eq!(channel, format!("gridiron:match:{match_id}"));
        assert!(payload.contains("origin"));
    }

    #[test]
    fn origins_are_distinct_per_process() {
        assert_ne!(FanoutBus::new().origin(), FanoutBus::new().origin());
    }
}
