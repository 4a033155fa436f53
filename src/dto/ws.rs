use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{
        clock::ClockSnapshot,
        match_view::{EventFeedSnapshot, MatchSnapshot},
    },
    state::{
        cache::CacheKind,
        clock::ClockKind,
    },
};

/// First message a fresh session receives: the match header plus both clock
/// snapshots as of connect time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InitialLoadData {
    /// Match header.
    #[serde(rename = "match")]
    pub match_view: MatchSnapshot,
    /// Game clock, absent until first armed.
    pub gameclock: Option<ClockSnapshot>,
    /// Play clock, absent until first armed.
    pub playclock: Option<ClockSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
/// Messages pushed to WebSocket clients, tagged by `type`.
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Connect-time burst.
    #[serde(rename = "initial-load")]
    InitialLoad(InitialLoadData),
    /// Match header changed.
    #[serde(rename = "match-update")]
    MatchUpdate(MatchSnapshot),
    /// Game clock ticked or was controlled.
    #[serde(rename = "gameclock-update")]
    GameclockUpdate(ClockSnapshot),
    /// Play clock ticked or was controlled.
    #[serde(rename = "playclock-update")]
    PlayclockUpdate(ClockSnapshot),
    /// The event feed changed.
    #[serde(rename = "event-update")]
    EventUpdate(EventFeedSnapshot),
    /// Application heartbeat; clients answer with `pong`.
    #[serde(rename = "ping")]
    Ping,
}

impl ServerMessage {
    /// Wrap a clock snapshot in the update variant matching its kind.
    pub fn clock_update(snapshot: ClockSnapshot) -> Self {
        match snapshot.kind {
            ClockKind::Game => ServerMessage::GameclockUpdate(snapshot),
            ClockKind::Play => ServerMessage::PlayclockUpdate(snapshot),
        }
    }

    /// Match this message is about, when it is match-scoped.
    pub fn match_id(&self) -> Option<Uuid> {
        match self {
            ServerMessage::InitialLoad(data) => Some(data.match_view.id),
            ServerMessage::MatchUpdate(snapshot) => Some(snapshot.id),
            ServerMessage::GameclockUpdate(snapshot)
            | ServerMessage::PlayclockUpdate(snapshot) => Some(snapshot.match_id),
            ServerMessage::EventUpdate(feed) => Some(feed.match_id),
            ServerMessage::Ping => None,
        }
    }

    /// Cache family a receiving process must invalidate before re-broadcasting
    /// this message to its own sessions.
    pub fn invalidates(&self) -> Option<CacheKind> {
        match self {
            ServerMessage::MatchUpdate(_) => Some(CacheKind::Match),
            ServerMessage::GameclockUpdate(_) => Some(CacheKind::GameClock),
            ServerMessage::PlayclockUpdate(_) => Some(CacheKind::PlayClock),
            ServerMessage::EventUpdate(_) => Some(CacheKind::Event),
            ServerMessage::InitialLoad(_) | ServerMessage::Ping => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from WebSocket clients.
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Answer to a server `ping`.
    #[serde(rename = "pong")]
    Pong,
    /// Anything this version does not understand; ignored.
    #[serde(other)]
    Unknown,
}

/// Wrapper carried on the per-match pub/sub channel.
///
/// The payload is exactly the WebSocket message; the origin id lets a process
/// drop its own publications when they echo back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    /// Origin process, see [`crate::state::fanout::FanoutBus::origin`].
    pub origin: Uuid,
    /// The message to re-broadcast locally.
    pub message: ServerMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::clock::ClockStatus;

    fn snapshot() -> ClockSnapshot {
        ClockSnapshot {
            match_id: Uuid::nil(),
            kind: ClockKind::Game,
            value: 431,
            status: ClockStatus::Running,
        }
    }

    #[test]
    fn clock_update_carries_the_tag_and_flat_fields() {
        let json = serde_json::to_value(ServerMessage::clock_update(snapshot())).unwrap();
        assert_eq!(json["type"], "gameclock-update");
        assert_eq!(json["value"], 431);
        assert_eq!(json["status"], "running");
        assert_eq!(json["kind"], "gameclock");
    }

    #[test]
    fn ping_is_a_bare_tag() {
        let json = serde_json::to_string(&ServerMessage::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn client_pong_parses_and_unknown_types_are_tolerated() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"pong"}"#).unwrap(),
            ClientMessage::Pong
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"selfie","data":1}"#).unwrap(),
            ClientMessage::Unknown
        ));
    }

    #[test]
    fn envelope_keeps_the_inner_message_intact() {
        let origin = Uuid::new_v4();
        let json = serde_json::to_string(&BridgeEnvelope {
            origin,
            message: ServerMessage::clock_update(snapshot()),
        })
        .unwrap();

        let envelope: BridgeEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope.origin, origin);
        assert_eq!(envelope.message.invalidates(), Some(CacheKind::GameClock));
        assert_eq!(envelope.message.match_id(), Some(Uuid::nil()));
    }
}
