use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::clock::{ClockKind, ClockStatus};

/// Match header persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// Display name, e.g. the fixture title.
    pub name: String,
    /// Home team name.
    pub home_team: String,
    /// Away team name.
    pub away_team: String,
    /// Home team points.
    pub home_score: u32,
    /// Away team points.
    pub away_score: u32,
    /// Current quarter, 1 through 4 plus overtime periods.
    pub quarter: u8,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the match entity was updated.
    pub updated_at: SystemTime,
}

/// Clock row persisted by the storage layer.
///
/// There is one row per match and kind, created the first time the clock is
/// armed and updated in place afterwards, so the row id stays stable for the
/// lifetime of the match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockEntity {
    /// Primary key of the clock row.
    pub id: Uuid,
    /// Match the clock belongs to.
    pub match_id: Uuid,
    /// Game or play clock.
    pub kind: ClockKind,
    /// Remaining seconds as of the last persisted mutation.
    pub value: u64,
    /// Status as of the last persisted mutation.
    pub status: ClockStatus,
    /// Last time this row was updated.
    pub updated_at: SystemTime,
}

impl ClockEntity {
    /// Fresh row for a clock that has never been persisted before.
    pub fn new(match_id: Uuid, kind: ClockKind, value: u64, status: ClockStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            kind,
            value,
            status,
            updated_at: SystemTime::now(),
        }
    }
}

/// One entry of a match's event feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEventEntity {
    /// Primary key of the event.
    pub id: Uuid,
    /// Match the event belongs to.
    pub match_id: Uuid,
    /// Position in the feed, ascending.
    pub seq: u32,
    /// Kind of event, e.g. `touchdown` or `field-goal`.
    pub event_type: String,
    /// Human readable description.
    pub description: String,
    /// Team the event is credited to, when applicable.
    pub team: Option<String>,
}

/// One partial stat row for a player, as delivered by imports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatLineEntity {
    /// Match the row belongs to.
    pub match_id: Uuid,
    /// Jersey number.
    pub player_number: u32,
    /// Player name.
    pub player_name: String,
    /// Rushing yards, may be negative.
    pub rushing_yards: i64,
    /// Passing yards, may be negative.
    pub passing_yards: i64,
    /// Receiving yards, may be negative.
    pub receiving_yards: i64,
    /// Touchdowns scored.
    pub touchdowns: u32,
}
