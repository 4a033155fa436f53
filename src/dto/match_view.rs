use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{MatchEntity, MatchEventEntity, PlayerStatLineEntity},
    dto::{clock::ClockSnapshot, format_system_time},
};

/// Match header as pushed to viewers: identity, teams, score and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchSnapshot {
    /// Match identifier.
    pub id: Uuid,
    /// Display name, e.g. `Week 3: Ravens at Steelers`.
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
    /// RFC 3339 timestamp of the last persisted change.
    pub updated_at: String,
}

impl From<MatchEntity> for MatchSnapshot {
    fn from(entity: MatchEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            home_team: entity.home_team,
            away_team: entity.away_team,
            home_score: entity.home_score,
            away_score: entity.away_score,
            quarter: entity.quarter,
            updated_at: format_system_time(entity.updated_at),
        }
    }
}

/// One entry of the match event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventSnapshot {
    /// Event identifier.
    pub id: Uuid,
    /// Position in the feed, ascending.
    pub seq: u32,
    /// Kind of event, e.g. `touchdown` or `field-goal`.
    pub event_type: String,
    /// Human readable description.
    pub description: String,
    /// Team the event is credited to, when applicable.
    pub team: Option<String>,
}

impl From<MatchEventEntity> for EventSnapshot {
    fn from(entity: MatchEventEntity) -> Self {
        Self {
            id: entity.id,
            seq: entity.seq,
            event_type: entity.event_type,
            description: entity.description,
            team: entity.team,
        }
    }
}

/// The ordered event feed of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventFeedSnapshot {
    /// Match the feed belongs to.
    pub match_id: Uuid,
    /// Events in feed order.
    pub events: Vec<EventSnapshot>,
}

impl EventFeedSnapshot {
    /// Build a feed from persisted rows, sorted by sequence number.
    pub fn from_rows(match_id: Uuid, mut rows: Vec<MatchEventEntity>) -> Self {
        rows.sort_by_key(|row| row.seq);
        Self {
            match_id,
            events: rows.into_iter().map(Into::into).collect(),
        }
    }
}

/// Accumulated stats of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatLineSnapshot {
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

/// Aggregated stat lines of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatsSnapshot {
    /// Match the stats belong to.
    pub match_id: Uuid,
    /// One line per player, in first-appearance order.
    pub lines: Vec<StatLineSnapshot>,
}

impl StatsSnapshot {
    /// Merge persisted stat rows into one line per player.
    ///
    /// Imports may deliver several partial rows for the same jersey number;
    /// they sum up, and players keep the order their first row appeared in.
    pub fn from_rows(match_id: Uuid, rows: Vec<PlayerStatLineEntity>) -> Self {
        let mut lines: IndexMap<u32, StatLineSnapshot> = IndexMap::new();
        for row in rows {
            let line = lines
                .entry(row.player_number)
                .or_insert_with(|| StatLineSnapshot {
                    player_number: row.player_number,
                    player_name: row.player_name.clone(),
                    rushing_yards: 0,
                    passing_yards: 0,
                    receiving_yards: 0,
                    touchdowns: 0,
                });
            line.rushing_yards += row.rushing_yards;
            line.passing_yards += row.passing_yards;
            line.receiving_yards += row.receiving_yards;
            line.touchdowns += row.touchdowns;
        }
        Self {
            match_id,
            lines: lines.into_values().collect(),
        }
    }
}

/// Everything a read client needs about a match in one response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchViewResponse {
    /// Match header.
    #[serde(rename = "match")]
    pub match_view: MatchSnapshot,
    /// Game clock, absent until first armed.
    pub gameclock: Option<ClockSnapshot>,
    /// Play clock, absent until first armed.
    pub playclock: Option<ClockSnapshot>,
    /// Ordered event feed.
    pub events: Vec<EventSnapshot>,
    /// Aggregated stat lines.
    pub stats: Vec<StatLineSnapshot>,
}
