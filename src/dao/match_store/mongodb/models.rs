use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::models::{ClockEntity, MatchEntity},
    state::clock::{ClockKind, ClockStatus},
};

/// Match header as stored in the `matches` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    home_team: String,
    away_team: String,
    home_score: u32,
    away_score: u32,
    quarter: u8,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            home_team: value.home_team,
            away_team: value.away_team,
            home_score: value.home_score,
            away_score: value.away_score,
            quarter: value.quarter,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoMatchDocument> for MatchEntity {
    fn from(value: MongoMatchDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            home_team: value.home_team,
            away_team: value.away_team,
            home_score: value.home_score,
            away_score: value.away_score,
            quarter: value.quarter,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Clock row as stored in the `clocks` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoClockDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    match_id: Uuid,
    kind: ClockKind,
    value: i64,
    status: ClockStatus,
    updated_at: DateTime,
}

impl From<ClockEntity> for MongoClockDocument {
    fn from(value: ClockEntity) -> Self {
        Self {
            id: value.id,
            match_id: value.match_id,
            kind: value.kind,
            value: value.value as i64,
            status: value.status,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoClockDocument> for ClockEntity {
    fn from(value: MongoClockDocument) -> Self {
        Self {
            id: value.id,
            match_id: value.match_id,
            kind: value.kind,
            value: value.value.max(0) as u64,
            status: value.status,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}

/// Filter selecting the single row of one clock: rows are keyed by match and
/// kind, never by the row id.
pub fn clock_filter(match_id: Uuid, kind: ClockKind) -> Document {
    doc! {"match_id": uuid_as_binary(match_id), "kind": kind.as_str()}
}

pub fn match_scope(match_id: Uuid) -> Document {
    doc! {"match_id": uuid_as_binary(match_id)}
}
