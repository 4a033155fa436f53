use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

use crate::state::clock::ClockKind;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save {kind} row for match `{match_id}`")]
    SaveClock {
        match_id: Uuid,
        kind: ClockKind,
        #[source]
        source: MongoError,
    },
    #[error("no {kind} row exists for match `{match_id}`")]
    ClockRowMissing { match_id: Uuid, kind: ClockKind },
    #[error("failed to load {kind} row for match `{match_id}`")]
    LoadClock {
        match_id: Uuid,
        kind: ClockKind,
        #[source]
        source: MongoError,
    },
    #[error("failed to load match `{id}`")]
    LoadMatch {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list events for match `{match_id}`")]
    ListEvents {
        match_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list stat lines for match `{match_id}`")]
    ListStats {
        match_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("environment variable `{var}` is not set")]
    MissingEnvVar { var: &'static str },
}
