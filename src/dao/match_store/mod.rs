/// In-memory backend for tests and storage-less development runs.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{ClockEntity, MatchEntity, MatchEventEntity, PlayerStatLineEntity},
        storage::StorageResult,
    },
    state::clock::{ClockKind, ClockStatus},
};

/// Abstraction over the persistence layer for matches and their clocks.
///
/// Clock writes come in two flavors: `save_clock` upserts the whole row and
/// is used exactly once per clock to create it, `update_clock` touches value
/// and status of the existing row and is what every later mutation, including
/// the per-second tick, goes through.
pub trait MatchStore: Send + Sync {
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    fn find_clock(
        &self,
        match_id: Uuid,
        kind: ClockKind,
    ) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>>;
    fn save_clock(&self, clock: ClockEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn update_clock(
        &self,
        match_id: Uuid,
        kind: ClockKind,
        value: u64,
        status: ClockStatus,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn list_events(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEventEntity>>>;
    fn list_stat_lines(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerStatLineEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
