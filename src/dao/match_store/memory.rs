use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::SystemTime,
};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::MatchStore;
use crate::{
    dao::{
        models::{ClockEntity, MatchEntity, MatchEventEntity, PlayerStatLineEntity},
        storage::{StorageError, StorageResult},
    },
    state::clock::{ClockKind, ClockStatus},
};

/// [`MatchStore`] backed by process memory.
///
/// Used by the test suite and by development runs without a database. The
/// `fail_next_writes` knob makes clock writes fail on purpose, which is how
/// the scheduler's retry path gets exercised.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    matches: RwLock<HashMap<Uuid, MatchEntity>>,
    clocks: RwLock<HashMap<(Uuid, ClockKind), ClockEntity>>,
    events: RwLock<Vec<MatchEventEntity>>,
    stats: RwLock<Vec<PlayerStatLineEntity>>,
    fail_writes: AtomicU32,
}

impl MemoryMatchStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a match header.
    pub async fn seed_match(&self, entity: MatchEntity) {
        self.inner.matches.write().await.insert(entity.id, entity);
    }

    /// Append event rows.
    pub async fn seed_events(&self, rows: Vec<MatchEventEntity>) {
        self.inner.events.write().await.extend(rows);
    }

    /// Append stat rows.
    pub async fn seed_stat_lines(&self, rows: Vec<PlayerStatLineEntity>) {
        self.inner.stats.write().await.extend(rows);
    }

    /// Make the next `count` clock writes fail with an unavailable error.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.fail_writes.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> Option<StorageError> {
        let remaining = self.inner.fail_writes.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        self.inner.fail_writes.store(remaining - 1, Ordering::SeqCst);
        Some(StorageError::unavailable(
            "injected write failure".into(),
            std::io::Error::other("injected write failure"),
        ))
    }

    /// Convenience for building a plausible match header in tests.
    pub fn sample_match(id: Uuid) -> MatchEntity {
        let now = SystemTime::now();
        MatchEntity {
            id,
            name: "Week 3: Ravens at Steelers".into(),
            home_team: "Steelers".into(),
            away_team: "Ravens".into(),
            home_score: 14,
            away_score: 10,
            quarter: 2,
            created_at: now,
            updated_at: now,
        }
    }
}

impl MatchStore for MemoryMatchStore {
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.matches.read().await.get(&id).cloned()) })
    }

    fn find_clock(
        &self,
        match_id: Uuid,
        kind: ClockKind,
    ) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .clocks
                .read()
                .await
                .get(&(match_id, kind))
                .cloned())
        })
    }

    fn save_clock(&self, clock: ClockEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some(err) = store.take_injected_failure() {
                return Err(err);
            }
            store
                .inner
                .clocks
                .write()
                .await
                .insert((clock.match_id, clock.kind), clock);
            Ok(())
        })
    }

    fn update_clock(
        &self,
        match_id: Uuid,
        kind: ClockKind,
        value: u64,
        status: ClockStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some(err) = store.take_injected_failure() {
                return Err(err);
            }
            let mut clocks = store.inner.clocks.write().await;
            match clocks.get_mut(&(match_id, kind)) {
                Some(row) => {
                    row.value = value;
                    row.status = status;
                    row.updated_at = SystemTime::now();
                    Ok(())
                }
                None => Err(StorageError::unavailable(
                    format!("no clock row for match {match_id} kind {kind}"),
                    std::io::Error::other("row missing"),
                )),
            }
        })
    }

    fn list_events(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .events
                .read()
                .await
                .iter()
                .filter(|row| row.match_id == match_id)
                .cloned()
                .collect())
        })
    }

    fn list_stat_lines(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerStatLineEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .stats
                .read()
                .await
                .iter()
                .filter(|row| row.match_id == match_id)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
