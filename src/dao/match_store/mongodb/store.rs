use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoClockDocument, MongoMatchDocument, clock_filter, doc_id, match_scope},
};
use crate::{
    dao::{
        match_store::MatchStore,
        models::{ClockEntity, MatchEntity, MatchEventEntity, PlayerStatLineEntity},
        storage::StorageResult,
    },
    state::clock::{ClockKind, ClockStatus},
};

const MATCH_COLLECTION_NAME: &str = "matches";
const CLOCK_COLLECTION_NAME: &str = "clocks";
const EVENT_COLLECTION_NAME: &str = "match_events";
const STAT_COLLECTION_NAME: &str = "stat_lines";

#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        // One row per clock; the unique index is what makes "created once,
        // updated forever" hold even across racing processes.
        let clocks = database.collection::<MongoClockDocument>(CLOCK_COLLECTION_NAME);
        let clock_index = mongodb::IndexModel::builder()
            .keys(doc! {"match_id": 1, "kind": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("clock_match_kind_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        clocks
            .create_index(clock_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CLOCK_COLLECTION_NAME,
                index: "match_id,kind",
                source,
            })?;

        let events = database.collection::<MatchEventEntity>(EVENT_COLLECTION_NAME);
        let event_index = mongodb::IndexModel::builder()
            .keys(doc! {"match_id": 1, "seq": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("event_match_seq_idx".to_owned()))
                    .build(),
            )
            .build();
        events
            .create_index(event_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EVENT_COLLECTION_NAME,
                index: "match_id,seq",
                source,
            })?;

        let stats = database.collection::<PlayerStatLineEntity>(STAT_COLLECTION_NAME);
        let stat_index = mongodb::IndexModel::builder()
            .keys(doc! {"match_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("stat_match_idx".to_owned()))
                    .build(),
            )
            .build();
        stats
            .create_index(stat_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: STAT_COLLECTION_NAME,
                index: "match_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn match_collection(&self) -> Collection<MongoMatchDocument> {
        self.database()
            .await
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn clock_collection(&self) -> Collection<MongoClockDocument> {
        self.database()
            .await
            .collection::<MongoClockDocument>(CLOCK_COLLECTION_NAME)
    }

    async fn find_match(&self, id: Uuid) -> MongoResult<Option<MatchEntity>> {
        let collection = self.match_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadMatch { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_clock(
        &self,
        match_id: Uuid,
        kind: ClockKind,
    ) -> MongoResult<Option<ClockEntity>> {
        let collection = self.clock_collection().await;
        let document = collection
            .find_one(clock_filter(match_id, kind))
            .await
            .map_err(|source| MongoDaoError::LoadClock {
                match_id,
                kind,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn save_clock(&self, clock: ClockEntity) -> MongoResult<()> {
        let match_id = clock.match_id;
        let kind = clock.kind;
        let document: MongoClockDocument = clock.into();
        let collection = self.clock_collection().await;
        collection
            .replace_one(clock_filter(match_id, kind), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveClock {
                match_id,
                kind,
                source,
            })?;
        Ok(())
    }

    async fn update_clock(
        &self,
        match_id: Uuid,
        kind: ClockKind,
        value: u64,
        status: ClockStatus,
    ) -> MongoResult<()> {
        let collection = self.clock_collection().await;
        let update = doc! {"$set": {
            "value": value as i64,
            "status": status.as_str(),
            "updated_at": DateTime::now(),
        }};
        let result = collection
            .update_one(clock_filter(match_id, kind), update)
            .await
            .map_err(|source| MongoDaoError::SaveClock {
                match_id,
                kind,
                source,
            })?;
        if result.matched_count == 0 {
            return Err(MongoDaoError::ClockRowMissing { match_id, kind });
        }
        Ok(())
    }

    async fn list_events(&self, match_id: Uuid) -> MongoResult<Vec<MatchEventEntity>> {
        let collection = self
            .database()
            .await
            .collection::<MatchEventEntity>(EVENT_COLLECTION_NAME);
        collection
            .find(match_scope(match_id))
            .sort(doc! {"seq": 1})
            .await
            .map_err(|source| MongoDaoError::ListEvents { match_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListEvents { match_id, source })
    }

    async fn list_stat_lines(&self, match_id: Uuid) -> MongoResult<Vec<PlayerStatLineEntity>> {
        let collection = self
            .database()
            .await
            .collection::<PlayerStatLineEntity>(STAT_COLLECTION_NAME);
        collection
            .find(match_scope(match_id))
            .await
            .map_err(|source| MongoDaoError::ListStats { match_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListStats { match_id, source })
    }
}

impl MatchStore for MongoMatchStore {
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(id).await.map_err(Into::into) })
    }

    fn find_clock(
        &self,
        match_id: Uuid,
        kind: ClockKind,
    ) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_clock(match_id, kind).await.map_err(Into::into) })
    }

    fn save_clock(&self, clock: ClockEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_clock(clock).await.map_err(Into::into) })
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
            store
                .update_clock(match_id, kind, value, status)
                .await
                .map_err(Into::into)
        })
    }

    fn list_events(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_events(match_id).await.map_err(Into::into) })
    }

    fn list_stat_lines(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerStatLineEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_stat_lines(match_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
