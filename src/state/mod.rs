pub mod cache;
pub mod clock;
pub mod connections;
pub mod fanout;
pub mod registry;

use std::sync::{Arc, Mutex};

use tokio::sync::{RwLock, broadcast, mpsc, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::match_store::MatchStore, error::ServiceError};

pub use self::cache::SnapshotCache;
pub use self::connections::{ConnectionManager, InterestUpdate};
pub use self::fanout::FanoutBus;
pub use self::registry::ClockRegistry;

pub type SharedState = Arc<AppState>;

/// Capacity of the domain event channel. Expiries are rare, so a small
/// buffer is plenty.
const DOMAIN_EVENT_CAPACITY: usize = 16;

/// Notable in-game occurrences surfaced by the clock loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEvent {
    /// The game clock of a match counted down to zero.
    GameClockExpired {
        /// Match whose game clock expired.
        match_id: Uuid,
    },
    /// The play clock of a match counted down to zero.
    PlayClockExpired {
        /// Match whose play clock expired.
        match_id: Uuid,
    },
}

/// Central application state storing live clocks, caches and connections.
pub struct AppState {
    config: AppConfig,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
    clocks: ClockRegistry,
    cache: SnapshotCache,
    connections: ConnectionManager,
    fanout: FanoutBus,
    domain_events: broadcast::Sender<DomainEvent>,
    interest_rx: Mutex<Option<mpsc::UnboundedReceiver<InterestUpdate>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (connections, interest_rx) = ConnectionManager::new();
        let (domain_events, _) = broadcast::channel(DOMAIN_EVENT_CAPACITY);
        Arc::new(Self {
            config,
            match_store: RwLock::new(None),
            degraded: degraded_tx,
            clocks: ClockRegistry::new(),
            cache: SnapshotCache::new(),
            connections,
            fanout: FanoutBus::new(),
            domain_events,
            interest_rx: Mutex::new(Some(interest_rx)),
        })
    }

    /// Runtime configuration the process was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the current match store or fail when running degraded.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn install_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        {
            let mut guard = self.match_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.match_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of live clock state machines keyed by match and kind.
    pub fn clocks(&self) -> &ClockRegistry {
        &self.clocks
    }

    /// Read-through cache shielding the store from hot snapshot reads.
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Registry of active websocket sessions grouped by match.
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Cross-process fanout handle used to mirror updates between replicas.
    pub fn fanout(&self) -> &FanoutBus {
        &self.fanout
    }

    /// Subscribe to domain events emitted by the clock loops.
    pub fn subscribe_domain_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.domain_events.subscribe()
    }

    /// Emit a domain event to all current subscribers.
    pub fn emit_domain_event(&self, event: DomainEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.domain_events.send(event);
    }

    /// Take the match interest stream fed by the connection manager.
    ///
    /// Returns `Some` exactly once; the pub/sub bridge claims it at startup.
    pub fn take_interest_rx(&self) -> Option<mpsc::UnboundedReceiver<InterestUpdate>> {
        self.interest_rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dao::match_store::memory::MemoryMatchStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);
        assert!(state.match_store().await.is_none());

        let mut watcher = state.degraded_watcher();
        assert!(*watcher.borrow_and_update());

        state
            .install_match_store(Arc::new(MemoryMatchStore::new()))
            .await;
        assert!(!state.is_degraded().await);
        assert!(state.match_store().await.is_some());
        assert!(watcher.changed().await.is_ok());
        assert!(!*watcher.borrow_and_update());
    }

    #[tokio::test]
    async fn clearing_the_store_reenters_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        state
            .install_match_store(Arc::new(MemoryMatchStore::new()))
            .await;
        assert!(!state.is_degraded().await);

        state.clear_match_store().await;
        assert!(state.is_degraded().await);
        assert!(state.match_store().await.is_none());
    }

    #[tokio::test]
    async fn interest_stream_can_only_be_taken_once() {
        let state = AppState::new(AppConfig::default());
        assert!(state.take_interest_rx().is_some());
        assert!(state.take_interest_rx().is_none());
    }

    #[tokio::test]
    async fn domain_events_reach_subscribers() {
        let state = AppState::new(AppConfig::default());
        let mut rx = state.subscribe_domain_events();
        let match_id = Uuid::new_v4();

        state.emit_domain_event(DomainEvent::PlayClockExpired { match_id });

        assert_eq!(
            rx.recv().await.ok(),
            Some(DomainEvent::PlayClockExpired { match_id })
        );
    }
}
