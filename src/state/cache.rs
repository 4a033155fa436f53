use std::{future::Future, sync::Arc};

use dashmap::{DashMap, Entry};
use uuid::Uuid;

use super::clock::ClockKind;
use crate::{
    dto::{
        clock::ClockSnapshot,
        match_view::{EventFeedSnapshot, MatchSnapshot, StatsSnapshot},
    },
    error::ServiceError,
};

/// Snapshot families tracked independently per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Composite match header (teams, score, quarter).
    Match,
    /// Game clock snapshot.
    GameClock,
    /// Play clock snapshot.
    PlayClock,
    /// Ordered event feed.
    Event,
    /// Aggregated player stat lines.
    Stats,
}

impl CacheKind {
    /// Cache family backing the given clock kind.
    pub fn for_clock(kind: ClockKind) -> Self {
        match kind {
            ClockKind::Game => CacheKind::GameClock,
            ClockKind::Play => CacheKind::PlayClock,
        }
    }

    /// Stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Match => "match",
            CacheKind::GameClock => "gameclock",
            CacheKind::PlayClock => "playclock",
            CacheKind::Event => "event",
            CacheKind::Stats => "stats",
        }
    }
}

/// Payload held by one cache slot. Arc'd so hits share a single allocation
/// and cached copies can never be mutated in place.
#[derive(Debug, Clone)]
pub enum CachedView {
    /// Match header snapshot.
    Match(Arc<MatchSnapshot>),
    /// Game or play clock snapshot.
    Clock(Arc<ClockSnapshot>),
    /// Event feed snapshot.
    Events(Arc<EventFeedSnapshot>),
    /// Stat line snapshot.
    Stats(Arc<StatsSnapshot>),
}

impl CachedView {
    /// Unwrap a match header, if this view holds one.
    pub fn into_match(self) -> Option<Arc<MatchSnapshot>> {
        match self {
            CachedView::Match(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Unwrap a clock snapshot, if this view holds one.
    pub fn into_clock(self) -> Option<Arc<ClockSnapshot>> {
        match self {
            CachedView::Clock(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Unwrap an event feed, if this view holds one.
    pub fn into_events(self) -> Option<Arc<EventFeedSnapshot>> {
        match self {
            CachedView::Events(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Unwrap a stats snapshot, if this view holds one.
    pub fn into_stats(self) -> Option<Arc<StatsSnapshot>> {
        match self {
            CachedView::Stats(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    view: Option<CachedView>,
}

/// Read-through snapshot cache keyed by `(kind, match id)`.
///
/// Reads serve the cached view when present and otherwise run the caller's
/// fetch. Writers never update cached payloads; they invalidate, and the next
/// read repopulates. Each slot carries a generation that invalidation bumps,
/// so a fetch that was in flight when the invalidation landed cannot store a
/// stale view over it. Two concurrent misses may both fetch; that is accepted.
#[derive(Default)]
pub struct SnapshotCache {
    slots: DashMap<(CacheKind, Uuid), Slot>,
}

impl SnapshotCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached view for the key, without triggering a fetch.
    pub fn peek(&self, kind: CacheKind, match_id: Uuid) -> Option<CachedView> {
        self.slots
            .get(&(kind, match_id))
            .and_then(|slot| slot.view.clone())
    }

    /// Drop the cached view and retire any fetch currently in flight for it.
    pub fn invalidate(&self, kind: CacheKind, match_id: Uuid) {
        match self.slots.entry((kind, match_id)) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.generation += 1;
                slot.view = None;
            }
            // Leave a tombstone so an in-flight fetch that opened before this
            // call observes the generation bump.
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    generation: 1,
                    view: None,
                });
            }
        }
    }

    /// Serve the cached view or run `fetch` and remember its result.
    ///
    /// A failed fetch is returned to the caller and never cached. A successful
    /// fetch is stored only when no invalidation landed while it ran.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        kind: CacheKind,
        match_id: Uuid,
        fetch: F,
    ) -> Result<CachedView, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedView, ServiceError>>,
    {
        let key = (kind, match_id);
        let opening_generation = match self.slots.get(&key) {
            Some(slot) => match slot.view.clone() {
                Some(view) => return Ok(view),
                None => slot.generation,
            },
            None => 0,
        };

        let view = fetch().await?;

        match self.slots.entry(key) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.generation == opening_generation {
                    slot.view = Some(view.clone());
                }
            }
            // A vacant slot after a tombstoned open means the key was purged
            // while the fetch ran; only a fetch that opened on a bare key may
            // insert.
            Entry::Vacant(vacant) => {
                if opening_generation == 0 {
                    vacant.insert(Slot {
                        generation: 0,
                        view: Some(view.clone()),
                    });
                }
            }
        }

        Ok(view)
    }

    /// Drop every slot the match owns, invalidation tombstones included.
    ///
    /// Runs at match teardown, after the final rows are persisted; finished
    /// matches must not keep slots for the rest of the process lifetime.
    pub fn purge_match(&self, match_id: Uuid) {
        for kind in [
            CacheKind::Match,
            CacheKind::GameClock,
            CacheKind::PlayClock,
            CacheKind::Event,
            CacheKind::Stats,
        ] {
            self.slots.remove(&(kind, match_id));
        }
    }

    /// Number of held slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no slot is held.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
