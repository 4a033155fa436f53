use std::sync::Arc;

use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use crate::{
    dao::match_store::MatchStore,
    error::ServiceError,
    state::{
        DomainEvent, SharedState,
        cache::CacheKind,
        clock::{ClockId, ClockKind, ClockStatus, TickOutcome},
        registry::{ClockEntry, ClockUpdate},
    },
};

/// Nominal spacing between decrements.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Count a running clock down once per second until it stops.
///
/// The interval timer fires on wall-clock boundaries regardless of how long a
/// step takes, so tick spacing does not accumulate processing latency; a step
/// that overruns a whole period skips ahead instead of bursting.
///
/// The loop exits when the clock is evicted, when a control operation retires
/// this epoch, when the status leaves running, when the value expires, or when
/// persistence fails twice for one tick. Failures stay contained here; other
/// clocks' loops are unaffected.
pub async fn run_decrement_loop(
    state: SharedState,
    id: ClockId,
    entry: Arc<ClockEntry>,
    epoch: u64,
) {
    let mut ticks = time::interval_at(time::Instant::now() + TICK_PERIOD, TICK_PERIOD);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(clock = %id, epoch, "decrement loop armed");

    loop {
        tokio::select! {
            _ = entry.cancel_token().cancelled() => break,
            _ = ticks.tick() => {}
        }

        // The registry is the liveness authority: an evicted clock never ticks.
        if state.clocks().get(&id).is_none() {
            break;
        }

        let mut machine = entry.machine().lock().await;
        if entry.loop_epoch() != epoch {
            // A control operation armed a newer loop; this one retires.
            break;
        }
        if machine.status() != ClockStatus::Running {
            break;
        }

        match machine.tick() {
            TickOutcome::Ticked(value) => {
                if persist_with_retry(&state, id, value, ClockStatus::Running)
                    .await
                    .is_err()
                {
                    // Park the clock; the last persisted value stays authoritative
                    // until an operator restarts it.
                    machine.reset(value, ClockStatus::Paused);
                    drop(machine);
                    warn!(clock = %id, "tick persistence failed twice; parking the clock");
                    commit(&state, &entry, id, value, ClockStatus::Paused);
                    break;
                }
                drop(machine);
                commit(&state, &entry, id, value, ClockStatus::Running);
            }
            TickOutcome::Expired => {
                if persist_with_retry(&state, id, 0, ClockStatus::Stopped)
                    .await
                    .is_err()
                {
                    warn!(clock = %id, "failed to persist clock expiry");
                }
                drop(machine);
                commit(&state, &entry, id, 0, ClockStatus::Stopped);
                state.emit_domain_event(expiry_event(id));
                break;
            }
            TickOutcome::NotRunning => break,
        }
    }

    debug!(clock = %id, epoch, "decrement loop stopped");
}

/// Make a committed tick visible: drop the stale snapshot, then enqueue the
/// update for the dispatcher.
fn commit(state: &SharedState, entry: &ClockEntry, id: ClockId, value: u64, status: ClockStatus) {
    state
        .cache()
        .invalidate(CacheKind::for_clock(id.kind), id.match_id);
    entry.push_update(ClockUpdate { id, value, status });
}

fn expiry_event(id: ClockId) -> DomainEvent {
    match id.kind {
        ClockKind::Game => DomainEvent::GameClockExpired {
            match_id: id.match_id,
        },
        ClockKind::Play => DomainEvent::PlayClockExpired {
            match_id: id.match_id,
        },
    }
}

async fn persist_with_retry(
    state: &SharedState,
    id: ClockId,
    value: u64,
    status: ClockStatus,
) -> Result<(), ServiceError> {
    if let Err(err) = persist(state, id, value, status).await {
        warn!(clock = %id, error = %err, "tick persistence failed; retrying once");
        return persist(state, id, value, status).await;
    }
    Ok(())
}

async fn persist(
    state: &SharedState,
    id: ClockId,
    value: u64,
    status: ClockStatus,
) -> Result<(), ServiceError> {
    let store = state.require_match_store().await?;
    store
        .update_clock(id.match_id, id.kind, value, status)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{match_store::memory::MemoryMatchStore, models::ClockEntity},
        state::{AppState, clock::ClockStateMachine},
    };

    async fn armed_state(value: u64) -> (SharedState, MemoryMatchStore, ClockId) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryMatchStore::new();
        let match_id = Uuid::new_v4();
        store
            .seed_match(MemoryMatchStore::sample_match(match_id))
            .await;
        store
            .save_clock(ClockEntity::new(
                match_id,
                ClockKind::Play,
                value,
                ClockStatus::Running,
            ))
            .await
            .unwrap();
        state.install_match_store(std::sync::Arc::new(store.clone())).await;
        (state, store, ClockId::new(match_id, ClockKind::Play))
    }

    /// Register a running machine and arm a loop for it, returning the entry
    /// and the epoch the loop was started under.
    async fn arm(state: &SharedState, id: ClockId, value: u64) -> (Arc<ClockEntry>, u64) {
        let (entry, created) = state.clocks().register_with(id, || {
            ClockStateMachine::new(ClockKind::Play, value, Some(40))
        });
        assert!(created);
        entry.machine().lock().await.start().unwrap();
        let epoch = entry.advance_epoch();
        tokio::spawn(run_decrement_loop(state.clone(), id, entry.clone(), epoch));
        (entry, epoch)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaches_zero_and_stops() {
        let (state, store, id) = armed_state(3).await;
        let mut events = state.subscribe_domain_events();
        let (entry, _) = arm(&state, id, 3).await;
        let mut updates = entry.subscribe();

        assert_eq!(
            events.recv().await.ok(),
            Some(DomainEvent::PlayClockExpired {
                match_id: id.match_id
            })
        );

        for (value, status) in [
            (2, ClockStatus::Running),
            (1, ClockStatus::Running),
            (0, ClockStatus::Stopped),
        ] {
            let update = updates.try_recv().unwrap();
            assert_eq!(update.value, value);
            assert_eq!(update.status, status);
        }

        let row = store.find_clock(id.match_id, id.kind).await.unwrap().unwrap();
        assert_eq!(row.value, 0);
        assert_eq!(row.status, ClockStatus::Stopped);

        let machine = entry.machine().lock().await;
        assert_eq!(machine.status(), ClockStatus::Stopped);
        assert_eq!(machine.reading(), 0);
        assert!(
            state.clocks().get(&id).is_some(),
            "expiry stops the loop but keeps the clock registered"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_newer_epoch_retires_the_older_loop() {
        let (state, _store, id) = armed_state(30).await;
        let (entry, _) = arm(&state, id, 30).await;
        let mut updates = entry.subscribe();

        // A second operator start arms a second loop under a newer epoch.
        let epoch = entry.advance_epoch();
        tokio::spawn(run_decrement_loop(state.clone(), id, entry.clone(), epoch));
        settle().await;

        for _ in 0..3 {
            time::advance(TICK_PERIOD).await;
            settle().await;
        }

        let mut values = Vec::new();
        while let Ok(update) = updates.try_recv() {
            values.push(update.value);
        }
        assert_eq!(
            values,
            vec![29, 28, 27],
            "only the newest loop may tick; a doubled loop would halve the values"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retired_status_ends_the_loop_without_ticks() {
        let (state, store, id) = armed_state(30).await;
        let (entry, _) = arm(&state, id, 30).await;
        settle().await;

        time::advance(TICK_PERIOD).await;
        settle().await;

        // Operator pause: settle the machine and retire the loop epoch.
        {
            let mut machine = entry.machine().lock().await;
            machine.pause().unwrap();
            entry.advance_epoch();
        }

        let mut updates = entry.subscribe();
        for _ in 0..3 {
            time::advance(TICK_PERIOD).await;
            settle().await;
        }

        assert!(updates.try_recv().is_err(), "a paused clock must not tick");
        assert_eq!(entry.machine().lock().await.reading(), 29);
        let row = store.find_clock(id.match_id, id.kind).await.unwrap().unwrap();
        assert_eq!(row.value, 29);
    }

    #[tokio::test(start_paused = true)]
    async fn double_persistence_failure_parks_the_clock() {
        let (state, store, id) = armed_state(30).await;
        store.fail_next_writes(2);
        let (entry, _) = arm(&state, id, 30).await;
        let mut updates = entry.subscribe();
        settle().await;

        time::advance(TICK_PERIOD).await;
        settle().await;

        let update = updates.try_recv().unwrap();
        assert_eq!(update.value, 29);
        assert_eq!(update.status, ClockStatus::Paused);

        let machine = entry.machine().lock().await;
        assert_eq!(machine.status(), ClockStatus::Paused);
        drop(machine);

        // The loop is gone: further seconds produce nothing.
        for _ in 0..3 {
            time::advance(TICK_PERIOD).await;
            settle().await;
        }
        assert!(updates.try_recv().is_err());

        let row = store.find_clock(id.match_id, id.kind).await.unwrap().unwrap();
        assert_eq!(row.value, 30, "the failed tick must not reach storage");
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_cancels_the_loop_mid_count() {
        let (state, _store, id) = armed_state(30).await;
        let (entry, _) = arm(&state, id, 30).await;
        let mut updates = entry.subscribe();
        settle().await;

        time::advance(TICK_PERIOD).await;
        settle().await;
        assert_eq!(updates.try_recv().unwrap().value, 29);

        state.clocks().evict(&id);
        for _ in 0..3 {
            time::advance(TICK_PERIOD).await;
            settle().await;
        }
        assert!(updates.try_recv().is_err(), "an evicted clock must not tick");
    }
}
