use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{match_store::MatchStore, models::ClockEntity},
    dto::clock::{ClockActionOutcome, ClockActionResponse, ClockSnapshot, ResetClockRequest},
    error::ServiceError,
    services::{broadcast_events, scheduler},
    state::{
        SharedState,
        cache::CacheKind,
        clock::{ClockId, ClockKind, ClockStateMachine, ClockStatus, StartOutcome},
        registry::{ClockEntry, ClockUpdate},
    },
};

/// Arm the countdown for a clock, creating its persisted row on first use.
///
/// Starting a clock that is already counting is benign: the request reports
/// `already-running` and neither the value nor the anchor move.
pub async fn start_clock(
    state: &SharedState,
    match_id: Uuid,
    kind: ClockKind,
) -> Result<ClockActionResponse, ServiceError> {
    let id = ClockId::new(match_id, kind);
    let (entry, mut machine) = lock_or_create(state, id).await?;
    let prev = machine.clone();

    if machine.start()? == StartOutcome::AlreadyRunning {
        return Ok(response(
            ClockActionOutcome::AlreadyRunning,
            id,
            machine.reading(),
            machine.status(),
        ));
    }

    let value = machine.reading();
    if let Err(err) = persist(state, id, value, ClockStatus::Running).await {
        *machine = prev;
        return Err(err);
    }

    commit(state, &entry, id, value, ClockStatus::Running);
    let epoch = entry.advance_epoch();
    tokio::spawn(scheduler::run_decrement_loop(
        state.clone(),
        id,
        entry.clone(),
        epoch,
    ));
    info!(clock = %id, value, "clock started");

    Ok(response(
        ClockActionOutcome::Started,
        id,
        value,
        ClockStatus::Running,
    ))
}

/// Freeze a running clock at its drift-corrected value.
pub async fn pause_clock(
    state: &SharedState,
    match_id: Uuid,
    kind: ClockKind,
) -> Result<ClockActionResponse, ServiceError> {
    let id = ClockId::new(match_id, kind);
    let (entry, mut machine) = lock_registered(state, id).await?;
    let prev = machine.clone();

    let value = machine.pause()?;
    if let Err(err) = persist(state, id, value, ClockStatus::Paused).await {
        *machine = prev;
        return Err(err);
    }

    commit(state, &entry, id, value, ClockStatus::Paused);
    entry.advance_epoch();
    info!(clock = %id, value, "clock paused");

    Ok(response(
        ClockActionOutcome::Paused,
        id,
        value,
        ClockStatus::Paused,
    ))
}

/// Force a clock to an operator-chosen value and status.
///
/// A clock caught running first settles through the transient stopping state,
/// so watchers see an explicit halt before the value jumps. A reset into
/// running re-arms the countdown at the new value.
pub async fn reset_clock(
    state: &SharedState,
    match_id: Uuid,
    kind: ClockKind,
    request: ResetClockRequest,
) -> Result<ClockActionResponse, ServiceError> {
    if request.status == ClockStatus::Stopping {
        return Err(ServiceError::InvalidInput(
            "stopping is transient and cannot be a reset target".into(),
        ));
    }

    let id = ClockId::new(match_id, kind);
    let (entry, mut machine) = lock_registered(state, id).await?;
    let prev = machine.clone();

    if machine.status() == ClockStatus::Running {
        let settled = machine.begin_stop()?;
        if let Err(err) = persist(state, id, settled, ClockStatus::Stopping).await {
            *machine = prev;
            return Err(err);
        }
        commit(state, &entry, id, settled, ClockStatus::Stopping);
    }

    machine.reset(request.value, request.status);
    let value = machine.reading();
    if let Err(err) = persist(state, id, value, request.status).await {
        // The still-armed loop overwrites the stopping row on its next tick.
        *machine = prev;
        return Err(err);
    }

    commit(state, &entry, id, value, request.status);
    let epoch = entry.advance_epoch();
    if request.status == ClockStatus::Running {
        tokio::spawn(scheduler::run_decrement_loop(
            state.clone(),
            id,
            entry.clone(),
            epoch,
        ));
    }
    info!(clock = %id, value, status = %request.status, "clock reset");

    Ok(response(ClockActionOutcome::Reset, id, value, request.status))
}

/// Tear a clock down for good: settle it, persist the final stopped row and
/// evict it from the registry so no loop or queue outlives the match.
pub async fn end_clock(
    state: &SharedState,
    match_id: Uuid,
    kind: ClockKind,
) -> Result<ClockActionResponse, ServiceError> {
    let id = ClockId::new(match_id, kind);
    let (entry, mut machine) = lock_registered(state, id).await?;
    let prev = machine.clone();

    if machine.status() == ClockStatus::Running {
        let settled = machine.begin_stop()?;
        if let Err(err) = persist(state, id, settled, ClockStatus::Stopping).await {
            *machine = prev;
            return Err(err);
        }
        commit(state, &entry, id, settled, ClockStatus::Stopping);
    }

    let value = machine.reading();
    machine.reset(value, ClockStatus::Stopped);
    if let Err(err) = persist(state, id, value, ClockStatus::Stopped).await {
        *machine = prev;
        return Err(err);
    }

    commit(state, &entry, id, value, ClockStatus::Stopped);
    drop(machine);
    state.clocks().evict(&id);
    if state.clocks().get(&id.sibling()).is_none() {
        // The match's last clock is gone; its cache slots go with it.
        state.cache().purge_match(id.match_id);
    }
    info!(clock = %id, value, "clock ended and evicted");

    Ok(response(
        ClockActionOutcome::Ended,
        id,
        value,
        ClockStatus::Stopped,
    ))
}

/// Entry and machine lock for `id`, creating the clock on first use.
async fn lock_or_create(
    state: &SharedState,
    id: ClockId,
) -> Result<(Arc<ClockEntry>, OwnedMutexGuard<ClockStateMachine>), ServiceError> {
    loop {
        let entry = register_or_create(state, id).await?;
        if let Some(locked) = lock_if_live(entry).await {
            return Ok(locked);
        }
    }
}

/// Entry and machine lock for `id` when the clock must already exist.
async fn lock_registered(
    state: &SharedState,
    id: ClockId,
) -> Result<(Arc<ClockEntry>, OwnedMutexGuard<ClockStateMachine>), ServiceError> {
    loop {
        let entry = lookup_registered(state, id).await?;
        if let Some(locked) = lock_if_live(entry).await {
            return Ok(locked);
        }
    }
}

/// Take the machine lock, rejecting an entry evicted while this caller queued
/// on it. A lock landing on a cancelled entry would drive a clock the
/// registry no longer owns; the caller refetches and locks the replacement,
/// re-registered from the persisted row.
async fn lock_if_live(
    entry: Arc<ClockEntry>,
) -> Option<(Arc<ClockEntry>, OwnedMutexGuard<ClockStateMachine>)> {
    let machine = entry.machine().clone().lock_owned().await;
    if entry.cancel_token().is_cancelled() {
        return None;
    }
    Some((entry, machine))
}

/// Registry entry for `id`, creating the persisted row when this is the first
/// start for the clock. The row is created once per match and only ever
/// updated afterwards, so a concurrent creation race settles on the winner.
async fn register_or_create(
    state: &SharedState,
    id: ClockId,
) -> Result<Arc<ClockEntry>, ServiceError> {
    if let Some(entry) = state.clocks().get(&id) {
        return Ok(entry);
    }

    let store = state.require_match_store().await?;
    ensure_match_exists(&store, id.match_id).await?;

    let default_value = state.config().clock_seconds(id.kind);
    let row = match store.find_clock(id.match_id, id.kind).await? {
        Some(row) => row,
        None => {
            let fresh = ClockEntity::new(id.match_id, id.kind, default_value, ClockStatus::Stopped);
            match store.save_clock(fresh.clone()).await {
                Ok(()) => fresh,
                // Lost a concurrent create; the winner's row is authoritative.
                Err(err) => match store.find_clock(id.match_id, id.kind).await? {
                    Some(row) => row,
                    None => return Err(err.into()),
                },
            }
        }
    };

    Ok(register(state, id, row, default_value))
}

/// Registry entry for `id` when the clock must already exist in storage.
async fn lookup_registered(
    state: &SharedState,
    id: ClockId,
) -> Result<Arc<ClockEntry>, ServiceError> {
    if let Some(entry) = state.clocks().get(&id) {
        return Ok(entry);
    }

    let store = state.require_match_store().await?;
    let Some(row) = store.find_clock(id.match_id, id.kind).await? else {
        return Err(ServiceError::NotFound(format!(
            "no {} for match `{}`",
            id.kind, id.match_id
        )));
    };

    let max_value = state.config().clock_seconds(id.kind);
    Ok(register(state, id, row, max_value))
}

fn register(state: &SharedState, id: ClockId, row: ClockEntity, max_value: u64) -> Arc<ClockEntry> {
    let (entry, created) = state.clocks().register_with(id, || {
        ClockStateMachine::from_persisted(id.kind, row.value, Some(max_value), row.status)
    });
    if created {
        if let Some(queue) = entry.take_dispatcher_queue() {
            tokio::spawn(broadcast_events::run_update_dispatcher(
                state.clone(),
                id,
                queue,
            ));
        }
    }
    entry
}

async fn ensure_match_exists(
    store: &Arc<dyn MatchStore>,
    match_id: Uuid,
) -> Result<(), ServiceError> {
    if store.find_match(match_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!(
            "match `{match_id}` not found"
        )));
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

/// Make a persisted mutation visible: drop the stale snapshot, then hand the
/// update to the clock's dispatcher.
fn commit(state: &SharedState, entry: &ClockEntry, id: ClockId, value: u64, status: ClockStatus) {
    state
        .cache()
        .invalidate(CacheKind::for_clock(id.kind), id.match_id);
    entry.push_update(ClockUpdate { id, value, status });
}

fn response(
    outcome: ClockActionOutcome,
    id: ClockId,
    value: u64,
    status: ClockStatus,
) -> ClockActionResponse {
    ClockActionResponse {
        outcome,
        clock: ClockSnapshot {
            match_id: id.match_id,
            kind: id.kind,
            value,
            status,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::MemoryMatchStore,
        state::AppState,
    };

    async fn state_with_match() -> (SharedState, MemoryMatchStore, Uuid) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryMatchStore::new();
        let match_id = Uuid::new_v4();
        store
            .seed_match(MemoryMatchStore::sample_match(match_id))
            .await;
        state
            .install_match_store(Arc::new(store.clone()))
            .await;
        (state, store, match_id)
    }

    async fn seed_clock(store: &MemoryMatchStore, match_id: Uuid, value: u64, status: ClockStatus) {
        store
            .save_clock(ClockEntity::new(match_id, ClockKind::Game, value, status))
            .await
            .unwrap();
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_wait_pause_reset_scenario() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 5, ClockStatus::Stopped).await;

        let started = start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        assert_eq!(started.outcome, ClockActionOutcome::Started);
        assert_eq!(started.clock.value, 5);
        assert_eq!(started.clock.status, ClockStatus::Running);

        // Let the freshly armed loop set its tick baseline before advancing.
        settle().await;
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }

        let paused = pause_clock(&state, match_id, ClockKind::Game).await.unwrap();
        assert_eq!(paused.outcome, ClockActionOutcome::Paused);
        assert_eq!(paused.clock.value, 3);

        // A paused clock reads the same value no matter how long we wait.
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        let id = ClockId::new(match_id, ClockKind::Game);
        let entry = state.clocks().get(&id).unwrap();
        assert_eq!(entry.machine().lock().await.reading(), 3);

        let reset = reset_clock(
            &state,
            match_id,
            ClockKind::Game,
            ResetClockRequest {
                value: 10,
                status: ClockStatus::Stopped,
            },
        )
        .await
        .unwrap();
        assert_eq!(reset.clock.value, 10);
        assert_eq!(reset.clock.status, ClockStatus::Stopped);

        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.value, 10);
        assert_eq!(row.status, ClockStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let (state, _store, match_id) = state_with_match().await;

        let first = start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        assert_eq!(first.outcome, ClockActionOutcome::Started);

        let second = start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        assert_eq!(second.outcome, ClockActionOutcome::AlreadyRunning);
        assert_eq!(second.clock.value, first.clock.value);
        assert_eq!(second.clock.status, ClockStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn first_start_creates_the_row_once() {
        let (state, store, match_id) = state_with_match().await;

        start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.value, state.config().clock_seconds(ClockKind::Game));
        let row_id = row.id;

        pause_clock(&state, match_id, ClockKind::Game).await.unwrap();
        start_clock(&state, match_id, ClockKind::Game).await.unwrap();

        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.id, row_id, "restart must update the row, not recreate it");
    }

    #[tokio::test]
    async fn start_rejects_an_unknown_match() {
        let state = AppState::new(AppConfig::default());
        state
            .install_match_store(Arc::new(MemoryMatchStore::new()))
            .await;

        let err = start_clock(&state, Uuid::new_v4(), ClockKind::Game)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn controls_require_an_existing_clock_row() {
        let (state, _store, match_id) = state_with_match().await;

        let err = pause_clock(&state, match_id, ClockKind::Play)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = end_clock(&state, match_id, ClockKind::Play)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn reset_rejects_a_stopping_target() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 5, ClockStatus::Paused).await;

        let err = reset_clock(
            &state,
            match_id,
            ClockKind::Game,
            ResetClockRequest {
                value: 5,
                status: ClockStatus::Stopping,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn pause_requires_a_running_clock() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 5, ClockStatus::Stopped).await;

        let err = pause_clock(&state, match_id, ClockKind::Game)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_of_a_running_clock_passes_through_stopping() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 60, ClockStatus::Stopped).await;

        start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        settle().await;
        let id = ClockId::new(match_id, ClockKind::Game);
        let entry = state.clocks().get(&id).unwrap();
        let mut updates = entry.subscribe();

        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        // Drain the two tick updates.
        assert_eq!(updates.try_recv().unwrap().value, 59);
        assert_eq!(updates.try_recv().unwrap().value, 58);

        reset_clock(
            &state,
            match_id,
            ClockKind::Game,
            ResetClockRequest {
                value: 12,
                status: ClockStatus::Paused,
            },
        )
        .await
        .unwrap();

        let halt = updates.try_recv().unwrap();
        assert_eq!(halt.status, ClockStatus::Stopping);
        assert_eq!(halt.value, 58);
        let settled = updates.try_recv().unwrap();
        assert_eq!(settled.status, ClockStatus::Paused);
        assert_eq!(settled.value, 12);

        // The old loop is retired: no further ticks arrive.
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        assert!(updates.try_recv().is_err());

        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((row.value, row.status), (12, ClockStatus::Paused));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_into_running_rearms_the_countdown() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 60, ClockStatus::Paused).await;

        let reset = reset_clock(
            &state,
            match_id,
            ClockKind::Game,
            ResetClockRequest {
                value: 25,
                status: ClockStatus::Running,
            },
        )
        .await
        .unwrap();
        assert_eq!(reset.clock.status, ClockStatus::Running);
        settle().await;

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;

        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((row.value, row.status), (24, ClockStatus::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_fans_out_identically_to_every_viewer() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 30, ClockStatus::Stopped).await;

        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        state.connections().connect(match_id, "console".into(), tx_a);
        state.connections().connect(match_id, "scoreboard".into(), tx_b);

        start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        settle().await;
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        pause_clock(&state, match_id, ClockKind::Game).await.unwrap();
        settle().await;

        let drain = |rx: &mut tokio::sync::mpsc::UnboundedReceiver<_>| {
            let mut frames = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                match frame {
                    axum::extract::ws::Message::Text(text) => frames.push(text.to_string()),
                    other => panic!("expected a text frame, got {other:?}"),
                }
            }
            frames
        };
        let frames_a = drain(&mut rx_a);
        let frames_b = drain(&mut rx_b);

        assert_eq!(frames_a, frames_b, "both viewers see the same stream");
        let last = frames_a.last().unwrap();
        assert!(last.contains("\"gameclock-update\""));
        assert!(last.contains("\"status\":\"paused\""));
        assert!(last.contains("\"value\":28"));
    }

    #[tokio::test(start_paused = true)]
    async fn end_clock_leaves_no_trace_in_the_registry() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 60, ClockStatus::Stopped).await;

        start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        settle().await;
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }

        let ended = end_clock(&state, match_id, ClockKind::Game).await.unwrap();
        assert_eq!(ended.outcome, ClockActionOutcome::Ended);
        assert_eq!(ended.clock.value, 58);
        assert_eq!(ended.clock.status, ClockStatus::Stopped);

        let id = ClockId::new(match_id, ClockKind::Game);
        assert!(state.clocks().get(&id).is_none());
        assert!(state.clocks().is_empty());

        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((row.value, row.status), (58, ClockStatus::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn start_racing_an_end_lands_on_a_fresh_clock() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 60, ClockStatus::Stopped).await;
        start_clock(&state, match_id, ClockKind::Game).await.unwrap();

        // Hold the machine lock so end and restart queue on it in order, both
        // holding the same soon-to-be-evicted entry.
        let id = ClockId::new(match_id, ClockKind::Game);
        let entry = state.clocks().get(&id).unwrap();
        let gate = entry.machine().clone().lock_owned().await;

        let ending = tokio::spawn({
            let state = state.clone();
            async move { end_clock(&state, match_id, ClockKind::Game).await }
        });
        settle().await;
        let restarting = tokio::spawn({
            let state = state.clone();
            async move { start_clock(&state, match_id, ClockKind::Game).await }
        });
        settle().await;
        drop(gate);

        let ended = ending.await.unwrap().unwrap();
        assert_eq!(ended.outcome, ClockActionOutcome::Ended);
        let restarted = restarting.await.unwrap().unwrap();
        assert_eq!(restarted.outcome, ClockActionOutcome::Started);

        // The restart must land on a fresh registration rather than the entry
        // the end evicted, and its countdown must actually be live.
        let entry = state.clocks().get(&id).expect("restart re-registers");
        assert!(!entry.cancel_token().is_cancelled());
        settle().await;
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((row.value, row.status), (58, ClockStatus::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn match_cache_is_released_with_its_last_clock() {
        let (state, _store, match_id) = state_with_match().await;

        start_clock(&state, match_id, ClockKind::Game).await.unwrap();
        start_clock(&state, match_id, ClockKind::Play).await.unwrap();
        assert!(!state.cache().is_empty(), "commits leave tombstoned slots");

        end_clock(&state, match_id, ClockKind::Game).await.unwrap();
        assert!(
            !state.cache().is_empty(),
            "the play clock still owns its slots"
        );

        end_clock(&state, match_id, ClockKind::Play).await.unwrap();
        assert!(state.clocks().is_empty());
        assert!(state.cache().is_empty(), "teardown drops the match's slots");
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_persist_rolls_the_machine_back() {
        let (state, store, match_id) = state_with_match().await;
        seed_clock(&store, match_id, 20, ClockStatus::Stopped).await;

        store.fail_next_writes(1);
        let err = start_clock(&state, match_id, ClockKind::Game)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));

        let id = ClockId::new(match_id, ClockKind::Game);
        let entry = state.clocks().get(&id).unwrap();
        let machine = entry.machine().lock().await;
        assert_eq!(machine.status(), ClockStatus::Stopped);
        assert_eq!(machine.reading(), 20);
        drop(machine);

        let row = store
            .find_clock(match_id, ClockKind::Game)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((row.value, row.status), (20, ClockStatus::Stopped));

        // No loop was armed for the failed start.
        let mut updates = entry.subscribe();
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn operations_fail_cleanly_when_degraded() {
        let state = AppState::new(AppConfig::default());
        let err = start_clock(&state, Uuid::new_v4(), ClockKind::Game)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }
}
