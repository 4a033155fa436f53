use std::sync::Arc;

use uuid::Uuid;

use crate::{
    dto::{
        clock::ClockSnapshot,
        match_view::{EventFeedSnapshot, MatchSnapshot, MatchViewResponse, StatsSnapshot},
        ws::{InitialLoadData, ServerMessage},
    },
    error::ServiceError,
    state::{
        SharedState,
        cache::{CacheKind, CachedView},
        clock::{ClockId, ClockKind},
    },
};

/// Match header, served from the cache and fetched from storage on a miss.
pub async fn match_snapshot(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Arc<MatchSnapshot>, ServiceError> {
    let view = state
        .cache()
        .get_or_fetch(CacheKind::Match, match_id, || async {
            let store = state.require_match_store().await?;
            let Some(entity) = store.find_match(match_id).await? else {
                return Err(ServiceError::NotFound(format!(
                    "match `{match_id}` not found"
                )));
            };
            Ok(CachedView::Match(Arc::new(MatchSnapshot::from(entity))))
        })
        .await?;
    unwrap_view(view.into_match())
}

/// Clock snapshot, preferring the live registry over the persisted row.
///
/// A registered clock serves its drift-corrected reading; ticks and control
/// operations invalidate this key, so a cached value is never more than one
/// committed mutation old. Only an unregistered clock falls back to storage.
pub async fn clock_snapshot(
    state: &SharedState,
    match_id: Uuid,
    kind: ClockKind,
) -> Result<Arc<ClockSnapshot>, ServiceError> {
    let view = state
        .cache()
        .get_or_fetch(CacheKind::for_clock(kind), match_id, || async {
            let id = ClockId::new(match_id, kind);
            if let Some(entry) = state.clocks().get(&id) {
                let machine = entry.machine().lock().await;
                return Ok(CachedView::Clock(Arc::new(ClockSnapshot {
                    match_id,
                    kind,
                    value: machine.reading(),
                    status: machine.status(),
                })));
            }

            let store = state.require_match_store().await?;
            let Some(row) = store.find_clock(match_id, kind).await? else {
                return Err(ServiceError::NotFound(format!(
                    "no {kind} for match `{match_id}`"
                )));
            };
            Ok(CachedView::Clock(Arc::new(ClockSnapshot::from(row))))
        })
        .await?;
    unwrap_view(view.into_clock())
}

/// Clock snapshot where "never armed" is an absence rather than an error.
pub async fn optional_clock_snapshot(
    state: &SharedState,
    match_id: Uuid,
    kind: ClockKind,
) -> Result<Option<Arc<ClockSnapshot>>, ServiceError> {
    match clock_snapshot(state, match_id, kind).await {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(ServiceError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Ordered event feed of a match. An empty feed is a valid cached value.
pub async fn event_feed(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Arc<EventFeedSnapshot>, ServiceError> {
    let view = state
        .cache()
        .get_or_fetch(CacheKind::Event, match_id, || async {
            let store = state.require_match_store().await?;
            let rows = store.list_events(match_id).await?;
            Ok(CachedView::Events(Arc::new(EventFeedSnapshot::from_rows(
                match_id, rows,
            ))))
        })
        .await?;
    unwrap_view(view.into_events())
}

/// Aggregated stat lines of a match.
pub async fn stats_snapshot(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Arc<StatsSnapshot>, ServiceError> {
    let view = state
        .cache()
        .get_or_fetch(CacheKind::Stats, match_id, || async {
            let store = state.require_match_store().await?;
            let rows = store.list_stat_lines(match_id).await?;
            Ok(CachedView::Stats(Arc::new(StatsSnapshot::from_rows(
                match_id, rows,
            ))))
        })
        .await?;
    unwrap_view(view.into_stats())
}

/// The composite read: header, both clocks, events and stats in one payload.
///
/// The header is mandatory; everything else degrades to empty or absent, so a
/// freshly created match renders before its first kickoff.
pub async fn match_view(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchViewResponse, ServiceError> {
    let header = match_snapshot(state, match_id).await?;
    let gameclock = optional_clock_snapshot(state, match_id, ClockKind::Game).await?;
    let playclock = optional_clock_snapshot(state, match_id, ClockKind::Play).await?;
    let events = event_feed(state, match_id).await?;
    let stats = stats_snapshot(state, match_id).await?;

    Ok(MatchViewResponse {
        match_view: (*header).clone(),
        gameclock: gameclock.map(|snapshot| *snapshot),
        playclock: playclock.map(|snapshot| *snapshot),
        events: events.events.clone(),
        stats: stats.lines.clone(),
    })
}

/// Connect-time burst for a fresh WebSocket session.
///
/// Fails when the match does not exist; the socket is closed instead of
/// subscribing a viewer to nothing.
pub async fn initial_load(
    state: &SharedState,
    match_id: Uuid,
) -> Result<ServerMessage, ServiceError> {
    let header = match_snapshot(state, match_id).await?;
    let gameclock = optional_clock_snapshot(state, match_id, ClockKind::Game).await?;
    let playclock = optional_clock_snapshot(state, match_id, ClockKind::Play).await?;

    Ok(ServerMessage::InitialLoad(InitialLoadData {
        match_view: (*header).clone(),
        gameclock: gameclock.map(|snapshot| *snapshot),
        playclock: playclock.map(|snapshot| *snapshot),
    }))
}

fn unwrap_view<T>(view: Option<T>) -> Result<T, ServiceError> {
    view.ok_or_else(|| ServiceError::InvalidState("cache slot held an unexpected view".into()))
}
