use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which of the two countdown clocks of a match a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ClockKind {
    /// Quarter clock counting down the remaining playing time of a period.
    #[serde(rename = "gameclock")]
    Game,
    /// Play clock counting down the seconds the offense has left to snap.
    #[serde(rename = "playclock")]
    Play,
}

impl ClockKind {
    /// Wire name of the clock kind, also used as cache and channel suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockKind::Game => "gameclock",
            ClockKind::Play => "playclock",
        }
    }

    /// The match's other clock.
    pub fn sibling(self) -> Self {
        match self {
            ClockKind::Game => ClockKind::Play,
            ClockKind::Play => ClockKind::Game,
        }
    }
}

impl fmt::Display for ClockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states of a countdown clock.
///
/// `Stopping` is transient: it is only ever observed in the update stream
/// while a running clock is being halted by a reset or teardown, never as a
/// resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClockStatus {
    /// Not counting, either never started or expired.
    Stopped,
    /// Counting down once per second.
    Running,
    /// Halted mid-count, value frozen.
    Paused,
    /// A running clock caught mid-halt, about to settle into a final state.
    Stopping,
}

impl ClockStatus {
    /// Wire name of the status, matching its serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockStatus::Stopped => "stopped",
            ClockStatus::Running => "running",
            ClockStatus::Paused => "paused",
            ClockStatus::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ClockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide identity of one clock: the match it belongs to plus its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockId {
    /// Match the clock belongs to.
    pub match_id: Uuid,
    /// Game or play clock.
    pub kind: ClockKind,
}

impl ClockId {
    /// Build an id from its parts.
    pub fn new(match_id: Uuid, kind: ClockKind) -> Self {
        Self { match_id, kind }
    }

    /// Id of the match's other clock.
    pub fn sibling(self) -> Self {
        Self::new(self.match_id, self.kind.sibling())
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.match_id, self.kind)
    }
}

/// Rejected clock transition, e.g. pausing a clock that is not running.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("clock cannot `{action}` while `{from:?}`")]
pub struct InvalidTransition {
    /// Status the clock was in when the action was attempted.
    pub from: ClockStatus,
    /// The attempted action.
    pub action: &'static str,
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The clock moved to [`ClockStatus::Running`]; a decrement loop must be armed.
    Started,
    /// The clock was already running; nothing changed.
    AlreadyRunning,
}

/// Result of one decrement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Decremented by one second, new value carried along.
    Ticked(u64),
    /// The clock hit zero and settled into [`ClockStatus::Stopped`].
    Expired,
    /// The clock is no longer running; the decrement loop must exit.
    NotRunning,
}

/// In-memory countdown state for a single clock.
///
/// The machine holds the value as of the last start or tick together with a
/// monotonic anchor of when that value became current. Readings subtract the
/// whole seconds elapsed since the anchor, so a consistent value comes back
/// even when the decrement loop is late.
#[derive(Debug, Clone)]
pub struct ClockStateMachine {
    kind: ClockKind,
    value: u64,
    max_value: Option<u64>,
    status: ClockStatus,
    started_at: Option<Instant>,
}

impl ClockStateMachine {
    /// Create a stopped clock at the given value.
    pub fn new(kind: ClockKind, value: u64, max_value: Option<u64>) -> Self {
        Self {
            kind,
            value: clamp(value, max_value),
            max_value,
            status: ClockStatus::Stopped,
            started_at: None,
        }
    }

    /// Rebuild a clock from its persisted row.
    ///
    /// A freshly loaded machine is never running: no decrement loop exists for
    /// it yet, so a row persisted mid-count comes back as paused at the last
    /// persisted value and resumes only through [`ClockStateMachine::start`].
    pub fn from_persisted(
        kind: ClockKind,
        value: u64,
        max_value: Option<u64>,
        status: ClockStatus,
    ) -> Self {
        let status = match status {
            ClockStatus::Running | ClockStatus::Stopping => ClockStatus::Paused,
            other => other,
        };
        Self {
            kind,
            value: clamp(value, max_value),
            max_value,
            status,
            started_at: None,
        }
    }

    /// Game or play clock.
    pub fn kind(&self) -> ClockKind {
        self.kind
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ClockStatus {
        self.status
    }

    /// Remaining seconds, corrected for time elapsed since the last tick.
    pub fn reading(&self) -> u64 {
        match (self.status, self.started_at) {
            (ClockStatus::Running, Some(anchor)) => {
                let elapsed = Instant::now().duration_since(anchor).as_secs();
                self.value.saturating_sub(elapsed)
            }
            _ => self.value,
        }
    }

    /// Begin counting down.
    ///
    /// Starting a running clock is benign and reported as
    /// [`StartOutcome::AlreadyRunning`] without touching the anchor.
    pub fn start(&mut self) -> Result<StartOutcome, InvalidTransition> {
        match self.status {
            ClockStatus::Running => Ok(StartOutcome::AlreadyRunning),
            ClockStatus::Stopped | ClockStatus::Paused => {
                self.status = ClockStatus::Running;
                self.started_at = Some(Instant::now());
                Ok(StartOutcome::Started)
            }
            ClockStatus::Stopping => Err(InvalidTransition {
                from: self.status,
                action: "start",
            }),
        }
    }

    /// Freeze a running clock, settling the value against the anchor.
    pub fn pause(&mut self) -> Result<u64, InvalidTransition> {
        match self.status {
            ClockStatus::Running => {
                self.value = self.reading();
                self.status = ClockStatus::Paused;
                self.started_at = None;
                Ok(self.value)
            }
            from => Err(InvalidTransition {
                from,
                action: "pause",
            }),
        }
    }

    /// Halt a running clock into the transient [`ClockStatus::Stopping`] state.
    ///
    /// Callers announce the stopping value and then finish the halt with
    /// [`ClockStateMachine::reset`].
    pub fn begin_stop(&mut self) -> Result<u64, InvalidTransition> {
        match self.status {
            ClockStatus::Running => {
                self.value = self.reading();
                self.status = ClockStatus::Stopping;
                self.started_at = None;
                Ok(self.value)
            }
            from => Err(InvalidTransition {
                from,
                action: "stop",
            }),
        }
    }

    /// Force the clock to a value and status. Always legal.
    ///
    /// The anchor is re-armed only when the target status is running, so a
    /// reset into running behaves like a fresh start at the given value.
    pub fn reset(&mut self, value: u64, status: ClockStatus) {
        self.value = clamp(value, self.max_value);
        self.status = status;
        self.started_at = if status == ClockStatus::Running {
            Some(Instant::now())
        } else {
            None
        };
    }

    /// Advance the countdown by one second.
    ///
    /// Re-anchors on every successful step; once the value reaches zero the
    /// clock settles into [`ClockStatus::Stopped`] and reports
    /// [`TickOutcome::Expired`].
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != ClockStatus::Running {
            return TickOutcome::NotRunning;
        }
        if self.value <= 1 {
            self.value = 0;
            self.status = ClockStatus::Stopped;
            self.started_at = None;
            return TickOutcome::Expired;
        }
        self.value -= 1;
        self.started_at = Some(Instant::now());
        TickOutcome::Ticked(self.value)
    }
}

fn clamp(value: u64, max_value: Option<u64>) -> u64 {
    match max_value {
        Some(ceiling) => value.min(ceiling),
        None => value,
    }
}
