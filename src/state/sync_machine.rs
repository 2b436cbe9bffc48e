use serde::Serialize;
use thiserror::Error;

/// Phases of the synchronisation with the shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Nothing has been requested from the store yet.
    Uninitialized,
    /// The initial fetch (or create) is in flight.
    Loading,
    /// The local league mirrors the shared document.
    Synced,
    /// The last store operation failed.
    Error,
}

/// Events that can be applied to the sync state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Start the initial load.
    Start,
    /// The initial fetch or create succeeded.
    Loaded,
    /// A store operation failed, with a human readable reason.
    Failed(String),
    /// Try the initial load again after a failure.
    Retry,
    /// A store operation succeeded again after a failure.
    Recovered,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SyncPhase,
    /// The event that cannot be applied from this phase.
    pub event: SyncEvent,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    /// Current phase.
    pub phase: SyncPhase,
    /// Incremented on every transition.
    pub version: usize,
    /// Whether the league has been loaded at least once.
    pub loaded: bool,
    /// Reason of the last failure while in [`SyncPhase::Error`].
    pub last_error: Option<String>,
}

/// Sync phase plus the transition count and the last failure.
#[derive(Debug, Clone)]
pub struct SyncStateMachine {
    phase: SyncPhase,
    version: usize,
    loaded: bool,
    last_error: Option<String>,
}

impl Default for SyncStateMachine {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Uninitialized,
            version: 0,
            loaded: false,
            last_error: None,
        }
    }
}

impl SyncStateMachine {
    /// Machine in [`SyncPhase::Uninitialized`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Local commands are accepted once the league has been loaded.
    pub fn accepts_commands(&self) -> bool {
        self.loaded
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            phase: self.phase,
            version: self.version,
            loaded: self.loaded,
            last_error: self.last_error.clone(),
        }
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: SyncEvent) -> Result<SyncPhase, InvalidTransition> {
        let next = self.compute_transition(&event)?;

        match event {
            SyncEvent::Failed(reason) => self.last_error = Some(reason),
            SyncEvent::Loaded => {
                self.loaded = true;
                self.last_error = None;
            }
            _ => self.last_error = None,
        }
        self.phase = next;
        self.version += 1;

        Ok(next)
    }

    fn compute_transition(&self, event: &SyncEvent) -> Result<SyncPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SyncPhase::Uninitialized, SyncEvent::Start) => SyncPhase::Loading,
            (SyncPhase::Loading, SyncEvent::Loaded) => SyncPhase::Synced,
            (_, SyncEvent::Failed(_)) => SyncPhase::Error,
            (SyncPhase::Error, SyncEvent::Retry) if !self.loaded => SyncPhase::Loading,
            (SyncPhase::Error, SyncEvent::Recovered) if self.loaded => SyncPhase::Synced,
            (from, event) => {
                return Err(InvalidTransition {
                    from,
                    event: event.clone(),
                });
            }
        };

        Ok(next)
    }
}
