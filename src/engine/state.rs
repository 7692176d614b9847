//! Process-wide engine running state shared between the relay and the idle pump.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Stopped,
    Running,
}

impl EngineState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => EngineState::Running,
            _ => EngineState::Stopped,
        }
    }

    fn as_raw(self) -> u8 {
        match self {
            EngineState::Stopped => 0,
            EngineState::Running => 1,
        }
    }
}

/// Atomic cell holding the current [`EngineState`].
///
/// Anyone may read it; only the callback relay writes it.
#[derive(Debug)]
pub struct EngineStateCell {
    raw: AtomicU8,
}

impl EngineStateCell {
    pub fn new() -> Self {
        Self {
            raw: AtomicU8::new(EngineState::Stopped.as_raw()),
        }
    }

    pub fn get(&self) -> EngineState {
        EngineState::from_raw(self.raw.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.get() == EngineState::Running
    }

    /// Store `next` and return the previous state.
    pub(crate) fn transition(&self, next: EngineState) -> EngineState {
        EngineState::from_raw(self.raw.swap(next.as_raw(), Ordering::AcqRel))
    }
}

impl Default for EngineStateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let cell = EngineStateCell::new();
        assert_eq!(cell.get(), EngineState::Stopped);
        assert!(!cell.is_running());
    }

    #[test]
    fn transition_returns_previous_state() {
        let cell = EngineStateCell::new();
        assert_eq!(cell.transition(EngineState::Running), EngineState::Stopped);
        assert_eq!(cell.transition(EngineState::Running), EngineState::Running);
        assert_eq!(cell.transition(EngineState::Stopped), EngineState::Running);
        assert!(!cell.is_running());
    }
}
