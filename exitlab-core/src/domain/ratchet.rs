/// Ratchet invariant enforcement
///
/// **Core Rule:** a protective stop may rise, never fall.
///
/// Trailing and break-even evaluators only *propose* stop levels; the ratchet
/// decides whether the proposal is accepted.
use serde::{Deserialize, Serialize};

/// Ratchet state for one position's stop price.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatchetState {
    current_level: Option<f64>,
}

impl RatchetState {
    /// Create a ratchet with no stop yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ratchet with an initial level
    pub fn with_initial_level(initial_level: f64) -> Self {
        Self {
            current_level: Some(initial_level),
        }
    }

    /// Apply the ratchet to a proposed stop level.
    ///
    /// Returns the new level if the proposal raised (or initialised) the stop,
    /// `None` when it was rejected as a loosening.
    ///
    /// # Example
    /// ```
    /// use exitlab_core::domain::RatchetState;
    ///
    /// let mut ratchet = RatchetState::with_initial_level(0.8);
    /// assert_eq!(ratchet.propose(1.0), Some(1.0));
    /// assert_eq!(ratchet.propose(0.9), None);
    /// assert_eq!(ratchet.current_level(), Some(1.0));
    /// ```
    pub fn propose(&mut self, proposed: f64) -> Option<f64> {
        if !proposed.is_finite() {
            return None;
        }
        match self.current_level {
            Some(current) if proposed <= current => None,
            _ => {
                self.current_level = Some(proposed);
                Some(proposed)
            }
        }
    }

    /// Get current ratchet level (if set)
    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }
}
