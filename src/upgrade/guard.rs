//! Single-flight gate for channel-switch attempts.
//!
//! Only one attempt may write the executable at a time. A second request while one is
//! running is rejected immediately rather than queued.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::UpdateError;

/// Admits at most one holder at a time; clones share the same gate.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    gate: Arc<Mutex<()>>,
}

/// Proof of holding the gate. Dropping it lets the next attempt in.
#[derive(Debug)]
pub struct FlightPermit {
    _guard: OwnedMutexGuard<()>,
}

impl SingleFlight {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate without waiting.
    ///
    /// # Errors
    ///
    /// [`UpdateError::UpdateInProgress`] when another permit is alive.
    pub fn try_begin(&self) -> Result<FlightPermit, UpdateError> {
        self.gate
            .clone()
            .try_lock_owned()
            .map(|guard| FlightPermit { _guard: guard })
            .map_err(|_| UpdateError::UpdateInProgress)
    }

    /// Whether a permit is currently held.
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }
}
