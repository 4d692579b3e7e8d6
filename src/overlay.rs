//! Optimistic overlay over the device shadow.
//!
//! The cloud shadow lags behind a start command by a few seconds. Without the
//! overlay the sensor would flicker back to `ready` between the command being
//! sent and the appliance reporting `making_bottle`. The overlay also remembers
//! that a finished bottle is still sitting under the funnel, which the shadow
//! itself does not report.

use tracing::debug;

use crate::data::Shadow;
use crate::error::{Error, Result};
use crate::status::Status;

/// Locally held state layered on top of the shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverlayState {
    /// Nothing pending.
    #[default]
    Idle,
    /// A start command was issued and the shadow has not yet confirmed it.
    Requested,
    /// A bottle finished and has not been collected.
    FullBottleWaiting,
}

impl OverlayState {
    /// Check if a start command is awaiting confirmation.
    pub fn making_bottle_requested(&self) -> bool {
        matches!(self, Self::Requested)
    }

    /// Check if a finished bottle is waiting to be collected.
    pub fn full_bottle(&self) -> bool {
        matches!(self, Self::FullBottleWaiting)
    }

    /// Compute the next state from two consecutive shadows.
    ///
    /// Edges are applied in order: a rising `making_bottle` acknowledges the
    /// request, a falling `making_bottle` with the bottle still in place marks
    /// it full, and a rising `bottle_missing` clears everything.
    pub fn transition(self, old: &Shadow, new: &Shadow) -> OverlayState {
        let mut state = self;

        if !old.making_bottle && new.making_bottle && state.making_bottle_requested() {
            state = Self::Idle;
        }

        if old.making_bottle && !new.making_bottle && !new.bottle_missing {
            state = Self::FullBottleWaiting;
        }

        if !old.bottle_missing && new.bottle_missing {
            state = Self::Idle;
        }

        state
    }
}

/// Per-entity overlay tracker.
///
/// Holds the current [`OverlayState`] together with the last observed shadow
/// so consecutive updates can be compared.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    state: OverlayState,
    previous: Shadow,
}

impl Overlay {
    /// Start tracking from the shadow known when the entity is created.
    pub fn new(initial: &Shadow) -> Self {
        Self {
            state: OverlayState::Idle,
            previous: initial.clone(),
        }
    }

    /// Current overlay state.
    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Record that a start command is about to be sent.
    ///
    /// Only allowed while the appliance resolves to [`Status::Ready`].
    pub fn on_command_issued(&mut self, current: Status) -> Result<()> {
        if !current.is_ready() {
            return Err(Error::InvalidCommandState { status: current });
        }
        self.state = OverlayState::Requested;
        Ok(())
    }

    /// Withdraw a pending request after the command failed to send.
    ///
    /// Returns `true` if a request was pending.
    pub fn cancel_request(&mut self) -> bool {
        if self.state.making_bottle_requested() {
            self.state = OverlayState::Idle;
            return true;
        }
        false
    }

    /// Apply a new shadow and return the resulting state.
    pub fn observe(&mut self, new: &Shadow) -> OverlayState {
        let next = self.state.transition(&self.previous, new);
        if next != self.state {
            debug!("Overlay transition: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.previous = new.clone();
        next
    }
}
