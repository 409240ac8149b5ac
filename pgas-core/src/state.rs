#![forbid(unsafe_code)]

//! The complete per-path abstract state.
//!
//! Every store is a persistent map, so cloning a state for two branches is
//! O(1) and neither branch can observe the other's updates. All `with_*`
//! methods return a new state and leave `self` untouched.

use im::OrdSet;

use crate::interval::IntervalTracker;
use crate::lifecycle::RegionLifecycle;
use crate::position::PositionTracker;
use crate::sync::ValueSyncStore;
use crate::violation::ViolationKind;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbstractState {
    intervals: IntervalTracker,
    lifecycle: RegionLifecycle,
    values: ValueSyncStore,
    position: PositionTracker,
    reported: OrdSet<ViolationKind>,
}

impl AbstractState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intervals(&self) -> &IntervalTracker {
        &self.intervals
    }

    pub fn lifecycle(&self) -> &RegionLifecycle {
        &self.lifecycle
    }

    pub fn values(&self) -> &ValueSyncStore {
        &self.values
    }

    pub fn position(&self) -> PositionTracker {
        self.position
    }

    pub fn in_bracket(&self) -> bool {
        self.position.in_bracket()
    }

    /// Violation kinds already signalled on this path.
    pub fn reported(&self) -> &OrdSet<ViolationKind> {
        &self.reported
    }

    pub fn with_intervals(&self, intervals: IntervalTracker) -> Self {
        Self {
            intervals,
            ..self.clone()
        }
    }

    pub fn with_lifecycle(&self, lifecycle: RegionLifecycle) -> Self {
        Self {
            lifecycle,
            ..self.clone()
        }
    }

    pub fn with_values(&self, values: ValueSyncStore) -> Self {
        Self {
            values,
            ..self.clone()
        }
    }

    pub fn with_position(&self, position: PositionTracker) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    pub fn with_reported(&self, kind: ViolationKind) -> Self {
        Self {
            reported: self.reported.update(kind),
            ..self.clone()
        }
    }
}
