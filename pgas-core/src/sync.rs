#![forbid(unsafe_code)]

use im::OrdMap;

use crate::region::ValueId;

/// Whether a value the program holds was read after proper synchronization.
///
/// `Unknown` means the value was never recorded; callers treat it as "not a
/// symmetric value", not as either of the other two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Synchronized,
    Unsynchronized,
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueSyncStore {
    values: OrdMap<ValueId, bool>,
}

impl ValueSyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unsynchronized(&self, value: ValueId) -> Self {
        Self {
            values: self.values.update(value, false),
        }
    }

    pub fn mark_synchronized(&self, value: ValueId) -> Self {
        Self {
            values: self.values.update(value, true),
        }
    }

    pub fn status(&self, value: ValueId) -> SyncStatus {
        match self.values.get(&value) {
            Some(true) => SyncStatus::Synchronized,
            Some(false) => SyncStatus::Unsynchronized,
            None => SyncStatus::Unknown,
        }
    }

    /// Flips every unsynchronized value to synchronized (a barrier).
    pub fn synchronize_all(&self) -> Self {
        if self.values.values().all(|synced| *synced) {
            return self.clone();
        }
        Self {
            values: self.values.keys().map(|id| (*id, true)).collect(),
        }
    }

    pub fn unsynchronized(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.values
            .iter()
            .filter(|(_, synced)| !**synced)
            .map(|(id, _)| *id)
    }
}
