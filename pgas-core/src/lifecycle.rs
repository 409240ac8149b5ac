#![forbid(unsafe_code)]

use im::{OrdMap, OrdSet};

use crate::region::{Location, RegionId};

/// Where a region is in its allocate/free cycle.
///
/// A region has at most one record, so it can never be both active and freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Tracked as symmetric without an allocation call (global/static storage).
    Symmetric,
    /// In the active-allocations set.
    Allocated { site: Location },
    /// Explicitly freed.
    Freed { site: Location, freed_at: Location },
}

/// Returned by [`RegionLifecycle::free`] when the region is not an active allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotActive {
    pub region: RegionId,
    /// Where the previous free happened, if the region was freed before.
    pub freed_at: Option<Location>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionLifecycle {
    records: OrdMap<RegionId, Lifecycle>,
    uninitialized: OrdSet<RegionId>,
}

impl RegionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, region: RegionId) -> Option<Lifecycle> {
        self.records.get(&region).copied()
    }

    /// Begins tracking `region` as symmetric. Idempotent; never overrides an
    /// allocation or free record.
    pub fn register_symmetric(&self, region: RegionId) -> Self {
        if self.records.contains_key(&region) {
            return self.clone();
        }
        Self {
            records: self.records.update(region, Lifecycle::Symmetric),
            uninitialized: self.uninitialized.clone(),
        }
    }

    /// Records `region` as active. Double allocation is the caller's to detect.
    pub fn allocate(&self, region: RegionId, site: Location) -> Self {
        Self {
            records: self.records.update(region, Lifecycle::Allocated { site }),
            uninitialized: self.uninitialized.clone(),
        }
    }

    /// Moves `region` from the active set to the freed set.
    pub fn free(&self, region: RegionId, at: Location) -> Result<Self, NotActive> {
        match self.get(region) {
            Some(Lifecycle::Allocated { site }) => Ok(Self {
                records: self.records.update(region, Lifecycle::Freed { site, freed_at: at }),
                uninitialized: self.uninitialized.without(&region),
            }),
            Some(Lifecycle::Freed { freed_at, .. }) => Err(NotActive {
                region,
                freed_at: Some(freed_at),
            }),
            Some(Lifecycle::Symmetric) | None => Err(NotActive {
                region,
                freed_at: None,
            }),
        }
    }

    pub fn is_tracked(&self, region: RegionId) -> bool {
        self.records.contains_key(&region)
    }

    pub fn is_active(&self, region: RegionId) -> bool {
        matches!(self.get(region), Some(Lifecycle::Allocated { .. }))
    }

    pub fn is_freed(&self, region: RegionId) -> bool {
        matches!(self.get(region), Some(Lifecycle::Freed { .. }))
    }

    pub fn is_symmetric(&self, region: RegionId) -> bool {
        matches!(
            self.get(region),
            Some(Lifecycle::Symmetric | Lifecycle::Allocated { .. })
        )
    }

    pub fn any_active(&self) -> bool {
        self.active().next().is_some()
    }

    /// Outstanding allocations in region order.
    pub fn active(&self) -> impl Iterator<Item = (RegionId, Location)> + '_ {
        self.records.iter().filter_map(|(id, rec)| match rec {
            Lifecycle::Allocated { site } => Some((*id, *site)),
            _ => None,
        })
    }

    /// The outstanding allocation with the smallest region id.
    pub fn first_active_site(&self) -> Option<(RegionId, Location)> {
        self.active().next()
    }

    pub fn mark_uninitialized(&self, region: RegionId) -> Self {
        Self {
            records: self.records.clone(),
            uninitialized: self.uninitialized.update(region),
        }
    }

    pub fn mark_initialized(&self, region: RegionId) -> Self {
        if !self.uninitialized.contains(&region) {
            return self.clone();
        }
        Self {
            records: self.records.clone(),
            uninitialized: self.uninitialized.without(&region),
        }
    }

    pub fn is_uninitialized(&self, region: RegionId) -> bool {
        self.uninitialized.contains(&region)
    }
}
