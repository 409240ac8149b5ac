#![forbid(unsafe_code)]

//! Per-region, per-peer marks of byte ranges written without an intervening
//! barrier.
//!
//! Marks are never merged: a list may hold duplicates or ranges covered by
//! other entries, and the overlap query stays correct because it tests every
//! entry.

use std::fmt;

use im::{OrdMap, Vector};
use pgas_sym::{ConstraintSolver, SymVal};

use crate::region::RegionId;

/// `[start, start + len - 1]` over a symbolic index domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: SymVal,
    pub len: SymVal,
}

impl Interval {
    pub fn new(start: SymVal, len: SymVal) -> Self {
        Self { start, len }
    }

    pub fn concrete(start: i64, len: i64) -> Self {
        Self::new(SymVal::Const(start), SymVal::Const(len))
    }

    /// Inclusive last index.
    pub fn end(&self) -> SymVal {
        self.start.plus(&self.len).minus(&SymVal::Const(1))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end())
    }
}

/// Which peer's copy of a region a mark applies to.
///
/// `Any` stands for a peer index the solver could not pin down: its marks are
/// visible to queries for every peer, and an `Any` query sees every peer's marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeerKey {
    Index(i64),
    Any,
}

impl PeerKey {
    pub fn resolve<S: ConstraintSolver + ?Sized>(peer: &SymVal, solver: &S) -> Self {
        solver.resolve(peer).map_or(PeerKey::Any, PeerKey::Index)
    }

    fn sees(self, other: PeerKey) -> bool {
        match (self, other) {
            (PeerKey::Index(a), PeerKey::Index(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerKey::Index(i) => write!(f, "PE {i}"),
            PeerKey::Any => f.write_str("an unresolved PE"),
        }
    }
}

/// How undecided comparisons count when testing two ranges for overlap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    /// Disjoint only if one range is proven strictly left of the other.
    #[default]
    Conservative,
    /// Overlapping only if neither range can possibly be strictly left of the other.
    Feasibility,
}

/// Decides whether two ranges may touch a common index.
pub fn ranges_overlap<S: ConstraintSolver + ?Sized>(
    a: &Interval,
    b: &Interval,
    solver: &S,
    policy: OverlapPolicy,
) -> bool {
    if is_provably_empty(a, solver) || is_provably_empty(b, solver) {
        return false;
    }

    let a_left_of_b = solver.less_than(&a.end(), &b.start);
    let b_left_of_a = solver.less_than(&b.end(), &a.start);
    match policy {
        OverlapPolicy::Conservative => !(a_left_of_b.is_proven() || b_left_of_a.is_proven()),
        OverlapPolicy::Feasibility => !a_left_of_b.is_possible() && !b_left_of_a.is_possible(),
    }
}

fn is_provably_empty<S: ConstraintSolver + ?Sized>(iv: &Interval, solver: &S) -> bool {
    solver.less_than(&iv.len, &SymVal::Const(1)).is_proven()
}

/// Returned by [`IntervalTracker::mark`] for a region that was never registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotTracked(pub RegionId);

#[derive(Clone, Debug, Default, PartialEq)]
struct RegionMarks {
    peers: OrdMap<PeerKey, Vector<Interval>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntervalTracker {
    regions: OrdMap<RegionId, RegionMarks>,
}

impl IntervalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `region`. Existing marks are kept.
    pub fn register(&self, region: RegionId) -> Self {
        if self.regions.contains_key(&region) {
            return self.clone();
        }
        Self {
            regions: self.regions.update(region, RegionMarks::default()),
        }
    }

    pub fn is_tracked(&self, region: RegionId) -> bool {
        self.regions.contains_key(&region)
    }

    /// Appends `interval` to `peer`'s list under `region`.
    pub fn mark(&self, region: RegionId, peer: PeerKey, interval: Interval) -> Result<Self, NotTracked> {
        let marks = self.regions.get(&region).ok_or(NotTracked(region))?;
        let mut list = marks.peers.get(&peer).cloned().unwrap_or_default();
        list.push_back(interval);
        let marks = RegionMarks {
            peers: marks.peers.update(peer, list),
        };
        Ok(Self {
            regions: self.regions.update(region, marks),
        })
    }

    /// True when some existing mark visible to `peer` may overlap `candidate`.
    pub fn overlaps_any<S: ConstraintSolver + ?Sized>(
        &self,
        region: RegionId,
        peer: PeerKey,
        candidate: &Interval,
        solver: &S,
        policy: OverlapPolicy,
    ) -> bool {
        self.first_overlap(region, peer, candidate, solver, policy).is_some()
    }

    /// The first existing mark that may overlap `candidate`, with the peer it was made for.
    pub fn first_overlap<S: ConstraintSolver + ?Sized>(
        &self,
        region: RegionId,
        peer: PeerKey,
        candidate: &Interval,
        solver: &S,
        policy: OverlapPolicy,
    ) -> Option<(PeerKey, Interval)> {
        let marks = self.regions.get(&region)?;
        marks
            .peers
            .iter()
            .filter(|(key, _)| peer.sees(**key))
            .flat_map(|(key, list)| list.iter().map(move |iv| (*key, iv)))
            .find(|(_, existing)| ranges_overlap(existing, candidate, solver, policy))
            .map(|(key, iv)| (key, iv.clone()))
    }

    /// Drops every mark on `region` for all peers; the region stays tracked.
    pub fn clear_region(&self, region: RegionId) -> Self {
        Self {
            regions: self.regions.update(region, RegionMarks::default()),
        }
    }

    /// Drops every mark on every region (a barrier).
    pub fn clear_all(&self) -> Self {
        Self {
            regions: self
                .regions
                .keys()
                .map(|id| (*id, RegionMarks::default()))
                .collect(),
        }
    }

    pub fn mark_count(&self, region: RegionId, peer: PeerKey) -> usize {
        self.regions
            .get(&region)
            .and_then(|m| m.peers.get(&peer))
            .map_or(0, Vector::len)
    }

    pub fn tracked_regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }
}
