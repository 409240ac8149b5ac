#![forbid(unsafe_code)]

//! Per-category state transitions.
//!
//! `Checker::on_call` is the only entry point the host needs: it classifies
//! the callee, runs the transition for its category against a clone of the
//! incoming state and returns the new state together with any violations.
//! The incoming state is never modified.

use pgas_sym::{ConstraintSolver, SymVal};

use crate::classify::{CallCategory, Dialect};
use crate::config::CheckerConfig;
use crate::error::ConfigError;
use crate::interval::{Interval, NotTracked, PeerKey};
use crate::lifecycle::{Lifecycle, NotActive};
use crate::region::{Location, Region, RegionId, ValueId};
use crate::state::AbstractState;
use crate::violation::{Violation, ViolationKind};

/// One intercepted library call with its arguments already resolved by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct CallEvent {
    pub callee: String,
    pub location: Location,
    /// `None` when the host could not pin the pointer argument to one region.
    pub target: Option<Region>,
    /// The program value produced (read) or consumed (write) by the call.
    pub value: Option<ValueId>,
    pub peer: SymVal,
    pub offset: SymVal,
    pub len: SymVal,
    /// Requested byte count for allocation calls.
    pub size: Option<SymVal>,
}

impl CallEvent {
    pub fn new(callee: impl Into<String>, location: Location) -> Self {
        Self {
            callee: callee.into(),
            location,
            target: None,
            value: None,
            peer: SymVal::Unknown,
            offset: SymVal::Unknown,
            len: SymVal::Unknown,
            size: None,
        }
    }

    pub fn with_target(mut self, region: Region) -> Self {
        self.target = Some(region);
        self
    }

    pub fn with_value(mut self, value: ValueId) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_peer(mut self, peer: SymVal) -> Self {
        self.peer = peer;
        self
    }

    pub fn with_range(mut self, offset: SymVal, len: SymVal) -> Self {
        self.offset = offset;
        self.len = len;
        self
    }

    pub fn with_size(mut self, size: SymVal) -> Self {
        self.size = Some(size);
        self
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.offset.clone(), self.len.clone())
    }
}

/// The state to register for the successor node, plus what went wrong on the way.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: AbstractState,
    pub violations: Vec<Violation>,
}

impl Transition {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn kinds(&self) -> Vec<ViolationKind> {
        self.violations.iter().map(|v| v.kind).collect()
    }
}

/// Accumulates the successor state while a transition runs.
struct Pending {
    state: AbstractState,
    violations: Vec<Violation>,
    once_per_path: bool,
}

impl Pending {
    fn report(&mut self, violation: Violation) {
        if self.once_per_path && self.state.reported().contains(&violation.kind) {
            log::trace!("suppressing repeated {} on this path", violation.kind);
            return;
        }
        self.state = self.state.with_reported(violation.kind);
        self.violations.push(violation);
    }

    fn finish(self) -> Transition {
        Transition {
            state: self.state,
            violations: self.violations,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Checker {
    dialect: Dialect,
    config: CheckerConfig,
}

impl Checker {
    pub fn new(dialect: Dialect, config: CheckerConfig) -> Self {
        Self { dialect, config }
    }

    /// Builds the dialect named by `config` and wraps both.
    pub fn from_config(config: CheckerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.dialect()?, config))
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn classify(&self, callee: &str) -> Option<CallCategory> {
        self.dialect.classify(callee)
    }

    /// Applies `call` to `state`. `None` means the callee is not part of the
    /// dialect and the host should continue unchanged.
    pub fn on_call<S: ConstraintSolver + ?Sized>(
        &self,
        state: &AbstractState,
        call: &CallEvent,
        solver: &S,
    ) -> Option<Transition> {
        let category = self.classify(&call.callee)?;
        log::trace!("{} -> {category}", call.callee);

        let mut p = Pending {
            state: state.clone(),
            violations: Vec::new(),
            once_per_path: self.config.report_once_per_path,
        };

        if category != CallCategory::Initialize && !p.state.in_bracket() {
            p.report(
                Violation::new(
                    ViolationKind::OutOfBracketCall,
                    call.location,
                    format!("`{}` ({category}) called outside the initialize/finalize bracket", call.callee),
                )
                .with_value(call.value),
            );
        }

        match category {
            CallCategory::Initialize => self.initialize(&mut p, call),
            CallCategory::AllocateSymmetric => self.allocate(&mut p, call, solver),
            CallCategory::DeallocateSymmetric => self.deallocate(&mut p, call),
            CallCategory::Barrier => self.barrier(&mut p),
            CallCategory::RemoteWrite => self.remote_write(&mut p, call, solver),
            CallCategory::RemoteRead => self.remote_read(&mut p, call, solver),
            CallCategory::Finalize => self.finalize(&mut p, call),
        }

        Some(p.finish())
    }

    fn initialize(&self, p: &mut Pending, call: &CallEvent) {
        let position = p.state.position();
        if position.has_entered() {
            let when = if position.in_bracket() { "initialized" } else { "finalized" };
            p.report(Violation::new(
                ViolationKind::OutOfBracketCall,
                call.location,
                format!("`{}` called again after the library was {when}", call.callee),
            ));
            return;
        }
        p.state = p.state.with_position(p.state.position().enter());
    }

    fn allocate<S: ConstraintSolver + ?Sized>(&self, p: &mut Pending, call: &CallEvent, solver: &S) {
        let Some(region) = call.target else {
            p.report(Violation::new(
                ViolationKind::NotSymmetricAccess,
                call.location,
                format!("result of `{}` could not be resolved to a region", call.callee),
            ));
            return;
        };

        if let Some(size) = call.size.as_ref().and_then(|s| solver.resolve(s)) {
            if size < 0 {
                p.report(
                    Violation::new(
                        ViolationKind::InvalidAllocationSize,
                        call.location,
                        format!("`{}` requests {size} bytes", call.callee),
                    )
                    .with_region(region.id),
                );
                return;
            }
        }

        let record = p.state.lifecycle().get(region.id);
        if let Some(Lifecycle::Allocated { site }) = record {
            p.report(
                Violation::new(
                    ViolationKind::DoubleAllocate,
                    call.location,
                    format!("{} is allocated again while still active", region.id),
                )
                .with_region(region.id)
                .with_related(site, "previously allocated here"),
            );
            return;
        }

        let mut lifecycle = p.state.lifecycle().allocate(region.id, call.location);
        if self.config.track_uninitialized {
            lifecycle = lifecycle.mark_uninitialized(region.id);
        }
        // A reused region must not inherit marks from its previous life.
        let intervals = if matches!(record, Some(Lifecycle::Freed { .. })) {
            p.state.intervals().clear_region(region.id)
        } else {
            p.state.intervals().register(region.id)
        };
        p.state = p.state.with_lifecycle(lifecycle).with_intervals(intervals);
    }

    fn deallocate(&self, p: &mut Pending, call: &CallEvent) {
        let Some(region) = call.target else {
            p.report(Violation::new(
                ViolationKind::NotSymmetricAccess,
                call.location,
                format!("argument of `{}` does not resolve to a symmetric region", call.callee),
            ));
            return;
        };

        match p.state.lifecycle().free(region.id, call.location) {
            Ok(lifecycle) => p.state = p.state.with_lifecycle(lifecycle),
            Err(NotActive { region, freed_at }) => {
                let mut v = Violation::new(
                    ViolationKind::DoubleFree,
                    call.location,
                    format!("{region} is not an active symmetric allocation"),
                )
                .with_region(region);
                if let Some(at) = freed_at {
                    v = v.with_related(at, "previously freed here");
                }
                p.report(v);
            }
        }
    }

    fn barrier(&self, p: &mut Pending) {
        p.state = p
            .state
            .with_intervals(p.state.intervals().clear_all())
            .with_values(p.state.values().synchronize_all());
    }

    /// Checks that a remote access targets a live symmetric region and
    /// registers global storage on first touch.
    fn access_target(&self, p: &mut Pending, call: &CallEvent) -> Option<RegionId> {
        let Some(region) = call.target else {
            p.report(
                Violation::new(
                    ViolationKind::NotSymmetricAccess,
                    call.location,
                    format!("target of `{}` does not resolve to a symmetric region", call.callee),
                )
                .with_value(call.value),
            );
            return None;
        };

        match p.state.lifecycle().get(region.id) {
            Some(Lifecycle::Freed { freed_at, .. }) => {
                p.report(
                    Violation::new(
                        ViolationKind::UseAfterFree,
                        call.location,
                        format!("`{}` accesses {} after it was freed", call.callee, region.id),
                    )
                    .with_region(region.id)
                    .with_value(call.value)
                    .with_related(freed_at, "freed here"),
                );
                return None;
            }
            None if region.is_static_symmetric() => {
                log::debug!("registering global {} as symmetric", region.id);
                p.state = p
                    .state
                    .with_lifecycle(p.state.lifecycle().register_symmetric(region.id))
                    .with_intervals(p.state.intervals().register(region.id));
            }
            _ => {}
        }

        if !p.state.lifecycle().is_symmetric(region.id) {
            p.report(
                Violation::new(
                    ViolationKind::NotSymmetricAccess,
                    call.location,
                    format!("{} is not symmetric memory", region.id),
                )
                .with_region(region.id)
                .with_value(call.value),
            );
            return None;
        }
        Some(region.id)
    }

    fn remote_write<S: ConstraintSolver + ?Sized>(&self, p: &mut Pending, call: &CallEvent, solver: &S) {
        let Some(region) = self.access_target(p, call) else {
            return;
        };

        let peer = PeerKey::resolve(&call.peer, solver);
        match p.state.intervals().mark(region, peer, call.interval()) {
            Ok(intervals) => p.state = p.state.with_intervals(intervals),
            Err(NotTracked(r)) => log::debug!("{r} has no interval record; write not marked"),
        }

        p.state = p
            .state
            .with_lifecycle(p.state.lifecycle().mark_initialized(region));
        if let Some(value) = call.value {
            p.state = p.state.with_values(p.state.values().mark_unsynchronized(value));
        }
    }

    fn remote_read<S: ConstraintSolver + ?Sized>(&self, p: &mut Pending, call: &CallEvent, solver: &S) {
        let Some(region) = self.access_target(p, call) else {
            return;
        };

        if self.config.track_uninitialized && p.state.lifecycle().is_uninitialized(region) {
            p.report(
                Violation::new(
                    ViolationKind::UninitializedRead,
                    call.location,
                    format!("`{}` reads {region} before any write to it", call.callee),
                )
                .with_region(region)
                .with_value(call.value),
            );
        }

        let peer = PeerKey::resolve(&call.peer, solver);
        let candidate = call.interval();
        let overlap = p.state.intervals().first_overlap(
            region,
            peer,
            &candidate,
            solver,
            self.config.overlap_policy,
        );

        if let Some((writer, existing)) = &overlap {
            p.report(
                Violation::new(
                    ViolationKind::UnsynchronizedAccess,
                    call.location,
                    format!(
                        "read of {candidate} from {peer} overlaps write {existing} to {writer} on {region} with no barrier in between"
                    ),
                )
                .with_region(region)
                .with_value(call.value),
            );
        }

        if let Some(value) = call.value {
            let values = if overlap.is_some() {
                p.state.values().mark_unsynchronized(value)
            } else {
                p.state.values().mark_synchronized(value)
            };
            p.state = p.state.with_values(values);
        }
    }

    fn finalize(&self, p: &mut Pending, call: &CallEvent) {
        if let Some((region, site)) = p.state.lifecycle().first_active_site() {
            let outstanding = p.state.lifecycle().active().count();
            p.report(
                Violation::new(
                    ViolationKind::MissingFree,
                    site,
                    format!("{region} is never freed ({outstanding} allocation(s) outstanding at finalize)"),
                )
                .with_region(region)
                .with_related(call.location, "finalized here"),
            );
        }
        p.state = p.state.with_position(p.state.position().exit());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::location;
    use crate::sync::SyncStatus;
    use pgas_sym::{RangeSolver, SymbolId};

    fn k(n: i64) -> SymVal {
        SymVal::Const(n)
    }

    fn at(line: usize) -> Location {
        location(line * 10, 5)
    }

    fn run(checker: &Checker, state: &AbstractState, call: CallEvent) -> Transition {
        checker.on_call(state, &call, &RangeSolver::new()).unwrap()
    }

    fn started(checker: &Checker) -> AbstractState {
        run(checker, &AbstractState::new(), CallEvent::new("shmem_init", at(0))).state
    }

    fn with_alloc(checker: &Checker, state: &AbstractState, id: u64) -> AbstractState {
        let t = run(
            checker,
            state,
            CallEvent::new("shmem_malloc", at(1)).with_target(Region::heap(id)).with_size(k(16)),
        );
        assert!(t.is_clean(), "{:?}", t.violations);
        t.state
    }

    #[test]
    fn test_unrecognized_callee_is_not_applicable() {
        let c = Checker::default();
        assert!(c.on_call(&AbstractState::new(), &CallEvent::new("printf", at(0)), &RangeSolver::new()).is_none());
    }

    #[test]
    fn test_init_enters_and_second_init_is_out_of_bracket() {
        let c = Checker::default();
        let s = started(&c);
        assert!(s.in_bracket());

        let t = run(&c, &s, CallEvent::new("start_pes", at(2)));
        assert_eq!(t.kinds(), vec![ViolationKind::OutOfBracketCall]);
        assert!(t.state.in_bracket());
    }

    #[test]
    fn test_call_before_init_still_transitions() {
        let c = Checker::default();
        let t = run(
            &c,
            &AbstractState::new(),
            CallEvent::new("shmem_malloc", at(1)).with_target(Region::heap(1)),
        );
        assert_eq!(t.kinds(), vec![ViolationKind::OutOfBracketCall]);
        assert!(t.state.lifecycle().is_active(RegionId(1)));
    }

    #[test]
    fn test_double_allocate_points_at_first_site() {
        let c = Checker::default();
        let s = with_alloc(&c, &started(&c), 1);
        let t = run(&c, &s, CallEvent::new("shmem_malloc", at(5)).with_target(Region::heap(1)));
        assert_eq!(t.kinds(), vec![ViolationKind::DoubleAllocate]);
        assert_eq!(t.violations[0].related[0].location, at(1));
    }

    #[test]
    fn test_negative_size_is_not_recorded() {
        let c = Checker::default();
        let t = run(
            &c,
            &started(&c),
            CallEvent::new("shmem_malloc", at(1)).with_target(Region::heap(1)).with_size(k(-4)),
        );
        assert_eq!(t.kinds(), vec![ViolationKind::InvalidAllocationSize]);
        assert!(!t.state.lifecycle().is_tracked(RegionId(1)));
    }

    #[test]
    fn test_unresolved_target_is_not_symmetric() {
        let c = Checker::default();
        let s = started(&c);
        let t = run(&c, &s, CallEvent::new("shmem_put", at(2)).with_peer(k(1)).with_range(k(0), k(4)));
        assert_eq!(t.kinds(), vec![ViolationKind::NotSymmetricAccess]);
        assert_eq!(t.state.intervals(), s.intervals());
        assert_eq!(t.state.lifecycle(), s.lifecycle());
    }

    #[test]
    fn test_stack_region_is_not_symmetric() {
        let c = Checker::default();
        let stack = Region {
            id: RegionId(9),
            storage: crate::region::Storage::Stack,
        };
        let t = run(&c, &started(&c), CallEvent::new("shmem_get", at(2)).with_target(stack).with_range(k(0), k(1)));
        assert_eq!(t.kinds(), vec![ViolationKind::NotSymmetricAccess]);
        assert_eq!(t.violations[0].region, Some(RegionId(9)));
    }

    #[test]
    fn test_global_region_is_symmetric_without_allocation() {
        let c = Checker::default();
        let g = Region::global(7);
        let t = run(
            &c,
            &started(&c),
            CallEvent::new("shmem_put", at(2)).with_target(g).with_peer(k(1)).with_range(k(0), k(8)),
        );
        assert!(t.is_clean());
        assert!(t.state.lifecycle().is_symmetric(g.id));
        assert!(!t.state.lifecycle().any_active());

        let t = run(
            &c,
            &t.state,
            CallEvent::new("shmem_get", at(3)).with_target(g).with_peer(k(1)).with_range(k(4), k(1)),
        );
        assert_eq!(t.kinds(), vec![ViolationKind::UnsynchronizedAccess]);
    }

    #[test]
    fn test_read_value_reflects_overlap() {
        let c = Checker::default();
        let s = with_alloc(&c, &started(&c), 1);
        let s = run(
            &c,
            &s,
            CallEvent::new("shmem_put", at(2))
                .with_target(Region::heap(1))
                .with_value(ValueId(1))
                .with_peer(k(0))
                .with_range(k(0), k(4)),
        )
        .state;
        assert_eq!(s.values().status(ValueId(1)), SyncStatus::Unsynchronized);

        let clean = run(
            &c,
            &s,
            CallEvent::new("shmem_get", at(3))
                .with_target(Region::heap(1))
                .with_value(ValueId(2))
                .with_peer(k(0))
                .with_range(k(4), k(4)),
        );
        assert!(clean.is_clean());
        assert_eq!(clean.state.values().status(ValueId(2)), SyncStatus::Synchronized);

        let racy = run(
            &c,
            &s,
            CallEvent::new("shmem_get", at(3))
                .with_target(Region::heap(1))
                .with_value(ValueId(2))
                .with_peer(k(0))
                .with_range(k(3), k(4)),
        );
        assert_eq!(racy.kinds(), vec![ViolationKind::UnsynchronizedAccess]);
        assert_eq!(racy.state.values().status(ValueId(2)), SyncStatus::Unsynchronized);
    }

    #[test]
    fn test_barrier_synchronizes_values() {
        let c = Checker::default();
        let s = with_alloc(&c, &started(&c), 1);
        let s = run(
            &c,
            &s,
            CallEvent::new("shmem_put", at(2))
                .with_target(Region::heap(1))
                .with_value(ValueId(1))
                .with_peer(k(0))
                .with_range(k(0), k(4)),
        )
        .state;
        let t = run(&c, &s, CallEvent::new("shmem_barrier_all", at(3)));
        assert!(t.is_clean());
        assert_eq!(t.state.values().status(ValueId(1)), SyncStatus::Synchronized);
        assert_eq!(t.state.intervals().mark_count(RegionId(1), PeerKey::Index(0)), 0);
    }

    #[test]
    fn test_uninitialized_read_then_written() {
        let c = Checker::default();
        let s = with_alloc(&c, &started(&c), 1);
        let read = CallEvent::new("shmem_get", at(3)).with_target(Region::heap(1)).with_peer(k(1)).with_range(k(0), k(4));

        let t = run(&c, &s, read.clone());
        assert_eq!(t.kinds(), vec![ViolationKind::UninitializedRead]);

        let s = run(
            &c,
            &s,
            CallEvent::new("shmem_put", at(2)).with_target(Region::heap(1)).with_peer(k(0)).with_range(k(0), k(4)),
        )
        .state;
        let s = run(&c, &s, CallEvent::new("shmem_barrier_all", at(3))).state;
        assert!(run(&c, &s, read).is_clean());
    }

    #[test]
    fn test_uninitialized_tracking_can_be_disabled() {
        let config = CheckerConfig {
            track_uninitialized: false,
            ..CheckerConfig::default()
        };
        let c = Checker::new(Dialect::openshmem(), config);
        let s = with_alloc(&c, &started(&c), 1);
        let t = run(
            &c,
            &s,
            CallEvent::new("shmem_get", at(3)).with_target(Region::heap(1)).with_peer(k(1)).with_range(k(0), k(4)),
        );
        assert!(t.is_clean());
    }

    #[test]
    fn test_unresolved_peer_conflicts_with_every_peer() {
        let c = Checker::default();
        let s = with_alloc(&c, &started(&c), 1);
        let s = run(
            &c,
            &s,
            CallEvent::new("shmem_put", at(2))
                .with_target(Region::heap(1))
                .with_peer(SymVal::Unknown)
                .with_range(k(0), k(4)),
        )
        .state;
        let t = run(
            &c,
            &s,
            CallEvent::new("shmem_get", at(3)).with_target(Region::heap(1)).with_peer(k(3)).with_range(k(1), k(1)),
        );
        assert_eq!(t.kinds(), vec![ViolationKind::UnsynchronizedAccess]);
    }

    #[test]
    fn test_symbolic_offsets_use_path_constraints() {
        let c = Checker::default();
        let i = SymVal::symbol(0);
        let mut solver = RangeSolver::new();
        solver.assume_range(SymbolId(0), Some(8), Some(12));

        let s = with_alloc(&c, &started(&c), 1);
        let s = c
            .on_call(
                &s,
                &CallEvent::new("shmem_put", at(2)).with_target(Region::heap(1)).with_peer(k(0)).with_range(k(0), k(4)),
                &solver,
            )
            .unwrap()
            .state;

        let disjoint = c
            .on_call(
                &s,
                &CallEvent::new("shmem_get", at(3)).with_target(Region::heap(1)).with_peer(k(0)).with_range(i.clone(), k(2)),
                &solver,
            )
            .unwrap();
        assert!(disjoint.is_clean());

        let unbounded = c
            .on_call(
                &s,
                &CallEvent::new("shmem_get", at(3)).with_target(Region::heap(1)).with_peer(k(0)).with_range(i, k(2)),
                &RangeSolver::new(),
            )
            .unwrap();
        assert_eq!(unbounded.kinds(), vec![ViolationKind::UnsynchronizedAccess]);
    }

    #[test]
    fn test_report_once_per_path() {
        let c = Checker::default();
        let s = AbstractState::new();
        let t1 = run(&c, &s, CallEvent::new("shmem_barrier_all", at(1)));
        let t2 = run(&c, &t1.state, CallEvent::new("shmem_barrier_all", at(2)));
        assert_eq!(t1.kinds(), vec![ViolationKind::OutOfBracketCall]);
        assert!(t2.is_clean());

        let noisy = Checker::new(
            Dialect::openshmem(),
            CheckerConfig {
                report_once_per_path: false,
                ..CheckerConfig::default()
            },
        );
        let t1 = run(&noisy, &s, CallEvent::new("shmem_barrier_all", at(1)));
        let t2 = run(&noisy, &t1.state, CallEvent::new("shmem_barrier_all", at(2)));
        assert_eq!(t2.kinds(), vec![ViolationKind::OutOfBracketCall]);
    }

    #[test]
    fn test_incoming_state_is_untouched() {
        let c = Checker::default();
        let s = with_alloc(&c, &started(&c), 1);
        let before = s.clone();
        let _ = run(&c, &s, CallEvent::new("shmem_free", at(4)).with_target(Region::heap(1)));
        assert_eq!(s, before);
        assert!(s.lifecycle().is_active(RegionId(1)));
    }

    #[test]
    fn test_from_config_uses_custom_table() {
        let config = CheckerConfig::from_toml_str("[dialect.calls]\ntoy_start = \"initialize\"\n").unwrap();
        let c = Checker::from_config(config).unwrap();
        assert_eq!(c.classify("toy_start"), Some(CallCategory::Initialize));
        assert_eq!(c.classify("shmem_init"), None);
    }
}
