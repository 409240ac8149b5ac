#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::linear::LinearForm;
use crate::value::{SymVal, SymbolId};

/// Three-valued answer to "does `lhs < rhs` hold".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tristate {
    /// Holds on every model of the path constraints.
    Proven,
    /// Holds on no model of the path constraints.
    Refuted,
    /// The solver could not decide.
    Unknown,
}

impl Tristate {
    pub fn is_proven(self) -> bool {
        self == Tristate::Proven
    }

    /// True unless the relation is impossible.
    pub fn is_possible(self) -> bool {
        self != Tristate::Refuted
    }
}

/// Boundary to the host's constraint solver.
///
/// Every comparison the interval tracker needs is phrased as "is `lhs < rhs`",
/// which is the only query the host has to answer.
pub trait ConstraintSolver {
    fn less_than(&self, lhs: &SymVal, rhs: &SymVal) -> Tristate;

    /// Pins `value` to a single integer when the path constraints allow only one.
    fn resolve(&self, value: &SymVal) -> Option<i64> {
        value.as_const()
    }
}

impl<S: ConstraintSolver + ?Sized> ConstraintSolver for &S {
    fn less_than(&self, lhs: &SymVal, rhs: &SymVal) -> Tristate {
        (**self).less_than(lhs, rhs)
    }

    fn resolve(&self, value: &SymVal) -> Option<i64> {
        (**self).resolve(value)
    }
}

/// Inclusive bounds on a symbol; `None` is unbounded on that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bounds {
    pub lo: Option<i64>,
    pub hi: Option<i64>,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds { lo: None, hi: None };

    pub fn new(lo: Option<i64>, hi: Option<i64>) -> Self {
        Self { lo, hi }
    }

    pub fn exact(v: i64) -> Self {
        Self { lo: Some(v), hi: Some(v) }
    }

    /// True when no integer satisfies both ends.
    pub fn is_empty(self) -> bool {
        matches!((self.lo, self.hi), (Some(lo), Some(hi)) if lo > hi)
    }

    fn intersect(self, other: Bounds) -> Bounds {
        let lo = match (self.lo, other.lo) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let hi = match (self.hi, other.hi) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Bounds { lo, hi }
    }
}

/// Constraint domain that knows only per-symbol ranges.
///
/// Comparisons are decided on the normalised difference `rhs - lhs`, so
/// relations between expressions over the same unbounded symbol (`x < x + 1`)
/// are still decided.
#[derive(Clone, Debug, Default)]
pub struct RangeSolver {
    ranges: BTreeMap<SymbolId, Bounds>,
}

impl RangeSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrows `sym` to `[lo, hi]`, intersecting with what is already known.
    pub fn assume_range(&mut self, sym: SymbolId, lo: Option<i64>, hi: Option<i64>) {
        let current = self.bounds(sym);
        self.ranges.insert(sym, current.intersect(Bounds::new(lo, hi)));
    }

    pub fn assume_eq(&mut self, sym: SymbolId, value: i64) {
        self.assume_range(sym, Some(value), Some(value));
    }

    pub fn bounds(&self, sym: SymbolId) -> Bounds {
        self.ranges.get(&sym).copied().unwrap_or(Bounds::UNBOUNDED)
    }

    /// False once contradictory assumptions have emptied some symbol's range.
    pub fn is_consistent(&self) -> bool {
        self.ranges.values().all(|b| !b.is_empty())
    }

    /// Interval hull of a linear form under the current ranges.
    fn hull(&self, form: &LinearForm) -> (Option<i128>, Option<i128>) {
        let k = i128::from(form.constant_term());
        let (mut lo, mut hi) = (Some(k), Some(k));
        for (sym, c) in form.terms() {
            let b = self.bounds(sym);
            let c = i128::from(c);
            let (min_end, max_end) = if c > 0 { (b.lo, b.hi) } else { (b.hi, b.lo) };
            lo = lo.zip(min_end).map(|(acc, v)| acc.saturating_add(c.saturating_mul(i128::from(v))));
            hi = hi.zip(max_end).map(|(acc, v)| acc.saturating_add(c.saturating_mul(i128::from(v))));
        }
        (lo, hi)
    }
}

impl ConstraintSolver for RangeSolver {
    fn less_than(&self, lhs: &SymVal, rhs: &SymVal) -> Tristate {
        let (Some(l), Some(r)) = (lhs.linear(), rhs.linear()) else {
            return Tristate::Unknown;
        };
        let Some(diff) = r.checked_sub(&l) else {
            return Tristate::Unknown;
        };

        // lhs < rhs  <=>  rhs - lhs >= 1
        match self.hull(&diff) {
            (Some(lo), _) if lo >= 1 => Tristate::Proven,
            (_, Some(hi)) if hi <= 0 => Tristate::Refuted,
            _ => Tristate::Unknown,
        }
    }

    fn resolve(&self, value: &SymVal) -> Option<i64> {
        let form = value.linear()?;
        match self.hull(&form) {
            (Some(lo), Some(hi)) if lo == hi => i64::try_from(lo).ok(),
            _ => None,
        }
    }
}

#[cfg(feature = "z3")]
pub mod z3_solver {
    use std::collections::BTreeMap;

    use z3::{
        ast::{Bool, Int},
        Config, Context, SatResult, Solver,
    };

    use super::{Bounds, ConstraintSolver, Tristate};
    use crate::value::{SymVal, SymbolId};

    /// Decides comparisons with two satisfiability checks (`lhs < rhs` and
    /// `lhs >= rhs`) under the asserted symbol ranges.
    pub struct Z3Solver {
        ctx: &'static Context,
        ranges: BTreeMap<SymbolId, Bounds>,
    }

    impl Z3Solver {
        pub fn new() -> Self {
            let cfg = Config::new();
            // The context lives for the whole process so solver sessions can
            // borrow it without a self-referential struct.
            let ctx: &'static Context = Box::leak(Box::new(Context::new(&cfg)));
            Self {
                ctx,
                ranges: BTreeMap::new(),
            }
        }

        pub fn assume_range(&mut self, sym: SymbolId, lo: Option<i64>, hi: Option<i64>) {
            let current = self.ranges.get(&sym).copied().unwrap_or(Bounds::UNBOUNDED);
            self.ranges.insert(sym, current.intersect(Bounds::new(lo, hi)));
        }

        fn sym_const(&self, id: SymbolId) -> Int<'static> {
            Int::new_const(self.ctx, format!("s{}", id.0))
        }

        fn encode(&self, v: &SymVal) -> Option<Int<'static>> {
            Some(match v {
                SymVal::Const(n) => Int::from_i64(self.ctx, *n),
                SymVal::Symbol(id) => self.sym_const(*id),
                SymVal::Add(a, b) => Int::add(self.ctx, &[&self.encode(a)?, &self.encode(b)?]),
                SymVal::Sub(a, b) => Int::sub(self.ctx, &[&self.encode(a)?, &self.encode(b)?]),
                SymVal::Unknown => return None,
            })
        }

        fn satisfiable(&self, goal: &Bool<'static>, syms: impl Iterator<Item = SymbolId>) -> Option<bool> {
            let solver = Solver::new(self.ctx);
            for sym in syms {
                let Some(b) = self.ranges.get(&sym) else { continue };
                let s = self.sym_const(sym);
                if let Some(lo) = b.lo {
                    solver.assert(&s.ge(&Int::from_i64(self.ctx, lo)));
                }
                if let Some(hi) = b.hi {
                    solver.assert(&s.le(&Int::from_i64(self.ctx, hi)));
                }
            }
            solver.assert(goal);
            match solver.check() {
                SatResult::Sat => Some(true),
                SatResult::Unsat => Some(false),
                SatResult::Unknown => None,
            }
        }
    }

    impl Default for Z3Solver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ConstraintSolver for Z3Solver {
        fn less_than(&self, lhs: &SymVal, rhs: &SymVal) -> Tristate {
            let (Some(l), Some(r)) = (self.encode(lhs), self.encode(rhs)) else {
                return Tristate::Unknown;
            };
            let mut syms = lhs.symbols();
            syms.extend(rhs.symbols());

            let lt = self.satisfiable(&l.lt(&r), syms.iter().copied());
            let ge = self.satisfiable(&l.ge(&r), syms.iter().copied());
            match (lt, ge) {
                (Some(false), _) => Tristate::Refuted,
                (Some(true), Some(false)) => Tristate::Proven,
                _ => Tristate::Unknown,
            }
        }
    }
}
