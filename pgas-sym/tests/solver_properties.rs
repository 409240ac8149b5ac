use pgas_sym::{ConstraintSolver, RangeSolver, SymVal, SymbolId, Tristate};
use proptest::test_runner::{Config, TestCaseError, TestRunner};

fn runner() -> TestRunner {
    TestRunner::new(Config {
        cases: 256,
        ..Config::default()
    })
}

fn expect(got: Tristate, want: Tristate, what: String) -> Result<(), TestCaseError> {
    if got == want {
        Ok(())
    } else {
        Err(TestCaseError::fail(format!("{what}: got {got:?}, want {want:?}")))
    }
}

#[test]
fn constants_are_always_decided() {
    let strat = (-1_000_000i64..1_000_000, -1_000_000i64..1_000_000);
    runner()
        .run(&strat, |(a, b)| {
            let want = if a < b { Tristate::Proven } else { Tristate::Refuted };
            let got = RangeSolver::new().less_than(&SymVal::Const(a), &SymVal::Const(b));
            expect(got, want, format!("{a} < {b}"))
        })
        .unwrap();
}

#[test]
fn shared_symbol_offsets_cancel() {
    let strat = (-1_000i64..1_000, -1_000i64..1_000);
    runner()
        .run(&strat, |(a, b)| {
            let x = SymVal::symbol(0);
            let lhs = x.plus(&SymVal::Const(a));
            let rhs = x.plus(&SymVal::Const(b));
            let want = if a < b { Tristate::Proven } else { Tristate::Refuted };
            expect(RangeSolver::new().less_than(&lhs, &rhs), want, format!("{lhs} < {rhs}"))
        })
        .unwrap();
}

#[test]
fn bounded_symbol_matches_its_range() {
    let strat = (-100i64..100, 0i64..50, -200i64..200);
    runner()
        .run(&strat, |(lo, width, k)| {
            let hi = lo + width;
            let mut s = RangeSolver::new();
            s.assume_range(SymbolId(0), Some(lo), Some(hi));

            // x < k over x in [lo, hi]
            let want = if hi < k {
                Tristate::Proven
            } else if lo >= k {
                Tristate::Refuted
            } else {
                Tristate::Unknown
            };
            expect(
                s.less_than(&SymVal::symbol(0), &SymVal::Const(k)),
                want,
                format!("x in [{lo}, {hi}] < {k}"),
            )
        })
        .unwrap();
}
