use pgas_core::{Interval, IntervalTracker, OverlapPolicy, PeerKey, RegionId};
use pgas_sym::RangeSolver;
use proptest::{
    prelude::prop,
    test_runner::{Config, TestCaseError, TestRunner},
};

const R: RegionId = RegionId(1);

fn runner() -> TestRunner {
    TestRunner::new(Config {
        cases: 256,
        ..Config::default()
    })
}

fn marked(peer: i64, start: i64, len: i64) -> IntervalTracker {
    IntervalTracker::new()
        .register(R)
        .mark(R, PeerKey::Index(peer), Interval::concrete(start, len))
        .unwrap()
}

fn overlaps(t: &IntervalTracker, peer: i64, start: i64, len: i64, policy: OverlapPolicy) -> bool {
    t.overlaps_any(
        R,
        PeerKey::Index(peer),
        &Interval::concrete(start, len),
        &RangeSolver::new(),
        policy,
    )
}

const POLICIES: [OverlapPolicy; 2] = [OverlapPolicy::Conservative, OverlapPolicy::Feasibility];

#[test]
fn disjoint_ranges_never_overlap() {
    let strat = (0i64..1_000, 1i64..64, 0i64..64, 1i64..64, 0i64..8, prop::bool::ANY);
    runner()
        .run(&strat, |(start, len, gap, other_len, peer, before)| {
            let t = marked(peer, start, len);
            // Candidate lies entirely after or entirely before the mark.
            let other_start = if before {
                start - gap - other_len
            } else {
                start + len + gap
            };
            for policy in POLICIES {
                if overlaps(&t, peer, other_start, other_len, policy) {
                    return Err(TestCaseError::fail(format!(
                        "[{start}, +{len}) vs [{other_start}, +{other_len}) reported overlapping under {policy:?}"
                    )));
                }
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn identical_and_partial_ranges_always_overlap() {
    let strat = (0i64..1_000, 1i64..64, 0i64..64, 1i64..64, 0i64..8);
    runner()
        .run(&strat, |(start, len, shift, other_len, peer)| {
            let t = marked(peer, start, len);
            // Candidate starts inside the mark, so they share at least `start + shift`.
            let other_start = start + shift % len;
            for policy in POLICIES {
                if !overlaps(&t, peer, start, len, policy) {
                    return Err(TestCaseError::fail("identical range not reported"));
                }
                if !overlaps(&t, peer, other_start, other_len, policy) {
                    return Err(TestCaseError::fail(format!(
                        "[{start}, +{len}) vs [{other_start}, +{other_len}) missed under {policy:?}"
                    )));
                }
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn marks_are_isolated_per_peer() {
    let strat = (0i64..1_000, 1i64..64, 0i64..16, 1i64..16);
    runner()
        .run(&strat, |(start, len, p, delta)| {
            let t = marked(p, start, len);
            let q = p + delta;
            if overlaps(&t, q, start, len, OverlapPolicy::Conservative) {
                return Err(TestCaseError::fail(format!("mark for PE {p} visible to PE {q}")));
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn clear_all_resets_every_mark() {
    let strat = prop::collection::vec((0i64..8, 0i64..256, 1i64..32), 1..16);
    runner()
        .run(&strat, |marks| {
            let regions = [RegionId(1), RegionId(2)];
            let mut t = IntervalTracker::new().register(regions[0]).register(regions[1]);
            for (i, (peer, start, len)) in marks.iter().enumerate() {
                t = t
                    .mark(regions[i % 2], PeerKey::Index(*peer), Interval::concrete(*start, *len))
                    .map_err(|e| TestCaseError::fail(format!("{e:?}")))?;
            }

            let cleared = t.clear_all();
            for (i, (peer, start, len)) in marks.iter().enumerate() {
                let hit = cleared.overlaps_any(
                    regions[i % 2],
                    PeerKey::Index(*peer),
                    &Interval::concrete(*start, *len),
                    &RangeSolver::new(),
                    OverlapPolicy::Conservative,
                );
                if hit {
                    return Err(TestCaseError::fail("mark survived clear_all"));
                }
            }
            Ok(())
        })
        .unwrap();
}
