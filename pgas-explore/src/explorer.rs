#![forbid(unsafe_code)]

//! Depth-first path exploration over a compiled scenario.
//!
//! Each path owns its abstract state and its own copy of the path
//! constraints. At a fork the state is cloned once per branch, which is cheap
//! because every store inside it is persistent.

use std::collections::BTreeMap;

use pgas_core::{AbstractState, Checker, Location, Violation, ViolationKind};
use pgas_sym::RangeSolver;

use crate::error::ScenarioError;
use crate::scenario::{CompiledBranch, Node, Program, Scenario};

/// One fully explored path.
#[derive(Clone, Debug)]
pub struct PathReport {
    /// Branch labels taken at each fork, outermost first.
    pub choices: Vec<String>,
    pub violations: Vec<Violation>,
    pub final_state: AbstractState,
    /// The path stopped at a fork whose branches all contradict its constraints.
    pub infeasible: bool,
}

impl PathReport {
    pub fn label(&self) -> String {
        if self.choices.is_empty() {
            "main".to_string()
        } else {
            self.choices.join(" / ")
        }
    }
}

/// A violation reported on one or more paths, identified by kind and location.
#[derive(Clone, Debug)]
pub struct Finding<'a> {
    pub violation: &'a Violation,
    /// Labels of the paths that reached it, in exploration order.
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ExplorationReport {
    pub paths: Vec<PathReport>,
    /// Exploration stopped at the path bound with work left over.
    pub truncated: bool,
}

impl ExplorationReport {
    pub fn has_violations(&self) -> bool {
        self.paths.iter().any(|p| !p.violations.is_empty())
    }

    pub fn violation_count(&self) -> usize {
        self.paths.iter().map(|p| p.violations.len()).sum()
    }

    /// Violations merged across paths, ordered by location then kind.
    pub fn distinct(&self) -> Vec<Finding<'_>> {
        let mut merged: BTreeMap<(usize, usize, ViolationKind), Finding<'_>> = BTreeMap::new();
        for path in &self.paths {
            for v in &path.violations {
                let key = (v.location.offset(), v.location.len(), v.kind);
                merged
                    .entry(key)
                    .or_insert_with(|| Finding {
                        violation: v,
                        paths: Vec::new(),
                    })
                    .paths
                    .push(path.label());
            }
        }
        merged.into_values().collect()
    }
}

struct Frame<'p> {
    /// Remaining work: each entry is a step list and the index of its next step.
    cursor: Vec<(&'p [Node], usize)>,
    state: AbstractState,
    solver: RangeSolver,
    choices: Vec<String>,
    violations: Vec<Violation>,
}

impl<'p> Frame<'p> {
    fn branch(&self, branch: &'p CompiledBranch) -> Option<Frame<'p>> {
        let mut solver = self.solver.clone();
        for a in &branch.assumptions {
            solver.assume_range(a.symbol, a.min, a.max);
        }
        if !solver.is_consistent() {
            log::debug!("pruning infeasible branch `{}`", branch.label);
            return None;
        }

        let mut cursor = self.cursor.clone();
        cursor.push((branch.nodes.as_slice(), 0));
        let mut choices = self.choices.clone();
        choices.push(branch.label.clone());

        Some(Frame {
            cursor,
            state: self.state.clone(),
            solver,
            choices,
            violations: self.violations.clone(),
        })
    }

    fn finish(self, infeasible: bool) -> PathReport {
        PathReport {
            choices: self.choices,
            violations: self.violations,
            final_state: self.state,
            infeasible,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Explorer {
    checker: Checker,
    max_paths: Option<usize>,
}

impl Explorer {
    pub const DEFAULT_MAX_PATHS: usize = 4096;

    pub fn new(checker: Checker) -> Self {
        Self {
            checker,
            max_paths: None,
        }
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = Some(max_paths);
        self
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn max_paths(&self) -> usize {
        self.max_paths.unwrap_or(Self::DEFAULT_MAX_PATHS)
    }

    pub fn run(&self, scenario: &Scenario) -> Result<ExplorationReport, ScenarioError> {
        let program = scenario.compile()?;
        Ok(self.explore(&program))
    }

    pub fn explore(&self, program: &Program) -> ExplorationReport {
        let mut report = ExplorationReport::default();
        let mut work = vec![Frame {
            cursor: vec![(program.nodes.as_slice(), 0)],
            state: AbstractState::new(),
            solver: program.solver.clone(),
            choices: Vec::new(),
            violations: Vec::new(),
        }];

        while let Some(mut frame) = work.pop() {
            if report.paths.len() >= self.max_paths() {
                log::warn!(
                    "{}: stopping after {} paths ({} pending)",
                    program.name,
                    report.paths.len(),
                    work.len() + 1
                );
                report.truncated = true;
                break;
            }

            match self.advance(&mut frame) {
                Some(branches) => {
                    log::debug!("fork with {} branch(es) after [{}]", branches.len(), frame.choices.join(" / "));
                    // Reversed so the first branch is explored first.
                    let live: Vec<_> = branches.iter().rev().filter_map(|b| frame.branch(b)).collect();
                    if live.is_empty() {
                        let path = frame.finish(true);
                        log::debug!("path `{}` ends infeasible: {} violation(s)", path.label(), path.violations.len());
                        report.paths.push(path);
                    } else {
                        work.extend(live);
                    }
                }
                None => {
                    let path = frame.finish(false);
                    log::debug!("path `{}` done: {} violation(s)", path.label(), path.violations.len());
                    report.paths.push(path);
                }
            }
        }
        report
    }

    /// Applies calls until the path ends or reaches a fork, which is returned.
    fn advance<'p>(&self, frame: &mut Frame<'p>) -> Option<&'p [CompiledBranch]> {
        loop {
            let top = frame.cursor.last_mut()?;
            let (nodes, idx) = (top.0, top.1);
            top.1 += 1;

            let Some(node) = nodes.get(idx) else {
                frame.cursor.pop();
                continue;
            };

            match node {
                Node::Call(call) => match self.checker.on_call(&frame.state, call, &frame.solver) {
                    Some(t) => {
                        frame.state = t.state;
                        frame.violations.extend(t.violations);
                    }
                    None => log::trace!("`{}` is not a library call; skipped", call.callee),
                },
                Node::Fork(branches) if branches.is_empty() => {}
                Node::Fork(branches) => return Some(branches.as_slice()),
            }
        }
    }
}

/// Kind and primary location of each distinct violation.
pub fn violation_sites(report: &ExplorationReport) -> Vec<(ViolationKind, Location)> {
    report
        .distinct()
        .into_iter()
        .map(|f| (f.violation.kind, f.violation.location))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgas_core::{CheckerConfig, Dialect};

    fn scenario(text: &str) -> Scenario {
        Scenario::from_toml_str(text).unwrap()
    }

    const FORKED_BARRIER: &str = r#"
[[region]]
name = "dest"

[[step]]
call = "shmem_init"

[[step]]
call = "shmem_malloc"
target = "dest"
size = 16

[[step]]
call = "shmem_put"
target = "dest"
peer = 1
offset = 0
len = 4

[[step]]
[[step.fork]]
name = "synced"
[[step.fork.step]]
call = "shmem_barrier_all"

[[step.fork]]
name = "racy"

[[step]]
call = "shmem_get"
target = "dest"
peer = 1
offset = 2
len = 1

[[step]]
call = "shmem_free"
target = "dest"

[[step]]
call = "shmem_finalize"
"#;

    #[test]
    fn test_branches_continue_with_remaining_steps() {
        let report = Explorer::default().run(&scenario(FORKED_BARRIER)).unwrap();
        assert_eq!(report.paths.len(), 2);
        assert!(!report.truncated);

        assert_eq!(report.paths[0].choices, vec!["synced"]);
        assert!(report.paths[0].violations.is_empty());

        assert_eq!(report.paths[1].choices, vec!["racy"]);
        let kinds: Vec<_> = report.paths[1].violations.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViolationKind::UnsynchronizedAccess]);

        // both paths reached finalize
        assert!(report.paths.iter().all(|p| !p.final_state.in_bracket()));
    }

    #[test]
    fn test_distinct_merges_paths() {
        let text = r#"
[[step]]
[[step.fork]]
name = "a"
[[step.fork]]
name = "b"

[[step]]
call = "shmem_barrier_all"
line = 7
"#;
        let report = Explorer::default().run(&scenario(text)).unwrap();
        assert_eq!(report.violation_count(), 2);
        let distinct = report.distinct();
        assert_eq!(distinct.len(), 1);
        assert_eq!(distinct[0].violation.kind, ViolationKind::OutOfBracketCall);
        assert_eq!(distinct[0].paths, vec!["a", "b"]);
        assert_eq!(violation_sites(&report), vec![(ViolationKind::OutOfBracketCall, pgas_core::location(7, 0))]);
    }

    #[test]
    fn test_infeasible_branch_is_pruned() {
        let text = r#"
[[symbol]]
name = "i"
min = 0
max = 3

[[step]]
[[step.fork]]
name = "small"
[[step.fork.assume]]
name = "i"
max = 1
[[step.fork]]
name = "impossible"
[[step.fork.assume]]
name = "i"
min = 10
"#;
        let report = Explorer::default().run(&scenario(text)).unwrap();
        assert_eq!(report.paths.len(), 1);
        assert_eq!(report.paths[0].label(), "small");
        assert!(!report.paths[0].infeasible);
    }

    #[test]
    fn test_fully_pruned_fork_keeps_prefix_violations() {
        let text = r#"
[[symbol]]
name = "i"
min = 0
max = 3

[[step]]
call = "shmem_barrier_all"
line = 1

[[step]]
[[step.fork]]
name = "high"
[[step.fork.assume]]
name = "i"
min = 10
[[step.fork]]
name = "negative"
[[step.fork.assume]]
name = "i"
max = -1

[[step]]
call = "shmem_init"
"#;
        let report = Explorer::default().run(&scenario(text)).unwrap();
        assert_eq!(report.paths.len(), 1);
        assert!(report.has_violations());

        let path = &report.paths[0];
        assert!(path.infeasible);
        assert_eq!(path.label(), "main");
        assert_eq!(path.violations[0].kind, ViolationKind::OutOfBracketCall);
        // nothing after the fork ran
        assert!(!path.final_state.in_bracket());
    }

    #[test]
    fn test_branch_constraints_decide_overlap() {
        let text = r#"
[[symbol]]
name = "i"

[[region]]
name = "dest"

[[step]]
call = "shmem_init"

[[step]]
call = "shmem_malloc"
target = "dest"

[[step]]
call = "shmem_put"
target = "dest"
peer = 0
offset = 0
len = 4

[[step]]
[[step.fork]]
name = "past-the-write"
[[step.fork.assume]]
name = "i"
min = 4
[[step.fork]]
name = "anywhere"

[[step]]
call = "shmem_get"
target = "dest"
peer = 0
offset = "i"
len = 1
"#;
        let report = Explorer::default().run(&scenario(text)).unwrap();
        assert_eq!(report.paths.len(), 2);
        assert!(report.paths[0].violations.is_empty());
        assert_eq!(report.paths[1].violations[0].kind, ViolationKind::UnsynchronizedAccess);
    }

    #[test]
    fn test_path_bound_truncates() {
        // three binary forks in a row: eight paths
        let fork = "[[step]]\n[[step.fork]]\nname = \"l\"\n[[step.fork]]\nname = \"r\"\n";
        let text = fork.repeat(3);
        let all = Explorer::default().run(&scenario(&text)).unwrap();
        assert_eq!(all.paths.len(), 8);
        assert_eq!(all.paths[0].label(), "l / l / l");
        assert_eq!(all.paths[7].label(), "r / r / r");

        let bounded = Explorer::default().with_max_paths(3).run(&scenario(&text)).unwrap();
        assert_eq!(bounded.paths.len(), 3);
        assert!(bounded.truncated);
    }

    #[test]
    fn test_unrecognized_calls_are_skipped() {
        let text = "[[step]]\ncall = \"printf\"\n[[step]]\ncall = \"shmem_init\"\n";
        let report = Explorer::default().run(&scenario(text)).unwrap();
        assert!(!report.has_violations());
        assert!(report.paths[0].final_state.in_bracket());
    }

    #[test]
    fn test_custom_dialect() {
        let config = CheckerConfig::from_toml_str(
            "[dialect.calls]\ntoy_start = \"initialize\"\ntoy_fence = \"barrier\"\n",
        )
        .unwrap();
        let explorer = Explorer::new(Checker::new(config.dialect().unwrap(), config));
        let text = "[[step]]\ncall = \"toy_fence\"\n[[step]]\ncall = \"toy_start\"\n";
        let report = explorer.run(&scenario(text)).unwrap();
        assert_eq!(
            report.paths[0].violations.iter().map(|v| v.kind).collect::<Vec<_>>(),
            vec![ViolationKind::OutOfBracketCall]
        );
        assert_ne!(explorer.checker().dialect(), &Dialect::openshmem());
    }
}
