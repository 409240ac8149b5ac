#![forbid(unsafe_code)]

//! Scenario files describe one program as a branching trace of library calls.
//!
//! ```toml
//! source = """..."""
//!
//! [[symbol]]
//! name = "i"
//! min = 0
//! max = 9
//!
//! [[region]]
//! name = "dest"
//!
//! [[step]]
//! call = "shmem_put"
//! line = 12
//! target = "dest"
//! peer = 2
//! offset = "i"
//! len = 1
//!
//! [[step]]
//! [[step.fork]]
//! name = "then"
//! [[step.fork.step]]
//! call = "shmem_barrier_all"
//! ```
//!
//! A fork needs its own (otherwise empty) `[[step]]` header. After a fork
//! every branch continues with the steps that follow it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use pgas_core::{location, CallEvent, Location, Region, RegionId, Storage, ValueId};
use pgas_sym::{RangeSolver, SymVal, SymbolId};

use crate::error::ScenarioError;

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,

    /// Program text that `line` numbers refer to.
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default, rename = "symbol")]
    pub symbols: Vec<SymbolDecl>,

    #[serde(default, rename = "region")]
    pub regions: Vec<RegionDecl>,

    #[serde(default, rename = "value")]
    pub values: Vec<ValueDecl>,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolDecl {
    pub name: String,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionDecl {
    pub name: String,
    #[serde(default)]
    pub storage: Storage,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueDecl {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum Step {
    Fork(ForkStep),
    Call(CallStep),
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkStep {
    pub fork: Vec<Branch>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Branch {
    #[serde(default)]
    pub name: Option<String>,

    /// Extra symbol bounds that hold on this branch only.
    #[serde(default, rename = "assume")]
    pub assumptions: Vec<SymbolDecl>,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallStep {
    pub call: String,
    #[serde(default)]
    pub line: Option<usize>,
    /// Region name; `"?"` or absent means the host could not resolve it.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub peer: Option<Operand>,
    #[serde(default)]
    pub offset: Option<Operand>,
    #[serde(default)]
    pub len: Option<Operand>,
    #[serde(default)]
    pub size: Option<Operand>,
}

/// An integer literal or a symbolic expression such as `"i + 1"`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Int(i64),
    Expr(String),
}

impl Scenario {
    /// Loads a scenario, choosing JSON for `.json` files and TOML otherwise.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = fs::read_to_string(path).map_err(|e| {
            ScenarioError::new(format!("failed to read {}: {e}", path.display()))
        })?;

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        };
        let mut scenario =
            parsed.map_err(|e| ScenarioError::new(format!("{}: {}", path.display(), e.message)))?;

        if scenario.name.is_none() {
            scenario.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        }
        Ok(scenario)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ScenarioError> {
        toml::from_str(text).map_err(|e| ScenarioError::new(format!("invalid scenario: {e}")))
    }

    pub fn from_json_str(text: &str) -> Result<Self, ScenarioError> {
        serde_json::from_str(text).map_err(|e| ScenarioError::new(format!("invalid scenario: {e}")))
    }

    /// Resolves names, parses symbolic operands and maps lines to spans.
    pub fn compile(&self) -> Result<Program, ScenarioError> {
        let mut compiler = Compiler::new(self)?;
        let nodes = compiler.steps(&self.steps)?;
        let region_names = compiler
            .regions
            .iter()
            .map(|(name, region)| (region.id, (*name).to_string()))
            .collect();

        Ok(Program {
            name: self.name.clone().unwrap_or_else(|| "scenario".to_string()),
            source: self.source.clone(),
            solver: compiler.solver,
            nodes,
            region_names,
        })
    }
}

/// A scenario with every name resolved, ready to explore.
#[derive(Clone, Debug)]
pub struct Program {
    pub name: String,
    pub source: Option<String>,
    /// Constraints that hold on every path.
    pub solver: RangeSolver,
    pub nodes: Vec<Node>,
    region_names: BTreeMap<RegionId, String>,
}

impl Program {
    pub fn region_name(&self, id: RegionId) -> Option<&str> {
        self.region_names.get(&id).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Call(CallEvent),
    Fork(Vec<CompiledBranch>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledBranch {
    pub label: String,
    pub assumptions: Vec<Assumption>,
    pub nodes: Vec<Node>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assumption {
    pub symbol: SymbolId,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Byte span of each 1-based line, newline excluded.
struct LineIndex {
    lines: Vec<(usize, usize)>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut lines = Vec::new();
        let mut offset = 0;
        for line in source.split_inclusive('\n') {
            let body = line.trim_end_matches(['\n', '\r']);
            lines.push((offset, body.len()));
            offset += line.len();
        }
        Self { lines }
    }

    fn span(&self, line: usize) -> Option<Location> {
        let (start, len) = *self.lines.get(line.checked_sub(1)?)?;
        Some(location(start, len))
    }
}

struct Compiler<'a> {
    symbols: HashMap<&'a str, SymbolId>,
    regions: HashMap<&'a str, Region>,
    values: HashMap<&'a str, ValueId>,
    lines: Option<LineIndex>,
    solver: RangeSolver,
    calls: usize,
}

impl<'a> Compiler<'a> {
    fn new(scenario: &'a Scenario) -> Result<Self, ScenarioError> {
        let mut symbols = HashMap::new();
        let mut solver = RangeSolver::new();
        for (i, decl) in scenario.symbols.iter().enumerate() {
            let id = SymbolId(u32::try_from(i).map_err(|_| ScenarioError::new("too many symbols"))?);
            if symbols.insert(decl.name.as_str(), id).is_some() {
                return Err(ScenarioError::new(format!("symbol `{}` declared twice", decl.name)));
            }
            if let (Some(min), Some(max)) = (decl.min, decl.max) {
                if min > max {
                    return Err(ScenarioError::new(format!(
                        "symbol `{}` has an empty range {min}..={max}",
                        decl.name
                    )));
                }
            }
            solver.assume_range(id, decl.min, decl.max);
        }

        let mut regions = HashMap::new();
        for (i, decl) in scenario.regions.iter().enumerate() {
            let region = Region {
                id: RegionId(i as u64 + 1),
                storage: decl.storage,
            };
            if decl.name == "?" || regions.insert(decl.name.as_str(), region).is_some() {
                return Err(ScenarioError::new(format!("invalid or duplicate region name `{}`", decl.name)));
            }
        }

        let mut values = HashMap::new();
        for (i, decl) in scenario.values.iter().enumerate() {
            if values.insert(decl.name.as_str(), ValueId(i as u64 + 1)).is_some() {
                return Err(ScenarioError::new(format!("value `{}` declared twice", decl.name)));
            }
        }

        Ok(Self {
            symbols,
            regions,
            values,
            lines: scenario.source.as_deref().map(LineIndex::new),
            solver,
            calls: 0,
        })
    }

    fn steps(&mut self, steps: &[Step]) -> Result<Vec<Node>, ScenarioError> {
        steps.iter().map(|step| self.step(step)).collect()
    }

    fn step(&mut self, step: &Step) -> Result<Node, ScenarioError> {
        match step {
            Step::Call(call) => self.call(call).map(Node::Call),
            Step::Fork(fork) => {
                let mut branches = Vec::with_capacity(fork.fork.len());
                for (i, branch) in fork.fork.iter().enumerate() {
                    let assumptions = branch
                        .assumptions
                        .iter()
                        .map(|a| -> Result<Assumption, ScenarioError> {
                            Ok(Assumption {
                                symbol: self.symbol(&a.name)?,
                                min: a.min,
                                max: a.max,
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    branches.push(CompiledBranch {
                        label: branch.name.clone().unwrap_or_else(|| format!("branch {}", i + 1)),
                        assumptions,
                        nodes: self.steps(&branch.steps)?,
                    });
                }
                Ok(Node::Fork(branches))
            }
        }
    }

    fn call(&mut self, step: &CallStep) -> Result<CallEvent, ScenarioError> {
        self.calls += 1;
        let at = self.location(step)?;
        let mut event = CallEvent::new(step.call.clone(), at);

        match step.target.as_deref() {
            None | Some("?") => {}
            Some(name) => {
                let region = self.regions.get(name).copied().ok_or_else(|| {
                    ScenarioError::new(format!("`{}` targets unknown region `{name}`", step.call))
                })?;
                event = event.with_target(region);
            }
        }

        if let Some(name) = step.value.as_deref() {
            let value = self.values.get(name).copied().ok_or_else(|| {
                ScenarioError::new(format!("`{}` uses unknown value `{name}`", step.call))
            })?;
            event = event.with_value(value);
        }

        event.peer = self.operand(step.peer.as_ref())?;
        event.offset = self.operand(step.offset.as_ref())?;
        event.len = self.operand(step.len.as_ref())?;
        event.size = step
            .size
            .as_ref()
            .map(|s| self.operand(Some(s)))
            .transpose()?;
        Ok(event)
    }

    fn location(&self, step: &CallStep) -> Result<Location, ScenarioError> {
        match (&self.lines, step.line) {
            (Some(index), Some(line)) => index.span(line).ok_or_else(|| {
                ScenarioError::new(format!(
                    "`{}` refers to line {line}, outside the {} line(s) of source",
                    step.call,
                    index.lines.len()
                ))
            }),
            (Some(_), None) => Err(ScenarioError::new(format!(
                "`{}` needs a `line` because the scenario has `source`",
                step.call
            ))),
            // No text to point into: keep calls apart by their line or ordinal.
            (None, line) => Ok(location(line.unwrap_or(self.calls), 0)),
        }
    }

    fn operand(&self, operand: Option<&Operand>) -> Result<SymVal, ScenarioError> {
        match operand {
            None => Ok(SymVal::Unknown),
            Some(Operand::Int(n)) => Ok(SymVal::Const(*n)),
            Some(Operand::Expr(text)) => SymVal::parse(text, |name| self.symbols.get(name).copied())
                .map_err(|e| ScenarioError::new(format!("in `{text}`: {}", e.message))),
        }
    }

    fn symbol(&self, name: &str) -> Result<SymbolId, ScenarioError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| ScenarioError::new(format!("unknown symbol `{name}`")))
    }
}
