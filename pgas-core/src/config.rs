#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::{CallCategory, Dialect};
use crate::error::ConfigError;
use crate::interval::OverlapPolicy;

pub const CONFIG_FILE_NAME: &str = "pgas-check.toml";

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckerConfig {
    pub overlap_policy: OverlapPolicy,

    /// Signal each violation kind at most once per explored path.
    pub report_once_per_path: bool,

    /// Flag remote reads of regions that were allocated but never written.
    pub track_uninitialized: bool,

    pub dialect: DialectConfig,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            overlap_policy: OverlapPolicy::default(),
            report_once_per_path: true,
            track_uninitialized: true,
            dialect: DialectConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DialectConfig {
    /// Built-in table to start from. Defaults to OpenSHMEM unless `calls`
    /// is given on its own.
    pub name: Option<String>,

    /// Extra or overriding `callee = "category"` entries.
    pub calls: BTreeMap<String, CallCategory>,
}

impl CheckerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text).map_err(|e| ConfigError {
            message: format!("{}: {}", path.display(), e.message),
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError {
            message: format!("invalid checker config: {e}"),
        })
    }

    /// Builds the call table this config describes.
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        let base = match self.dialect.name.as_deref() {
            Some(name) => Dialect::builtin(name).ok_or_else(|| ConfigError {
                message: format!("unknown built-in dialect `{name}` (known: {})", Dialect::OPENSHMEM),
            })?,
            None if !self.dialect.calls.is_empty() => {
                Dialect::from_entries("custom", std::iter::empty::<(&str, CallCategory)>())
            }
            None => Dialect::openshmem(),
        };

        let dialect = self
            .dialect
            .calls
            .iter()
            .fold(base, |d, (callee, category)| d.with_entry(callee.clone(), *category));

        // Without an initialize entry every tracked call would be out of bracket.
        if !dialect.entries().iter().any(|(_, c)| *c == CallCategory::Initialize) {
            return Err(ConfigError {
                message: format!("dialect `{}` has no `initialize` entry", dialect.name()),
            });
        }
        Ok(dialect)
    }
}

/// Walks up from `start` looking for `pgas-check.toml`.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = search_start(start)?;

    loop {
        let candidate = cur.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !cur.pop() {
            return None;
        }
    }
}

/// The directory a config search begins in. Relative paths resolve against
/// the working directory, so a bare `scen.toml` still searches its ancestors.
fn search_start(start: &Path) -> Option<PathBuf> {
    let start = std::path::absolute(start).ok()?;
    if start.is_dir() {
        Some(start)
    } else {
        start.parent().map(Path::to_path_buf)
    }
}
