#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;

/// Semantic category of a recognized library entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallCategory {
    Initialize,
    AllocateSymmetric,
    DeallocateSymmetric,
    Barrier,
    RemoteWrite,
    RemoteRead,
    Finalize,
}

impl CallCategory {
    pub fn display(&self) -> &'static str {
        match self {
            CallCategory::Initialize => "initialize",
            CallCategory::AllocateSymmetric => "symmetric allocation",
            CallCategory::DeallocateSymmetric => "symmetric deallocation",
            CallCategory::Barrier => "barrier",
            CallCategory::RemoteWrite => "remote write",
            CallCategory::RemoteRead => "remote read",
            CallCategory::Finalize => "finalize",
        }
    }
}

impl fmt::Display for CallCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

const OPENSHMEM_CALLS: &[(&str, CallCategory)] = &[
    ("shmem_init", CallCategory::Initialize),
    ("start_pes", CallCategory::Initialize),
    ("shmem_malloc", CallCategory::AllocateSymmetric),
    ("shmem_calloc", CallCategory::AllocateSymmetric),
    ("shmem_align", CallCategory::AllocateSymmetric),
    ("shmalloc", CallCategory::AllocateSymmetric),
    ("shmem_free", CallCategory::DeallocateSymmetric),
    ("shfree", CallCategory::DeallocateSymmetric),
    ("shmem_barrier_all", CallCategory::Barrier),
    ("shmem_barrier", CallCategory::Barrier),
    ("shmem_sync_all", CallCategory::Barrier),
    ("shmem_put", CallCategory::RemoteWrite),
    ("shmem_putmem", CallCategory::RemoteWrite),
    ("shmem_int_put", CallCategory::RemoteWrite),
    ("shmem_long_put", CallCategory::RemoteWrite),
    ("shmem_double_put", CallCategory::RemoteWrite),
    ("shmem_p", CallCategory::RemoteWrite),
    ("shmem_get", CallCategory::RemoteRead),
    ("shmem_getmem", CallCategory::RemoteRead),
    ("shmem_int_get", CallCategory::RemoteRead),
    ("shmem_long_get", CallCategory::RemoteRead),
    ("shmem_double_get", CallCategory::RemoteRead),
    ("shmem_g", CallCategory::RemoteRead),
    ("shmem_finalize", CallCategory::Finalize),
];

/// Name → category table for one PGAS library.
///
/// Transition logic only ever sees categories, so supporting another library
/// means supplying another table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialect {
    name: String,
    calls: HashMap<String, CallCategory>,
}

impl Dialect {
    pub const OPENSHMEM: &'static str = "openshmem";

    pub fn openshmem() -> Self {
        Self::from_entries(Self::OPENSHMEM, OPENSHMEM_CALLS.iter().copied())
    }

    /// A built-in table by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "openshmem" => Some(Self::openshmem()),
            _ => None,
        }
    }

    pub fn from_entries<N, I>(name: impl Into<String>, entries: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, CallCategory)>,
    {
        Self {
            name: name.into(),
            calls: entries.into_iter().map(|(n, c)| (n.into(), c)).collect(),
        }
    }

    /// Adds or replaces one entry.
    pub fn with_entry(mut self, callee: impl Into<String>, category: CallCategory) -> Self {
        self.calls.insert(callee.into(), category);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` for entry points this dialect does not recognize.
    pub fn classify(&self, callee: &str) -> Option<CallCategory> {
        self.calls.get(callee).copied()
    }

    /// Entries sorted by callee name.
    pub fn entries(&self) -> Vec<(&str, CallCategory)> {
        let mut out: Vec<_> = self.calls.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::openshmem()
    }
}
