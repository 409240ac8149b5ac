#![forbid(unsafe_code)]

use std::fmt;

use miette::SourceSpan;

/// Program location a violation or allocation is attributed to.
pub type Location = SourceSpan;

pub fn location(start: usize, len: usize) -> Location {
    SourceSpan::new(start.into(), len)
}

/// Opaque handle for one piece of memory, issued by the host engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Opaque handle for a program value (not the memory it came from).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u64);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value#{}", self.0)
    }
}

/// Where the host says a region lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    #[default]
    Heap,
    Stack,
    /// Global or static storage: symmetric on every peer without an allocation call.
    Global,
}

/// A region identity resolved by the host, together with its storage class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub id: RegionId,
    pub storage: Storage,
}

impl Region {
    pub fn heap(id: u64) -> Self {
        Self {
            id: RegionId(id),
            storage: Storage::Heap,
        }
    }

    pub fn global(id: u64) -> Self {
        Self {
            id: RegionId(id),
            storage: Storage::Global,
        }
    }

    pub fn is_static_symmetric(&self) -> bool {
        self.storage == Storage::Global
    }
}
