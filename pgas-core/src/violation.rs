#![forbid(unsafe_code)]

use std::fmt;

use miette::{Diagnostic, LabeledSpan};
use thiserror::Error;

use crate::region::{Location, RegionId, ValueId};

/// Kinds of symmetric-memory misuse the checker can signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    NotSymmetricAccess,
    UseAfterFree,
    DoubleFree,
    DoubleAllocate,
    UnsynchronizedAccess,
    MissingFree,
    OutOfBracketCall,
    InvalidAllocationSize,
    UninitializedRead,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 9] = [
        ViolationKind::NotSymmetricAccess,
        ViolationKind::UseAfterFree,
        ViolationKind::DoubleFree,
        ViolationKind::DoubleAllocate,
        ViolationKind::UnsynchronizedAccess,
        ViolationKind::MissingFree,
        ViolationKind::OutOfBracketCall,
        ViolationKind::InvalidAllocationSize,
        ViolationKind::UninitializedRead,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ViolationKind::NotSymmetricAccess => "pgas::not_symmetric_access",
            ViolationKind::UseAfterFree => "pgas::use_after_free",
            ViolationKind::DoubleFree => "pgas::double_free",
            ViolationKind::DoubleAllocate => "pgas::double_allocate",
            ViolationKind::UnsynchronizedAccess => "pgas::unsynchronized_access",
            ViolationKind::MissingFree => "pgas::missing_free",
            ViolationKind::OutOfBracketCall => "pgas::out_of_bracket_call",
            ViolationKind::InvalidAllocationSize => "pgas::invalid_allocation_size",
            ViolationKind::UninitializedRead => "pgas::uninitialized_read",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViolationKind::NotSymmetricAccess => "not-symmetric-access",
            ViolationKind::UseAfterFree => "use-after-free",
            ViolationKind::DoubleFree => "double-free",
            ViolationKind::DoubleAllocate => "double-allocate",
            ViolationKind::UnsynchronizedAccess => "unsynchronized-access",
            ViolationKind::MissingFree => "missing-free",
            ViolationKind::OutOfBracketCall => "out-of-bracket-call",
            ViolationKind::InvalidAllocationSize => "invalid-allocation-size",
            ViolationKind::UninitializedRead => "uninitialized-read",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            ViolationKind::NotSymmetricAccess => {
                "remote accesses must target memory from a symmetric allocation or a global/static object"
            }
            ViolationKind::UseAfterFree => "allocate the region again before accessing it",
            ViolationKind::DoubleFree => "each symmetric allocation must be freed exactly once",
            ViolationKind::DoubleAllocate => "free the region before allocating it again",
            ViolationKind::UnsynchronizedAccess => {
                "insert a barrier between the remote write and this read"
            }
            ViolationKind::MissingFree => "free every symmetric allocation before finalizing",
            ViolationKind::OutOfBracketCall => {
                "library calls are only valid between initialize and finalize"
            }
            ViolationKind::InvalidAllocationSize => "allocation sizes must be non-negative",
            ViolationKind::UninitializedRead => "write the region before reading it remotely",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelatedInfo {
    pub location: Location,
    pub message: String,
}

/// One detected misuse, carried alongside the new state rather than instead of it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    pub location: Location,
    pub region: Option<RegionId>,
    pub value: Option<ValueId>,
    pub related: Vec<RelatedInfo>,
}

impl Violation {
    pub fn new(kind: ViolationKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
            region: None,
            value: None,
            related: Vec::new(),
        }
    }

    pub fn with_region(mut self, region: RegionId) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_value(mut self, value: Option<ValueId>) -> Self {
        self.value = value;
        self
    }

    pub fn with_related(mut self, location: Location, message: impl Into<String>) -> Self {
        self.related.push(RelatedInfo {
            location,
            message: message.into(),
        });
        self
    }
}

impl Diagnostic for Violation {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.help()))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let primary = LabeledSpan::new_with_span(Some(self.kind.name().to_string()), self.location);
        let related = self
            .related
            .iter()
            .map(|r| LabeledSpan::new_with_span(Some(r.message.clone()), r.location));
        Some(Box::new(std::iter::once(primary).chain(related)))
    }
}
