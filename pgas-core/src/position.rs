#![forbid(unsafe_code)]

/// Whether control is between the library's initialize and finalize calls.
///
/// Stored as the scalar 0 (outside) / 1 (inside), plus whether the bracket
/// was ever opened on this path. It opens at most once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PositionTracker {
    position: u8,
    entered: bool,
}

impl PositionTracker {
    const OUTSIDE: u8 = 0;
    const INSIDE: u8 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(self) -> Self {
        Self {
            position: Self::INSIDE,
            entered: true,
        }
    }

    pub fn exit(self) -> Self {
        Self {
            position: Self::OUTSIDE,
            ..self
        }
    }

    /// True once `enter` has run, including after a later `exit`.
    pub fn has_entered(self) -> bool {
        self.entered
    }

    pub fn in_bracket(self) -> bool {
        self.position == Self::INSIDE
    }

    pub fn value(self) -> u8 {
        self.position
    }
}
