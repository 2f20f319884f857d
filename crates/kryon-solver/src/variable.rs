// crates/kryon-solver/src/variable.rs
use kryon_core::Index;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SPACE: AtomicU32 = AtomicU32::new(1);

/// Identity of one solver's coordinate space.
///
/// Every handle carries the space it was issued by, so handles from another
/// layer are rejected instead of silently aliasing a local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(u32);

impl SpaceId {
    pub(crate) fn next() -> Self {
        SpaceId(NEXT_SPACE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space{}", self.0)
    }
}

/// Handle to a single layout unknown owned by a [`Solver`](crate::Solver)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    space: SpaceId,
    index: Index,
}

impl Variable {
    pub(crate) fn new(space: SpaceId, index: Index) -> Self {
        Self { space, index }
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub(crate) fn index(&self) -> Index {
        self.index
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}@{}", self.index, self.space)
    }
}
