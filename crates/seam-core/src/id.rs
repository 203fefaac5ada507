//! Strongly-typed identifiers used as opaque tags by the block pool.

use std::fmt;

/// Identifies a voxel material/type registered in an external registry.
///
/// The pool never interprets material IDs; they key the per-material SIMD
/// layout table and appear in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MaterialId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Opaque owner tag recorded on each allocated block.
///
/// Diagnostic only: the pool stores it on `allocate()` and reports it in
/// validation output, but never branches on it. The zone manager typically
/// packs a zone/chunk identifier in here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OwnerTag(pub u64);

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OwnerTag {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Opaque reference to the subsystem that requested an allocation.
///
/// Like [`OwnerTag`], this is carried through metadata untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RequesterId(pub u64);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequesterId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
