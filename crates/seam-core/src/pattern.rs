//! Access-pattern hints supplied at pool construction.

/// Expected access pattern for a pool's blocks.
///
/// Purely advisory in the core allocator: it is recorded, reported in
/// stats, and available to outer layers (e.g. a future NUMA placement
/// policy), but does not change allocation behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AccessPattern {
    /// Blocks touched in index order.
    Sequential,
    /// Alternating reads across distant blocks.
    Interleaved,
    /// Spatial tile traversal.
    Tiled,
    /// No particular structure.
    #[default]
    General,
    /// Many threads touching disjoint blocks.
    Concurrent,
}
