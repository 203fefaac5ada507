//! Pool configuration parameters.

use seam_core::{AccessPattern, PrecisionTier};

/// Configuration for a narrow-band block pool.
///
/// Captured at construction; the stride and tier interact (the stride is
/// rounded up to the tier's alignment when the pool initializes), the rest
/// are independent knobs. All fields are plain data — validation happens
/// in [`crate::BlockPool::new`] and `initialize()`.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Human-readable pool name for diagnostics.
    pub name: String,

    /// Requested bytes per block, before tier-alignment rounding.
    ///
    /// Values below [`PoolConfig::MIN_BLOCK_SIZE`] are raised to it.
    pub block_size: usize,

    /// Number of block slots to create at `initialize()`.
    pub initial_capacity: usize,

    /// Advisory access-pattern hint. Recorded and reported, never acted on
    /// by the core allocator.
    pub access_pattern: AccessPattern,

    /// Whether `allocate()` may grow the pool when the free list is empty.
    pub allow_growth: bool,

    /// Precision tier controlling buffer alignment and channel width.
    pub tier: PrecisionTier,

    /// Number of sample channels stored per block.
    pub channel_count: u32,

    /// Distance (world units) ahead of recent allocations that the
    /// prefetch heuristic projects along the mining direction.
    pub prefetch_distance: f32,
}

impl PoolConfig {
    /// Smallest permitted block stride in bytes.
    pub const MIN_BLOCK_SIZE: usize = 8;

    /// Default prefetch projection distance in world units.
    pub const DEFAULT_PREFETCH_DISTANCE: f32 = 200.0;

    /// Default channel count (one SDF distance channel).
    pub const DEFAULT_CHANNEL_COUNT: u32 = 1;

    /// Create a config with the given identity and defaults elsewhere.
    pub fn new(name: impl Into<String>, block_size: usize, initial_capacity: usize) -> Self {
        Self {
            name: name.into(),
            block_size,
            initial_capacity,
            access_pattern: AccessPattern::default(),
            allow_growth: true,
            tier: PrecisionTier::default(),
            channel_count: Self::DEFAULT_CHANNEL_COUNT,
            prefetch_distance: Self::DEFAULT_PREFETCH_DISTANCE,
        }
    }

    /// Effective stride: `block_size` raised to the minimum and rounded up
    /// to the tier's alignment.
    pub fn stride(&self) -> usize {
        round_up(
            self.block_size.max(Self::MIN_BLOCK_SIZE),
            self.tier.alignment(),
        )
    }
}

/// Round `value` up to the next multiple of `align` (`align` > 0).
pub(crate) fn round_up(value: usize, align: usize) -> usize {
    debug_assert!(align > 0);
    value.div_ceil(align) * align
}
