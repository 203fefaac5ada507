//! Seam: a narrow-band memory pool for real-time voxel mining SDF fields.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Seam sub-crates. For most users, adding `seam` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use seam::prelude::*;
//!
//! // A pool of 4 KiB blocks for hot (surface-adjacent) SDF samples.
//! let mut config = PoolConfig::new("terrain_hot", 4096, 256);
//! config.tier = PrecisionTier::Hot;
//! let pool = BlockPool::new(config);
//! assert!(pool.initialize());
//!
//! let block = pool.allocate(OwnerTag(7), RequesterId(1)).unwrap();
//! assert!(pool.set_block_position(block, Vec3::new(120.0, 40.0, 96.0)));
//! assert!(pool.set_distance_from_surface(block, 1.5));
//!
//! let stats = pool.get_stats();
//! assert_eq!(stats.allocated_blocks, 1);
//! assert_eq!(stats.stride, 4096);
//!
//! assert!(pool.free(block));
//! assert!(pool.validate().is_empty());
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the
//! prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `seam-core` | IDs, `Vec3`, precision tiers, access patterns |
//! | [`pool`] | `seam-pool` | The block pool, its config, stats, and errors |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core vocabulary types (`seam-core`).
///
/// Strongly typed identifiers, [`types::Vec3`], [`types::PrecisionTier`],
/// [`types::SimdClass`], and [`types::AccessPattern`].
pub use seam_core as types;

/// The narrow-band block pool allocator (`seam-pool`).
///
/// [`pool::BlockPool`] is the central type; its config, metadata, stats,
/// and error types live in the sub-modules.
pub use seam_pool as pool;

/// Common imports for typical Seam usage.
///
/// ```rust
/// use seam::prelude::*;
/// ```
pub mod prelude {
    // Vocabulary
    pub use seam_core::{
        AccessPattern, MaterialId, OwnerTag, PrecisionTier, RequesterId, SimdClass, Vec3,
    };

    // Pool
    pub use seam_pool::{
        BlockMetadata, BlockMove, BlockPool, PoolConfig, PoolError, PoolStats, SimdFieldLayout,
        ValidationIssue,
    };
}
