//! Narrow-band block pool allocator for SDF voxel fields.
//!
//! Real-time voxel mining keeps signed-distance-field samples near the
//! material surface — the narrow band — in fixed-stride blocks that are
//! allocated, freed, and relocated at high frequency. This crate is the
//! memory core behind that: one [`BlockPool`] per channel set, holding a
//! single tier-aligned backing buffer plus per-slot bookkeeping. This is
//! one of the crates in the workspace that may contain `unsafe` code,
//! bounded to `buffer.rs` and the prefetch intrinsic.
//!
//! # Architecture
//!
//! ```text
//! BlockPool (mutex-guarded core)
//! ├── BlockBuffer        — aligned raw storage, one allocation
//! ├── MetadataTable      — per-slot descriptors, 1:1 with blocks
//! ├── free list          — Vec<u32> of free slot indices
//! ├── AccessHistory      — ring of recent allocations → prefetch hints
//! ├── SimdLayoutTable    — per-material vectorization layouts
//! └── PoolStats cache    — dirty-flag guarded aggregates
//! ```
//!
//! Maintenance operations (defragment, Morton packing, narrow-band
//! packing, shrink) run under the same lock, each bounded by an explicit
//! millisecond budget, and leave the pool fully valid even when they
//! abort on timeout.
//!
//! # Address contract
//!
//! Blocks are addressed by slot index internally; raw addresses handed
//! out by [`BlockPool::allocate`] are invalidated by any structural
//! mutation. See `pool.rs` module docs for the full contract.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod buffer;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pool;
mod predict;
mod reorg;
pub mod simd;
pub mod stats;

pub use config::PoolConfig;
pub use error::PoolError;
pub use metadata::BlockMetadata;
pub use pool::{BlockMove, BlockPool};
pub use simd::SimdFieldLayout;
pub use stats::{PoolStats, ValidationIssue};
