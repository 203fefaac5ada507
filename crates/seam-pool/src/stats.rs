//! Aggregate pool statistics and invariant validation.
//!
//! Statistics are cached behind a dirty flag that only mutation paths
//! set (and only `recompute_stats`, under the pool lock, clears), so the
//! read path never recomputes redundantly. `validate_locked` re-derives
//! everything from scratch and cross-checks the incremental bookkeeping;
//! it reports every inconsistency rather than stopping at the first.

use std::fmt;
use std::mem::size_of;

use crate::metadata::BlockMetadata;
use crate::pool::PoolInner;

/// Cumulative event counters maintained by the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PoolCounters {
    /// Total successful allocations over the pool's lifetime.
    pub total_allocations: u64,
    /// Allocate calls that returned null (exhaustion or failed growth).
    pub allocation_failures: u64,
    /// Number of capacity growths (explicit and allocation-driven).
    pub grow_events: u64,
    /// Number of completed shrinks.
    pub shrink_events: u64,
    /// High-water mark of simultaneously allocated blocks.
    pub peak_allocated: usize,
}

/// A snapshot of aggregate pool statistics.
///
/// Produced by [`crate::BlockPool::get_stats`]; values are consistent
/// with each other (computed under the pool lock).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoolStats {
    /// Current slot capacity.
    pub capacity: usize,
    /// Blocks currently allocated.
    pub allocated_blocks: usize,
    /// Blocks currently free.
    pub free_blocks: usize,
    /// High-water mark of simultaneously allocated blocks.
    pub peak_allocated: usize,
    /// Effective block stride in bytes.
    pub stride: usize,
    /// Backing buffer size in bytes.
    pub buffer_bytes: usize,
    /// Bookkeeping overhead: pool struct, metadata table, free list.
    pub overhead_bytes: usize,
    /// `100 * transitions / (capacity - 1)`; 0 for capacity < 2.
    pub fragmentation_pct: f32,
    /// Total successful allocations over the pool's lifetime.
    pub total_allocations: u64,
    /// Allocate calls that returned null.
    pub allocation_failures: u64,
    /// Number of capacity growths.
    pub grow_events: u64,
    /// Number of completed shrinks.
    pub shrink_events: u64,
}

/// One inconsistency detected by [`crate::BlockPool::validate`].
#[derive(Clone, Debug, PartialEq)]
pub enum ValidationIssue {
    /// `allocated + free != capacity`.
    CountMismatch {
        /// Allocated count derived from metadata.
        allocated: usize,
        /// Free-list length.
        free: usize,
        /// Slot capacity.
        capacity: usize,
    },
    /// The incrementally tracked live count disagrees with metadata.
    LiveCountDrift {
        /// The pool's incremental counter.
        tracked: usize,
        /// Count derived by scanning metadata.
        derived: usize,
    },
    /// A slot index appears more than once in the free list.
    DuplicateFreeIndex {
        /// The repeated index.
        index: usize,
    },
    /// A free-list index is outside the slot range.
    FreeIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Current capacity.
        capacity: usize,
    },
    /// A free-list entry points at a slot marked allocated.
    AllocatedSlotInFreeList {
        /// The offending index.
        index: usize,
    },
    /// A slot marked free is missing from the free list.
    FreeSlotMissingFromFreeList {
        /// The offending index.
        index: usize,
    },
    /// The stride violates the minimum or the tier alignment.
    StrideMisaligned {
        /// Current stride.
        stride: usize,
        /// Required alignment.
        alignment: usize,
    },
    /// Initialized with capacity but no backing buffer, or vice versa.
    BufferExtentMismatch {
        /// Actual buffer bytes (0 when absent).
        bytes: usize,
        /// Expected `capacity * stride`.
        expected: usize,
    },
    /// The pool mutex was poisoned by a panic during a mutation.
    LockPoisoned,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch {
                allocated,
                free,
                capacity,
            } => write!(
                f,
                "allocated ({allocated}) + free ({free}) != capacity ({capacity})"
            ),
            Self::LiveCountDrift { tracked, derived } => write!(
                f,
                "tracked allocated count {tracked} disagrees with metadata scan {derived}"
            ),
            Self::DuplicateFreeIndex { index } => {
                write!(f, "slot {index} appears more than once in the free list")
            }
            Self::FreeIndexOutOfRange { index, capacity } => {
                write!(f, "free-list index {index} out of range (capacity {capacity})")
            }
            Self::AllocatedSlotInFreeList { index } => {
                write!(f, "slot {index} is in the free list but marked allocated")
            }
            Self::FreeSlotMissingFromFreeList { index } => {
                write!(f, "slot {index} is marked free but absent from the free list")
            }
            Self::StrideMisaligned { stride, alignment } => {
                write!(f, "stride {stride} violates {alignment}-byte alignment")
            }
            Self::BufferExtentMismatch { bytes, expected } => {
                write!(f, "buffer extent {bytes} bytes, expected {expected}")
            }
            Self::LockPoisoned => write!(f, "pool lock poisoned"),
        }
    }
}

impl PoolInner {
    /// Recompute the cached statistics if any mutation dirtied them.
    pub(crate) fn recompute_stats(&mut self) {
        if !self.stats_dirty {
            return;
        }
        let transitions = self.meta.fragment_transitions();
        let fragmentation_pct = if self.capacity > 1 {
            100.0 * transitions as f32 / (self.capacity - 1) as f32
        } else {
            0.0
        };
        self.stats_cache = PoolStats {
            capacity: self.capacity,
            allocated_blocks: self.allocated,
            free_blocks: self.free.len(),
            peak_allocated: self.counters.peak_allocated,
            stride: self.stride,
            buffer_bytes: self.buf.as_ref().map(|b| b.bytes()).unwrap_or(0),
            overhead_bytes: size_of::<Self>()
                + self.meta.len() * size_of::<BlockMetadata>()
                + self.free.capacity() * size_of::<u32>(),
            fragmentation_pct,
            total_allocations: self.counters.total_allocations,
            allocation_failures: self.counters.allocation_failures,
            grow_events: self.counters.grow_events,
            shrink_events: self.counters.shrink_events,
        };
        self.stats_dirty = false;
    }

    /// Re-derive all counts from metadata and cross-check the free list.
    pub(crate) fn validate_locked(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let derived_allocated = self.meta.allocated_count();
        if derived_allocated + self.free.len() != self.capacity {
            issues.push(ValidationIssue::CountMismatch {
                allocated: derived_allocated,
                free: self.free.len(),
                capacity: self.capacity,
            });
        }
        if derived_allocated != self.allocated {
            issues.push(ValidationIssue::LiveCountDrift {
                tracked: self.allocated,
                derived: derived_allocated,
            });
        }

        let mut in_free_list = vec![false; self.capacity];
        for &index in &self.free {
            let index = index as usize;
            if index >= self.capacity {
                issues.push(ValidationIssue::FreeIndexOutOfRange {
                    index,
                    capacity: self.capacity,
                });
                continue;
            }
            if in_free_list[index] {
                issues.push(ValidationIssue::DuplicateFreeIndex { index });
                continue;
            }
            in_free_list[index] = true;
            if self.meta.get(index).map(|m| m.allocated).unwrap_or(false) {
                issues.push(ValidationIssue::AllocatedSlotInFreeList { index });
            }
        }
        for (index, slot) in self.meta.iter().enumerate() {
            if !slot.allocated && !in_free_list[index] {
                issues.push(ValidationIssue::FreeSlotMissingFromFreeList { index });
            }
        }

        let alignment = self.tier.alignment();
        if self.stride < crate::config::PoolConfig::MIN_BLOCK_SIZE || self.stride % alignment != 0
        {
            issues.push(ValidationIssue::StrideMisaligned {
                stride: self.stride,
                alignment,
            });
        }

        let expected = self.capacity * self.stride;
        let bytes = self.buf.as_ref().map(|b| b.bytes()).unwrap_or(0);
        if self.initialized && bytes != expected {
            issues.push(ValidationIssue::BufferExtentMismatch { bytes, expected });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::BlockPool;
    use seam_core::{OwnerTag, RequesterId};

    fn pool(capacity: usize) -> BlockPool {
        let pool = BlockPool::new(PoolConfig::new("stats", 64, capacity));
        assert!(pool.initialize());
        pool
    }

    #[test]
    fn fresh_pool_stats() {
        let p = pool(10);
        let stats = p.get_stats();
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.allocated_blocks, 0);
        assert_eq!(stats.free_blocks, 10);
        assert_eq!(stats.fragmentation_pct, 0.0);
        assert_eq!(stats.buffer_bytes, 640);
        assert!(stats.overhead_bytes > 0);
    }

    #[test]
    fn stats_track_peak_and_failures() {
        let mut config = PoolConfig::new("peaks", 64, 2);
        config.allow_growth = false;
        let p = BlockPool::new(config);
        assert!(p.initialize());

        let a = p.allocate(OwnerTag(0), RequesterId(0)).unwrap();
        let _b = p.allocate(OwnerTag(0), RequesterId(0)).unwrap();
        assert!(p.allocate(OwnerTag(0), RequesterId(0)).is_none());
        assert!(p.free(a));

        let stats = p.get_stats();
        assert_eq!(stats.peak_allocated, 2);
        assert_eq!(stats.allocated_blocks, 1);
        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.allocation_failures, 1);
    }

    #[test]
    fn fragmentation_percentage_reflects_holes() {
        let p = pool(5);
        let mut ptrs = Vec::new();
        for _ in 0..5 {
            ptrs.push(p.allocate(OwnerTag(0), RequesterId(0)).unwrap());
        }
        // Free slots 1 and 3: layout A F A F A, 4 transitions over 4 gaps.
        assert!(p.free(ptrs[1]));
        assert!(p.free(ptrs[3]));
        let stats = p.get_stats();
        assert_eq!(stats.fragmentation_pct, 100.0);
    }

    #[test]
    fn repeated_get_stats_is_stable() {
        let p = pool(4);
        p.allocate(OwnerTag(0), RequesterId(0)).unwrap();
        assert_eq!(p.get_stats(), p.get_stats());
    }

    #[test]
    fn validation_messages_render() {
        let issue = ValidationIssue::DuplicateFreeIndex { index: 3 };
        assert!(issue.to_string().contains("3"));
        let issue = ValidationIssue::CountMismatch {
            allocated: 1,
            free: 2,
            capacity: 4,
        };
        assert!(issue.to_string().contains("capacity (4)"));
    }

    #[test]
    fn healthy_pool_validates_clean() {
        let p = pool(16);
        for _ in 0..7 {
            p.allocate(OwnerTag(0), RequesterId(0)).unwrap();
        }
        assert!(p.validate().is_empty());
    }
}
