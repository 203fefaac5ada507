//! Time-budgeted buffer reorganization: defragmentation, Morton packing,
//! and narrow-band-distance packing.
//!
//! All three full reorganizations share one shape: compute a permutation
//! of allocated slots, copy block data into a scratch buffer in the new
//! order, rebuild metadata and the free list, then swap the scratch in.
//! Each re-checks the wall clock every [`TIME_CHECK_INTERVAL`] iterations
//! and, on expiry, discards the scratch buffer so the pool is never
//! observed half-reorganized.

use std::time::{Duration, Instant};

use crate::buffer::BlockBuffer;
use crate::pool::PoolInner;

use seam_core::Vec3;

/// Iterations between wall-clock reads in reorganization loops.
///
/// Tunable: larger values cut `Instant::now()` overhead at the cost of
/// budget precision.
pub(crate) const TIME_CHECK_INTERVAL: usize = 64;

/// Quantization cell size (world units) for Morton coordinates.
pub(crate) const MORTON_CELL_SIZE: f32 = 100.0;

/// Offset added to each quantized axis so negative world coordinates map
/// into the unsigned Morton domain.
pub(crate) const MORTON_AXIS_OFFSET: i64 = 1 << 20;

/// Each axis contributes 21 bits, for a 63-bit interleaved code.
const MORTON_AXIS_MASK: u64 = (1 << 21) - 1;

/// A wall-clock budget for maintenance operations.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TimeBudget {
    start: Instant,
    limit: Duration,
}

impl TimeBudget {
    /// Start a budget of `max_ms` milliseconds from now.
    pub fn new(max_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            limit: Duration::from_millis(max_ms),
        }
    }

    /// Whether the budget has run out.
    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.limit
    }

    /// Budget check amortized over loop iterations: reads the clock only
    /// when `iteration` is a multiple of [`TIME_CHECK_INTERVAL`].
    pub fn expired_at(&self, iteration: usize) -> bool {
        iteration % TIME_CHECK_INTERVAL == 0 && self.expired()
    }
}

/// Quantize one world coordinate into the 21-bit Morton axis domain.
fn quantize_axis(value: f32) -> u64 {
    // `as i64` saturates for huge/non-finite floats; saturating_add keeps
    // the subsequent clamp honest at the extremes.
    let cell = ((value / MORTON_CELL_SIZE).floor() as i64).saturating_add(MORTON_AXIS_OFFSET);
    cell.clamp(0, MORTON_AXIS_MASK as i64) as u64
}

/// Spread the low 21 bits of `v` so they occupy every third bit.
fn spread_bits(v: u64) -> u64 {
    let mut x = v & MORTON_AXIS_MASK;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// 63-bit Morton (Z-order) code of a quantized world position.
pub(crate) fn morton_code(position: Vec3) -> u64 {
    let x = spread_bits(quantize_axis(position.x));
    let y = spread_bits(quantize_axis(position.y));
    let z = spread_bits(quantize_axis(position.z));
    x | (y << 1) | (z << 2)
}

impl PoolInner {
    /// Copy allocated blocks into a scratch buffer in `order`, rebuild
    /// metadata and free list, and swap the scratch in.
    ///
    /// All-or-nothing: returns `false` without mutating anything if the
    /// scratch allocation fails or the budget expires mid-copy.
    fn rebuild_in_order(&mut self, order: &[u32], budget: &TimeBudget) -> bool {
        let Some(buf) = self.buf.as_ref() else {
            return false;
        };
        let Ok(mut scratch) = BlockBuffer::zeroed(self.capacity * self.stride, self.tier.alignment())
        else {
            return false;
        };
        for (new_index, &old_index) in order.iter().enumerate() {
            if budget.expired_at(new_index) {
                return false;
            }
            scratch.copy_block_from(buf, old_index as usize, new_index, self.stride);
        }
        self.meta = self.meta.reordered(order);
        // Allocated blocks occupy the prefix; the trailing slots are free.
        self.free = ((order.len() as u32)..(self.capacity as u32)).rev().collect();
        self.buf = Some(scratch);
        // Ring indices refer to pre-swap slots; forget them.
        self.history.clear();
        self.stats_dirty = true;
        true
    }

    /// Compact allocated blocks to the front, preserving their relative
    /// order. Returns the number of allocated/free transitions observed
    /// (at most 1 after a completed compaction; the partial scan count if
    /// the budget expires, in which case nothing is mutated).
    pub(crate) fn defragment_locked(&mut self, budget: &TimeBudget) -> usize {
        let mut transitions = 0usize;
        let mut previous: Option<bool> = None;
        for (index, slot) in self.meta.iter().enumerate() {
            if budget.expired_at(index) {
                return transitions;
            }
            if let Some(prev) = previous {
                if prev != slot.allocated {
                    transitions += 1;
                }
            }
            previous = Some(slot.allocated);
        }
        if transitions <= 1 {
            return transitions;
        }

        let order: Vec<u32> = self
            .meta
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.allocated)
            .map(|(index, _)| index as u32)
            .collect();
        if self.rebuild_in_order(&order, budget) {
            self.meta.fragment_transitions()
        } else {
            transitions
        }
    }

    /// Reorder allocated blocks by Morton code of their positions.
    /// Requires at least two allocated blocks.
    pub(crate) fn pack_by_position_locked(&mut self, budget: &TimeBudget) -> bool {
        let mut keyed: Vec<(u64, u32)> = self
            .meta
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.allocated)
            .map(|(index, slot)| (morton_code(slot.position), index as u32))
            .collect();
        if keyed.len() < 2 {
            return false;
        }
        keyed.sort_unstable();
        let order: Vec<u32> = keyed.into_iter().map(|(_, index)| index).collect();
        self.rebuild_in_order(&order, budget)
    }

    /// Reorder allocated blocks by ascending distance from the surface,
    /// nearest first. Requires at least two allocated blocks.
    pub(crate) fn optimize_narrow_band_locked(&mut self, budget: &TimeBudget) -> bool {
        let mut keyed: Vec<(f32, u32)> = self
            .meta
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.allocated)
            .map(|(index, slot)| (slot.distance_from_surface, index as u32))
            .collect();
        if keyed.len() < 2 {
            return false;
        }
        keyed.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let order: Vec<u32> = keyed.into_iter().map(|(_, index)| index).collect();
        self.rebuild_in_order(&order, budget)
    }

    /// One defragmentation step: find the first free slot that has an
    /// allocated block somewhere after it, and move that block's data
    /// into the free slot. Returns `(src, dst)` slot indices.
    pub(crate) fn move_next_fragmented_locked(&mut self) -> Option<(usize, usize)> {
        // First allocated block immediately followed by a free slot.
        let mut dst = None;
        for index in 0..self.capacity.saturating_sub(1) {
            let here = self.meta.get(index)?.allocated;
            let next = self.meta.get(index + 1)?.allocated;
            if here && !next {
                dst = Some(index + 1);
                break;
            }
        }
        let dst = dst?;
        // First allocated block beyond the gap.
        let src = (dst + 1..self.capacity).find(|&index| {
            self.meta
                .get(index)
                .map(|slot| slot.allocated)
                .unwrap_or(false)
        })?;

        // Resolve every fallible lookup before mutating anything.
        let position = self.free.iter().position(|&index| index as usize == dst)?;
        let moved = *self.meta.get(src)?;
        let buf = self.buf.as_mut()?;

        buf.copy_block_within(src, dst, self.stride);
        if let Some(slot) = self.meta.get_mut(dst) {
            *slot = moved;
        }
        if let Some(slot) = self.meta.get_mut(src) {
            slot.clear();
        }
        // The destination leaves the free list; the source joins it.
        self.free.swap_remove(position);
        self.free.push(src as u32);
        self.stats_dirty = true;
        Some((src, dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_bits_places_every_third_bit() {
        assert_eq!(spread_bits(0b1), 0b1);
        assert_eq!(spread_bits(0b11), 0b1001);
        assert_eq!(spread_bits(0b101), 0b1000001);
    }

    #[test]
    fn morton_interleaves_axes() {
        // One cell along each axis from a common origin: x sets bit 0,
        // y bit 1, z bit 2 relative to the origin's code.
        let origin = morton_code(Vec3::ZERO);
        let x = morton_code(Vec3::new(MORTON_CELL_SIZE, 0.0, 0.0));
        let y = morton_code(Vec3::new(0.0, MORTON_CELL_SIZE, 0.0));
        let z = morton_code(Vec3::new(0.0, 0.0, MORTON_CELL_SIZE));
        assert_eq!(x, origin | 0b001);
        assert_eq!(y, origin | 0b010);
        assert_eq!(z, origin | 0b100);
    }

    #[test]
    fn morton_monotonic_along_one_axis() {
        let mut previous = 0u64;
        for step in 0..100 {
            let code = morton_code(Vec3::new(step as f32 * MORTON_CELL_SIZE, 0.0, 0.0));
            assert!(code >= previous);
            previous = code;
        }
    }

    #[test]
    fn morton_clamps_extreme_coordinates() {
        let far = morton_code(Vec3::new(1e30, 1e30, 1e30));
        let near = morton_code(Vec3::new(-1e30, -1e30, -1e30));
        assert_eq!(near, 0);
        // All 63 low bits set when every axis clamps to the mask.
        assert_eq!(far, (1u64 << 63) - 1);
    }

    #[test]
    fn morton_within_cell_is_stable() {
        let a = morton_code(Vec3::new(10.0, 20.0, 30.0));
        let b = morton_code(Vec3::new(40.0, 50.0, 60.0));
        assert_eq!(a, b, "same quantization cell, same code");
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let budget = TimeBudget::new(0);
        assert!(budget.expired());
        assert!(budget.expired_at(0));
        // Off-interval iterations skip the clock read entirely.
        assert!(!budget.expired_at(1));
    }

    #[test]
    fn generous_budget_does_not_expire() {
        let budget = TimeBudget::new(60_000);
        assert!(!budget.expired());
        assert!(!budget.expired_at(0));
    }

    mod pool_ops {
        use super::*;
        use crate::config::PoolConfig;
        use crate::pool::BlockPool;
        use seam_core::{OwnerTag, RequesterId};
        use std::ptr::NonNull;

        fn pool(capacity: usize) -> BlockPool {
            let pool = BlockPool::new(PoolConfig::new("reorg", 64, capacity));
            assert!(pool.initialize());
            pool
        }

        fn stamp(ptr: NonNull<u8>, value: u8) {
            #[allow(unsafe_code)]
            unsafe {
                std::ptr::write_bytes(ptr.as_ptr(), value, 64)
            };
        }

        fn first_byte_of_slot(pool: &BlockPool, index: usize) -> u8 {
            let ptr = pool.block_address(index).unwrap();
            #[allow(unsafe_code)]
            unsafe {
                *ptr.as_ptr()
            }
        }

        /// Allocate `count` blocks tagged 1..=count, then free every
        /// second one to create a fragmented layout.
        fn fragmented(count: usize) -> (BlockPool, Vec<NonNull<u8>>) {
            let p = pool(count + 8);
            let mut all = Vec::new();
            for i in 0..count {
                let ptr = p
                    .allocate(OwnerTag(i as u64 + 1), RequesterId(0))
                    .unwrap();
                stamp(ptr, i as u8 + 1);
                all.push(ptr);
            }
            // Free every second block only after the whole run is placed,
            // so the holes stay holes.
            let mut kept = Vec::new();
            for (i, ptr) in all.into_iter().enumerate() {
                if i % 2 == 0 {
                    kept.push(ptr);
                } else {
                    assert!(p.free(ptr));
                }
            }
            (p, kept)
        }

        #[test]
        fn defragment_compacts_preserving_relative_order() {
            let (p, kept) = fragmented(8);
            assert!(p.get_stats().fragmentation_pct > 0.0);

            let fragments = p.defragment(5_000);
            assert!(fragments <= 1);
            assert!(p.validate().is_empty());

            // Blocks 1, 3, 5, 7 survive, compacted to slots 0..4 in
            // their original order, data travelling with them.
            for (slot, expected) in [1u64, 3, 5, 7].iter().enumerate() {
                let meta = p.block_metadata(slot).unwrap();
                assert!(meta.allocated);
                assert_eq!(meta.owner, OwnerTag(*expected));
                assert_eq!(first_byte_of_slot(&p, slot), *expected as u8);
            }
            assert_eq!(kept.len(), 4);
        }

        #[test]
        fn defragment_is_a_no_op_when_compact() {
            let p = pool(8);
            for _ in 0..3 {
                p.allocate(OwnerTag(0), RequesterId(0)).unwrap();
            }
            // Layout A A A F...: exactly one fragment boundary.
            assert_eq!(p.defragment(5_000), 1);
            assert!(p.validate().is_empty());
        }

        #[test]
        fn defragment_zero_budget_mutates_nothing() {
            let (p, _kept) = fragmented(8);
            let before = p.get_stats();
            let fragments = p.defragment(0);
            assert_eq!(fragments, 0, "scan aborts before counting");
            assert_eq!(p.get_stats(), before);
            assert!(p.validate().is_empty());
        }

        #[test]
        fn pack_orders_blocks_by_morton_code() {
            let p = pool(16);
            // Positions deliberately out of Z-order.
            let positions = [
                Vec3::new(900.0, 100.0, 0.0),
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(300.0, 700.0, 400.0),
                Vec3::new(100.0, 0.0, 0.0),
                Vec3::new(500.0, 500.0, 500.0),
            ];
            for pos in positions {
                let ptr = p.allocate(OwnerTag(0), RequesterId(0)).unwrap();
                assert!(p.set_block_position(ptr, pos));
            }

            assert!(p.pack_blocks_by_position(5_000));
            assert!(p.validate().is_empty());

            let mut previous = 0u64;
            for slot in 0..positions.len() {
                let meta = p.block_metadata(slot).unwrap();
                assert!(meta.allocated);
                let code = morton_code(meta.position);
                assert!(code >= previous, "slot {slot} breaks Morton order");
                previous = code;
            }
        }

        #[test]
        fn pack_requires_two_allocated_blocks() {
            let p = pool(8);
            assert!(!p.pack_blocks_by_position(5_000));
            p.allocate(OwnerTag(0), RequesterId(0)).unwrap();
            assert!(!p.pack_blocks_by_position(5_000));
        }

        #[test]
        fn pack_zero_budget_aborts_without_mutation() {
            let p = pool(8);
            for i in 0..4 {
                let ptr = p.allocate(OwnerTag(i), RequesterId(0)).unwrap();
                assert!(p.set_block_position(ptr, Vec3::new(i as f32 * 500.0, 0.0, 0.0)));
            }
            let before = p.get_stats();
            assert!(!p.pack_blocks_by_position(0));
            assert_eq!(p.get_stats(), before);
            assert!(p.validate().is_empty());
        }

        #[test]
        fn optimize_orders_blocks_by_surface_distance() {
            let p = pool(16);
            let distances = [5.0f32, 1.0, 4.0, 0.5, 3.0];
            for (i, &distance) in distances.iter().enumerate() {
                let ptr = p.allocate(OwnerTag(i as u64), RequesterId(0)).unwrap();
                stamp(ptr, (10.0 * distance) as u8);
                assert!(p.set_distance_from_surface(ptr, distance));
            }

            assert!(p.optimize_narrow_band(5_000));
            assert!(p.validate().is_empty());

            let mut previous = f32::NEG_INFINITY;
            for slot in 0..distances.len() {
                let meta = p.block_metadata(slot).unwrap();
                assert!(meta.allocated);
                assert!(meta.distance_from_surface >= previous);
                previous = meta.distance_from_surface;
                // Data follows its block.
                assert_eq!(
                    first_byte_of_slot(&p, slot),
                    (10.0 * meta.distance_from_surface) as u8
                );
            }
        }

        #[test]
        fn move_next_fragmented_fills_first_gap() {
            let p = pool(8);
            let a = p.allocate(OwnerTag(1), RequesterId(0)).unwrap();
            let b = p.allocate(OwnerTag(2), RequesterId(0)).unwrap();
            let c = p.allocate(OwnerTag(3), RequesterId(0)).unwrap();
            stamp(c, 0x33);
            let _ = a;
            assert!(p.free(b));
            // Layout: A F A — slot 1 is the gap, slot 2 the mover.

            let step = p.move_next_fragmented_allocation().unwrap();
            assert_eq!(step.bytes, 64);
            assert!(p.validate().is_empty());

            let meta = p.block_metadata(1).unwrap();
            assert_eq!(meta.owner, OwnerTag(3));
            assert_eq!(first_byte_of_slot(&p, 1), 0x33);
            assert!(p.block_metadata(2).map(|m| !m.allocated).unwrap());
            assert_eq!(step.new_address, p.block_address(1).unwrap());

            // Now compact: no further step possible.
            assert!(p.move_next_fragmented_allocation().is_none());
        }

        #[test]
        fn move_next_returns_none_for_empty_pool() {
            let p = pool(8);
            assert!(p.move_next_fragmented_allocation().is_none());
        }
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn morton_is_order_preserving_per_axis(
                a in -1e6f32..1e6,
                b in -1e6f32..1e6,
            ) {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                let code_lo = morton_code(Vec3::new(lo, 0.0, 0.0));
                let code_hi = morton_code(Vec3::new(hi, 0.0, 0.0));
                prop_assert!(code_lo <= code_hi);
            }

            #[test]
            fn spread_bits_round_trips_through_mask(v in 0u64..(1 << 21)) {
                let spread = spread_bits(v);
                // No two axes may collide: spread bits occupy every third position.
                prop_assert_eq!(spread & (spread >> 1) & (spread >> 2), 0);
            }
        }
    }
}
