//! Access-history tracking and the mining-direction prefetch heuristic.
//!
//! The pool records the last few allocated slot indices in a bounded
//! ring. Every so often (see `pool.rs`) it projects each recent block's
//! position along the configured mining direction and issues cache
//! prefetch hints for allocated blocks near the projected point — the
//! blocks a miner advancing in that direction is likely to touch next.
//!
//! Everything here is best-effort: hints never block, never mutate pool
//! state, and are harmless when stale.

use smallvec::SmallVec;

use seam_core::Vec3;

use crate::buffer::BlockBuffer;
use crate::metadata::MetadataTable;

/// Number of recent allocations remembered for prediction.
pub(crate) const ACCESS_HISTORY_LEN: usize = 32;

/// Upper bound on prefetch hints issued per pass. Keeps a pass cheap even
/// for large pools with tight clusters.
pub(crate) const MAX_PREFETCH_HINTS: usize = 16;

/// Bounded ring of recently allocated slot indices, oldest evicted first.
#[derive(Clone, Debug, Default)]
pub(crate) struct AccessHistory {
    recent: SmallVec<[u32; ACCESS_HISTORY_LEN]>,
    /// Next overwrite position once the ring is full.
    next: usize,
}

impl AccessHistory {
    /// Record a freshly allocated slot index.
    pub fn record(&mut self, index: u32) {
        if self.recent.len() < ACCESS_HISTORY_LEN {
            self.recent.push(index);
        } else {
            self.recent[self.next] = index;
            self.next = (self.next + 1) % ACCESS_HISTORY_LEN;
        }
    }

    /// Iterate over remembered indices (order is not significant).
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.recent.iter().copied()
    }

    /// Forget everything (reset, shutdown, repacking).
    pub fn clear(&mut self) {
        self.recent.clear();
        self.next = 0;
    }
}

/// Issue a read prefetch hint for `ptr`.
///
/// A pure cache hint: no memory is dereferenced.
#[allow(unsafe_code)]
pub(crate) fn prefetch_read(ptr: *const u8) {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: `_mm_prefetch` accepts any address; it neither reads nor
    // writes the pointed-to memory.
    unsafe {
        std::arch::x86_64::_mm_prefetch(ptr.cast::<i8>(), std::arch::x86_64::_MM_HINT_T0);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = ptr;
}

/// Run one prefetch pass over the pool's current state.
///
/// For each remembered index with an annotated position, projects a
/// target point `position + direction * distance` and hints every
/// allocated block within `2 * distance` of it, up to
/// [`MAX_PREFETCH_HINTS`] total. Returns the number of hints issued.
pub(crate) fn prefetch_pass(
    history: &AccessHistory,
    meta: &MetadataTable,
    buf: &BlockBuffer,
    stride: usize,
    direction: Vec3,
    distance: f32,
) -> usize {
    if distance <= 0.0 || !direction.is_set() {
        return 0;
    }
    let radius_sq = (2.0 * distance) * (2.0 * distance);
    let mut issued = 0usize;
    // Collect candidate pointers first so the hint burst is contiguous.
    let mut hints: SmallVec<[*const u8; MAX_PREFETCH_HINTS]> = SmallVec::new();

    'outer: for recent in history.iter() {
        let Some(origin) = meta.get(recent as usize) else {
            continue;
        };
        if !origin.position.is_set() {
            continue;
        }
        let target = origin.position + direction * distance;
        for (index, slot) in meta.iter().enumerate() {
            if !slot.allocated || !slot.position.is_set() {
                continue;
            }
            if slot.position.distance_sq(target) <= radius_sq {
                hints.push(buf.block_ptr(index, stride).as_ptr());
                issued += 1;
                if issued >= MAX_PREFETCH_HINTS {
                    break 'outer;
                }
            }
        }
    }

    for ptr in hints {
        prefetch_read(ptr);
    }
    issued
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_first() {
        let mut history = AccessHistory::default();
        for i in 0..(ACCESS_HISTORY_LEN as u32 + 3) {
            history.record(i);
        }
        let remembered: Vec<u32> = history.iter().collect();
        assert_eq!(remembered.len(), ACCESS_HISTORY_LEN);
        // 0, 1, 2 were evicted by 32, 33, 34.
        assert!(!remembered.contains(&0));
        assert!(!remembered.contains(&2));
        assert!(remembered.contains(&3));
        assert!(remembered.contains(&34));
    }

    #[test]
    fn clear_empties_ring() {
        let mut history = AccessHistory::default();
        history.record(5);
        history.clear();
        assert_eq!(history.iter().count(), 0);
    }

    fn pass_fixture(direction: Vec3, distance: f32) -> usize {
        let stride = 32usize;
        let capacity = 8usize;
        let buf = BlockBuffer::zeroed(capacity * stride, 16).unwrap();
        let mut meta = MetadataTable::new(capacity);
        // Block 0 is the recent allocation at x=0; blocks 1..4 sit further
        // along +x at 100-unit intervals.
        for i in 0..5usize {
            let slot = meta.get_mut(i).unwrap();
            slot.allocated = true;
            slot.position = Vec3::new(i as f32 * 100.0, 1.0, 0.0);
        }
        let mut history = AccessHistory::default();
        history.record(0);
        prefetch_pass(&history, &meta, &buf, stride, direction, distance)
    }

    #[test]
    fn hints_blocks_near_projected_target() {
        // Target = (200, 1, 0); radius 400 covers x in [-200, 600]: all 5.
        let issued = pass_fixture(Vec3::new(1.0, 0.0, 0.0), 200.0);
        assert_eq!(issued, 5);
    }

    #[test]
    fn tight_radius_hints_fewer_blocks() {
        // Target = (60, 1, 0); radius 120 covers x in [-60, 180]: blocks 0 and 1.
        let issued = pass_fixture(Vec3::new(1.0, 0.0, 0.0), 60.0);
        assert_eq!(issued, 2);
    }

    #[test]
    fn zero_direction_is_a_no_op() {
        assert_eq!(pass_fixture(Vec3::ZERO, 200.0), 0);
    }

    #[test]
    fn zero_distance_is_a_no_op() {
        assert_eq!(pass_fixture(Vec3::new(1.0, 0.0, 0.0), 0.0), 0);
    }

    #[test]
    fn pass_caps_hint_count() {
        let stride = 16usize;
        let capacity = 64usize;
        let buf = BlockBuffer::zeroed(capacity * stride, 16).unwrap();
        let mut meta = MetadataTable::new(capacity);
        // Every block clusters around the same point.
        for i in 0..capacity {
            let slot = meta.get_mut(i).unwrap();
            slot.allocated = true;
            slot.position = Vec3::new(10.0, 10.0, 10.0);
        }
        let mut history = AccessHistory::default();
        history.record(0);
        history.record(1);
        let issued = prefetch_pass(
            &history,
            &meta,
            &buf,
            stride,
            Vec3::new(0.0, 1.0, 0.0),
            5.0,
        );
        assert_eq!(issued, MAX_PREFETCH_HINTS);
    }
}
