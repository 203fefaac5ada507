//! Per-block metadata and the slot-indexed metadata table.

use seam_core::{OwnerTag, RequesterId, Vec3};

/// Descriptor for one block slot, indexed 1:1 with the backing buffer.
///
/// Mutated only by the owning pool under its lock. `Default` is the
/// cleared (free) state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlockMetadata {
    /// Whether the slot currently holds a live allocation.
    pub allocated: bool,
    /// Opaque tag of the owning subsystem. Diagnostic only.
    pub owner: OwnerTag,
    /// Opaque reference to the requester. Diagnostic only.
    pub requester: RequesterId,
    /// Microseconds since the pool's epoch when the slot was allocated.
    pub allocated_at_us: u64,
    /// World position of the block. Zero means "not yet annotated".
    pub position: Vec3,
    /// Distance from the material surface, in world units.
    pub distance_from_surface: f32,
}

impl BlockMetadata {
    /// Reset to the cleared (free) state.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Slot-indexed table of [`BlockMetadata`] descriptors.
#[derive(Clone, Debug, Default)]
pub(crate) struct MetadataTable {
    slots: Vec<BlockMetadata>,
}

impl MetadataTable {
    /// Create a table of `capacity` cleared descriptors.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![BlockMetadata::default(); capacity],
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Shared access to a slot descriptor.
    pub fn get(&self, index: usize) -> Option<&BlockMetadata> {
        self.slots.get(index)
    }

    /// Exclusive access to a slot descriptor.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut BlockMetadata> {
        self.slots.get_mut(index)
    }

    /// Iterate over all descriptors in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockMetadata> {
        self.slots.iter()
    }

    /// Grow to `new_len` slots, filling with cleared descriptors.
    pub fn grow_to(&mut self, new_len: usize) {
        debug_assert!(new_len >= self.slots.len());
        self.slots.resize(new_len, BlockMetadata::default());
    }

    /// Drop all slots at index `new_len` and beyond.
    pub fn truncate(&mut self, new_len: usize) {
        self.slots.truncate(new_len);
    }

    /// Clear every descriptor in place.
    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }

    /// Number of slots with the allocated flag set.
    pub fn allocated_count(&self) -> usize {
        self.slots.iter().filter(|m| m.allocated).count()
    }

    /// Count of allocated/free adjacency transitions across slot order.
    ///
    /// This is the pool's fragmentation measure: a fully compacted layout
    /// has at most one transition.
    pub fn fragment_transitions(&self) -> usize {
        self.slots
            .windows(2)
            .filter(|w| w[0].allocated != w[1].allocated)
            .count()
    }

    /// Build the post-reorganization table: descriptors for `order` land
    /// in slots `0..order.len()`, the rest are cleared.
    pub fn reordered(&self, order: &[u32]) -> Self {
        let mut slots = vec![BlockMetadata::default(); self.slots.len()];
        for (new_index, &old_index) in order.iter().enumerate() {
            slots[new_index] = self.slots[old_index as usize];
        }
        Self { slots }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_allocated(pattern: &[bool]) -> MetadataTable {
        let mut table = MetadataTable::new(pattern.len());
        for (i, &alloc) in pattern.iter().enumerate() {
            table.get_mut(i).unwrap().allocated = alloc;
        }
        table
    }

    #[test]
    fn new_table_is_cleared() {
        let table = MetadataTable::new(4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.allocated_count(), 0);
        assert!(!table.get(0).unwrap().position.is_set());
    }

    #[test]
    fn fragment_transitions_counts_boundaries() {
        assert_eq!(with_allocated(&[]).fragment_transitions(), 0);
        assert_eq!(with_allocated(&[true, true, true]).fragment_transitions(), 0);
        assert_eq!(
            with_allocated(&[true, true, false, false]).fragment_transitions(),
            1
        );
        assert_eq!(
            with_allocated(&[true, false, true, false]).fragment_transitions(),
            3
        );
        assert_eq!(
            with_allocated(&[false, true, true, false, true]).fragment_transitions(),
            3
        );
    }

    #[test]
    fn reordered_moves_descriptors_to_front() {
        let mut table = with_allocated(&[false, true, false, true]);
        table.get_mut(1).unwrap().distance_from_surface = 1.5;
        table.get_mut(3).unwrap().distance_from_surface = 3.5;

        let packed = table.reordered(&[3, 1]);
        assert_eq!(packed.len(), 4);
        assert_eq!(packed.get(0).unwrap().distance_from_surface, 3.5);
        assert_eq!(packed.get(1).unwrap().distance_from_surface, 1.5);
        assert!(!packed.get(2).unwrap().allocated);
        assert!(!packed.get(3).unwrap().allocated);
        assert_eq!(packed.fragment_transitions(), 1);
    }

    #[test]
    fn grow_to_adds_cleared_slots() {
        let mut table = with_allocated(&[true]);
        table.grow_to(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.allocated_count(), 1);
        assert!(!table.get(2).unwrap().allocated);
    }
}
