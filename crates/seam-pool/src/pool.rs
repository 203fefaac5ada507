//! The narrow-band block pool.
//!
//! [`BlockPool`] owns one contiguous, tier-aligned backing buffer divided
//! into fixed-stride slots, a 1:1 metadata table, and a free-slot list.
//! Every structural mutation happens under one internal mutex; the only
//! lock-free paths are [`BlockPool::owns_ptr`] and the prefetch hint
//! itself, which are advisory by design.
//!
//! # Address contract
//!
//! Slots are addressed by integer index internally. Addresses returned to
//! callers (`allocate`, [`BlockMove`]) are valid **only until the next
//! structural mutation** — grow, shrink, defragment, either packing
//! operation, reset, or shutdown all reallocate or reorder the buffer.
//! After any of those, re-resolve through [`BlockPool::block_address`] or
//! treat the block as lost. This is a documented contract, not one the
//! type system enforces.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use seam_core::{AccessPattern, MaterialId, OwnerTag, PrecisionTier, RequesterId, SimdClass, Vec3};

use crate::buffer::BlockBuffer;
use crate::config::{round_up, PoolConfig};
use crate::metadata::{BlockMetadata, MetadataTable};
use crate::predict::{prefetch_pass, AccessHistory};
use crate::reorg::TimeBudget;
use crate::simd::{SimdFieldLayout, SimdLayoutTable};
use crate::stats::{PoolCounters, PoolStats, ValidationIssue};

/// Minimum number of blocks added by an allocation-driven grow.
pub(crate) const MIN_GROW_BLOCKS: usize = 32;

/// Minimum free-block margin `shrink()` always preserves.
pub(crate) const MIN_FREE_MARGIN: usize = 32;

/// Every Nth allocation triggers a prefetch pass.
const PREFETCH_PASS_INTERVAL: u64 = 64;

/// Result of a single-step defragmentation move.
///
/// Callers holding the old address use this to fix up their pointers; the
/// addresses obey the usual short-lived contract.
#[derive(Clone, Copy, Debug)]
pub struct BlockMove {
    /// Address the block's data was moved from.
    pub old_address: NonNull<u8>,
    /// Address the block's data now lives at.
    pub new_address: NonNull<u8>,
    /// Number of bytes moved (the pool stride).
    pub bytes: usize,
}

/// Mutable pool state guarded by the pool mutex.
#[derive(Debug)]
pub(crate) struct PoolInner {
    /// Effective block stride in bytes. Fixed once initialized.
    pub(crate) stride: usize,
    /// Caller's requested block size, before rounding. Kept so tier
    /// changes before initialization can re-round.
    pub(crate) requested_block_size: usize,
    pub(crate) tier: PrecisionTier,
    pub(crate) channel_count: u32,
    pub(crate) access_pattern: AccessPattern,
    pub(crate) allow_growth: bool,
    pub(crate) mining_direction: Vec3,
    pub(crate) prefetch_distance: f32,
    pub(crate) initial_capacity: usize,
    pub(crate) initialized: bool,
    /// Current slot capacity. Equals `meta.len()` whenever initialized.
    pub(crate) capacity: usize,
    /// Live allocation count. Maintained incrementally; `validate()`
    /// cross-checks it against the metadata table.
    pub(crate) allocated: usize,
    pub(crate) buf: Option<BlockBuffer>,
    pub(crate) meta: MetadataTable,
    pub(crate) free: Vec<u32>,
    pub(crate) history: AccessHistory,
    pub(crate) simd: SimdLayoutTable,
    pub(crate) epoch: Instant,
    pub(crate) counters: PoolCounters,
    pub(crate) stats_dirty: bool,
    pub(crate) stats_cache: PoolStats,
}

impl PoolInner {
    /// Resolve a caller-supplied address to a slot index.
    ///
    /// Requires the address to fall inside the current buffer and to sit
    /// exactly on a stride boundary.
    pub(crate) fn index_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let buf = self.buf.as_ref()?;
        let offset = buf.offset_of(ptr.as_ptr())?;
        if offset % self.stride != 0 {
            return None;
        }
        let index = offset / self.stride;
        (index < self.capacity).then_some(index)
    }

    /// Append `additional` zeroed slots, reallocating the buffer.
    ///
    /// Returns `false` (state untouched) if the new buffer cannot be
    /// allocated. The old buffer survives until the copy completes, so
    /// there are momentarily two buffers live.
    pub(crate) fn grow_by(&mut self, additional: usize) -> bool {
        if additional == 0 {
            return true;
        }
        let new_capacity = self.capacity + additional;
        let Ok(mut fresh) = BlockBuffer::zeroed(new_capacity * self.stride, self.tier.alignment())
        else {
            return false;
        };
        if let Some(old) = &self.buf {
            fresh.copy_prefix_from(old, self.capacity * self.stride);
        }
        self.buf = Some(fresh);
        self.meta.grow_to(new_capacity);
        // Push descending so the lowest new index pops first.
        self.free
            .extend(((self.capacity as u32)..(new_capacity as u32)).rev());
        self.capacity = new_capacity;
        self.counters.grow_events += 1;
        self.stats_dirty = true;
        true
    }

    /// Remove up to `max_remove` blocks from the contiguous free tail.
    ///
    /// Never reduces the free count below `max(allocated / 4, 32)` and
    /// never touches a slot below the highest allocated index, so no
    /// live block's index is invalidated. Returns the number removed.
    pub(crate) fn shrink_locked(&mut self, max_remove: usize) -> usize {
        if max_remove == 0 || self.capacity == 0 {
            return 0;
        }
        // Margin recomputed from the live count directly, not via stats.
        let margin = (self.allocated / 4).max(MIN_FREE_MARGIN);
        let margin_allowed = self.free.len().saturating_sub(margin);
        if margin_allowed == 0 {
            return 0;
        }

        // Length of the unbroken free run ending at `capacity - 1`.
        let mut tail: Vec<u32> = self.free.clone();
        tail.sort_unstable_by(|a, b| b.cmp(a));
        let mut run = 0usize;
        for (i, &index) in tail.iter().enumerate() {
            if index as usize == self.capacity - 1 - i {
                run += 1;
            } else {
                break;
            }
        }

        let remove = max_remove.min(margin_allowed).min(run);
        if remove == 0 {
            return 0;
        }
        let new_capacity = self.capacity - remove;
        let Ok(mut fresh) = BlockBuffer::zeroed(new_capacity * self.stride, self.tier.alignment())
        else {
            // Allocation failure aborts the shrink; prior state preserved.
            return 0;
        };
        if let Some(old) = &self.buf {
            fresh.copy_prefix_from(old, new_capacity * self.stride);
        }
        self.buf = Some(fresh);
        self.meta.truncate(new_capacity);
        self.free.retain(|&index| (index as usize) < new_capacity);
        self.capacity = new_capacity;
        self.counters.shrink_events += 1;
        self.stats_dirty = true;
        remove
    }
}

/// A fixed-stride, SIMD-aligned block pool for narrow-band voxel samples.
///
/// One pool instance manages one homogeneous kind of block (one channel
/// set at one precision tier). Construction records the configuration;
/// [`initialize`](Self::initialize) allocates the backing storage.
///
/// The pool is `Send + Sync`; every operation takes `&self` and
/// serializes on the internal mutex. See the module docs for the address
/// validity contract.
#[derive(Debug)]
pub struct BlockPool {
    name: String,
    inner: Mutex<PoolInner>,
    /// Published buffer base for the lock-free `owns_ptr` path.
    base: AtomicPtr<u8>,
    /// Published buffer extent in bytes.
    extent_bytes: AtomicUsize,
    /// Published stride for the lock-free boundary check.
    extent_stride: AtomicUsize,
}

impl BlockPool {
    /// Construct an uninitialized pool from a configuration.
    pub fn new(config: PoolConfig) -> Self {
        let stride = config.stride();
        Self {
            name: config.name,
            inner: Mutex::new(PoolInner {
                stride,
                requested_block_size: config.block_size,
                tier: config.tier,
                channel_count: config.channel_count.max(1),
                access_pattern: config.access_pattern,
                allow_growth: config.allow_growth,
                mining_direction: Vec3::ZERO,
                prefetch_distance: config.prefetch_distance,
                initial_capacity: config.initial_capacity,
                initialized: false,
                capacity: 0,
                allocated: 0,
                buf: None,
                meta: MetadataTable::default(),
                free: Vec::new(),
                history: AccessHistory::default(),
                simd: SimdLayoutTable::default(),
                epoch: Instant::now(),
                counters: PoolCounters::default(),
                stats_dirty: true,
                stats_cache: PoolStats::default(),
            }),
            base: AtomicPtr::new(std::ptr::null_mut()),
            extent_bytes: AtomicUsize::new(0),
            extent_stride: AtomicUsize::new(0),
        }
    }

    /// Pool name, as given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Option<MutexGuard<'_, PoolInner>> {
        // A poisoned lock means a panic mid-mutation; treat the pool as
        // unusable rather than propagating the panic.
        self.inner.lock().ok()
    }

    /// Publish the current buffer extent for the lock-free paths.
    fn publish_extent(&self, inner: &PoolInner) {
        let (base, bytes) = match &inner.buf {
            Some(buf) => (buf.base().as_ptr(), buf.bytes()),
            None => (std::ptr::null_mut(), 0),
        };
        self.base.store(base, Ordering::Release);
        self.extent_bytes.store(bytes, Ordering::Release);
        self.extent_stride.store(inner.stride, Ordering::Release);
    }

    /// Allocate backing storage and build the slot bookkeeping.
    ///
    /// Idempotent: returns `true` if already initialized. Returns `false`
    /// only if the underlying buffer allocation fails.
    pub fn initialize(&self) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if inner.initialized {
            return true;
        }
        let capacity = inner.initial_capacity;
        if capacity > 0 {
            match BlockBuffer::zeroed(capacity * inner.stride, inner.tier.alignment()) {
                Ok(buf) => inner.buf = Some(buf),
                Err(_) => return false,
            }
        }
        inner.meta = MetadataTable::new(capacity);
        inner.free = (0..capacity as u32).rev().collect();
        inner.capacity = capacity;
        inner.allocated = 0;
        inner.initialized = true;
        inner.stats_dirty = true;
        self.publish_extent(inner);
        true
    }

    /// Release the backing buffer and all bookkeeping.
    ///
    /// Every outstanding address becomes invalid. Subsequent operations
    /// fail softly until the pool is initialized again.
    pub fn shutdown(&self) {
        let Some(mut guard) = self.lock() else {
            return;
        };
        let inner = &mut *guard;
        inner.buf = None;
        inner.meta = MetadataTable::default();
        inner.free.clear();
        inner.history.clear();
        inner.capacity = 0;
        inner.allocated = 0;
        inner.initialized = false;
        inner.stats_dirty = true;
        self.publish_extent(inner);
    }

    /// Whether the pool currently holds initialized storage.
    pub fn is_initialized(&self) -> bool {
        self.lock().map(|inner| inner.initialized).unwrap_or(false)
    }

    /// Current slot capacity.
    pub fn capacity(&self) -> usize {
        self.lock().map(|inner| inner.capacity).unwrap_or(0)
    }

    /// Effective block stride in bytes.
    pub fn stride(&self) -> usize {
        self.lock().map(|inner| inner.stride).unwrap_or(0)
    }

    /// Allocate one block, tagging it with `owner` and `requester`.
    ///
    /// Pops a free slot (pop order is unspecified), zero-fills it, and
    /// returns its address. If the free list is empty and growth is
    /// permitted, grows by `max(capacity / 4, 32)` first. Returns `None`
    /// — and counts an allocation failure — when no slot can be produced.
    pub fn allocate(&self, owner: OwnerTag, requester: RequesterId) -> Option<NonNull<u8>> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        if !inner.initialized {
            return None;
        }
        if inner.free.is_empty() {
            let grown = inner.allow_growth && {
                let amount = (inner.capacity / 4).max(MIN_GROW_BLOCKS);
                inner.grow_by(amount)
            };
            if !grown {
                inner.counters.allocation_failures += 1;
                inner.stats_dirty = true;
                return None;
            }
            self.publish_extent(inner);
        }
        let index = inner.free.pop()? as usize;

        let timestamp = inner.epoch.elapsed().as_micros() as u64;
        let slot = inner.meta.get_mut(index)?;
        slot.allocated = true;
        slot.owner = owner;
        slot.requester = requester;
        slot.allocated_at_us = timestamp;

        let buf = inner.buf.as_mut()?;
        buf.zero_block(index, inner.stride);

        inner.allocated += 1;
        inner.counters.total_allocations += 1;
        inner.counters.peak_allocated = inner.counters.peak_allocated.max(inner.allocated);
        inner.history.record(index as u32);
        inner.stats_dirty = true;

        if inner.counters.total_allocations % PREFETCH_PASS_INTERVAL == 0 {
            prefetch_pass(
                &inner.history,
                &inner.meta,
                inner.buf.as_ref()?,
                inner.stride,
                inner.mining_direction,
                inner.prefetch_distance,
            );
        }

        Some(inner.buf.as_ref()?.block_ptr(index, inner.stride))
    }

    /// Return a block to the free list.
    ///
    /// Fails — without mutating anything — for addresses outside the
    /// pool, addresses off a stride boundary, and blocks already free.
    pub fn free(&self, ptr: NonNull<u8>) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return false;
        }
        let Some(index) = inner.index_of(ptr) else {
            return false;
        };
        let Some(slot) = inner.meta.get_mut(index) else {
            return false;
        };
        if !slot.allocated {
            return false;
        }
        slot.clear();
        inner.free.push(index as u32);
        inner.allocated -= 1;
        inner.stats_dirty = true;
        true
    }

    /// Lock-free check whether `ptr` lies on a block boundary inside the
    /// pool's current buffer.
    ///
    /// Advisory: this races benignly with concurrent grow/shrink, so the
    /// answer may be stale by the time the caller acts on it.
    pub fn owns_ptr(&self, ptr: NonNull<u8>) -> bool {
        let base = self.base.load(Ordering::Acquire);
        if base.is_null() {
            return false;
        }
        let bytes = self.extent_bytes.load(Ordering::Acquire);
        let stride = self.extent_stride.load(Ordering::Acquire);
        if stride == 0 {
            return false;
        }
        let addr = ptr.as_ptr() as usize;
        let start = base as usize;
        addr >= start && addr < start + bytes && (addr - start) % stride == 0
    }

    /// Address of the allocated block at `index`, for post-mutation
    /// re-resolution. `None` for out-of-range or free slots.
    pub fn block_address(&self, index: usize) -> Option<NonNull<u8>> {
        let guard = self.lock()?;
        let slot = guard.meta.get(index)?;
        if !slot.allocated {
            return None;
        }
        Some(guard.buf.as_ref()?.block_ptr(index, guard.stride))
    }

    /// Copy of the metadata descriptor at `index`.
    pub fn block_metadata(&self, index: usize) -> Option<BlockMetadata> {
        self.lock()?.meta.get(index).copied()
    }

    /// Append `additional` zeroed slots.
    ///
    /// `additional == 0` is a no-op success. Refused when growth is
    /// disabled, unless `force` is set. Existing block bytes are copied
    /// verbatim into the new buffer; all prior addresses are invalidated.
    pub fn grow(&self, additional: usize, force: bool) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return false;
        }
        if additional == 0 {
            return true;
        }
        if !inner.allow_growth && !force {
            return false;
        }
        let grown = inner.grow_by(additional);
        if grown {
            self.publish_extent(inner);
        }
        grown
    }

    /// Remove up to `max_remove` blocks from the contiguous free tail,
    /// returning how many were removed (0 for a constrained no-op).
    pub fn shrink(&self, max_remove: usize) -> usize {
        let Some(mut guard) = self.lock() else {
            return 0;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return 0;
        }
        let removed = inner.shrink_locked(max_remove);
        if removed > 0 {
            self.publish_extent(inner);
        }
        removed
    }

    /// Compact allocated blocks to the front of the buffer, preserving
    /// their relative order, within a wall-clock budget.
    ///
    /// Returns the number of allocated/free transitions observed: at most
    /// 1 after a completed compaction, or the partial count if the budget
    /// expired (in which case nothing was mutated).
    pub fn defragment(&self, max_time_ms: u64) -> usize {
        let Some(mut guard) = self.lock() else {
            return 0;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return 0;
        }
        let budget = TimeBudget::new(max_time_ms);
        let fragments = inner.defragment_locked(&budget);
        self.publish_extent(inner);
        fragments
    }

    /// Reorder allocated blocks into Morton (Z-order) sequence of their
    /// quantized positions, within a wall-clock budget.
    ///
    /// All-or-nothing: on timeout the scratch buffer is discarded and the
    /// pool is untouched. Requires at least two allocated blocks.
    pub fn pack_blocks_by_position(&self, max_time_ms: u64) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return false;
        }
        let budget = TimeBudget::new(max_time_ms);
        let packed = inner.pack_by_position_locked(&budget);
        if packed {
            self.publish_extent(inner);
        }
        packed
    }

    /// Reorder allocated blocks by ascending distance from the material
    /// surface, within a wall-clock budget. Same contract as
    /// [`pack_blocks_by_position`](Self::pack_blocks_by_position).
    pub fn optimize_narrow_band(&self, max_time_ms: u64) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return false;
        }
        let budget = TimeBudget::new(max_time_ms);
        let packed = inner.optimize_narrow_band_locked(&budget);
        if packed {
            self.publish_extent(inner);
        }
        packed
    }

    /// Perform one defragmentation step: move the first allocated block
    /// that sits beyond a free gap into that gap.
    ///
    /// Returns the old/new addresses and size for caller-side pointer
    /// fix-up, or `None` when no such pair exists.
    pub fn move_next_fragmented_allocation(&self) -> Option<BlockMove> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        if !inner.initialized {
            return None;
        }
        let (src, dst) = inner.move_next_fragmented_locked()?;
        let buf = inner.buf.as_ref()?;
        Some(BlockMove {
            old_address: buf.block_ptr(src, inner.stride),
            new_address: buf.block_ptr(dst, inner.stride),
            bytes: inner.stride,
        })
    }

    /// Annotate the block at `ptr` with its world position.
    ///
    /// Called by the zone manager after allocation. Fails for invalid
    /// addresses and free slots.
    pub fn set_block_position(&self, ptr: NonNull<u8>, position: Vec3) -> bool {
        self.update_slot(ptr, |slot| slot.position = position)
    }

    /// Annotate the block at `ptr` with its distance from the surface.
    pub fn set_distance_from_surface(&self, ptr: NonNull<u8>, distance: f32) -> bool {
        self.update_slot(ptr, |slot| slot.distance_from_surface = distance)
    }

    fn update_slot(&self, ptr: NonNull<u8>, apply: impl FnOnce(&mut BlockMetadata)) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return false;
        }
        let Some(index) = inner.index_of(ptr) else {
            return false;
        };
        match inner.meta.get_mut(index) {
            Some(slot) if slot.allocated => {
                apply(slot);
                true
            }
            _ => false,
        }
    }

    /// Record a new advisory access pattern.
    pub fn set_access_pattern(&self, pattern: AccessPattern) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        guard.access_pattern = pattern;
        true
    }

    /// Change the precision tier.
    ///
    /// Before initialization this also re-rounds the stride. Afterwards
    /// the stride is immutable, so the change is accepted only if the new
    /// tier's alignment still divides it.
    pub fn set_precision_tier(&self, tier: PrecisionTier) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if inner.initialized {
            if inner.stride % tier.alignment() != 0 {
                return false;
            }
            inner.tier = tier;
        } else {
            inner.tier = tier;
            inner.stride = round_up(
                inner.requested_block_size.max(PoolConfig::MIN_BLOCK_SIZE),
                tier.alignment(),
            );
        }
        true
    }

    /// Set the number of sample channels per block. Zero is rejected.
    pub fn set_channel_count(&self, channel_count: u32) -> bool {
        if channel_count == 0 {
            return false;
        }
        let Some(mut guard) = self.lock() else {
            return false;
        };
        guard.channel_count = channel_count;
        true
    }

    /// Set the mining-direction hint used by the prefetch heuristic.
    ///
    /// The vector is normalized; zero or non-finite input is rejected.
    pub fn set_mining_direction(&self, direction: Vec3) -> bool {
        let Some(unit) = direction.normalized() else {
            return false;
        };
        let Some(mut guard) = self.lock() else {
            return false;
        };
        guard.mining_direction = unit;
        true
    }

    /// Bytes per sample channel implied by the current tier and channel
    /// count. Used by outer layers when sizing block contents.
    pub fn bytes_per_channel(&self) -> usize {
        self.lock()
            .map(|inner| inner.tier.bytes_per_channel(inner.channel_count))
            .unwrap_or(0)
    }

    /// Register a SIMD field layout for `material`.
    ///
    /// Validates the alignment (power of two, at least 16 bytes), raises
    /// it to the instruction class's minimum if lower, and tracks the
    /// widest class requested across all calls. Fails on invalid input or
    /// an uninitialized pool, with no partial effect.
    pub fn configure_simd_layout(
        &self,
        material: MaterialId,
        alignment: usize,
        vectorized: bool,
        class: SimdClass,
    ) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return false;
        }
        inner.simd.configure(material, alignment, vectorized, class)
    }

    /// Look up the SIMD layout registered for `material`.
    pub fn simd_layout(&self, material: MaterialId) -> Option<SimdFieldLayout> {
        self.lock()?.simd.get(material)
    }

    /// Widest SIMD instruction class requested across all layout calls.
    pub fn widest_simd_class(&self) -> SimdClass {
        self.lock()
            .map(|inner| inner.simd.widest_class())
            .unwrap_or_default()
    }

    /// Aggregate pool statistics, recomputed only when state changed
    /// since the last call.
    pub fn get_stats(&self) -> PoolStats {
        let Some(mut guard) = self.lock() else {
            return PoolStats::default();
        };
        guard.recompute_stats();
        guard.stats_cache.clone()
    }

    /// Cross-check the free list against the metadata table, reporting
    /// every inconsistency found. An empty result means the pool's
    /// invariants hold. Never repairs anything.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        match self.lock() {
            Some(guard) => guard.validate_locked(),
            None => vec![ValidationIssue::LockPoisoned],
        }
    }

    /// Free every block and zero the buffer, keeping capacity and
    /// cumulative counters. Fails only on an uninitialized pool.
    pub fn reset(&self) -> bool {
        let Some(mut guard) = self.lock() else {
            return false;
        };
        let inner = &mut *guard;
        if !inner.initialized {
            return false;
        }
        if let Some(buf) = inner.buf.as_mut() {
            buf.zero_all();
        }
        inner.meta.clear_all();
        inner.free = (0..inner.capacity as u32).rev().collect();
        inner.allocated = 0;
        inner.history.clear();
        inner.stats_dirty = true;
        true
    }
}
