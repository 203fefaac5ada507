//! Aligned raw backing buffer for block storage.
//!
//! [`BlockBuffer`] is the one place in this crate that owns raw memory:
//! a single `alloc_zeroed` allocation at the pool's tier alignment, freed
//! on drop. Everything above it addresses blocks by slot index; the
//! arithmetic from index to pointer lives here and nowhere else.
//!
//! All `unsafe` in this module is bounded by two facts: the buffer owns
//! its allocation exclusively, and every index-derived offset is checked
//! (debug-asserted) against the allocation's extent before use.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::PoolError;

/// An exclusively-owned, aligned, zero-initialized byte buffer.
///
/// Always non-empty: zero-capacity pools carry `Option<BlockBuffer>::None`
/// instead of a dangling allocation.
pub(crate) struct BlockBuffer {
    ptr: NonNull<u8>,
    bytes: usize,
    align: usize,
}

// The buffer owns its allocation; nothing else aliases it.
#[allow(unsafe_code)]
unsafe impl Send for BlockBuffer {}

impl BlockBuffer {
    /// Allocate a zero-filled buffer of `bytes` at `align`.
    ///
    /// `bytes` must be non-zero and `align` a power of two.
    #[allow(unsafe_code)]
    pub fn zeroed(bytes: usize, align: usize) -> Result<Self, PoolError> {
        debug_assert!(bytes > 0);
        let layout = Layout::from_size_align(bytes, align)
            .map_err(|_| PoolError::InvalidLayout { bytes, align })?;
        // SAFETY: layout has non-zero size, validated just above.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(PoolError::AllocationFailed { bytes, align })?;
        Ok(Self { ptr, bytes, align })
    }

    /// Total buffer size in bytes.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Base address of the buffer.
    pub fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Address of the block at `index` for the given stride.
    #[allow(unsafe_code)]
    pub fn block_ptr(&self, index: usize, stride: usize) -> NonNull<u8> {
        let offset = index * stride;
        debug_assert!(offset + stride <= self.bytes);
        // SAFETY: the offset is within this buffer's single allocation.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) }
    }

    /// Zero the block at `index`.
    #[allow(unsafe_code)]
    pub fn zero_block(&mut self, index: usize, stride: usize) {
        let dst = self.block_ptr(index, stride);
        // SAFETY: `block_ptr` guarantees `stride` bytes are in bounds.
        unsafe { std::ptr::write_bytes(dst.as_ptr(), 0, stride) };
    }

    /// Zero the entire buffer.
    #[allow(unsafe_code)]
    pub fn zero_all(&mut self) {
        // SAFETY: writes exactly the owned extent.
        unsafe { std::ptr::write_bytes(self.ptr.as_ptr(), 0, self.bytes) };
    }

    /// Copy one block's bytes from `src` into slot `dst_index` of `self`.
    ///
    /// The two buffers are distinct allocations (scratch rebuilds, grow),
    /// so the ranges never overlap.
    #[allow(unsafe_code)]
    pub fn copy_block_from(
        &mut self,
        src: &BlockBuffer,
        src_index: usize,
        dst_index: usize,
        stride: usize,
    ) {
        let from = src.block_ptr(src_index, stride);
        let to = self.block_ptr(dst_index, stride);
        // SAFETY: both ranges are in bounds of their own allocations and
        // the allocations are distinct.
        unsafe { std::ptr::copy_nonoverlapping(from.as_ptr(), to.as_ptr(), stride) };
    }

    /// Copy one block to another slot within this buffer.
    ///
    /// `src_index != dst_index` is required; fixed-stride slots at
    /// different indices never overlap.
    #[allow(unsafe_code)]
    pub fn copy_block_within(&mut self, src_index: usize, dst_index: usize, stride: usize) {
        debug_assert_ne!(src_index, dst_index);
        let from = self.block_ptr(src_index, stride);
        let to = self.block_ptr(dst_index, stride);
        // SAFETY: distinct slot indices at fixed stride cannot overlap.
        unsafe { std::ptr::copy_nonoverlapping(from.as_ptr(), to.as_ptr(), stride) };
    }

    /// Copy the first `bytes` bytes of `src` into the start of `self`.
    ///
    /// Used by grow/shrink, which preserve the retained prefix verbatim.
    #[allow(unsafe_code)]
    pub fn copy_prefix_from(&mut self, src: &BlockBuffer, bytes: usize) {
        debug_assert!(bytes <= self.bytes && bytes <= src.bytes);
        // SAFETY: prefix length checked against both extents; distinct
        // allocations, so no overlap.
        unsafe { std::ptr::copy_nonoverlapping(src.ptr.as_ptr(), self.ptr.as_ptr(), bytes) };
    }

    /// Whether `ptr` points inside this buffer's extent.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.ptr.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.bytes
    }

    /// Byte offset of `ptr` from the buffer base, if inside the extent.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        if self.contains(ptr) {
            Some(ptr as usize - self.ptr.as_ptr() as usize)
        } else {
            None
        }
    }
}

impl Drop for BlockBuffer {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // Construction validated this exact layout.
        let layout = Layout::from_size_align(self.bytes, self.align)
            .expect("layout was validated at allocation");
        // SAFETY: `ptr` came from `alloc_zeroed` with this layout and is
        // freed exactly once.
        unsafe { dealloc(self.ptr.as_ptr(), layout) };
    }
}

impl std::fmt::Debug for BlockBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockBuffer")
            .field("base", &self.ptr)
            .field("bytes", &self.bytes)
            .field("align", &self.align)
            .finish()
    }
}
