//! Software emulation implementation for testing and development.
//!
//! This module provides host-side stand-ins for the two collaborators the paging core consumes:
//! a frame allocator backed by an ordinary heap buffer, and an MMU that only records what it is
//! told. Unlike a scale model, the emulation uses the real 32-bit layout (4 KiB frames, 1024-entry
//! tables), so a full identity map needs a little over 4 MiB of emulated memory.

mod mmu;

pub use mmu::EmulatedMmu;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ptr::NonNull;
use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};

use crate::{AllocError, FrameAllocator, PAGE_SIZE, PhysicalAddress};

/// Emulated physical memory for software simulation.
///
/// Physical addresses are byte offsets into one page-aligned host buffer. Blocks are handed out
/// first-fit from previously released blocks, then from a bump cursor, and are zeroed on every
/// allocation. The allocator keeps counters so tests can check exactly what was allocated and
/// released.
pub struct EmulatedMemory {
    /// The underlying memory buffer.
    base: NonNull<u8>,
    layout: Layout,
    /// Next never-used offset.
    next: u32,
    /// Released blocks as `(offset, size)`.
    free: Vec<(u32, u32)>,
    /// Live blocks, keyed by offset.
    live: BTreeMap<u32, u32>,
    allocations: usize,
    releases: usize,
}

impl EmulatedMemory {
    /// Creates a new emulated memory region of the specified size.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero, is not a multiple of the page size, or does not fit in the
    /// 32-bit physical address space.
    pub fn new(size: usize) -> Self {
        assert!(
            size > 0 && size % PAGE_SIZE as usize == 0,
            "emulated memory must be a non-zero number of pages"
        );
        assert!(
            u32::try_from(size).is_ok(),
            "emulated memory exceeds the physical address space"
        );

        let layout = Layout::from_size_align(size, PAGE_SIZE as usize)
            .unwrap_or_else(|_| panic!("invalid emulated memory layout"));
        // SAFETY: The layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout));

        Self {
            base,
            layout,
            next: 0,
            free: Vec::new(),
            live: BTreeMap::new(),
            allocations: 0,
            releases: 0,
        }
    }

    /// Returns the size of the emulated memory region.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Returns the number of successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Returns the number of releases so far.
    pub fn releases(&self) -> usize {
        self.releases
    }

    /// Returns the number of blocks currently allocated.
    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    /// Returns whether `block` is the start of a currently allocated block.
    pub fn is_live(&self, block: PhysicalAddress) -> bool {
        self.live.contains_key(&block.as_u32())
    }

    /// Takes the first released block that can hold `size` bytes, splitting off any remainder.
    fn take_free(&mut self, size: u32) -> Option<u32> {
        let index = self.free.iter().position(|&(_, len)| len >= size)?;
        let (offset, len) = self.free.swap_remove(index);
        if len > size {
            self.free.push((offset + size, len - size));
        }
        Some(offset)
    }

    /// Bumps the cursor by `size` bytes if the region still has room.
    fn take_fresh(&mut self, size: u32) -> Option<u32> {
        let end = self.next.checked_add(size)?;
        if end as usize > self.size() {
            return None;
        }
        let offset = self.next;
        self.next = end;
        Some(offset)
    }
}

// SAFETY: Blocks are disjoint, page-aligned, zeroed ranges of the host buffer, which is only
// reachable through `translate`. Addresses outside the buffer or off a page boundary panic.
unsafe impl FrameAllocator for EmulatedMemory {
    fn allocate_zeroed(&mut self, size: usize) -> Result<PhysicalAddress, AllocError> {
        let size = u32::try_from(size)
            .ok()
            .filter(|&size| size > 0)
            .and_then(|size| size.checked_next_multiple_of(PAGE_SIZE))
            .ok_or(AllocError::InvalidSize)?;

        let offset = self
            .take_free(size)
            .or_else(|| self.take_fresh(size))
            .ok_or(AllocError::OutOfMemory)?;

        // SAFETY: `offset..offset + size` lies inside the buffer and is not part of any live block.
        unsafe {
            self.base
                .as_ptr()
                .add(offset as usize)
                .write_bytes(0, size as usize);
        }

        self.live.insert(offset, size);
        self.allocations += 1;
        Ok(PhysicalAddress::new(offset))
    }

    fn release(&mut self, block: PhysicalAddress) {
        let Some(size) = self.live.remove(&block.as_u32()) else {
            panic!("release of {} which is not an allocated block", block);
        };
        self.free.push((block.as_u32(), size));
        self.releases += 1;
    }

    fn translate(&self, block: PhysicalAddress) -> *mut u8 {
        assert!(
            block.as_usize() < self.size(),
            "physical address {} is outside emulated memory",
            block
        );
        assert!(
            block.is_page_aligned(),
            "physical address {} is not a frame address",
            block
        );
        // SAFETY: The offset was just checked to start a whole page inside the buffer.
        unsafe { self.base.as_ptr().add(block.as_usize()) }
    }
}

impl Drop for EmulatedMemory {
    fn drop(&mut self) {
        // SAFETY: `base` was allocated in `new` with exactly this layout.
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}
