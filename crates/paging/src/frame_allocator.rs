//! Interface to the allocator that supplies physical memory to the paging core.

use crate::{AllocError, PhysicalAddress};

/// Source of zero-filled, page-aligned physical memory blocks.
///
/// The paging core never allocates memory itself; every directory and page table it builds is
/// obtained here and handed back through [`FrameAllocator::release`]. Table frames are read and
/// written through [`FrameAllocator::translate`] from safe functions such as
/// [`AddressSpace::lookup`](crate::AddressSpace::lookup), so the memory safety of the whole crate
/// rests on the guarantees below.
///
/// An address space must be used with the allocator that built it. Handing it a different one is
/// memory-safe under these guarantees but yields meaningless entries or a panic.
///
/// # Safety
///
/// Implementors guarantee that:
///
/// - `allocate_zeroed` returns a block of at least `size` bytes that starts on a page boundary,
///   is filled with zeroes and overlaps no other live block.
/// - For every live block, `translate` returns a page-aligned pointer valid for reads and writes
///   of the whole block, and that memory is not accessed except through `translate` until the
///   block is released.
/// - For any other page-aligned address, `translate` either panics or returns a pointer with the
///   same guarantees for one page.
///
/// Relying on the default `translate` asserts that every such physical address is mapped at the
/// same linear address in the running code.
pub unsafe trait FrameAllocator {
    /// Allocates a zero-filled block of at least `size` bytes, aligned to a page boundary.
    fn allocate_zeroed(&mut self, size: usize) -> Result<PhysicalAddress, AllocError>;

    /// Returns a block previously obtained from [`FrameAllocator::allocate_zeroed`].
    fn release(&mut self, block: PhysicalAddress);

    /// Translates a physical block address into a pointer usable by the running code.
    ///
    /// The default is the identity translation used while the kernel still runs on physical
    /// addresses (or through a full identity map).
    fn translate(&self, block: PhysicalAddress) -> *mut u8 {
        block.as_usize() as *mut u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AddressSpace, ENTRY_COUNT, EmulatedMemory, EntryFlags, PAGE_SIZE, PageTable,
        VirtualAddress, build_table,
    };

    const PAGE: usize = PAGE_SIZE as usize;

    /// Physical addresses this far above the emulated buffer offsets.
    const WINDOW: u32 = 0x1000_0000;

    /// Emulated memory that reports its blocks at a fixed physical window.
    struct Windowed(EmulatedMemory);

    // SAFETY: Every block maps one-to-one onto an `EmulatedMemory` block, which upholds the
    // contract, and addresses outside the window panic.
    unsafe impl FrameAllocator for Windowed {
        fn allocate_zeroed(&mut self, size: usize) -> Result<PhysicalAddress, AllocError> {
            let block = self.0.allocate_zeroed(size)?;
            block.checked_add(WINDOW).ok_or(AllocError::OutOfMemory)
        }

        fn release(&mut self, block: PhysicalAddress) {
            self.0.release(shift_down(block));
        }

        fn translate(&self, block: PhysicalAddress) -> *mut u8 {
            self.0.translate(shift_down(block))
        }
    }

    fn shift_down(block: PhysicalAddress) -> PhysicalAddress {
        match block.checked_sub(WINDOW) {
            Some(offset) => offset,
            None => panic!("{} is below the physical window", block),
        }
    }

    #[test]
    fn tables_are_reached_through_translate() {
        let mut mem = Windowed(EmulatedMemory::new(PAGE));
        let phys = build_table(&mut mem, PhysicalAddress::new(0x0040_0000), EntryFlags::PRESENT)
            .unwrap();
        assert_eq!(phys, PhysicalAddress::new(WINDOW));

        // SAFETY: `phys` is the live table just built.
        let table = unsafe { PageTable::at(&mem, phys) };
        assert_eq!(table.entry(3).address(), PhysicalAddress::new(0x0040_3000));
    }

    #[test]
    fn space_works_through_non_identity_translation() {
        let mut mem = Windowed(EmulatedMemory::new((ENTRY_COUNT + 1) * PAGE));
        let mut space =
            AddressSpace::build_identity(&mut mem, EntryFlags::PRESENT | EntryFlags::WRITABLE)
                .unwrap();
        let virt = VirtualAddress::new(0x0080_0000);

        space
            .map(&mem, virt, PhysicalAddress::new(0x9000), EntryFlags::PRESENT)
            .unwrap();
        assert_eq!(
            space.lookup(&mem, virt).unwrap().address(),
            PhysicalAddress::new(0x9000)
        );

        space.release(&mut mem).unwrap();
        assert_eq!(mem.0.live_blocks(), 0);
    }

    #[test]
    #[should_panic(expected = "outside emulated memory")]
    fn foreign_allocator_panics_instead_of_reading_stray_memory() {
        let mut mem = EmulatedMemory::new((ENTRY_COUNT + 2) * PAGE);
        // Push the directory off frame zero so the small region cannot hold it.
        mem.allocate_zeroed(PAGE).unwrap();
        let space =
            AddressSpace::build_identity(&mut mem, EntryFlags::PRESENT).unwrap();

        let foreign = EmulatedMemory::new(PAGE);
        let _ = space.lookup(&foreign, VirtualAddress::new(0x1000));
    }
}
