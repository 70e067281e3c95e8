//! Address space management.
//!
//! An [`AddressSpace`] owns one directory and the 1024 page tables reachable from it. It is built
//! eagerly as a full identity map of the 4 GiB linear space, mutated one entry at a time, and torn
//! down through [`PagingContext::destroy`](crate::PagingContext::destroy), which refuses to
//! release the space the MMU is currently using.

use core::mem::size_of;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    ENTRY_COUNT, EntryFlags, FrameAllocator, PAGE_SIZE, PageEntry, PageTable, PagingError,
    PhysicalAddress, TABLE_SPAN, VirtualAddress, table::build_table,
};

/// Handle to one two-level translation structure.
///
/// The handle owns its directory and tables exclusively; two handles never share a frame. Once
/// destroyed, every operation on the handle fails with [`PagingError::InvalidHandle`].
pub struct AddressSpace {
    /// Physical address of the directory, or `None` once the space has been destroyed.
    directory: Option<PhysicalAddress>,
    /// Id of the context that last installed this space, or zero if it never was.
    installed_by: AtomicUsize,
}

impl AddressSpace {
    /// Builds an identity map of the whole 4 GiB linear space.
    ///
    /// Directory slot `i` points at a table mapping the physical window starting at
    /// `i * TABLE_SPAN`, so every linear page translates to the physical page with the same
    /// address. Table entries carry `flags`; directory entries carry `flags` with
    /// [`EntryFlags::WRITABLE`] forced on, leaving write permission to be decided per page.
    ///
    /// If the allocator runs dry part way through, every table built so far and the directory are
    /// released before the error is returned.
    pub fn build_identity<A: FrameAllocator + ?Sized>(
        allocator: &mut A,
        flags: EntryFlags,
    ) -> Result<Self, PagingError> {
        let directory = allocator.allocate_zeroed(size_of::<PageTable>())?;

        let mut filled = 0;
        if let Err(err) = populate_identity(allocator, directory, flags, &mut filled) {
            log::error!(
                "identity map failed at directory slot {}: {}; releasing {} tables",
                filled,
                err,
                filled
            );
            release_tables(allocator, directory, filled);
            allocator.release(directory);
            return Err(err);
        }

        log::debug!("built identity address space with directory at {}", directory);
        Ok(Self {
            directory: Some(directory),
            installed_by: AtomicUsize::new(0),
        })
    }

    /// Returns the physical address of the directory.
    pub fn directory(&self) -> Result<PhysicalAddress, PagingError> {
        self.directory.ok_or(PagingError::InvalidHandle)
    }

    /// Returns whether this handle has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.directory.is_none()
    }

    /// Records that the context with id `context` installed this space.
    pub(crate) fn mark_installed(&self, context: usize) {
        self.installed_by.store(context, Ordering::Relaxed);
    }

    /// Returns the id of the context that last installed this space, if any.
    pub(crate) fn installed_by(&self) -> Option<usize> {
        match self.installed_by.load(Ordering::Relaxed) {
            0 => None,
            context => Some(context),
        }
    }

    /// Overwrites the table entry that translates `virt` with `entry`, verbatim.
    ///
    /// This is a raw poke: the directory entry is followed whether or not it is present, no table
    /// is allocated, and a previous mapping is silently replaced. Flushing any stale translation
    /// the MMU may have cached is the caller's job.
    pub fn set_mapping<A: FrameAllocator + ?Sized>(
        &mut self,
        allocator: &A,
        virt: VirtualAddress,
        entry: PageEntry,
    ) -> Result<(), PagingError> {
        let directory = self.directory()?;
        let indices = virt.indices()?;

        // SAFETY: The directory is live and owned by this space.
        let table_phys = unsafe { PageTable::at(allocator, directory) }
            .entry(indices.directory)
            .address();
        // SAFETY: Entry addresses are page-aligned and the directory view above has ended. Every
        // directory slot was pointed at a table owned by this space when it was built, and
        // directory entries are never rewritten afterwards.
        let table = unsafe { PageTable::at_mut(allocator, table_phys) };
        *table.entry_mut(indices.table) = entry;

        #[cfg(feature = "detailed-logging")]
        log::trace!("{} -> {:?} (directory {})", virt, entry, directory);

        Ok(())
    }

    /// Maps the page at `virt` to the frame at `phys` with `flags`.
    ///
    /// Both addresses must be page-aligned; nothing is written if either is not.
    pub fn map<A: FrameAllocator + ?Sized>(
        &mut self,
        allocator: &A,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        flags: EntryFlags,
    ) -> Result<(), PagingError> {
        let entry = PageEntry::encode(phys, flags)?;
        self.set_mapping(allocator, virt, entry)
    }

    /// Maps `pages` consecutive pages starting at `virt` onto consecutive frames starting at
    /// `phys`.
    ///
    /// Alignment and range are checked for the whole run before the first entry is written, so a
    /// rejected call leaves the space untouched.
    pub fn map_range<A: FrameAllocator + ?Sized>(
        &mut self,
        allocator: &A,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        pages: usize,
        flags: EntryFlags,
    ) -> Result<(), PagingError> {
        self.directory()?;
        virt.require_page_aligned()?;
        phys.require_page_aligned()?;
        PageEntry::encode(phys, flags)?;

        let Some(last) = pages.checked_sub(1) else {
            return Ok(());
        };
        let span = u32::try_from(last)
            .ok()
            .and_then(|last| last.checked_mul(PAGE_SIZE))
            .ok_or(PagingError::RangeOverflow)?;
        virt.checked_add(span).ok_or(PagingError::RangeOverflow)?;
        phys.checked_add(span).ok_or(PagingError::RangeOverflow)?;

        for page in 0..=last {
            let offset = page as u32 * PAGE_SIZE;
            let (Some(page_virt), Some(page_phys)) =
                (virt.checked_add(offset), phys.checked_add(offset))
            else {
                return Err(PagingError::RangeOverflow);
            };
            self.map(allocator, page_virt, page_phys, flags)?;
        }

        Ok(())
    }

    /// Returns the table entry that translates `virt`.
    pub fn lookup<A: FrameAllocator + ?Sized>(
        &self,
        allocator: &A,
        virt: VirtualAddress,
    ) -> Result<PageEntry, PagingError> {
        let directory = self.directory()?;
        let indices = virt.indices()?;

        // SAFETY: The directory is live and owned by this space.
        let table_phys = unsafe { PageTable::at(allocator, directory) }
            .entry(indices.directory)
            .address();
        // SAFETY: See `set_mapping`.
        let table = unsafe { PageTable::at(allocator, table_phys) };
        Ok(table.entry(indices.table))
    }

    /// Releases every table and then the directory, invalidating the handle.
    ///
    /// Callers go through [`PagingContext::destroy`](crate::PagingContext::destroy), which first
    /// makes sure the space is not installed in the MMU.
    pub(crate) fn release<A: FrameAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
    ) -> Result<(), PagingError> {
        let directory = self.directory.take().ok_or(PagingError::InvalidHandle)?;
        release_tables(allocator, directory, ENTRY_COUNT);
        allocator.release(directory);

        log::debug!("destroyed address space with directory at {}", directory);
        Ok(())
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if let Some(directory) = self.directory {
            log::warn!(
                "address space with directory at {} dropped without being destroyed; leaking {} frames",
                directory,
                ENTRY_COUNT + 1
            );
        }
    }
}

/// Fills every directory slot with a freshly built identity-mapping table.
///
/// `filled` counts the slots completed so far, so the caller knows what to roll back on failure.
fn populate_identity<A: FrameAllocator + ?Sized>(
    allocator: &mut A,
    directory: PhysicalAddress,
    flags: EntryFlags,
    filled: &mut usize,
) -> Result<(), PagingError> {
    let directory_flags = flags | EntryFlags::WRITABLE;

    for index in 0..ENTRY_COUNT {
        let base = PhysicalAddress::new(index as u32 * TABLE_SPAN);
        let table = build_table(allocator, base, flags)?;
        let entry = match PageEntry::encode(table, directory_flags) {
            Ok(entry) => entry,
            Err(err) => {
                allocator.release(table);
                return Err(err);
            }
        };

        // SAFETY: The directory was allocated by the caller for this space alone.
        let dir = unsafe { PageTable::at_mut(allocator, directory) };
        *dir.entry_mut(index) = entry;
        *filled += 1;
    }

    Ok(())
}

/// Releases the tables referenced by the first `count` directory slots.
///
/// Table addresses are recovered by masking off the flag field of each directory entry.
fn release_tables<A: FrameAllocator + ?Sized>(
    allocator: &mut A,
    directory: PhysicalAddress,
    count: usize,
) {
    for index in 0..count {
        // SAFETY: The directory is live until the caller releases it after this loop.
        let table = unsafe { PageTable::at(allocator, directory) }
            .entry(index)
            .address();
        allocator.release(table);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{AllocError, EmulatedMemory};

    const PAGE: usize = PAGE_SIZE as usize;

    /// Enough emulated memory for two complete identity maps.
    pub(crate) fn memory() -> EmulatedMemory {
        EmulatedMemory::new(2 * (ENTRY_COUNT + 1) * PAGE)
    }

    fn kernel_flags() -> EntryFlags {
        EntryFlags::PRESENT | EntryFlags::WRITABLE
    }

    /// Tears a space down directly so tests here don't need a context.
    fn teardown(mut space: AddressSpace, mem: &mut EmulatedMemory) {
        space.release(mem).unwrap();
    }

    mod build {
        use super::*;

        #[test]
        fn allocates_directory_and_all_tables() {
            let mut mem = memory();
            let space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();

            assert_eq!(mem.allocations(), ENTRY_COUNT + 1);
            assert_eq!(mem.live_blocks(), ENTRY_COUNT + 1);
            assert!(mem.is_live(space.directory().unwrap()));
            teardown(space, &mut mem);
        }

        #[test]
        fn identity_map_covers_every_page() {
            let mut mem = memory();
            let space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();

            for page in 0..(ENTRY_COUNT * ENTRY_COUNT) as u32 {
                let addr = page * PAGE_SIZE;
                let entry = space.lookup(&mem, VirtualAddress::new(addr)).unwrap();
                assert_eq!(entry.address(), PhysicalAddress::new(addr));
            }
            teardown(space, &mut mem);
        }

        #[test]
        fn table_entries_carry_requested_flags() {
            let mut mem = memory();
            let flags = EntryFlags::PRESENT | EntryFlags::USER;
            let space = AddressSpace::build_identity(&mut mem, flags).unwrap();

            let entry = space
                .lookup(&mem, VirtualAddress::new(0x00C0_5000))
                .unwrap();
            assert_eq!(entry.flags(), Ok(flags));
            teardown(space, &mut mem);
        }

        #[test]
        fn directory_entries_force_writable() {
            let mut mem = memory();
            let space = AddressSpace::build_identity(&mut mem, EntryFlags::PRESENT).unwrap();

            // SAFETY: The directory is live for the duration of this view.
            let dir = unsafe { PageTable::at(&mem, space.directory().unwrap()) };
            for entry in dir.iter() {
                assert_eq!(
                    entry.flags(),
                    Ok(EntryFlags::PRESENT | EntryFlags::WRITABLE)
                );
                assert!(mem.is_live(entry.address()));
            }

            let page = space.lookup(&mem, VirtualAddress::new(0x1000)).unwrap();
            assert_eq!(page.flags(), Ok(EntryFlags::PRESENT));
            teardown(space, &mut mem);
        }

        #[test]
        fn rolls_back_on_allocation_failure() {
            // Room for the directory and ten tables only.
            let mut mem = EmulatedMemory::new(11 * PAGE);
            let result = AddressSpace::build_identity(&mut mem, kernel_flags());

            assert!(matches!(
                result,
                Err(PagingError::Alloc(AllocError::OutOfMemory))
            ));
            assert_eq!(mem.allocations(), 11);
            assert_eq!(mem.releases(), 11);
            assert_eq!(mem.live_blocks(), 0);
        }

        #[test]
        fn fails_cleanly_without_room_for_directory() {
            let mut mem = EmulatedMemory::new(PAGE);
            mem.allocate_zeroed(PAGE).unwrap();

            assert!(matches!(
                AddressSpace::build_identity(&mut mem, kernel_flags()),
                Err(PagingError::Alloc(AllocError::OutOfMemory))
            ));
            assert_eq!(mem.live_blocks(), 1);
        }

        #[test]
        fn spaces_share_no_frames() {
            let mut mem = memory();
            let first = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let second = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();

            assert_ne!(first.directory().unwrap(), second.directory().unwrap());
            // SAFETY: Both directories are live for the duration of these views.
            let (a, b) = unsafe {
                (
                    PageTable::at(&mem, first.directory().unwrap()),
                    PageTable::at(&mem, second.directory().unwrap()),
                )
            };
            for index in 0..ENTRY_COUNT {
                assert_ne!(a.entry(index).address(), b.entry(index).address());
            }

            teardown(first, &mut mem);
            teardown(second, &mut mem);
        }
    }

    mod mutate {
        use super::*;

        #[test]
        fn set_mapping_replaces_entry_verbatim() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0x0040_0000);

            assert_eq!(
                space.lookup(&mem, virt).unwrap().address(),
                PhysicalAddress::new(0x0040_0000)
            );

            let entry = PageEntry::encode(PhysicalAddress::new(0x9000), kernel_flags()).unwrap();
            space.set_mapping(&mem, virt, entry).unwrap();

            assert_eq!(space.lookup(&mem, virt).unwrap(), entry);
            assert_eq!(
                space.lookup(&mem, virt + PAGE_SIZE).unwrap().address(),
                PhysicalAddress::new(0x0040_1000)
            );
            teardown(space, &mut mem);
        }

        #[test]
        fn set_mapping_writes_raw_values() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0x0000_2000);

            // Not present, and with bits outside the flag vocabulary.
            space
                .set_mapping(&mem, virt, PageEntry::from_raw(0x0001_2100))
                .unwrap();
            assert_eq!(space.lookup(&mem, virt).unwrap().as_u32(), 0x0001_2100);
            teardown(space, &mut mem);
        }

        #[test]
        fn misaligned_addresses_are_rejected_without_mutation() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let entry = PageEntry::from_raw(0x9003);

            for raw in [0x0040_0001, 0x0040_0800, 0x0040_0FFF] {
                let virt = VirtualAddress::new(raw);
                assert_eq!(
                    space.set_mapping(&mem, virt, entry),
                    Err(PagingError::Misaligned(raw))
                );
                assert_eq!(space.lookup(&mem, virt), Err(PagingError::Misaligned(raw)));
            }

            assert_eq!(
                space
                    .lookup(&mem, VirtualAddress::new(0x0040_0000))
                    .unwrap()
                    .address(),
                PhysicalAddress::new(0x0040_0000)
            );
            teardown(space, &mut mem);
        }

        #[test]
        fn map_encodes_then_sets() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0xC000_0000);
            let flags = EntryFlags::PRESENT | EntryFlags::USER;

            space
                .map(&mem, virt, PhysicalAddress::new(0x0010_0000), flags)
                .unwrap();

            let entry = space.lookup(&mem, virt).unwrap();
            assert_eq!(entry.address(), PhysicalAddress::new(0x0010_0000));
            assert_eq!(entry.flags(), Ok(flags));
            teardown(space, &mut mem);
        }

        #[test]
        fn map_rejects_misaligned_frame() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0x5000);

            assert_eq!(
                space.map(&mem, virt, PhysicalAddress::new(0x9008), kernel_flags()),
                Err(PagingError::Misaligned(0x9008))
            );
            assert_eq!(
                space.lookup(&mem, virt).unwrap().address(),
                PhysicalAddress::new(0x5000)
            );
            teardown(space, &mut mem);
        }

        #[test]
        fn map_range_crosses_table_boundary() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0x003F_E000);
            let phys = PhysicalAddress::new(0x0800_0000);

            space.map_range(&mem, virt, phys, 4, kernel_flags()).unwrap();

            for page in 0..4 {
                let offset = page * PAGE_SIZE;
                assert_eq!(
                    space.lookup(&mem, virt + offset).unwrap().address(),
                    phys + offset
                );
            }
            assert_eq!(
                space.lookup(&mem, virt + 4 * PAGE_SIZE).unwrap().address(),
                PhysicalAddress::new(0x0040_2000)
            );
            teardown(space, &mut mem);
        }

        #[test]
        fn map_range_of_zero_pages_is_a_no_op() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0x7000);

            space
                .map_range(&mem, virt, PhysicalAddress::new(0x9000), 0, kernel_flags())
                .unwrap();
            assert_eq!(
                space.lookup(&mem, virt).unwrap().address(),
                PhysicalAddress::new(0x7000)
            );
            teardown(space, &mut mem);
        }

        #[test]
        fn map_range_past_end_of_space_writes_nothing() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0xFFFF_E000);

            assert_eq!(
                space.map_range(&mem, virt, PhysicalAddress::new(0x9000), 3, kernel_flags()),
                Err(PagingError::RangeOverflow)
            );
            assert_eq!(
                space.lookup(&mem, virt).unwrap().address(),
                PhysicalAddress::new(0xFFFF_E000)
            );
            teardown(space, &mut mem);
        }

        #[test]
        fn map_range_rejects_misaligned_start() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();

            assert_eq!(
                space.map_range(
                    &mem,
                    VirtualAddress::new(0x1010),
                    PhysicalAddress::new(0x9000),
                    2,
                    kernel_flags()
                ),
                Err(PagingError::Misaligned(0x1010))
            );
            teardown(space, &mut mem);
        }

        #[test]
        fn mutating_one_space_leaves_another_untouched() {
            let mut mem = memory();
            let mut first = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let second = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let virt = VirtualAddress::new(0x0040_0000);

            first
                .map(&mem, virt, PhysicalAddress::new(0x9000), kernel_flags())
                .unwrap();

            assert_eq!(
                first.lookup(&mem, virt).unwrap().address(),
                PhysicalAddress::new(0x9000)
            );
            assert_eq!(
                second.lookup(&mem, virt).unwrap().address(),
                PhysicalAddress::new(0x0040_0000)
            );

            teardown(first, &mut mem);
            teardown(second, &mut mem);
        }
    }

    mod release {
        use super::*;

        #[test]
        fn releases_every_frame_exactly_once() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            let directory = space.directory().unwrap();

            space.release(&mut mem).unwrap();

            assert_eq!(mem.releases(), ENTRY_COUNT + 1);
            assert_eq!(mem.live_blocks(), 0);
            assert!(!mem.is_live(directory));
            assert!(space.is_destroyed());
        }

        #[test]
        fn released_handle_is_invalid() {
            let mut mem = memory();
            let mut space = AddressSpace::build_identity(&mut mem, kernel_flags()).unwrap();
            space.release(&mut mem).unwrap();

            let virt = VirtualAddress::new(0x1000);
            assert_eq!(space.directory(), Err(PagingError::InvalidHandle));
            assert_eq!(space.lookup(&mem, virt), Err(PagingError::InvalidHandle));
            assert_eq!(
                space.set_mapping(&mem, virt, PageEntry::from_raw(0x9003)),
                Err(PagingError::InvalidHandle)
            );
            assert_eq!(
                space.map_range(&mem, virt, PhysicalAddress::new(0x9000), 1, kernel_flags()),
                Err(PagingError::InvalidHandle)
            );
            assert_eq!(space.release(&mut mem), Err(PagingError::InvalidHandle));
            assert_eq!(mem.releases(), ENTRY_COUNT + 1);
        }
    }
}
