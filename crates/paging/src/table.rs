//! Page table structure and the table builder.

use core::mem::size_of;

use crate::{
    ENTRY_COUNT, EntryFlags, FrameAllocator, PAGE_SIZE, PageEntry, PagingError, PhysicalAddress,
};

/// A page table or directory: exactly 1024 entries filling one page-aligned frame.
///
/// The same layout serves both levels of the hierarchy. In a directory each entry points at a
/// page table; in a page table each entry points at a data page.
#[repr(C, align(4096))]
pub struct PageTable {
    /// The entries in this page table.
    entries: [PageEntry; ENTRY_COUNT],
}

const _: () = assert!(size_of::<PageTable>() == PAGE_SIZE as usize);

impl PageTable {
    /// Returns the entry at the given index.
    ///
    /// # Panics
    /// Panics if index >= 1024.
    pub fn entry(&self, index: usize) -> PageEntry {
        assert!(index < ENTRY_COUNT, "page table index out of bounds");
        self.entries[index]
    }

    /// Returns a mutable reference to the entry at the given index.
    ///
    /// # Panics
    /// Panics if index >= 1024.
    pub fn entry_mut(&mut self, index: usize) -> &mut PageEntry {
        assert!(index < ENTRY_COUNT, "page table index out of bounds");
        &mut self.entries[index]
    }

    /// Iterates over all entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = PageEntry> + '_ {
        self.entries.iter().copied()
    }

    /// Returns the number of entries in this page table.
    pub const fn len(&self) -> usize {
        ENTRY_COUNT
    }

    /// Views the table stored in the frame at `phys`.
    ///
    /// # Safety
    ///
    /// `phys` must be page-aligned, and no mutable reference to the same frame may exist for
    /// `'a`. The [`FrameAllocator`] contract then makes the translated pointer valid for a whole
    /// table, or panics. The contents are only meaningful if `phys` is a table built with
    /// `allocator`.
    pub(crate) unsafe fn at<'a, A: FrameAllocator + ?Sized>(
        allocator: &A,
        phys: PhysicalAddress,
    ) -> &'a PageTable {
        let ptr = allocator.translate(phys).cast::<PageTable>();
        debug_assert!(ptr.is_aligned(), "table frame is not page-aligned");
        // SAFETY: Guaranteed by the caller.
        unsafe { &*ptr }
    }

    /// Mutably views the table stored in the frame at `phys`.
    ///
    /// # Safety
    ///
    /// `phys` must be page-aligned, and no other reference to the same frame may exist for `'a`.
    /// See [`PageTable::at`].
    pub(crate) unsafe fn at_mut<'a, A: FrameAllocator + ?Sized>(
        allocator: &A,
        phys: PhysicalAddress,
    ) -> &'a mut PageTable {
        let ptr = allocator.translate(phys).cast::<PageTable>();
        debug_assert!(ptr.is_aligned(), "table frame is not page-aligned");
        // SAFETY: Guaranteed by the caller.
        unsafe { &mut *ptr }
    }
}

/// Allocates a page table mapping 1024 consecutive physical pages starting at `base`.
///
/// Entry `b` of the new table points at `base + b * PAGE_SIZE` with `flags`. The table does not
/// know which linear range it serves; that is decided by the directory slot that points at it.
///
/// Returns the physical address of the new table. `base` must be page-aligned and the whole run
/// must fit below 4 GiB; both are checked before anything is allocated.
pub fn build_table<A: FrameAllocator + ?Sized>(
    allocator: &mut A,
    base: PhysicalAddress,
    flags: EntryFlags,
) -> Result<PhysicalAddress, PagingError> {
    let base = base.require_page_aligned()?;
    base.checked_add((ENTRY_COUNT as u32 - 1) * PAGE_SIZE)
        .ok_or(PagingError::RangeOverflow)?;

    let table_phys = allocator.allocate_zeroed(size_of::<PageTable>())?;

    // SAFETY: The frame was just allocated for this table and nothing else refers to it.
    let table = unsafe { PageTable::at_mut(allocator, table_phys) };
    for (index, entry) in table.entries.iter_mut().enumerate() {
        let encoded = base
            .checked_add(index as u32 * PAGE_SIZE)
            .ok_or(PagingError::RangeOverflow)
            .and_then(|frame| PageEntry::encode(frame, flags));
        match encoded {
            Ok(encoded) => *entry = encoded,
            Err(err) => {
                allocator.release(table_phys);
                return Err(err);
            }
        }
    }

    #[cfg(feature = "detailed-logging")]
    log::trace!("page table at {} maps {} with {:?}", table_phys, base, flags);

    Ok(table_phys)
}
