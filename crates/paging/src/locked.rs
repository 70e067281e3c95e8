//! Serialized access to an address space shared between execution contexts.

use spin::{Mutex, MutexGuard};

use crate::{
    AddressSpace, EntryFlags, FrameAllocator, PageEntry, PagingError, PhysicalAddress,
    VirtualAddress,
};

/// An [`AddressSpace`] behind a spin lock.
///
/// Entry updates read a directory entry and then write through it, and that pair is not atomic.
/// Holding the lock for the whole sequence keeps two contexts from interleaving on the same
/// directory/table pair.
pub struct LockedAddressSpace {
    inner: Mutex<AddressSpace>,
}

impl LockedAddressSpace {
    /// Wraps an address space.
    pub const fn new(space: AddressSpace) -> Self {
        Self {
            inner: Mutex::new(space),
        }
    }

    /// Locks the address space for a longer sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, AddressSpace> {
        self.inner.lock()
    }

    /// See [`AddressSpace::set_mapping`].
    pub fn set_mapping<A: FrameAllocator + ?Sized>(
        &self,
        allocator: &A,
        virt: VirtualAddress,
        entry: PageEntry,
    ) -> Result<(), PagingError> {
        self.inner.lock().set_mapping(allocator, virt, entry)
    }

    /// See [`AddressSpace::map`].
    pub fn map<A: FrameAllocator + ?Sized>(
        &self,
        allocator: &A,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        flags: EntryFlags,
    ) -> Result<(), PagingError> {
        self.inner.lock().map(allocator, virt, phys, flags)
    }

    /// See [`AddressSpace::lookup`].
    pub fn lookup<A: FrameAllocator + ?Sized>(
        &self,
        allocator: &A,
        virt: VirtualAddress,
    ) -> Result<PageEntry, PagingError> {
        self.inner.lock().lookup(allocator, virt)
    }

    /// Unwraps the address space.
    pub fn into_inner(self) -> AddressSpace {
        self.inner.into_inner()
    }
}
