//! Tracking of the address space installed in the MMU.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{AddressSpace, FrameAllocator, Mmu, PagingError, PhysicalAddress};

/// Source of context ids. Zero is reserved for "never installed".
static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Owner of the MMU and of the record of which directory it currently translates through.
///
/// Only one address space can be active at a time. Activation does not transfer ownership: the
/// previously active space stays valid and owned by whoever built it. The context is passed
/// explicitly to whoever activates or destroys address spaces.
///
/// A space remembers the context that last installed it, and only that context may destroy it.
pub struct PagingContext<M: Mmu> {
    mmu: M,
    /// Directory most recently installed through this context.
    active: Option<PhysicalAddress>,
    /// Assigned on the first activation; zero until then.
    id: usize,
}

impl<M: Mmu> PagingContext<M> {
    /// Creates a context with no active address space.
    pub const fn new(mmu: M) -> Self {
        Self {
            mmu,
            active: None,
            id: 0,
        }
    }

    /// Installs `space`'s directory as the MMU's translation root.
    ///
    /// Fails with [`PagingError::InvalidHandle`] if `space` has been destroyed.
    ///
    /// # Safety
    ///
    /// The directory must map everything the running code touches (code, stack, and the memory
    /// behind the frame allocator). Any mapping changed with
    /// [`AddressSpace::set_mapping`] since the space was built counts.
    pub unsafe fn activate(&mut self, space: &AddressSpace) -> Result<(), PagingError> {
        let directory = space.directory()?;
        if self.id == 0 {
            self.id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        }

        // SAFETY: Guaranteed by the caller.
        unsafe { self.mmu.install_root(directory) };
        self.active = Some(directory);
        space.mark_installed(self.id);

        log::debug!("activated address space with directory at {}", directory);
        Ok(())
    }

    /// Turns on address translation through the active directory.
    ///
    /// Fails with [`PagingError::NoActiveSpace`] if nothing has been activated yet.
    ///
    /// # Safety
    ///
    /// The same requirements as [`PagingContext::activate`] apply to the active space.
    pub unsafe fn enable_paging(&mut self) -> Result<(), PagingError> {
        let directory = self.active.ok_or(PagingError::NoActiveSpace)?;
        // SAFETY: A directory has been installed and the caller vouches for it.
        unsafe { self.mmu.enable_paging() };

        log::debug!("paging enabled with directory at {}", directory);
        Ok(())
    }

    /// Returns the directory currently installed in the MMU, if any.
    pub fn active_directory(&self) -> Option<PhysicalAddress> {
        self.active
    }

    /// Returns whether `space` is the one the MMU is translating through.
    pub fn is_active(&self, space: &AddressSpace) -> bool {
        match (self.active, space.directory()) {
            (Some(active), Ok(directory)) => active == directory,
            _ => false,
        }
    }

    /// Releases every page table of `space`, then its directory, and invalidates the handle.
    ///
    /// The active space cannot be destroyed ([`PagingError::SpaceActive`]): activate a different,
    /// valid space first. A space installed through another context is refused with
    /// [`PagingError::ForeignContext`] whether or not that context still uses it. Destroying a
    /// handle twice fails with [`PagingError::InvalidHandle`] and releases nothing.
    pub fn destroy<A: FrameAllocator + ?Sized>(
        &self,
        space: &mut AddressSpace,
        allocator: &mut A,
    ) -> Result<(), PagingError> {
        let directory = space.directory()?;

        if space.installed_by().is_some_and(|owner| owner != self.id) {
            log::error!(
                "refusing to destroy address space at {} installed through another context",
                directory
            );
            return Err(PagingError::ForeignContext);
        }

        if self.is_active(space) {
            log::error!("refusing to destroy the active address space at {}", directory);
            return Err(PagingError::SpaceActive);
        }

        space.release(allocator)
    }

    /// Returns the MMU driven by this context.
    pub fn mmu(&self) -> &M {
        &self.mmu
    }
}
