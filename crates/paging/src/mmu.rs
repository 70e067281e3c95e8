//! Interface to the processor's memory-management unit.

use crate::PhysicalAddress;

/// The hardware primitives the paging core needs from the MMU.
///
/// Both operations are treated as opaque and atomic.
pub trait Mmu {
    /// Makes `directory` the processor's active translation root.
    ///
    /// # Safety
    ///
    /// `directory` must be the physical address of a fully built directory that maps every
    /// address the running code touches, including the code itself and its stack.
    unsafe fn install_root(&mut self, directory: PhysicalAddress);

    /// Turns address translation on.
    ///
    /// # Safety
    ///
    /// A valid root must have been installed with [`Mmu::install_root`] first.
    unsafe fn enable_paging(&mut self);
}
