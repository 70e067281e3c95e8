//! 32-bit x86 (i386 protected mode) implementation.
//!
//! The directory and table formats are architecture-neutral in this crate; the only
//! x86-specific pieces are the control-register writes that install a directory and turn
//! paging on.

use core::arch::asm;

use crate::{Mmu, PhysicalAddress};

/// Paging enable bit in CR0.
const CR0_PG: u32 = 1 << 31;

/// The MMU of the running processor, driven through CR3 and CR0.
#[derive(Debug, Default)]
pub struct Cr3Mmu;

impl Cr3Mmu {
    /// Creates a handle to the processor's MMU.
    pub const fn new() -> Self {
        Self
    }
}

impl Mmu for Cr3Mmu {
    unsafe fn install_root(&mut self, directory: PhysicalAddress) {
        // SAFETY: The caller guarantees `directory` is a complete directory that maps the
        // running code. Writing CR3 also flushes every non-global TLB entry.
        unsafe {
            asm!("mov cr3, {}", in(reg) directory.as_u32(), options(nostack, preserves_flags));
        }
    }

    unsafe fn enable_paging(&mut self) {
        // SAFETY: The caller guarantees a valid root is already installed in CR3.
        unsafe {
            asm!(
                "mov {tmp}, cr0",
                "or {tmp}, {pg}",
                "mov cr0, {tmp}",
                tmp = out(reg) _,
                pg = in(reg) CR0_PG,
                options(nostack),
            );
        }
    }
}
