//! MMU stand-in for software emulation.

use crate::{Mmu, PhysicalAddress};

/// Records the root installs and paging enables a real MMU would receive.
#[derive(Debug, Default)]
pub struct EmulatedMmu {
    root: Option<PhysicalAddress>,
    installs: usize,
    paging_enabled: bool,
}

impl EmulatedMmu {
    /// Creates an MMU with no root installed and paging off.
    pub const fn new() -> Self {
        Self {
            root: None,
            installs: 0,
            paging_enabled: false,
        }
    }

    /// Returns the most recently installed root.
    pub fn root(&self) -> Option<PhysicalAddress> {
        self.root
    }

    /// Returns how many times a root has been installed.
    pub fn installs(&self) -> usize {
        self.installs
    }

    /// Returns whether paging has been turned on.
    pub fn paging_enabled(&self) -> bool {
        self.paging_enabled
    }
}

impl Mmu for EmulatedMmu {
    unsafe fn install_root(&mut self, directory: PhysicalAddress) {
        self.root = Some(directory);
        self.installs += 1;
    }

    unsafe fn enable_paging(&mut self) {
        self.paging_enabled = true;
    }
}
