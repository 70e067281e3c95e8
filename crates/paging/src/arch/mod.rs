//! Architecture-specific collaborators for the paging core.
//!
//! This module conditionally provides either the hardware MMU backend or the software
//! emulation used by tests, based on the target architecture and features.

// The hardware backend is only meaningful on 32-bit x86.
#[cfg(target_arch = "x86")]
mod x86;
#[cfg(target_arch = "x86")]
pub use x86::Cr3Mmu;

// Use software emulation ONLY when:
// - Running tests, OR
// - software-emulation feature is explicitly enabled
#[cfg(any(test, feature = "software-emulation"))]
mod software;
#[cfg(any(test, feature = "software-emulation"))]
pub use software::{EmulatedMemory, EmulatedMmu};
