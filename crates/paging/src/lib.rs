#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

//! # Paging
//!
//! The address-translation core of a 32-bit protected-mode kernel. It builds, installs, mutates
//! and tears down the two-level structures the MMU walks to turn a linear address into a
//! physical one:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | directory | table | offset |
//! ```
//!
//! A directory holds 1024 entries, each pointing at a page table; a page table holds 1024
//! entries, each pointing at a 4 KiB frame. One directory therefore covers the whole 4 GiB
//! linear space.
//!
//! It provides:
//!
//! - A 32-bit entry codec ([`PageEntry`], [`EntryFlags`]) and linear-address decomposition
//!   ([`VirtualAddress::indices`]).
//! - Eager identity-mapped [`AddressSpace`]s with single-entry remapping.
//! - A [`PagingContext`] that records which directory the MMU is using and refuses to destroy it.
//! - Software emulation of physical memory and the MMU for testing in non-kernel environments.
//!
//! Physical memory comes from an external [`FrameAllocator`]; the hardware root-install
//! primitive is behind the [`Mmu`] trait.

extern crate alloc;

mod address;
mod address_space;
mod arch;
mod context;
mod entry;
mod error;
mod flags;
mod frame_allocator;
mod locked;
mod mmu;
mod table;

pub use address::{ENTRY_COUNT, PAGE_SIZE, PhysicalAddress, TABLE_SPAN, TableIndices, VirtualAddress};
pub use address_space::AddressSpace;
pub use context::PagingContext;
pub use entry::PageEntry;
pub use error::{AllocError, PagingError};
pub use flags::EntryFlags;
pub use frame_allocator::FrameAllocator;
pub use locked::LockedAddressSpace;
pub use mmu::Mmu;
pub use table::{PageTable, build_table};

#[cfg(target_arch = "x86")]
pub use arch::Cr3Mmu;
#[cfg(any(test, feature = "software-emulation"))]
pub use arch::{EmulatedMemory, EmulatedMmu};
