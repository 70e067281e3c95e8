//! Address types for physical and linear memory.
//!
//! Both address kinds are 32-bit newtypes. They are kept distinct so that a physical frame
//! address can never be handed to an operation expecting a linear address (or the reverse).
//! Neither type is a reference into the running program: a [`PhysicalAddress`] only becomes
//! dereferenceable through [`FrameAllocator::translate`](crate::FrameAllocator::translate).

use core::fmt;
use core::ops::{Add, Sub};

use crate::PagingError;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// Number of entries in a directory or in a page table.
pub const ENTRY_COUNT: usize = 1024;

/// Bytes of linear address space covered by a single page table (4 MiB).
pub const TABLE_SPAN: u32 = ENTRY_COUNT as u32 * PAGE_SIZE;

/// Macro to define common address type functionality.
///
/// This macro generates the structure and methods shared by physical and linear addresses.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates a new address.
            #[inline]
            pub const fn new(addr: u32) -> Self {
                Self(addr)
            }

            /// Returns the raw address value.
            #[inline]
            pub const fn as_u32(self) -> u32 {
                self.0
            }

            /// Returns the raw address value widened to `usize`.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: u32) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Checks if the address sits on a page boundary.
            #[inline]
            pub const fn is_page_aligned(self) -> bool {
                self.is_aligned(PAGE_SIZE)
            }

            /// Returns the address unchanged if it is page-aligned.
            ///
            /// Misaligned addresses are reported, never rounded.
            #[inline]
            pub const fn require_page_aligned(self) -> Result<Self, PagingError> {
                if self.is_page_aligned() {
                    Ok(self)
                } else {
                    Err(PagingError::Misaligned(self.0))
                }
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: u32) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }

            /// Aligns the address up to the given alignment.
            ///
            /// Returns `None` if the aligned address does not fit in 32 bits.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_up(self, align: u32) -> Option<Self> {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                match self.0.checked_add(align - 1) {
                    Some(raised) => Some(Self(raised & !(align - 1))),
                    None => None,
                }
            }

            /// Adds a byte offset, returning `None` on 32-bit overflow.
            #[inline]
            pub const fn checked_add(self, rhs: u32) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(sum) => Some(Self(sum)),
                    None => None,
                }
            }

            /// Subtracts a byte offset, returning `None` below address zero.
            #[inline]
            pub const fn checked_sub(self, rhs: u32) -> Option<Self> {
                match self.0.checked_sub(rhs) {
                    Some(diff) => Some(Self(diff)),
                    None => None,
                }
            }
        }

        impl fmt::Pointer for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#010x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(addr: u32) -> Self {
                Self::new(addr)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(addr: $name) -> Self {
                addr.0
            }
        }

        /// # Panics
        ///
        /// Panics if the sum does not fit in 32 bits, in every build profile. Use
        /// [`checked_add`](Self::checked_add) where the offset is not already known to fit.
        impl Add<u32> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: u32) -> Self::Output {
                match self.checked_add(rhs) {
                    Some(sum) => sum,
                    None => panic!("address arithmetic overflowed 32 bits"),
                }
            }
        }

        /// # Panics
        ///
        /// Panics if the result would be below address zero, in every build profile.
        impl Sub<u32> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: u32) -> Self::Output {
                match self.checked_sub(rhs) {
                    Some(diff) => diff,
                    None => panic!("address arithmetic underflowed zero"),
                }
            }
        }

        /// Distance in bytes from `rhs` up to `self`.
        ///
        /// # Panics
        ///
        /// Panics if `rhs` is above `self`, in every build profile.
        impl Sub<$name> for $name {
            type Output = u32;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                match self.0.checked_sub(rhs.0) {
                    Some(distance) => distance,
                    None => panic!("address arithmetic underflowed zero"),
                }
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     The address actually presented to memory hardware. Frames, page tables and \
     directories are all identified by their physical address."
);

impl_address_common!(
    VirtualAddress,
    "A linear (virtual) memory address.\n\n\
     The address seen by running code, translated by the MMU through the active \
     directory before it reaches memory."
);

/// Position of a page inside the two-level translation structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableIndices {
    /// Slot in the directory (bits 31-22 of the linear address).
    pub directory: usize,
    /// Slot in the page table (bits 21-12 of the linear address).
    pub table: usize,
}

impl VirtualAddress {
    /// Splits a page-aligned linear address into its directory and table indices.
    ///
    /// Both indices are always within `0..ENTRY_COUNT`. Addresses that are not page-aligned are
    /// rejected with [`PagingError::Misaligned`]; the in-page offset is never computed here.
    #[inline]
    pub const fn indices(self) -> Result<TableIndices, PagingError> {
        if !self.is_page_aligned() {
            return Err(PagingError::Misaligned(self.0));
        }

        Ok(TableIndices {
            directory: (self.0 / TABLE_SPAN) as usize,
            table: ((self.0 % TABLE_SPAN) / PAGE_SIZE) as usize,
        })
    }

    /// Builds the page-aligned linear address selected by a directory and table index.
    ///
    /// # Panics
    ///
    /// Panics if either index is outside `0..ENTRY_COUNT`.
    #[inline]
    pub const fn from_indices(indices: TableIndices) -> Self {
        assert!(
            indices.directory < ENTRY_COUNT && indices.table < ENTRY_COUNT,
            "table index out of range"
        );
        Self(indices.directory as u32 * TABLE_SPAN + indices.table as u32 * PAGE_SIZE)
    }
}
