//! Directory and page table entries.

use core::fmt;

use crate::{EntryFlags, PagingError, PhysicalAddress};

/// A single 32-bit directory or page table entry.
///
/// The entry format:
/// - Bits 0-11: Flags ([`EntryFlags`])
/// - Bits 12-31: Physical frame address (page-aligned, so its low 12 bits are always zero)
///
/// This type is the only place a [`PhysicalAddress`] is packed into or recovered from its
/// in-table representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct PageEntry(u32);

impl PageEntry {
    /// Physical address mask (bits 12-31).
    const ADDRESS_MASK: u32 = !EntryFlags::FIELD_MASK;

    /// Creates an entry pointing at `frame` with the given flags.
    ///
    /// Fails with [`PagingError::Misaligned`] if `frame` is not page-aligned, and with
    /// [`PagingError::UndefinedFlags`] if `flags` was built with bits outside the vocabulary
    /// (for example through `EntryFlags::from_bits_retain`).
    pub const fn encode(frame: PhysicalAddress, flags: EntryFlags) -> Result<Self, PagingError> {
        let undefined = flags.bits() & !EntryFlags::all().bits();
        if undefined != 0 {
            return Err(PagingError::UndefinedFlags(undefined));
        }

        match frame.require_page_aligned() {
            Ok(frame) => Ok(Self(frame.as_u32() | flags.bits())),
            Err(err) => Err(err),
        }
    }

    /// Returns the physical address stored in this entry, with the flag field masked off.
    ///
    /// The address is returned whether or not the entry is present.
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 & Self::ADDRESS_MASK)
    }

    /// Returns the flags of this entry.
    ///
    /// Fails with [`PagingError::UndefinedFlags`] if the entry carries bits outside the
    /// vocabulary, which can only happen for entries created with [`PageEntry::from_raw`].
    pub const fn flags(self) -> Result<EntryFlags, PagingError> {
        EntryFlags::from_raw(self.0 & EntryFlags::FIELD_MASK)
    }

    /// Returns whether this entry is present.
    pub const fn is_present(self) -> bool {
        self.0 & EntryFlags::PRESENT.bits() != 0
    }

    /// Returns the raw 32-bit value of this entry.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Creates an entry from a raw 32-bit value, without validation.
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PageEntry({} | {:#05x})",
            self.address(),
            self.0 & EntryFlags::FIELD_MASK
        )
    }
}
