//! Page table entry flags.

use crate::PagingError;

bitflags::bitflags! {
    /// Flag bits stored in the low 12 bits of a directory or table entry.
    ///
    /// Only the bits named here may appear in an entry built by this crate. Bit 7 (page size),
    /// bit 8 (global) and the three software-available bits are outside the vocabulary and are
    /// rejected by [`EntryFlags::from_raw`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u32 {
        /// The entry participates in translation.
        const PRESENT = 1 << 0;
        /// Stores are permitted through this entry.
        const WRITABLE = 1 << 1;
        /// Non-privileged code may reference the page.
        const USER = 1 << 2;
        /// Writes go straight to memory instead of being cached.
        const WRITE_THROUGH = 1 << 3;
        /// The page is not cached.
        const CACHE_DISABLED = 1 << 4;
        /// Set by the processor when the entry is used for translation.
        const ACCESSED = 1 << 5;
        /// Set by the processor when the page is written.
        const DIRTY = 1 << 6;
    }
}

impl EntryFlags {
    /// Mask covering every bit an entry may use for flags.
    pub const FIELD_MASK: u32 = 0xFFF;

    /// Converts raw flag bits, rejecting any bit outside the vocabulary.
    pub const fn from_raw(raw: u32) -> Result<Self, PagingError> {
        match Self::from_bits(raw) {
            Some(flags) => Ok(flags),
            None => Err(PagingError::UndefinedFlags(raw & !Self::all().bits())),
        }
    }

    /// Returns whether the present bit is set.
    pub const fn is_present(self) -> bool {
        self.contains(Self::PRESENT)
    }

    /// Returns whether the writable bit is set.
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Returns whether the user-accessible bit is set.
    pub const fn is_user(self) -> bool {
        self.contains(Self::USER)
    }
}

impl Default for EntryFlags {
    fn default() -> Self {
        Self::empty()
    }
}
