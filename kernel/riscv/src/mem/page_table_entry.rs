use crate::mem::paddr::{self, PAddr};
use bitflags::bitflags;
use core::fmt::{Debug, Formatter, Write};

const FLAG_BITS: u64 = 10;
const FLAG_MASK: u64 = (1 << FLAG_BITS) - 1;
const PPN_OFFSET: u64 = 10;
const PPN_MASK: u64 = ((1 << paddr::PPN_BITS) - 1) << PPN_OFFSET;

/// An entry of a [`PageTable`](super::PageTable) responsible for mapping virtual to physical addresses.
///
/// # Format
/// The PTE format for Sv39 is shown in the below figure.
/// Bits 9..0 have the meaning described by [`EntryFlags`], the PPN segments hold
/// the physical page number of whatever the entry points to.
///
/// ```text
///  63      54 53    28 27    19 18    10 9   8  7   6   5   4   3   2   1   0
/// ┌──────────┬────────┬────────┬────────┬─────┬───┬───┬───┬───┬───┬───┬───┬───┐
/// │ reserved │ PPN[2] │ PPN[1] │ PPN[0] │ RSW │ D │ A │ G │ U │ X │ W │ R │ V │
/// └──────────┴────────┴────────┴────────┴─────┴───┴───┬───┴───┴───┴───┴───┴───┘
///     10bit    26bit     9bit     9bit   2bit
/// ```
///
/// # Interpretation
/// The same 64-bit value encodes three disjoint cases which [`kind()`](PageTableEntry::kind)
/// makes explicit:
/// - *invalid*: the Valid flag is clear, the rest of the entry carries no meaning
/// - *branch*: Valid is set and none of Read/Write/Execute are, the address names
///   the next-level page table
/// - *leaf*: Valid is set together with at least one of Read/Write/Execute, the
///   address names the mapped data page
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(C, align(8))]
pub struct PageTableEntry {
    entry: u64,
}

/// The decoded interpretation of one [`PageTableEntry`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EntryKind {
    /// The entry maps nothing
    Invalid,
    /// The entry points to the next-level page table located at the contained address
    Branch(PAddr),
    /// The entry maps a data page located at `addr` with the permissions in `flags`
    Leaf { addr: PAddr, flags: EntryFlags },
}

impl PageTableEntry {
    /// Create a new empty entry.
    ///
    /// This entry does not point to anything and is considered disabled by the hardware.
    pub const fn empty() -> Self {
        Self { entry: 0 }
    }

    /// The raw bits of this entry as the hardware sees them
    pub fn raw(&self) -> u64 {
        self.entry
    }

    /// Whether this entry is currently valid (in other words whether it is considered active)
    pub fn is_valid(&self) -> bool {
        self.flags().contains(EntryFlags::Valid)
    }

    /// Whether this is a leaf entry not pointing to further [`PageTable`](super::PageTable)s.
    pub fn is_leaf(&self) -> bool {
        self.flags().intersects(EntryFlags::RWX)
    }

    /// Return the flags which are encoded in this entry
    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.entry & FLAG_MASK)
    }

    /// Return the physical address which this entry points to
    pub fn addr(&self) -> PAddr {
        (self.entry & PPN_MASK) >> PPN_OFFSET << paddr::PAGE_OFFSET_BITS
    }

    /// Decode the entry into its tagged interpretation
    pub fn kind(&self) -> EntryKind {
        if !self.is_valid() {
            EntryKind::Invalid
        } else if self.is_leaf() {
            EntryKind::Leaf {
                addr: self.addr(),
                flags: self.flags(),
            }
        } else {
            EntryKind::Branch(self.addr())
        }
    }

    /// Set the content of this entry.
    ///
    /// This function also automatically enables the entry by setting the [`Valid`](EntryFlags::Valid) flag.
    ///
    /// If you want to disable the entry use [`clear()`](PageTableEntry::clear) instead.
    ///
    /// # Safety
    /// Changing the entry of a PageTable inherently changes virtual address mappings.
    /// This can make other, completely unrelated, references and pointers invalid and must always be done with
    /// care.
    pub unsafe fn set(&mut self, addr: PAddr, flags: EntryFlags) {
        assert_eq!(
            paddr::paddr_page_offset(addr),
            0,
            "cannot set page table entry to unaligned paddr {:#x}",
            addr
        );
        assert_eq!(
            addr & paddr::PADDR_MASK,
            addr,
            "paddr {:#x} is not representable in Sv39",
            addr
        );
        log::trace!("setting page table entry {self:p} to {addr:#x} with flags {flags:?}");

        self.entry = ((addr >> paddr::PAGE_OFFSET_BITS) << PPN_OFFSET)
            | (flags | EntryFlags::Valid).bits();
    }

    /// Clear the content of this entry, setting it to 0x0 and removing all flags.
    ///
    /// # Safety
    /// Changing the entry of a PageTable inherently changes virtual address mappings.
    /// This can make other, completely unrelated, references and pointers invalid and must always be done with
    /// care.
    pub unsafe fn clear(&mut self) {
        log::trace!("clearing page table entry {self:p}");
        self.entry = 0;
    }
}

impl Debug for PageTableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            EntryKind::Invalid => f.write_str("PageTableEntry { invalid }"),
            _ => f.write_fmt(format_args!(
                "PageTableEntry {{ addr: {:#12x}, flags: {:?} }}",
                self.addr(),
                self.flags()
            )),
        }
    }
}

bitflags! {
    /// The flags that can be set on a [`PageTableEntry`]
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct EntryFlags: u64 {
        /// If set, the MMU considers this a valid entry in the page table and uses it for address mapping
        const Valid = 1 << 0;
        /// Allows reading from the mapped page
        const Read = 1 << 1;
        /// Allows writing to the mapped page
        const Write = 1 << 2;
        /// Allows executing code from the mapped page
        const Execute = 1 << 3;
        /// Allows accessing the mapped page **from user mode**
        const User = 1 << 4;
        /// If set, the MMU considers this entry to be present in **all** address space IDs and caches them accordingly.
        /// It is safe to never set this but when setting it, care should be taken to do it correctly.
        const Global = 1 << 5;
        /// Set by the MMU when something has read from the page since the mapping was set up
        const Accessed = 1 << 6;
        /// Set by the MMU when something has written to the page since the mapping was set up
        const Dirty = 1 << 7;

        /// Custom bit available for use by us
        const CUSTOM1 = 1 << 8;
        /// Custom bit available for use by us
        const CUSTOM2 = 1 << 9;

        const RWX = Self::Read.bits() | Self::Write.bits() | Self::Execute.bits();
    }
}

impl Debug for EntryFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        fn write_bit(
            flags: EntryFlags,
            bit: EntryFlags,
            c: char,
            f: &mut Formatter<'_>,
        ) -> core::fmt::Result {
            if flags.contains(bit) {
                f.write_char(c)
            } else {
                f.write_char(' ')
            }
        }
        write_bit(*self, EntryFlags::CUSTOM2, '2', f)?;
        write_bit(*self, EntryFlags::CUSTOM1, '1', f)?;
        write_bit(*self, EntryFlags::Dirty, 'D', f)?;
        write_bit(*self, EntryFlags::Accessed, 'A', f)?;
        write_bit(*self, EntryFlags::Global, 'G', f)?;
        write_bit(*self, EntryFlags::User, 'U', f)?;
        write_bit(*self, EntryFlags::Execute, 'X', f)?;
        write_bit(*self, EntryFlags::Write, 'W', f)?;
        write_bit(*self, EntryFlags::Read, 'R', f)?;
        write_bit(*self, EntryFlags::Valid, 'V', f)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_correctly_set_and_loaded() {
        let mut entry = PageTableEntry::empty();
        unsafe { entry.set(0x8004_2000, EntryFlags::Read) };
        assert_eq!(entry.raw(), (0x8004_2000u64 >> 12 << 10) | 0b11);
        assert_eq!(entry.addr(), 0x8004_2000);
        assert!(entry.is_valid());
        assert!(entry.is_leaf());
    }

    #[test]
    fn test_kind_distinguishes_branch_and_leaf() {
        let mut entry = PageTableEntry::empty();
        assert_eq!(entry.kind(), EntryKind::Invalid);

        unsafe { entry.set(0x1000, EntryFlags::empty()) };
        assert_eq!(entry.kind(), EntryKind::Branch(0x1000));

        unsafe { entry.set(0x2000, EntryFlags::Read | EntryFlags::User) };
        assert_eq!(
            entry.kind(),
            EntryKind::Leaf {
                addr: 0x2000,
                flags: EntryFlags::Valid | EntryFlags::Read | EntryFlags::User,
            }
        );
    }

    #[test]
    #[should_panic]
    fn test_unaligned_address_is_rejected() {
        let mut entry = PageTableEntry::empty();
        unsafe { entry.set(0x1234, EntryFlags::Read) };
    }
}
