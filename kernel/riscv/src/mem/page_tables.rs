use crate::mem::{MemoryPage, PageTableEntry, PAGESIZE};
use core::mem;
use core::ptr::NonNull;
use static_assertions::{assert_eq_align, assert_eq_size};

/// A PageTable for configuring virtual memory mapping.
///
/// It exactly fills 4096 bytes which is also the size of mapped pages.
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageTableEntry; PAGESIZE / mem::size_of::<PageTableEntry>()],
}

assert_eq_size!(PageTable, MemoryPage);
assert_eq_align!(PageTable, MemoryPage);

impl PageTable {
    /// The number of entries in one page table
    pub const LEN: usize = PAGESIZE / mem::size_of::<PageTableEntry>();

    /// Initialize the given page as an empty `PageTable`.
    ///
    /// All entries are written as invalid, no matter what the page contained before.
    pub fn init(page: NonNull<MemoryPage>) -> NonNull<PageTable> {
        log::trace!("initializing empty pagetable at {page:p}");
        let table = page.cast::<PageTableEntry>();
        for i in 0..Self::LEN {
            unsafe { table.as_ptr().add(i).write(PageTableEntry::empty()) };
        }

        page.cast::<PageTable>()
    }
}
