//! Page table walking and the low-level mapping primitives
//!
//! Everything in this module operates on an explicitly passed root [`PageTable`]
//! so the same code serves the kernel's own address space and user address
//! spaces alike. The caller is responsible for serializing access to a given
//! table; nothing here locks.

use allocators::{AllocError, MemoryPage, PageAllocator};
use core::ptr::NonNull;
use riscv::mem::{
    page_round_down, vpn_segments, EntryFlags, EntryKind, PAddr, PageTable, PageTableEntry,
    PhysMapping, VAddr, MAX_VADDR, PAGESIZE,
};
use thiserror_no_std::Error;

/// The error returned by virtual memory operations that can legitimately fail at runtime.
///
/// Invariant violations that only a kernel bug could produce do not show up here;
/// those panic instead.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum VmError {
    #[error("the page allocator has no free pages left")]
    OutOfMemory,
    #[error("the virtual address is not mapped user-accessible")]
    NotMapped,
    #[error("no string terminator was found within the allowed length")]
    StringTooLong,
}

impl From<AllocError> for VmError {
    fn from(_: AllocError) -> Self {
        VmError::OutOfMemory
    }
}

/// Descend the page table tree to the level-0 entry responsible for `vaddr`.
///
/// Returns `None` as soon as an intermediate level turns out to be unmapped.
/// Whether the returned entry itself is valid is for the caller to decide.
///
/// # Panics
/// Panics if `vaddr` lies outside the valid Sv39 range; callers dealing with
/// user-supplied addresses must have validated them before walking.
pub fn walk<'a>(phys: &PhysMapping, root: &'a PageTable, vaddr: VAddr) -> Option<&'a PageTableEntry> {
    assert!(
        vaddr < MAX_VADDR,
        "virtual address {vaddr:#x} is outside the valid Sv39 range"
    );

    let vpn = vpn_segments(vaddr);
    let mut table = root;
    for level in [2, 1] {
        let entry = &table.entries[vpn[level]];
        match entry.kind() {
            EntryKind::Branch(next) => {
                table = unsafe { &*(phys.map(next) as *const PageTable) };
            }
            EntryKind::Invalid => return None,
            EntryKind::Leaf { .. } => panic!("hugepage encountered during page table walk"),
        }
    }
    Some(&table.entries[vpn[0]])
}

/// Like [`walk`] but yields a mutable entry.
pub fn walk_mut<'a>(
    phys: &PhysMapping,
    root: &'a mut PageTable,
    vaddr: VAddr,
) -> Option<&'a mut PageTableEntry> {
    assert!(
        vaddr < MAX_VADDR,
        "virtual address {vaddr:#x} is outside the valid Sv39 range"
    );

    let vpn = vpn_segments(vaddr);
    let mut table: *mut PageTable = root;
    for level in [2, 1] {
        let entry = unsafe { &mut (*table).entries[vpn[level]] };
        match entry.kind() {
            EntryKind::Branch(next) => table = phys.map(next) as *mut PageTable,
            EntryKind::Invalid => return None,
            EntryKind::Leaf { .. } => panic!("hugepage encountered during page table walk"),
        }
    }
    Some(unsafe { &mut (*table).entries[vpn[0]] })
}

/// Like [`walk_mut`] but allocates missing intermediate page tables on demand.
///
/// Newly created tables are zeroed and installed as branch entries.
/// Allocator exhaustion is an ordinary runtime condition here and propagates as
/// [`VmError::OutOfMemory`].
pub fn walk_alloc<'a, A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: &'a mut PageTable,
    vaddr: VAddr,
) -> Result<&'a mut PageTableEntry, VmError> {
    assert!(
        vaddr < MAX_VADDR,
        "virtual address {vaddr:#x} is outside the valid Sv39 range"
    );

    let vpn = vpn_segments(vaddr);
    let mut table: *mut PageTable = root;
    for level in [2, 1] {
        let entry = unsafe { &mut (*table).entries[vpn[level]] };
        match entry.kind() {
            EntryKind::Branch(next) => table = phys.map(next) as *mut PageTable,
            EntryKind::Invalid => {
                let next = PageTable::init(alloc.alloc_page()?);
                unsafe { entry.set(phys.rev_map(next.as_ptr() as u64), EntryFlags::empty()) };
                table = next.as_ptr();
            }
            EntryKind::Leaf { .. } => panic!("hugepage encountered during page table walk"),
        }
    }
    Ok(unsafe { &mut (*table).entries[vpn[0]] })
}

/// Install leaf mappings covering the page range that contains `[vaddr, vaddr + size)`.
///
/// `vaddr` and `size` need not be page-aligned. Missing intermediate tables are
/// allocated on demand; on [`VmError::OutOfMemory`] already installed entries of
/// this call remain (callers that need atomicity roll back via their own unmap,
/// see [`uvm::grow`](crate::uvm::grow)).
///
/// # Panics
/// Panics on a zero `size` and when any target entry is already valid; remapping
/// without an intervening unmap is always a kernel bug.
pub fn map_pages<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: &mut PageTable,
    vaddr: VAddr,
    paddr: PAddr,
    size: usize,
    flags: EntryFlags,
) -> Result<(), VmError> {
    assert!(size != 0, "cannot map a zero-sized range");
    assert!(
        flags.intersects(EntryFlags::RWX),
        "a leaf mapping must set at least one of Read, Write or Execute"
    );
    log::trace!(
        "mapping {vaddr:#x} -> {paddr:#x} ({size:#x} bytes, flags {flags:?}) in page table {root:p}"
    );

    let last = page_round_down(vaddr + size as u64 - 1);
    let mut va = page_round_down(vaddr);
    let mut pa = paddr;
    loop {
        let entry = walk_alloc(alloc, phys, root, va)?;
        assert!(
            !entry.is_valid(),
            "refusing to overwrite the existing mapping at {va:#x}"
        );
        unsafe { entry.set(pa, flags) };

        if va == last {
            break;
        }
        va += PAGESIZE as u64;
        pa += PAGESIZE as u64;
    }
    Ok(())
}

/// Remove `npages` consecutive leaf mappings starting at the page-aligned `vaddr`.
///
/// With `free_phys` set the backing physical pages are returned to the allocator.
/// The entries themselves are zeroed; intermediate tables stay in place.
///
/// # Panics
/// Panics on an unaligned `vaddr` and whenever a mapping in the range is missing,
/// invalid or not a leaf, since all of those mean the address space is
/// inconsistent with what the caller believes it to be.
pub fn unmap_pages<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: &mut PageTable,
    vaddr: VAddr,
    npages: usize,
    free_phys: bool,
) {
    assert_eq!(
        vaddr % PAGESIZE as u64,
        0,
        "unmap address {vaddr:#x} is not page-aligned"
    );
    log::trace!("unmapping {npages} pages starting at {vaddr:#x} in page table {root:p}");

    for i in 0..npages {
        let va = vaddr + (i * PAGESIZE) as u64;
        let Some(entry) = walk_mut(phys, root, va) else {
            panic!("no page table entry exists for {va:#x}");
        };
        match entry.kind() {
            EntryKind::Leaf { addr, .. } => {
                if free_phys {
                    let page = phys.map(addr) as *mut MemoryPage;
                    unsafe { alloc.free_page(NonNull::new_unchecked(page)) };
                }
                unsafe { entry.clear() };
            }
            EntryKind::Invalid => panic!("tried to unmap {va:#x} which is not mapped"),
            EntryKind::Branch(_) => panic!("tried to unmap {va:#x} whose entry is not a leaf"),
        }
    }
}

/// Log the structure of a page table tree, one line per valid entry.
///
/// Read-only; recurses into branch entries and stops at leaves.
pub fn dump_pagetable(phys: &PhysMapping, root: &PageTable) {
    log::debug!("page table {root:p}");
    dump_table(phys, root, 2);
}

fn dump_table(phys: &PhysMapping, table: &PageTable, level: usize) {
    for (i, entry) in table.entries.iter().enumerate() {
        let kind = entry.kind();
        if kind == EntryKind::Invalid {
            continue;
        }

        let depth = match level {
            2 => "..",
            1 => ".. ..",
            _ => ".. .. ..",
        };
        log::debug!("{depth}{i}: pte {:#x} pa {:#x}", entry.raw(), entry.addr());

        if let EntryKind::Branch(next) = kind {
            let next = unsafe { &*(phys.map(next) as *const PageTable) };
            dump_table(phys, next, level - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use allocators::PageArena;
    use std::vec::Vec;

    fn backing(pages: usize) -> Vec<MemoryPage> {
        (0..pages).map(|_| MemoryPage::default()).collect()
    }

    fn new_root<'a>(alloc: &PageArena<'_>) -> &'a mut PageTable {
        unsafe { &mut *PageTable::init(alloc.alloc_page().unwrap()).as_ptr() }
    }

    #[test]
    fn test_walk_alloc_creates_branch_levels() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        assert!(walk(&phys, root, 0x4000).is_none());

        let entry = walk_alloc(&alloc, &phys, root, 0x4000).unwrap();
        assert!(!entry.is_valid());
        // two intermediate tables were created below the root
        assert_eq!(alloc.free_pages(), 8 - 3);
        assert!(walk(&phys, root, 0x4000).is_some());
    }

    #[test]
    fn test_map_unmap_round_trip() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        let pa = 0x8000_0000u64;
        map_pages(&alloc, &phys, root, 0x3000, pa, 3 * PAGESIZE, EntryFlags::Read).unwrap();

        for va in [0x3000u64, 0x4000, 0x5000] {
            let entry = walk(&phys, root, va).unwrap();
            assert!(entry.is_leaf());
        }
        assert_eq!(walk(&phys, root, 0x3000).unwrap().addr(), pa);
        assert_eq!(walk(&phys, root, 0x5000).unwrap().addr(), pa + 2 * PAGESIZE as u64);

        unmap_pages(&alloc, &phys, root, 0x3000, 3, false);
        for va in [0x3000u64, 0x4000, 0x5000] {
            assert!(!walk(&phys, root, va).unwrap().is_valid());
        }
    }

    #[test]
    fn test_unmap_can_return_backing_pages() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        let target = alloc.alloc_page().unwrap();
        let pa = target.as_ptr() as u64;
        map_pages(&alloc, &phys, root, 0x3000, pa, PAGESIZE, EntryFlags::Read).unwrap();
        let free_before = alloc.free_pages();

        unmap_pages(&alloc, &phys, root, 0x3000, 1, true);
        assert_eq!(alloc.free_pages(), free_before + 1);
        assert!(!walk(&phys, root, 0x3000).unwrap().is_valid());
    }

    #[test]
    fn test_unaligned_range_is_covered_completely() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        // 2 bytes crossing a page boundary must map both pages
        map_pages(&alloc, &phys, root, 0x1fff, 0x8000_0000, 2, EntryFlags::Read).unwrap();
        assert!(walk(&phys, root, 0x1000).unwrap().is_valid());
        assert!(walk(&phys, root, 0x2000).unwrap().is_valid());
    }

    #[test]
    fn test_map_fails_when_allocator_is_exhausted() {
        let mut mem = backing(2);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        // only one free page remains but the walk needs two intermediate tables
        alloc.alloc_page().unwrap();
        assert_eq!(
            map_pages(&alloc, &phys, root, 0, 0x8000_0000, PAGESIZE, EntryFlags::Read),
            Err(VmError::OutOfMemory)
        );
    }

    #[test]
    #[should_panic]
    fn test_remap_panics() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        map_pages(&alloc, &phys, root, 0x1000, 0x8000_0000, PAGESIZE, EntryFlags::Read).unwrap();
        map_pages(&alloc, &phys, root, 0x1000, 0x8000_1000, PAGESIZE, EntryFlags::Read).unwrap();
    }

    #[test]
    #[should_panic]
    fn test_zero_size_map_panics() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        let _ = map_pages(&alloc, &phys, root, 0x1000, 0x8000_0000, 0, EntryFlags::Read);
    }

    #[test]
    #[should_panic]
    fn test_unaligned_unmap_panics() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        unmap_pages(&alloc, &phys, root, 0x1234, 1, false);
    }

    #[test]
    #[should_panic]
    fn test_unmapping_invalid_entry_panics() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        map_pages(&alloc, &phys, root, 0x1000, 0x8000_0000, PAGESIZE, EntryFlags::Read).unwrap();
        unmap_pages(&alloc, &phys, root, 0x1000, 1, false);
        // the entry is gone now, a second unmap is a caller bug
        unmap_pages(&alloc, &phys, root, 0x1000, 1, false);
    }

    #[test]
    #[should_panic]
    fn test_walk_rejects_out_of_range_address() {
        let mut mem = backing(2);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        let _ = walk(&phys, root, MAX_VADDR);
    }

    #[test]
    fn test_dump_does_not_mutate() {
        let mut mem = backing(8);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();
        let root = new_root(&alloc);

        map_pages(&alloc, &phys, root, 0x1000, 0x8000_0000, PAGESIZE, EntryFlags::Read).unwrap();
        let before = walk(&phys, root, 0x1000).unwrap().raw();
        dump_pagetable(&phys, root);
        assert_eq!(walk(&phys, root, 0x1000).unwrap().raw(), before);
    }
}
