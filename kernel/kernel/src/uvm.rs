//! Lifecycle of per-process user address spaces
//!
//! A user address space is identified by its root page table; its logical size
//! in bytes (which need not be page-aligned) is tracked by the process layer
//! and passed into the operations here. The caller holds the process lock, so
//! none of these functions synchronize on their own.

use crate::vm::{self, VmError};
use allocators::{MemoryPage, PageAllocator};
use core::ptr::NonNull;
use riscv::mem::{
    page_round_up, EntryFlags, EntryKind, PageTable, PhysMapping, VAddr, PAGESIZE,
};

/// The permissions user pages are mapped with
const USER_FLAGS: EntryFlags = EntryFlags::Read
    .union(EntryFlags::Write)
    .union(EntryFlags::Execute)
    .union(EntryFlags::User);

/// Create an empty user page table.
pub fn create<A: PageAllocator>(alloc: &A) -> Result<NonNull<PageTable>, VmError> {
    let root = PageTable::init(alloc.alloc_page()?);
    log::trace!("created user page table at {root:p}");
    Ok(root)
}

/// Load the initial program image into address 0 of a fresh page table.
///
/// Only used for the very first process.
///
/// # Panics
/// Panics if the image does not fit into a single page; the first process is
/// expected to be a tiny bootstrap program.
pub fn seed<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: &mut PageTable,
    src: &[u8],
) -> Result<(), VmError> {
    assert!(
        src.len() < PAGESIZE,
        "initial program image does not fit into one page"
    );

    let page = alloc.alloc_page()?;
    let paddr = phys.rev_map(page.as_ptr() as u64);
    if let Err(err) = vm::map_pages(alloc, phys, root, 0, paddr, PAGESIZE, USER_FLAGS) {
        unsafe { alloc.free_page(page) };
        return Err(err);
    }

    unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), page.as_ptr().cast::<u8>(), src.len()) };
    Ok(())
}

/// Grow an address space from `oldsz` to `newsz` bytes by mapping fresh zeroed pages.
///
/// Neither size needs to be page-aligned. Returns the new size, or `oldsz`
/// unchanged when `newsz` does not actually grow the space.
///
/// On failure everything allocated by this call is unmapped and freed again
/// before the error is reported; the address space is never left partially
/// grown.
pub fn grow<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: &mut PageTable,
    oldsz: usize,
    newsz: usize,
) -> Result<usize, VmError> {
    if newsz < oldsz {
        return Ok(oldsz);
    }

    let mapped_end = page_round_up(oldsz as u64) as usize;
    let mut a = mapped_end;
    while a < newsz {
        let page = match alloc.alloc_page() {
            Ok(page) => page,
            Err(err) => {
                shrink(alloc, phys, root, a, mapped_end);
                return Err(err.into());
            }
        };

        let paddr = phys.rev_map(page.as_ptr() as u64);
        if let Err(err) = vm::map_pages(alloc, phys, root, a as VAddr, paddr, PAGESIZE, USER_FLAGS)
        {
            unsafe { alloc.free_page(page) };
            shrink(alloc, phys, root, a, mapped_end);
            return Err(err);
        }

        a += PAGESIZE;
    }
    Ok(newsz)
}

/// Shrink an address space from `oldsz` to `newsz` bytes, unmapping and freeing
/// the pages in between.
///
/// Neither size needs to be page-aligned and `oldsz` may exceed the actually
/// mapped size. Returns the new size; a no-op when `newsz >= oldsz`.
pub fn shrink<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: &mut PageTable,
    oldsz: usize,
    newsz: usize,
) -> usize {
    if newsz >= oldsz {
        return oldsz;
    }

    let new_end = page_round_up(newsz as u64);
    let old_end = page_round_up(oldsz as u64);
    if new_end < old_end {
        let npages = ((old_end - new_end) as usize) / PAGESIZE;
        vm::unmap_pages(alloc, phys, root, new_end, npages, true);
    }

    newsz
}

/// Copy a parent address space into `dst` for fork.
///
/// Every mapped page in `[0, size)` gets a freshly allocated physical page in
/// the child, its content copied byte for byte and its leaf flags taken over
/// unchanged. Source and destination never share a data page.
///
/// On failure the destination is returned to its fully unmapped pre-call state.
///
/// # Panics
/// Panics when a page below `size` is missing or invalid in the parent, since
/// that means the parent's tracked size disagrees with its page table.
pub fn duplicate<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    src: &PageTable,
    dst: &mut PageTable,
    size: usize,
) -> Result<(), VmError> {
    let mut va = 0;
    while va < size {
        let Some(entry) = vm::walk(phys, src, va as VAddr) else {
            panic!("source address space has no page table entry for {va:#x}");
        };
        let EntryKind::Leaf { addr, flags } = entry.kind() else {
            panic!("source address space has no mapped page at {va:#x}");
        };

        let result = alloc.alloc_page().map_err(VmError::from).and_then(|page| {
            unsafe {
                core::ptr::copy_nonoverlapping(
                    phys.map(addr) as *const u8,
                    page.as_ptr().cast::<u8>(),
                    PAGESIZE,
                )
            };
            let paddr = phys.rev_map(page.as_ptr() as u64);
            vm::map_pages(alloc, phys, dst, va as VAddr, paddr, PAGESIZE, flags).map_err(|err| {
                unsafe { alloc.free_page(page) };
                err
            })
        });

        if let Err(err) = result {
            // roll the destination back to its pre-call state
            vm::unmap_pages(alloc, phys, dst, 0, va / PAGESIZE, true);
            return Err(err);
        }

        va += PAGESIZE;
    }
    Ok(())
}

/// Strip user-mode access from the page mapped at `vaddr`.
///
/// Used to turn the page below a user stack into a guard page that the kernel
/// can still reach but user code cannot.
///
/// # Panics
/// Panics if no leaf mapping exists for `vaddr`.
pub fn clear_user_access(phys: &PhysMapping, root: &mut PageTable, vaddr: VAddr) {
    let Some(entry) = vm::walk_mut(phys, root, vaddr) else {
        panic!("no page table entry exists for {vaddr:#x}");
    };
    let EntryKind::Leaf { addr, flags } = entry.kind() else {
        panic!("no leaf mapping exists at {vaddr:#x}");
    };
    unsafe { entry.set(addr, flags - EntryFlags::User) };
}

/// Free all user memory of an address space, then the page table tree itself.
pub fn free<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: NonNull<PageTable>,
    size: usize,
) {
    if size > 0 {
        let npages = (page_round_up(size as u64) as usize) / PAGESIZE;
        vm::unmap_pages(alloc, phys, unsafe { &mut *root.as_ptr() }, 0, npages, true);
    }
    free_table(alloc, phys, root);
}

/// Recursively reclaim the pages making up a page table tree.
///
/// # Panics
/// Panics when any leaf mapping is still present; all user memory must have
/// been unmapped before its translation structure can be reclaimed.
fn free_table<A: PageAllocator>(alloc: &A, phys: &PhysMapping, table: NonNull<PageTable>) {
    let table_ref = unsafe { &mut *table.as_ptr() };
    for entry in table_ref.entries.iter_mut() {
        match entry.kind() {
            EntryKind::Branch(next) => {
                let next = phys.map(next) as *mut PageTable;
                free_table(alloc, phys, unsafe { NonNull::new_unchecked(next) });
                unsafe { entry.clear() };
            }
            EntryKind::Leaf { .. } => {
                panic!("leaf mapping survived into page table reclamation")
            }
            EntryKind::Invalid => {}
        }
    }
    unsafe { alloc.free_page(table.cast::<MemoryPage>()) };
}
