use crate::traits::{AllocError, PageAllocator};
use crate::{MemoryPage, PAGESIZE};
use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// A free page that points to the next free page.
///
/// The link lives inside the free page itself so the arena needs no bookkeeping
/// memory of its own.
struct FreePage {
    next: Option<NonNull<FreePage>>,
}

/// A page allocator that hands out pages from a contiguous slice of backing memory.
///
/// Freed pages are kept on an intrusive free-list and handed out again on later
/// allocations.
pub struct PageArena<'mem> {
    /// Pointer to the start of the backing memory
    start: *mut MemoryPage,
    /// Number of pages in the backing memory
    pages: usize,
    /// First free page, if any
    head: Cell<Option<NonNull<FreePage>>>,
    /// Number of currently free pages
    free: Cell<usize>,
    _mem: PhantomData<&'mem mut [MemoryPage]>,
}

impl<'mem> PageArena<'mem> {
    /// Create a new arena that allocates from the given slice of pages.
    pub fn new(backing: &'mem mut [MemoryPage]) -> Self {
        let arena = Self {
            start: backing.as_mut_ptr(),
            pages: backing.len(),
            head: Cell::new(None),
            free: Cell::new(0),
            _mem: PhantomData,
        };

        // chain all pages into the free-list, last page first so that
        // allocations are handed out in slice order
        for i in (0..arena.pages).rev() {
            let page = unsafe { arena.start.add(i) };
            unsafe { arena.push_free(NonNull::new_unchecked(page)) };
        }

        arena
    }

    /// The total number of pages managed by this arena
    pub fn capacity(&self) -> usize {
        self.pages
    }

    /// The number of pages that are currently free
    pub fn free_pages(&self) -> usize {
        self.free.get()
    }

    /// Whether the given pointer points to a page inside the arena's backing memory
    fn contains(&self, page: NonNull<MemoryPage>) -> bool {
        let addr = page.as_ptr() as usize;
        let start = self.start as usize;
        addr >= start && addr < start + self.pages * PAGESIZE && addr % PAGESIZE == 0
    }

    unsafe fn push_free(&self, page: NonNull<MemoryPage>) {
        let free_page = page.cast::<FreePage>();
        unsafe {
            free_page.as_ptr().write(FreePage {
                next: self.head.get(),
            })
        };
        self.head.set(Some(free_page));
        self.free.set(self.free.get() + 1);
    }
}

impl PageAllocator for PageArena<'_> {
    fn alloc_page(&self) -> Result<NonNull<MemoryPage>, AllocError> {
        let Some(free_page) = self.head.get() else {
            log::warn!("page arena is out of free pages");
            return Err(AllocError::OutOfPages);
        };

        self.head.set(unsafe { free_page.as_ref().next });
        self.free.set(self.free.get() - 1);

        // the page still holds the free-list link (and possibly old content)
        let page = free_page.cast::<MemoryPage>();
        unsafe { page.as_ptr().cast::<u8>().write_bytes(0, PAGESIZE) };
        Ok(page)
    }

    unsafe fn free_page(&self, page: NonNull<MemoryPage>) {
        assert!(
            self.contains(page),
            "page {:p} was not allocated from this arena",
            page
        );
        unsafe { self.push_free(page) };
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec;

    fn backing(pages: usize) -> Vec<MemoryPage> {
        (0..pages).map(|_| MemoryPage::default()).collect()
    }

    #[test]
    fn test_allocates_all_pages_then_fails() {
        let mut mem = backing(4);
        let arena = PageArena::new(&mut mem);
        assert_eq!(arena.free_pages(), 4);

        for _ in 0..4 {
            arena.alloc_page().unwrap();
        }
        assert_eq!(arena.free_pages(), 0);
        assert_eq!(arena.alloc_page(), Err(AllocError::OutOfPages));
    }

    #[test]
    fn test_allocated_pages_are_zeroed() {
        let mut mem = backing(2);
        mem[0].iter_mut().for_each(|b| *b = 0xAA);
        mem[1].iter_mut().for_each(|b| *b = 0xAA);

        let arena = PageArena::new(&mut mem);
        let page = arena.alloc_page().unwrap();
        assert!(unsafe { page.as_ref() }.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_freed_page_is_reused() {
        let mut mem = backing(1);
        let arena = PageArena::new(&mut mem);

        let page = arena.alloc_page().unwrap();
        unsafe { arena.free_page(page) };
        assert_eq!(arena.free_pages(), 1);

        let page_again = arena.alloc_page().unwrap();
        assert_eq!(page, page_again);
    }

    #[test]
    #[should_panic]
    fn test_freeing_foreign_page_panics() {
        let mut mem = backing(1);
        let mut other = MemoryPage::default();
        let arena = PageArena::new(&mut mem);

        unsafe { arena.free_page(NonNull::from(&mut other)) };
    }
}
