use crate::MemoryPage;
use core::ptr::NonNull;
use thiserror_no_std::Error;

/// The error returned when a page allocation fails
#[derive(Debug, Error, Eq, PartialEq)]
pub enum AllocError {
    #[error("the allocator has no free pages left")]
    OutOfPages,
}

/// An implementation of `PageAllocator` hands out page-sized, page-aligned blocks of memory.
///
/// This is the only resource provider the virtual memory subsystem knows about.
/// Allocations have no layout parameter on purpose; a page table page and a
/// mapped data page are the same kind of block.
pub trait PageAllocator {
    /// Attempt to allocate one page.
    ///
    /// On success the returned page is guaranteed to be fully zeroed so that callers
    /// can immediately use it as a page table or hand it out as user memory without
    /// leaking previous content.
    fn alloc_page(&self) -> Result<NonNull<MemoryPage>, AllocError>;

    /// Return a page to the allocator.
    ///
    /// # Panics
    /// Implementations may panic if the given page does not lie within their backing
    /// memory since that always indicates a bug in the caller.
    ///
    /// # Safety
    /// The given page must be *currently allocated* from this allocator.
    ///
    /// This means that:
    /// - it was previously returned by [`alloc_page`](PageAllocator::alloc_page)
    /// - it has not yet been freed again
    /// - no references into the page remain in use
    unsafe fn free_page(&self, page: NonNull<MemoryPage>);
}
