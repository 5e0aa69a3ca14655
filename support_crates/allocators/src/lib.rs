//! Physical page allocation for the kernel
//!
//! The virtual memory subsystem hands out memory in fixed-size, page-aligned
//! blocks and nothing else, so the allocator interface here is deliberately
//! binary: take one page, give one page back.

#![no_std]

mod page_arena;
mod traits;

pub use page_arena::PageArena;
pub use traits::{AllocError, PageAllocator};

use core::ops::{Deref, DerefMut};

/// How large each memory page is in bytes
pub const PAGESIZE: usize = 4096;

/// A block of memory that is exactly one page large and aligned to a page boundary
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(C, align(4096))]
pub struct MemoryPage([u8; PAGESIZE]);

impl Deref for MemoryPage {
    type Target = [u8; PAGESIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MemoryPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self([0u8; PAGESIZE])
    }
}
