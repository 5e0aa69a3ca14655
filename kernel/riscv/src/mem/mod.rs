//! Data structures and definitions for Sv39 virtual addressing
//!
//! Sv39 implementations support a 39-bit virtual address space divided into 4 KiB pages.
//! An Sv39 virtual address is partitioned as shown below; translation walks a
//! three-level page table hierarchy, one 9-bit VPN segment per level, while the
//! 12-bit page offset is carried over untranslated.
//!
//! ```text
//! 38           30 29          21 20          12 11            0
//! ┌──────────────┬──────────────┬──────────────┬───────────────┐
//! │    VPN[2]    │    VPN[1]    │    VPN[0]    │  page offset  │
//! └──────────────┴──────────────┴──────────────┴───────────────┘
//!      9bits          9bits          9bits           12bits
//! ```
//!
//! Each page table is itself exactly one page holding 512 entries; the entry
//! format is documented on [`PageTableEntry`].

mod mapping;
mod paddr;
mod page_table_entry;
mod page_tables;
mod vaddr;

pub use allocators::{MemoryPage, PAGESIZE};
pub use mapping::*;
pub use paddr::*;
pub use page_table_entry::*;
pub use page_tables::*;
pub use vaddr::*;
