//! The virtual memory core of a small Sv39 teaching kernel
//!
//! This crate owns the kernel's address translation structure: the three-level
//! page table walk, the primitives that install and remove mappings, the fixed
//! kernel address space built at boot, the lifecycle of per-process user address
//! spaces and the copy routines that move data across the kernel/user boundary
//! on behalf of the system call layer.
//!
//! Physical pages come from an external [`PageAllocator`](allocators::PageAllocator);
//! scheduling, trap entry and program loading are other collaborators' business.

#![no_std]

pub mod kvm;
pub mod layout;
#[cfg(target_arch = "riscv64")]
pub mod logging;
pub mod usercopy;
pub mod uvm;
pub mod vm;
