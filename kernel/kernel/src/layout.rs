//! The physical memory layout of the board and the fixed kernel mapping plan
//!
//! The values here mirror the qemu `virt` machine: memory-mapped device windows
//! below `0x8000_0000`, RAM starting at `KERNBASE` with the kernel loaded at its
//! very beginning.

use riscv::mem::{PAddr, VAddr, MAX_VADDR, PAGESIZE};

/// Register window of the UART serial device (one page, mapped read/write)
pub const UART0: PAddr = 0x1000_0000;

/// Register window of the virtio MMIO disk interface (one page, mapped read/write)
pub const VIRTIO0: PAddr = 0x1000_1000;

/// Register window of the platform-level interrupt controller (mapped read/write)
pub const PLIC: PAddr = 0x0c00_0000;

/// Size of the PLIC register window in bytes
pub const PLIC_SIZE: usize = 0x40_0000;

/// Where RAM (and the kernel text placed at its start) begins
pub const KERNBASE: PAddr = 0x8000_0000;

/// First physical address past the RAM the kernel is willing to use (128 MiB)
pub const PHYSTOP: PAddr = KERNBASE + 128 * 1024 * 1024;

/// The virtual address of the trampoline page used for trap entry/exit.
///
/// It occupies the highest valid virtual page and is mapped in the kernel address
/// space as well as in every user address space.
pub const TRAMPOLINE: VAddr = MAX_VADDR - PAGESIZE as u64;

/// The link-time dependent part of the kernel mapping plan.
///
/// These values come from linker symbols and are therefore only known to the boot
/// code, which fills this struct in and hands it to
/// [`make_kernel_table`](crate::kvm::make_kernel_table).
#[derive(Debug, Copy, Clone)]
pub struct KernelLayout {
    /// First physical address past the kernel's executable text.
    ///
    /// Must be page-aligned (the linker script aligns it).
    pub text_end: PAddr,
    /// First physical address past the usable RAM, typically [`PHYSTOP`]
    pub ram_end: PAddr,
    /// Physical address of the page holding the trampoline code
    pub trampoline: PAddr,
}
