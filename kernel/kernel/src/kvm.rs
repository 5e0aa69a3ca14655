//! Construction and activation of the kernel's own address space
//!
//! The kernel address space is process-wide state: it is built exactly once
//! during boot, before any other execution context exists, and is never torn
//! down. Apart from the per-context kernel stacks contributed by the scheduler
//! while a process is created, its mappings never change after activation.

use crate::layout::{KernelLayout, KERNBASE, PLIC, PLIC_SIZE, TRAMPOLINE, UART0, VIRTIO0};
use crate::vm::{self, VmError};
use allocators::PageAllocator;
use riscv::mem::{EntryFlags, PAddr, PageTable, PhysMapping, VAddr, PAGESIZE};

/// The root page table of the kernel address space.
///
/// Written exactly once by [`init_kernel_table`] during boot and read-only ever
/// after, so the raw static needs no locking.
static mut KERNEL_ROOT_PT: *mut PageTable = core::ptr::null_mut();

/// Access the process-wide kernel page table.
///
/// # Panics
/// Panics when called before [`init_kernel_table`].
pub fn kernel_root() -> *mut PageTable {
    let root = unsafe { KERNEL_ROOT_PT };
    assert!(!root.is_null(), "the kernel page table is not initialized yet");
    root
}

/// Add a mapping to the in-progress kernel page table.
///
/// Only used at boot (and by the kernel-stack installer running at process
/// creation); running out of pages this early is unrecoverable, so mapping
/// failure panics instead of propagating.
pub fn kernel_map<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    root: &mut PageTable,
    vaddr: VAddr,
    paddr: PAddr,
    size: usize,
    flags: EntryFlags,
) {
    vm::map_pages(alloc, phys, root, vaddr, paddr, size, flags)
        .expect("out of memory while building the kernel address space");
}

/// Build the kernel's direct-map page table.
///
/// Devices and RAM are identity-mapped so that the kernel can keep using
/// physical addresses after paging is switched on; only the trampoline page
/// lives at a different (the highest possible) virtual address.
/// `map_stacks` is invoked on the finished layout to let the process layer
/// install its per-context kernel stack mappings before the table is returned.
pub fn make_kernel_table<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    layout: &KernelLayout,
    map_stacks: impl FnOnce(&mut PageTable) -> Result<(), VmError>,
) -> Result<*mut PageTable, VmError> {
    let root = PageTable::init(alloc.alloc_page()?);
    let root = unsafe { &mut *root.as_ptr() };
    let rw = EntryFlags::Read | EntryFlags::Write;
    let rx = EntryFlags::Read | EntryFlags::Execute;

    // uart registers
    kernel_map(alloc, phys, root, UART0, UART0, PAGESIZE, rw);

    // virtio mmio disk interface
    kernel_map(alloc, phys, root, VIRTIO0, VIRTIO0, PAGESIZE, rw);

    // platform-level interrupt controller
    kernel_map(alloc, phys, root, PLIC, PLIC, PLIC_SIZE, rw);

    // the kernel's executable text
    kernel_map(
        alloc,
        phys,
        root,
        KERNBASE,
        KERNBASE,
        (layout.text_end - KERNBASE) as usize,
        rx,
    );

    // kernel data and the physical RAM we will make use of
    kernel_map(
        alloc,
        phys,
        root,
        layout.text_end,
        layout.text_end,
        (layout.ram_end - layout.text_end) as usize,
        rw,
    );

    // the trampoline for trap entry/exit, mapped to the highest virtual page
    kernel_map(alloc, phys, root, TRAMPOLINE, layout.trampoline, PAGESIZE, rx);

    // per-context kernel stacks are the process layer's contribution
    map_stacks(root)?;

    Ok(root)
}

/// Build the kernel address space and publish it as the process-wide root table.
pub fn init_kernel_table<A: PageAllocator>(
    alloc: &A,
    phys: &PhysMapping,
    layout: &KernelLayout,
    map_stacks: impl FnOnce(&mut PageTable) -> Result<(), VmError>,
) -> Result<(), VmError> {
    let root = make_kernel_table(alloc, phys, layout, map_stacks)?;
    unsafe { KERNEL_ROOT_PT = root };
    log::debug!("kernel page table initialized at {root:p}");
    Ok(())
}

/// Switch the hardware translation root register to the kernel page table.
///
/// Must run on every hart during its boot. The write fences the translation
/// cache on both sides, so no stale entries survive; hardware offers no failure
/// mode here.
#[cfg(target_arch = "riscv64")]
pub unsafe fn activate_kernel_table(phys: &PhysMapping) {
    use riscv::cpu::{Satp, SatpData, SatpMode};

    let root = kernel_root();
    log::debug!("activating kernel page table {root:p}");
    unsafe {
        Satp::write(SatpData {
            mode: SatpMode::Sv39,
            asid: 0,
            ppn: phys.rev_map(root as u64) >> 12,
        })
    };
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::vm::walk;
    use allocators::{MemoryPage, PageArena};
    use riscv::mem::EntryKind;
    use std::vec::Vec;

    fn backing(pages: usize) -> Vec<MemoryPage> {
        (0..pages).map(|_| MemoryPage::default()).collect()
    }

    fn test_layout() -> KernelLayout {
        KernelLayout {
            text_end: KERNBASE + 0x20_0000,
            ram_end: KERNBASE + 0x40_0000,
            trampoline: KERNBASE + 0x1000,
        }
    }

    #[test]
    fn test_fixed_kernel_layout() {
        let mut mem = backing(32);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();

        let root = make_kernel_table(&alloc, &phys, &test_layout(), |_| Ok(())).unwrap();
        let root = unsafe { &*root };

        let rw = EntryFlags::Valid | EntryFlags::Read | EntryFlags::Write;
        let rx = EntryFlags::Valid | EntryFlags::Read | EntryFlags::Execute;

        // device windows are identity-mapped read/write
        assert_eq!(
            walk(&phys, root, UART0).unwrap().kind(),
            EntryKind::Leaf { addr: UART0, flags: rw }
        );
        assert_eq!(
            walk(&phys, root, VIRTIO0).unwrap().kind(),
            EntryKind::Leaf { addr: VIRTIO0, flags: rw }
        );
        assert_eq!(
            walk(&phys, root, PLIC + PLIC_SIZE as u64 - 0x1000).unwrap().kind(),
            EntryKind::Leaf { addr: PLIC + PLIC_SIZE as u64 - 0x1000, flags: rw }
        );

        // kernel text is executable but not writable, data is the other way around
        assert_eq!(
            walk(&phys, root, KERNBASE).unwrap().kind(),
            EntryKind::Leaf { addr: KERNBASE, flags: rx }
        );
        assert_eq!(
            walk(&phys, root, KERNBASE + 0x20_0000).unwrap().kind(),
            EntryKind::Leaf { addr: KERNBASE + 0x20_0000, flags: rw }
        );

        // the trampoline sits at the very top of the address space
        assert_eq!(
            walk(&phys, root, TRAMPOLINE).unwrap().kind(),
            EntryKind::Leaf { addr: KERNBASE + 0x1000, flags: rx }
        );
    }

    #[test]
    fn test_stack_installer_runs_on_finished_layout() {
        let mut mem = backing(32);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();

        let stack_va = TRAMPOLINE - 2 * PAGESIZE as u64;
        let root = make_kernel_table(&alloc, &phys, &test_layout(), |root| {
            kernel_map(
                &alloc,
                &phys,
                root,
                stack_va,
                KERNBASE + 0x3000,
                PAGESIZE,
                EntryFlags::Read | EntryFlags::Write,
            );
            Ok(())
        })
        .unwrap();

        let root = unsafe { &*root };
        assert!(walk(&phys, root, stack_va).unwrap().is_leaf());
    }

    #[test]
    fn test_stack_installer_failure_propagates() {
        let mut mem = backing(32);
        let alloc = PageArena::new(&mut mem);
        let phys = PhysMapping::identity();

        let result = make_kernel_table(&alloc, &phys, &test_layout(), |_| Err(VmError::OutOfMemory));
        assert_eq!(result.map(|_| ()), Err(VmError::OutOfMemory));
    }
}
