//! Data transfer across the kernel/user translation boundary
//!
//! Every system call that touches user memory goes through these routines.
//! They translate user virtual addresses in software and refuse to touch any
//! page that is not mapped user-accessible: a valid kernel-only mapping (such
//! as a guard page) is deliberately indistinguishable from an unmapped one, so
//! user-supplied addresses can never reach memory the process does not own.
//! Failures here are ordinary per-call errors, never kernel panics.

use crate::vm::{self, VmError};
use riscv::mem::{
    page_round_down, EntryFlags, EntryKind, PAddr, PageTable, PhysMapping, VAddr, MAX_VADDR,
    PAGESIZE,
};

/// Look up the physical address backing the user-accessible page at `vaddr`.
///
/// Returns `None` for out-of-range, unmapped and kernel-only addresses alike.
pub fn user_page(phys: &PhysMapping, root: &PageTable, vaddr: VAddr) -> Option<PAddr> {
    if vaddr >= MAX_VADDR {
        return None;
    }

    let entry = vm::walk(phys, root, vaddr)?;
    match entry.kind() {
        EntryKind::Leaf { addr, flags } if flags.contains(EntryFlags::User) => Some(addr),
        _ => None,
    }
}

/// Copy `src` into a user address space at `dst_va`.
pub fn copy_to_user(
    phys: &PhysMapping,
    root: &PageTable,
    dst_va: VAddr,
    src: &[u8],
) -> Result<(), VmError> {
    let mut src = src;
    let mut dst_va = dst_va;
    while !src.is_empty() {
        let va0 = page_round_down(dst_va);
        let pa0 = user_page(phys, root, va0).ok_or(VmError::NotMapped)?;
        let offset = (dst_va - va0) as usize;
        let n = usize::min(PAGESIZE - offset, src.len());

        let dst = (phys.map(pa0) as usize + offset) as *mut u8;
        unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), dst, n) };

        src = &src[n..];
        dst_va = va0 + PAGESIZE as u64;
    }
    Ok(())
}

/// Copy `dst.len()` bytes out of a user address space starting at `src_va`.
pub fn copy_from_user(
    phys: &PhysMapping,
    root: &PageTable,
    dst: &mut [u8],
    src_va: VAddr,
) -> Result<(), VmError> {
    let mut dst = dst;
    let mut src_va = src_va;
    while !dst.is_empty() {
        let va0 = page_round_down(src_va);
        let pa0 = user_page(phys, root, va0).ok_or(VmError::NotMapped)?;
        let offset = (src_va - va0) as usize;
        let n = usize::min(PAGESIZE - offset, dst.len());

        let src = (phys.map(pa0) as usize + offset) as *const u8;
        unsafe { core::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), n) };

        dst = &mut dst[n..];
        src_va = va0 + PAGESIZE as u64;
    }
    Ok(())
}

/// Copy a null-terminated string out of a user address space starting at `src_va`.
///
/// Copying stops the moment a terminating zero byte is read; the terminator is
/// written into `dst` and the string length (terminator excluded) is returned.
/// When `dst` fills up before a terminator was found the copy fails with
/// [`VmError::StringTooLong`].
pub fn copy_str_from_user(
    phys: &PhysMapping,
    root: &PageTable,
    dst: &mut [u8],
    src_va: VAddr,
) -> Result<usize, VmError> {
    let mut copied = 0;
    let mut src_va = src_va;
    loop {
        if copied == dst.len() {
            return Err(VmError::StringTooLong);
        }

        let va0 = page_round_down(src_va);
        let pa0 = user_page(phys, root, va0).ok_or(VmError::NotMapped)?;
        let offset = (src_va - va0) as usize;
        let n = usize::min(PAGESIZE - offset, dst.len() - copied);

        let page = phys.map(pa0) as *const u8;
        for i in 0..n {
            let byte = unsafe { page.add(offset + i).read() };
            dst[copied] = byte;
            if byte == 0 {
                return Ok(copied);
            }
            copied += 1;
        }

        src_va = va0 + PAGESIZE as u64;
    }
}
