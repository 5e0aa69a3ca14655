//! Access to the control and status registers involved in address translation

use core::arch::asm;

/// The addressing mode stored in the `satp` register
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u64)]
pub enum SatpMode {
    /// No translation or protection
    Bare = 0,
    /// Page-based 39-bit virtual addressing
    Sv39 = 8,
    /// Page-based 48-bit virtual addressing
    Sv48 = 9,
}

/// The data that is held by the [`Satp`] register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SatpData {
    pub mode: SatpMode,
    pub asid: u64,
    pub ppn: u64,
}

impl From<SatpData> for u64 {
    fn from(value: SatpData) -> Self {
        (value.mode as u64) << 60 | (value.asid & 0xFFFF) << 44 | value.ppn & ((1 << 44) - 1)
    }
}

/// The supervisor address translation and protection register.
///
/// It holds the physical page number of the root page table together with the
/// addressing mode; writing it is what actually switches the active address space.
pub struct Satp;

impl Satp {
    pub fn read_raw() -> u64 {
        let value: u64;
        unsafe { asm!("csrr {}, satp", out(reg) value) };
        value
    }

    /// Write the given translation configuration into the hardware register.
    ///
    /// Stale translations are flushed on both sides of the write so that no cached
    /// entry of the previous address space survives the switch.
    ///
    /// # Safety
    /// This changes how all memory accesses are resolved.
    /// The referenced page table must map the currently executing code or the CPU
    /// will fault immediately after the write.
    pub unsafe fn write(value: SatpData) {
        let raw: u64 = value.into();
        unsafe {
            asm!(
                "sfence.vma",
                "csrw satp, {}",
                "sfence.vma",
                in(reg) raw,
            )
        };
    }
}
