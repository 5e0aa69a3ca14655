/// Type alias for physical addresses.
///
/// This is used by functions that explicitly interpret addresses as physical ones.
pub type PAddr = u64;

pub(crate) const PAGE_OFFSET_BITS: u64 = 12;
pub(crate) const PAGE_OFFSET_MASK: u64 = (1 << PAGE_OFFSET_BITS) - 1;

pub(crate) const PPN_BITS: u64 = 44;

/// All address bits an Sv39 physical address may use (56 bits)
pub const PADDR_MASK: u64 = (1 << (PPN_BITS + PAGE_OFFSET_BITS)) - 1;

/// Get the page offset from a physical address
#[inline]
pub fn paddr_page_offset(paddr: PAddr) -> u64 {
    paddr & PAGE_OFFSET_MASK
}
