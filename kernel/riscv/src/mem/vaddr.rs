use crate::mem::PAGESIZE;

/// Type alias for virtual addresses.
///
/// This is used by functions that explicitly interpret addresses as virtual ones.
pub type VAddr = u64;

const PAGE_OFFSET_BITS: u64 = 12;
const PAGE_OFFSET_MASK: u64 = (1 << PAGE_OFFSET_BITS) - 1;

const VPN_SEGMENT_BITS: u64 = 9;
const VPN_SEGMENT_MASK: u64 = (1 << VPN_SEGMENT_BITS) - 1;

/// One past the largest usable Sv39 virtual address.
///
/// Sv39 offers 39 usable bits but bit 38 is avoided on purpose: addresses with it
/// set would need sign-extension in bits 39..64 and are easier to rule out entirely.
pub const MAX_VADDR: VAddr = 1 << (PAGE_OFFSET_BITS + 3 * VPN_SEGMENT_BITS - 1);

/// Get the VPN (virtual page number) segments from a virtual address.
///
/// Segment `[i]` indexes the level-`i` page table, level 2 being the root.
#[inline]
pub fn vpn_segments(vaddr: VAddr) -> [usize; 3] {
    [
        ((vaddr >> PAGE_OFFSET_BITS) & VPN_SEGMENT_MASK) as usize,
        ((vaddr >> (PAGE_OFFSET_BITS + VPN_SEGMENT_BITS)) & VPN_SEGMENT_MASK) as usize,
        ((vaddr >> (PAGE_OFFSET_BITS + 2 * VPN_SEGMENT_BITS)) & VPN_SEGMENT_MASK) as usize,
    ]
}

/// Get the page offset from a virtual address
#[inline]
pub fn vaddr_page_offset(vaddr: VAddr) -> u64 {
    vaddr & PAGE_OFFSET_MASK
}

/// Round an address down to the start of the page containing it
#[inline]
pub fn page_round_down(addr: u64) -> u64 {
    addr & !(PAGESIZE as u64 - 1)
}

/// Round an address up to the next page boundary (identity on page boundaries)
#[inline]
pub fn page_round_up(addr: u64) -> u64 {
    (addr + PAGESIZE as u64 - 1) & !(PAGESIZE as u64 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_segments_are_extracted_in_level_order() {
        let vaddr = (3u64 << 30) | (2 << 21) | (1 << 12) | 0x123;
        assert_eq!(vpn_segments(vaddr), [1, 2, 3]);
        assert_eq!(vaddr_page_offset(vaddr), 0x123);
    }

    #[test]
    fn test_page_rounding() {
        assert_eq!(page_round_down(0x1fff), 0x1000);
        assert_eq!(page_round_up(0x1001), 0x2000);
        assert_eq!(page_round_up(0x1000), 0x1000);
    }
}
