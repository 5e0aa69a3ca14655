use crate::mem::paddr::PAddr;

/// Description of where in the kernel's own address space physical memory is accessible.
///
/// The page table tree stores physical addresses but the kernel has to follow those
/// links with ordinary loads and stores, so every traversal needs to know how to turn
/// a physical address into one the CPU can dereference right now.
/// For the boot identity map (and for host-side tests) that conversion is a no-op;
/// a kernel running with a higher-half direct map would use a non-zero offset.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PhysMapping {
    start: u64,
    size: u64,
}

impl PhysMapping {
    /// Return the mapping which describes addresses being identity-mapped.
    /// That is, physical addresses can be dereferenced directly.
    pub const fn identity() -> Self {
        Self {
            start: 0,
            size: u64::MAX,
        }
    }

    /// Create a new instance describing physical addresses being accessible starting
    /// at `start` for the next `size` bytes.
    pub const fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    /// Resolve the given physical address into its dereferencable counterpart.
    pub const fn map(&self, addr: PAddr) -> u64 {
        assert!(addr < self.size);
        self.start + addr
    }

    /// Reverse-resolve a dereferencable address back into the physical address the
    /// memory management unit understands.
    pub const fn rev_map(&self, addr: u64) -> PAddr {
        assert!(addr >= self.start);
        addr - self.start
    }
}
