#![no_std]

#[cfg(target_arch = "riscv64")]
pub mod cpu;
pub mod mem;
