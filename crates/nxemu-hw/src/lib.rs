//! Hardware constants for the emulated console.
//!
//! This crate carries the numbers that describe the guest machine: the
//! arena (guest DRAM) layout, clock/display/audio specifications, and the
//! proprietary GPU command-stream opcodes. It is dependency-free so both
//! the emulator and external tooling can share the same definitions.

pub mod gpu;
pub mod memory_map;
pub mod specs;
