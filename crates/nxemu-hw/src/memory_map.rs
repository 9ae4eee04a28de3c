//! Layout of the shared guest memory arena.
//!
//! Every address used by the emulator is an offset into one contiguous
//! arena standing in for guest DRAM. The low region is reserved for
//! engine-visible structures (per-core register banks, the input snapshot),
//! the program image loads at a fixed base, and everything above the
//! program region is general-purpose guest RAM.

/// Guest DRAM.
pub mod dram {
    /// Default arena capacity (4 GiB, the console's DRAM size).
    pub const SIZE: usize = 4 * 1024 * 1024 * 1024;
}

/// Per-core register banks.
///
/// Each execution core mirrors its register file into its bank at batch
/// boundaries so the scheduler can observe register state without a
/// separate copy. A bank holds 32 general-purpose registers, the program
/// counter, and the status register, all 64-bit.
pub mod register_bank {
    /// Base offset of the first core's bank.
    pub const BASE: u64 = 0x0000;
    /// Bytes reserved per core (34 registers padded to a power of two).
    pub const PER_CORE_SIZE: u64 = 0x200;
    /// Maximum number of banked cores.
    pub const MAX_CORES: usize = 8;
    /// Total size of the bank region.
    pub const SIZE: usize = (PER_CORE_SIZE as usize) * MAX_CORES;
}

/// Input snapshot region.
///
/// The dispatcher serializes the current input snapshot here before
/// requesting a tick batch from the designated core; guest code reads it
/// with ordinary loads.
pub mod input {
    /// Base offset of the encoded snapshot.
    pub const BASE: u64 = 0x1000;
    /// Bytes reserved for the snapshot encoding.
    pub const SIZE: usize = 0x40;
}

/// Program image region.
pub mod program {
    /// Load base for program image sections.
    pub const BASE: u64 = 0x1_0000;
    /// Maximum bytes of loaded program image (64 MiB).
    pub const MAX_SIZE: usize = 64 * 1024 * 1024;
    /// End of the program region (exclusive).
    pub const END: u64 = BASE + MAX_SIZE as u64;
}

/// General-purpose guest work RAM above the program region.
pub mod work {
    /// Base offset of guest work RAM.
    pub const BASE: u64 = super::program::END;
}

/// Smallest arena capacity that still contains the fixed layout
/// (register banks, input region, and the program load base).
pub const MIN_ARENA_SIZE: usize = program::BASE as usize;
