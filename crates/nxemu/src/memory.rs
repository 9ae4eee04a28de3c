//! The shared guest memory arena.
//!
//! One arena exists per running session and stands in for all of guest
//! DRAM. It is shared (not copied) across every execution core via `Arc`,
//! and exposed only through bounds-checked offset+length accessors: an
//! out-of-range access is an [`ArenaError::OutOfBounds`], never undefined
//! behavior at the component boundary.
//!
//! # Cross-core visibility
//!
//! The arena itself imposes no ordering. A write made by one core is
//! guaranteed visible to another only after a synchronization point —
//! in practice, delivery of a scheduler message (the dispatcher fences
//! around command-buffer and audio handoff; see `scheduler`). Callers that
//! read memory another core may be writing concurrently get whatever bytes
//! the hardware happens to deliver, exactly as on the real console.

use std::cell::UnsafeCell;
use std::mem::ManuallyDrop;

use thiserror::Error;

/// Errors produced by arena allocation and access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The host could not reserve the requested capacity.
    #[error("cannot allocate {requested} bytes of guest DRAM")]
    OutOfMemory {
        /// Requested capacity in bytes.
        requested: usize,
    },
    /// `offset + len` exceeds the arena capacity.
    #[error("access at offset {offset:#x} ({len} bytes) exceeds capacity {capacity:#x}")]
    OutOfBounds {
        /// Offset of the failed access.
        offset: u64,
        /// Length of the failed access.
        len: usize,
        /// Arena capacity in bytes.
        capacity: usize,
    },
}

/// One large contiguous byte region, concurrently mapped into every
/// execution core. Created once at session start, never resized.
pub struct MemoryArena {
    cells: Box<[UnsafeCell<u8>]>,
}

// SAFETY: All access goes through the bounds-checked accessors below, and
// cross-core ordering is the scheduler's documented contract (writes are
// published at message-delivery fences). Racing byte access yields
// unspecified byte values, matching guest-visible hardware behavior.
unsafe impl Send for MemoryArena {}
unsafe impl Sync for MemoryArena {}

impl MemoryArena {
    /// Allocate a zeroed arena of `capacity` bytes.
    pub fn allocate(capacity: usize) -> Result<Self, ArenaError> {
        let mut bytes: Vec<u8> = Vec::new();
        if bytes.try_reserve_exact(capacity).is_err() {
            return Err(ArenaError::OutOfMemory {
                requested: capacity,
            });
        }
        bytes.resize(capacity, 0);

        let mut bytes = ManuallyDrop::new(bytes);
        let (ptr, len, cap) = (bytes.as_mut_ptr(), bytes.len(), bytes.capacity());
        // SAFETY: UnsafeCell<u8> is repr(transparent) over u8, so the
        // allocation can be reinterpreted element-for-element.
        let cells = unsafe { Vec::from_raw_parts(ptr.cast::<UnsafeCell<u8>>(), len, cap) };

        Ok(Self {
            cells: cells.into_boxed_slice(),
        })
    }

    /// Arena capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn base_ptr(&self) -> *mut u8 {
        self.cells.as_ptr() as *mut u8
    }

    fn check(&self, offset: u64, len: usize) -> Result<usize, ArenaError> {
        let end = offset.checked_add(len as u64);
        match end {
            Some(end) if end <= self.cells.len() as u64 => Ok(offset as usize),
            _ => Err(ArenaError::OutOfBounds {
                offset,
                len,
                capacity: self.cells.len(),
            }),
        }
    }

    /// Borrow `len` bytes starting at `offset`.
    ///
    /// The returned slice is only stable while no other core writes the
    /// range; use the copying accessors when that cannot be guaranteed.
    pub fn view(&self, offset: u64, len: usize) -> Result<&[u8], ArenaError> {
        let start = self.check(offset, len)?;
        // SAFETY: range checked above; aliasing is covered by the arena's
        // cross-core visibility contract.
        Ok(unsafe { std::slice::from_raw_parts(self.base_ptr().add(start), len) })
    }

    /// Copy bytes out of the arena into `out`.
    pub fn read_bytes(&self, offset: u64, out: &mut [u8]) -> Result<(), ArenaError> {
        let start = self.check(offset, out.len())?;
        // SAFETY: range checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base_ptr().add(start), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    /// Copy `data` into the arena at `offset`.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<(), ArenaError> {
        let start = self.check(offset, data.len())?;
        // SAFETY: range checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base_ptr().add(start), data.len());
        }
        Ok(())
    }

    /// Read a little-endian u64 at `offset`.
    pub fn read_u64(&self, offset: u64) -> Result<u64, ArenaError> {
        let mut buf = [0u8; 8];
        self.read_bytes(offset, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Write a little-endian u64 at `offset`.
    pub fn write_u64(&self, offset: u64, value: u64) -> Result<(), ArenaError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Read a little-endian u32 at `offset`.
    pub fn read_u32(&self, offset: u64) -> Result<u32, ArenaError> {
        let mut buf = [0u8; 4];
        self.read_bytes(offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl std::fmt::Debug for MemoryArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryArena")
            .field("capacity", &self.cells.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;

    #[test]
    fn round_trip_same_thread() {
        let arena = MemoryArena::allocate(0x1000).unwrap();
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x42];
        arena.write_bytes(0x800, &data).unwrap();

        let mut out = [0u8; 5];
        arena.read_bytes(0x800, &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(arena.view(0x800, 5).unwrap(), &data);
    }

    #[test]
    fn round_trip_across_threads_after_sync_point() {
        let arena = Arc::new(MemoryArena::allocate(0x1000).unwrap());
        let (tx, rx) = mpsc::channel();

        let writer = {
            let arena = Arc::clone(&arena);
            std::thread::spawn(move || {
                arena.write_bytes(0x10, b"handoff").unwrap();
                // Channel delivery is the synchronization point.
                tx.send(()).unwrap();
            })
        };

        rx.recv().unwrap();
        let mut out = [0u8; 7];
        arena.read_bytes(0x10, &mut out).unwrap();
        assert_eq!(&out, b"handoff");
        writer.join().unwrap();
    }

    #[test]
    fn out_of_bounds_access_faults() {
        let arena = MemoryArena::allocate(0x100).unwrap();
        let err = arena.write_bytes(0xFE, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ArenaError::OutOfBounds { offset: 0xFE, len: 3, .. }));

        assert!(arena.read_u64(0xF8).is_ok());
        assert!(arena.read_u64(0xF9).is_err());
        // Offsets past the end must not wrap.
        assert!(arena.view(u64::MAX, 2).is_err());
    }

    #[test]
    fn word_accessors_are_little_endian() {
        let arena = MemoryArena::allocate(0x100).unwrap();
        arena.write_u64(0x20, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(arena.read_u32(0x20).unwrap(), 0x5566_7788);
        assert_eq!(arena.read_u64(0x20).unwrap(), 0x1122_3344_5566_7788);
    }
}
