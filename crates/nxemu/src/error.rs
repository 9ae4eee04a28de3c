//! Session-level error taxonomy.

use thiserror::Error;

use crate::image::ImageError;
use crate::memory::ArenaError;
use crate::session::SessionState;

/// Errors surfaced by the emulator session to its frontend.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Session bring-up failed (arena allocation, core spawn, bad config).
    #[error("initialization failed: {0}")]
    Initialization(String),
    /// The guest memory arena rejected an operation.
    #[error(transparent)]
    Arena(#[from] ArenaError),
    /// A program image could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The requested operation is illegal in the session's current state.
    #[error("operation not permitted while {state:?}")]
    State { state: SessionState },
}

/// Why a program image was refused.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The container itself is malformed.
    #[error(transparent)]
    Image(#[from] ImageError),
    /// A section would land outside the guest program region.
    #[error("section {index} does not fit the program region")]
    SectionOutsideProgramRegion { index: usize },
    /// The entry point is not inside the program region.
    #[error("entry point {entry:#x} is outside the program region")]
    EntryOutsideProgramRegion { entry: u64 },
}
