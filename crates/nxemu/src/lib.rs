pub mod args;
pub mod audio;
pub mod cpu;
pub mod demo;
pub mod display;
pub mod error;
pub mod gpu;
pub mod image;
pub mod input;
pub mod isa;
pub mod memory;
pub mod scheduler;
pub mod session;

// Re-export commonly used types
pub use args::Args;
pub use audio::{AudioFrame, AudioQueue, ChannelBlock};
pub use cpu::{BatchOutcome, CoreFault, ExecutionCore, RegisterFile};
pub use error::{EmulatorError, LoadError};
pub use gpu::{
    CommandBuffer, CommandTranslator, CommandWriter, Framebuffer, GpuError, OffscreenTarget,
    PresentTarget, TranslationFault,
};
pub use image::{Image, ImageBuilder, ImageError};
pub use input::{InputSampler, InputSnapshot, StickVector};
pub use memory::{ArenaError, MemoryArena};
pub use scheduler::{CoreEvent, CoreState, Dispatcher};
pub use session::{EmulatorConfig, EmulatorSession, SessionState};
