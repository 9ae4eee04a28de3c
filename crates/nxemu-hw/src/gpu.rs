//! Proprietary GPU command-stream format.
//!
//! A command buffer is a flat byte sequence of commands, each a fixed
//! 8-byte header followed by a payload:
//!
//! ```text
//! +--------------+-------------------+------------------+
//! | opcode (u32) | payload_len (u32) | payload bytes... |
//! +--------------+-------------------+------------------+
//! ```
//!
//! All integers are little-endian. Commands execute strictly in emission
//! order; the stream carries no alignment padding between commands.

/// Bytes in a command header (opcode + payload length).
pub const HEADER_BYTES: usize = 8;

/// Command opcodes.
pub mod commands {
    /// Clear the render target. Payload: 4 x f32 RGBA.
    pub const CLEAR: u32 = 0x0001;
    /// Bind a translated pipeline. Payload: u32 pipeline id.
    pub const BIND_PIPELINE: u32 = 0x0002;
    /// Draw an axis-aligned quad. Payload: u32 x, y, width, height, color.
    pub const DRAW_QUAD: u32 = 0x0003;
    /// Restrict subsequent draws. Payload: u32 x, y, width, height.
    pub const SET_SCISSOR: u32 = 0x0004;
}

/// Expected payload sizes per opcode.
pub mod payload {
    /// CLEAR payload bytes.
    pub const CLEAR: usize = 16;
    /// BIND_PIPELINE payload bytes.
    pub const BIND_PIPELINE: usize = 4;
    /// DRAW_QUAD payload bytes.
    pub const DRAW_QUAD: usize = 20;
    /// SET_SCISSOR payload bytes.
    pub const SET_SCISSOR: usize = 16;
}
