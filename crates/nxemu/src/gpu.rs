//! GPU command-buffer translation and submission.
//!
//! The designated core's batches produce opaque command buffers in the
//! console's proprietary stream format (see `nxemu_hw::gpu`). This module
//! deserializes a buffer into a renderer-agnostic sequence of operations
//! and executes them, in emission order, against a CPU framebuffer that is
//! then handed to a [`PresentTarget`].
//!
//! Draw order is authoritative: the stream assumes the strict sequential
//! submission semantics of the original hardware's command processor, so
//! operations are never reordered. An unrecognized command is skipped and
//! counted rather than failing the frame; a truncated stream stops parsing
//! but the frame still presents whatever parsed before the fault.

use nxemu_hw::gpu::{HEADER_BYTES, commands, payload};
use nxemu_hw::specs::display;
use thiserror::Error;
use tracing::{debug, warn};

/// An opaque, length-delimited batch of proprietary GPU commands.
///
/// Produced by a core's execution batch, consumed exactly once by the
/// translator, never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuffer {
    bytes: Vec<u8>,
}

impl CommandBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A single translated command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpuOp {
    Clear { r: f32, g: f32, b: f32, a: f32 },
    BindPipeline { id: u32 },
    DrawQuad { x: u32, y: u32, width: u32, height: u32, color: u32 },
    SetScissor { x: u32, y: u32, width: u32, height: u32 },
}

/// A fault raised while translating one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranslationFault {
    /// The stream carried an opcode the translator does not recognize.
    #[error("unrecognized command {opcode:#06x} at offset {offset:#x}")]
    UnknownCommand { opcode: u32, offset: usize },
    /// Trailing bytes too short to hold a command header.
    #[error("truncated command header at offset {offset:#x} ({remaining} bytes left)")]
    TruncatedHeader { offset: usize, remaining: usize },
    /// A declared payload extends past the end of the buffer.
    #[error("command {opcode:#06x} payload runs past end of buffer at offset {offset:#x}")]
    TruncatedPayload { opcode: u32, offset: usize },
    /// A recognized command carried a payload of the wrong size.
    #[error("command {opcode:#06x} payload is {actual} bytes, expected {expected}")]
    BadPayloadSize { opcode: u32, expected: usize, actual: usize },
}

/// Errors from the presentation backend.
#[derive(Debug, Error)]
pub enum GpuError {
    /// The host lacks a usable graphics backend. Fatal to graphics output
    /// only; CPU execution may continue headless.
    #[error("no usable presentation device: {0}")]
    UnsupportedDevice(String),
    /// Presenting a completed frame failed.
    #[error("failed to present frame: {0}")]
    Present(String),
}

/// Result of deserializing one command buffer.
#[derive(Debug, Default)]
pub struct ParsedStream {
    pub ops: Vec<GpuOp>,
    pub faults: Vec<TranslationFault>,
}

fn read_u32(payload: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]])
}

fn read_f32(payload: &[u8], at: usize) -> f32 {
    f32::from_bits(read_u32(payload, at))
}

/// Deserialize a command stream into operations, in emission order.
///
/// Unknown commands and payload-size mismatches are skipped (their
/// declared payload length still advances the cursor); truncation stops
/// the parse since no further command boundary can be trusted.
pub fn parse_stream(buffer: &CommandBuffer) -> ParsedStream {
    let bytes = buffer.bytes();
    let mut out = ParsedStream::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < HEADER_BYTES {
            out.faults
                .push(TranslationFault::TruncatedHeader { offset, remaining });
            break;
        }

        let opcode = read_u32(bytes, offset);
        let declared = read_u32(bytes, offset + 4) as usize;
        let body_at = offset + HEADER_BYTES;

        if bytes.len() - body_at < declared {
            out.faults
                .push(TranslationFault::TruncatedPayload { opcode, offset });
            break;
        }
        let body = &bytes[body_at..body_at + declared];

        let expected = match opcode {
            commands::CLEAR => Some(payload::CLEAR),
            commands::BIND_PIPELINE => Some(payload::BIND_PIPELINE),
            commands::DRAW_QUAD => Some(payload::DRAW_QUAD),
            commands::SET_SCISSOR => Some(payload::SET_SCISSOR),
            _ => None,
        };

        match expected {
            None => out.faults.push(TranslationFault::UnknownCommand { opcode, offset }),
            Some(expected) if expected != declared => {
                out.faults.push(TranslationFault::BadPayloadSize {
                    opcode,
                    expected,
                    actual: declared,
                });
            }
            Some(_) => {
                let op = match opcode {
                    commands::CLEAR => GpuOp::Clear {
                        r: read_f32(body, 0),
                        g: read_f32(body, 4),
                        b: read_f32(body, 8),
                        a: read_f32(body, 12),
                    },
                    commands::BIND_PIPELINE => GpuOp::BindPipeline {
                        id: read_u32(body, 0),
                    },
                    commands::DRAW_QUAD => GpuOp::DrawQuad {
                        x: read_u32(body, 0),
                        y: read_u32(body, 4),
                        width: read_u32(body, 8),
                        height: read_u32(body, 12),
                        color: read_u32(body, 16),
                    },
                    commands::SET_SCISSOR => GpuOp::SetScissor {
                        x: read_u32(body, 0),
                        y: read_u32(body, 4),
                        width: read_u32(body, 8),
                        height: read_u32(body, 12),
                    },
                    _ => unreachable!("expected size implies known opcode"),
                };
                out.ops.push(op);
            }
        }

        offset = body_at + declared;
    }

    out
}

/// Builder for command streams, mirroring the parser.
///
/// Used by the built-in demo image and by tests; guest programs normally
/// carry pre-built streams in their data sections.
#[derive(Debug, Default)]
pub struct CommandWriter {
    bytes: Vec<u8>,
}

impl CommandWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&mut self, opcode: u32, body: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(&opcode.to_le_bytes());
        self.bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(body);
        self
    }

    pub fn clear(&mut self, r: f32, g: f32, b: f32, a: f32) -> &mut Self {
        let mut body = [0u8; payload::CLEAR];
        for (slot, v) in body.chunks_exact_mut(4).zip([r, g, b, a]) {
            slot.copy_from_slice(&v.to_bits().to_le_bytes());
        }
        self.command(commands::CLEAR, &body)
    }

    pub fn bind_pipeline(&mut self, id: u32) -> &mut Self {
        self.command(commands::BIND_PIPELINE, &id.to_le_bytes())
    }

    pub fn draw_quad(&mut self, x: u32, y: u32, width: u32, height: u32, color: u32) -> &mut Self {
        let mut body = [0u8; payload::DRAW_QUAD];
        for (slot, v) in body.chunks_exact_mut(4).zip([x, y, width, height, color]) {
            slot.copy_from_slice(&v.to_le_bytes());
        }
        self.command(commands::DRAW_QUAD, &body)
    }

    pub fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) -> &mut Self {
        let mut body = [0u8; payload::SET_SCISSOR];
        for (slot, v) in body.chunks_exact_mut(4).zip([x, y, width, height]) {
            slot.copy_from_slice(&v.to_le_bytes());
        }
        self.command(commands::SET_SCISSOR, &body)
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

/// The CPU framebuffer frames are composed into, `0xRRGGBB` per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
        }
    }
}

/// Where completed frames go.
///
/// The translator renders into its framebuffer and hands it off here; the
/// windowed frontend backs this with a softbuffer surface, tests with an
/// offscreen copy.
pub trait PresentTarget {
    fn present(&mut self, fb: &Framebuffer) -> Result<(), GpuError>;
}

/// Headless target: counts presents and keeps the last frame.
#[derive(Debug, Default)]
pub struct OffscreenTarget {
    pub frames: u64,
    pub last_frame: Option<Framebuffer>,
}

impl PresentTarget for OffscreenTarget {
    fn present(&mut self, fb: &Framebuffer) -> Result<(), GpuError> {
        self.frames += 1;
        self.last_frame = Some(fb.clone());
        Ok(())
    }
}

/// Translates proprietary command buffers and submits frames.
pub struct CommandTranslator {
    target: Box<dyn PresentTarget>,
    fb: Framebuffer,
    scissor: Option<(u32, u32, u32, u32)>,
    bound_pipeline: u32,
    frames_presented: u64,
    faults_skipped: u64,
}

impl CommandTranslator {
    /// Create a translator submitting against `target`.
    ///
    /// The presentation device itself is initialized by the frontend that
    /// constructs the target; a host without one fails there with
    /// [`GpuError::UnsupportedDevice`] and the session continues headless.
    pub fn new(target: Box<dyn PresentTarget>) -> Self {
        Self {
            target,
            fb: Framebuffer::new(display::WIDTH, display::HEIGHT),
            scissor: None,
            bound_pipeline: 0,
            frames_presented: 0,
            faults_skipped: 0,
        }
    }

    /// Frames presented so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Commands skipped due to translation faults so far.
    pub fn faults_skipped(&self) -> u64 {
        self.faults_skipped
    }

    /// Translate one buffer and present the resulting frame.
    ///
    /// Empty buffers are a no-op: nothing is drawn, nothing is presented,
    /// no fault is raised.
    pub fn translate_and_submit(&mut self, buffer: &CommandBuffer) -> Result<(), GpuError> {
        if buffer.is_empty() {
            return Ok(());
        }

        let parsed = parse_stream(buffer);
        for fault in &parsed.faults {
            // Skip the single bad command and keep the frame.
            warn!("skipping command: {fault}");
        }
        self.faults_skipped += parsed.faults.len() as u64;

        debug!(
            ops = parsed.ops.len(),
            skipped = parsed.faults.len(),
            "translated command buffer ({} bytes)",
            buffer.len()
        );

        for op in parsed.ops {
            self.apply(op);
        }

        self.target.present(&self.fb)?;
        self.frames_presented += 1;
        Ok(())
    }

    /// Re-present the current frame without translating anything new.
    /// Used by the windowed frontend's redraw path.
    pub fn present_current(&mut self) -> Result<(), GpuError> {
        self.target.present(&self.fb)
    }

    fn apply(&mut self, op: GpuOp) {
        match op {
            GpuOp::Clear { r, g, b, .. } => {
                let color = pack_rgb(r, g, b);
                self.fb.pixels.fill(color);
                self.scissor = None;
            }
            GpuOp::BindPipeline { id } => {
                self.bound_pipeline = id;
            }
            GpuOp::SetScissor { x, y, width, height } => {
                self.scissor = Some((x, y, width, height));
            }
            GpuOp::DrawQuad { x, y, width, height, color } => {
                self.fill_quad(x, y, width, height, color);
            }
        }
    }

    fn fill_quad(&mut self, x: u32, y: u32, width: u32, height: u32, color: u32) {
        let (mut x0, mut y0) = (x, y);
        let (mut x1, mut y1) = (x.saturating_add(width), y.saturating_add(height));

        if let Some((sx, sy, sw, sh)) = self.scissor {
            x0 = x0.max(sx);
            y0 = y0.max(sy);
            x1 = x1.min(sx.saturating_add(sw));
            y1 = y1.min(sy.saturating_add(sh));
        }
        x1 = x1.min(self.fb.width);
        y1 = y1.min(self.fb.height);

        for row in y0..y1 {
            for col in x0..x1 {
                self.fb.pixels[(row * self.fb.width + col) as usize] = color;
            }
        }
    }
}

fn pack_rgb(r: f32, g: f32, b: f32) -> u32 {
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0) as u32;
    (to_byte(r) << 16) | (to_byte(g) << 8) | to_byte(b)
}
