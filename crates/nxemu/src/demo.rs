//! Built-in demo image.
//!
//! A self-contained program that exercises the whole pipeline without any
//! external assets: core 0 submits a prebuilt command stream and a sine
//! tone every frame, while the remaining cores count in work RAM. Handy
//! for smoke-testing a frontend (`--demo`).

use std::f32::consts::TAU;

use nxemu_hw::memory_map::program;
use nxemu_hw::specs::{audio, display};

use crate::gpu::CommandWriter;
use crate::image::ImageBuilder;
use crate::isa::{Instr::*, assemble};

/// Data section offsets inside the program region.
const COMMANDS_AT: u64 = program::BASE + 0x1000;
const AUDIO_AT: u64 = program::BASE + 0x2000;

/// Stereo sample pairs per frame at the nominal rates.
const PAIRS_PER_FRAME: usize = (audio::SAMPLE_RATE_HZ / display::REFRESH_RATE_HZ) as usize;

/// Build the demo image.
pub fn demo_image() -> Vec<u8> {
    let entry = program::BASE;
    let i = |index: u64| (entry + index * 8) as u32;

    // Core 0 branches off to the submit loop; the rest derive a private
    // work-RAM slot from their core id and count forever.
    let code = assemble(&[
        /* 0 */ BranchIfZero { rs1: 1, target: i(7) },
        // background cores: x3 = counters base + 8 * core id
        /* 1 */ Mov { rd: 3, rs1: 1 },
        /* 2 */ Add { rd: 3, rs1: 3, rs2: 3 },
        /* 3 */ Add { rd: 3, rs1: 3, rs2: 3 },
        /* 4 */ Add { rd: 3, rs1: 3, rs2: 3 },
        /* 5 */ AddImm { rd: 3, rs1: 3, imm: COUNTERS_AT as u32 },
        /* 6 */ Jump { target: i(12) },
        // designated core: submit audio then commands, once per tick
        /* 7 */ LoadImm { rd: 2, imm: COMMANDS_AT as u32 },
        /* 8 */ LoadImm { rd: 3, imm: commands().len() as u32 },
        /* 9 */ LoadImm { rd: 4, imm: AUDIO_AT as u32 },
        /* 10 */ LoadImm { rd: 5, imm: (PAIRS_PER_FRAME * audio::CHANNELS) as u32 },
        /* 11 */ Jump { target: i(15) },
        // background loop
        /* 12 */ AddImm { rd: 2, rs1: 2, imm: 1 },
        /* 13 */ Store { src: 2, base: 3, offset: 0 },
        /* 14 */ Jump { target: i(12) },
        // submit loop, designated core only
        /* 15 */ SubmitAudio { addr: 4, len: 5 },
        /* 16 */ SubmitCommands { addr: 2, len: 3 },
        /* 17 */ Jump { target: i(15) },
    ]);

    ImageBuilder::new(entry)
        .section(entry, code)
        .section(COMMANDS_AT, commands())
        .section(AUDIO_AT, tone())
        .build()
}

/// Background-core counters, after the data sections.
const COUNTERS_AT: u64 = program::BASE + 0x8000;

fn commands() -> Vec<u8> {
    let mut w = CommandWriter::new();
    w.clear(0.05, 0.05, 0.12, 1.0)
        .bind_pipeline(0)
        .draw_quad(
            display::WIDTH / 2 - 160,
            display::HEIGHT / 2 - 90,
            320,
            180,
            0xE03C50,
        )
        .set_scissor(0, display::HEIGHT - 40, display::WIDTH, 40)
        .draw_quad(0, 0, display::WIDTH, display::HEIGHT, 0x2C2C34);
    w.finish()
}

/// One frame of 440 Hz tone, interleaved stereo f32.
fn tone() -> Vec<u8> {
    let mut out = Vec::with_capacity(PAIRS_PER_FRAME * audio::CHANNELS * 4);
    for n in 0..PAIRS_PER_FRAME {
        let t = n as f32 / audio::SAMPLE_RATE_HZ as f32;
        let sample = (TAU * 440.0 * t).sin() * 0.2;
        out.extend_from_slice(&sample.to_le_bytes());
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuOp, parse_stream};
    use crate::image::Image;

    #[test]
    fn background_loop_is_below_the_data_sections() {
        // 18 instructions of code; the first data section sits at +0x1000.
        assert!(18 * 8 < 0x1000);
        assert!(COUNTERS_AT > AUDIO_AT + tone().len() as u64);
    }

    #[test]
    fn demo_image_parses_and_carries_a_valid_stream() {
        let file = demo_image();
        let image = Image::parse(&file).unwrap();
        assert_eq!(image.entry, program::BASE);
        assert_eq!(image.sections.len(), 3);

        let stream = crate::gpu::CommandBuffer::new(
            image.section_bytes(&image.sections[1]).to_vec(),
        );
        let parsed = parse_stream(&stream);
        assert!(parsed.faults.is_empty());
        assert!(matches!(parsed.ops[0], GpuOp::Clear { .. }));
        assert_eq!(parsed.ops.len(), 5);
    }

    #[test]
    fn tone_section_is_one_frame_of_stereo() {
        assert_eq!(tone().len(), PAIRS_PER_FRAME * 2 * 4);
    }
}
