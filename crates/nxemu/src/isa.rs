//! The closed guest instruction set.
//!
//! Instructions are a fixed 8 bytes: an opcode byte, three register
//! operand bytes, and a 32-bit little-endian immediate:
//!
//! ```text
//! +--------+----+-----+-----+---------------+
//! | opcode | rd | rs1 | rs2 | imm (u32, LE) |
//! +--------+----+-----+-----+---------------+
//! ```
//!
//! The set is deliberately closed: decode produces a tagged variant and
//! execution dispatches through one exhaustive match, so an unhandled
//! opcode is impossible to reach past decode. Unknown opcode bytes decode
//! to an error carrying the offending byte.

use nxemu_hw::specs;

/// Bytes per encoded instruction.
pub const INSTRUCTION_BYTES: u64 = 8;

/// Register conventions baked into the engine.
pub mod reg {
    /// Seeded with the core id at program load.
    pub const CORE_ID: u8 = 1;
    /// Link register written by `Call`, read by `Ret`.
    pub const LINK: u8 = 30;
}

/// Opcode byte values.
pub mod opcode {
    pub const HALT: u8 = 0x00;
    pub const LOAD_IMM: u8 = 0x01;
    pub const MOV: u8 = 0x02;
    pub const ADD: u8 = 0x03;
    pub const SUB: u8 = 0x04;
    pub const ADD_IMM: u8 = 0x05;
    pub const LOAD: u8 = 0x10;
    pub const STORE: u8 = 0x11;
    pub const JUMP: u8 = 0x20;
    pub const BRANCH_IF_ZERO: u8 = 0x21;
    pub const CALL: u8 = 0x22;
    pub const RET: u8 = 0x23;
    pub const SUBMIT_COMMANDS: u8 = 0x30;
    pub const SUBMIT_AUDIO: u8 = 0x31;
}

/// One decoded guest instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    /// Stop this core; it stays halted until the next program load.
    Halt,
    /// `rd = imm` (zero-extended).
    LoadImm { rd: u8, imm: u32 },
    /// `rd = rs1`.
    Mov { rd: u8, rs1: u8 },
    /// `rd = rs1 + rs2` (wrapping).
    Add { rd: u8, rs1: u8, rs2: u8 },
    /// `rd = rs1 - rs2` (wrapping).
    Sub { rd: u8, rs1: u8, rs2: u8 },
    /// `rd = rs1 + imm` (wrapping, imm zero-extended).
    AddImm { rd: u8, rs1: u8, imm: u32 },
    /// `rd = mem[rs1 + imm]` (64-bit).
    Load { rd: u8, base: u8, offset: u32 },
    /// `mem[rs1 + imm] = rs2` (64-bit).
    Store { src: u8, base: u8, offset: u32 },
    /// `pc = target`.
    Jump { target: u32 },
    /// `pc = target` when `rs1 == 0`, else fall through.
    BranchIfZero { rs1: u8, target: u32 },
    /// `link = pc + 8; pc = target`.
    Call { target: u32 },
    /// `pc = link`.
    Ret,
    /// System call: emit `mem[rs1 .. rs1 + rs2]` as a GPU command buffer.
    SubmitCommands { addr: u8, len: u8 },
    /// System call: emit `rs2` interleaved f32 samples starting at `rs1`.
    SubmitAudio { addr: u8, len: u8 },
}

impl Instr {
    /// Whether this instruction ends a translated block.
    ///
    /// Blocks end at control flow and halts. The submit system calls are
    /// ordinary instructions within a block; the batch yield check runs at
    /// block boundaries.
    pub fn is_block_terminator(self) -> bool {
        matches!(
            self,
            Instr::Halt
                | Instr::Jump { .. }
                | Instr::BranchIfZero { .. }
                | Instr::Call { .. }
                | Instr::Ret
        )
    }
}

/// Decode one 8-byte instruction word.
///
/// Returns the unrecognized opcode byte on failure so the caller can
/// attribute the fault.
pub fn decode(word: [u8; 8]) -> Result<Instr, u8> {
    let op = word[0];
    let (rd, rs1, rs2) = (word[1], word[2], word[3]);
    let imm = u32::from_le_bytes([word[4], word[5], word[6], word[7]]);

    let instr = match op {
        opcode::HALT => Instr::Halt,
        opcode::LOAD_IMM => Instr::LoadImm { rd, imm },
        opcode::MOV => Instr::Mov { rd, rs1 },
        opcode::ADD => Instr::Add { rd, rs1, rs2 },
        opcode::SUB => Instr::Sub { rd, rs1, rs2 },
        opcode::ADD_IMM => Instr::AddImm { rd, rs1, imm },
        opcode::LOAD => Instr::Load {
            rd,
            base: rs1,
            offset: imm,
        },
        opcode::STORE => Instr::Store {
            src: rs2,
            base: rs1,
            offset: imm,
        },
        opcode::JUMP => Instr::Jump { target: imm },
        opcode::BRANCH_IF_ZERO => Instr::BranchIfZero { rs1, target: imm },
        opcode::CALL => Instr::Call { target: imm },
        opcode::RET => Instr::Ret,
        opcode::SUBMIT_COMMANDS => Instr::SubmitCommands { addr: rs1, len: rs2 },
        opcode::SUBMIT_AUDIO => Instr::SubmitAudio { addr: rs1, len: rs2 },
        other => return Err(other),
    };

    // A register operand past the file is as illegal as a bad opcode.
    if !register_operands_valid(instr) {
        return Err(op);
    }
    Ok(instr)
}

fn register_operands_valid(instr: Instr) -> bool {
    let max = specs::cpu::REGISTER_COUNT as u8;
    let regs: [u8; 3] = match instr {
        Instr::Halt | Instr::Jump { .. } | Instr::Ret => [0, 0, 0],
        Instr::LoadImm { rd, .. } => [rd, 0, 0],
        Instr::Mov { rd, rs1 } => [rd, rs1, 0],
        Instr::Add { rd, rs1, rs2 } | Instr::Sub { rd, rs1, rs2 } => [rd, rs1, rs2],
        Instr::AddImm { rd, rs1, .. } => [rd, rs1, 0],
        Instr::Load { rd, base, .. } => [rd, base, 0],
        Instr::Store { src, base, .. } => [src, base, 0],
        Instr::BranchIfZero { rs1, .. } => [rs1, 0, 0],
        Instr::Call { .. } => [0, 0, 0],
        Instr::SubmitCommands { addr, len } | Instr::SubmitAudio { addr, len } => [addr, len, 0],
    };
    regs.iter().all(|&r| r < max)
}

/// Encode one instruction to its 8-byte wire form.
pub fn encode(instr: Instr) -> [u8; 8] {
    let (op, rd, rs1, rs2, imm) = match instr {
        Instr::Halt => (opcode::HALT, 0, 0, 0, 0),
        Instr::LoadImm { rd, imm } => (opcode::LOAD_IMM, rd, 0, 0, imm),
        Instr::Mov { rd, rs1 } => (opcode::MOV, rd, rs1, 0, 0),
        Instr::Add { rd, rs1, rs2 } => (opcode::ADD, rd, rs1, rs2, 0),
        Instr::Sub { rd, rs1, rs2 } => (opcode::SUB, rd, rs1, rs2, 0),
        Instr::AddImm { rd, rs1, imm } => (opcode::ADD_IMM, rd, rs1, 0, imm),
        Instr::Load { rd, base, offset } => (opcode::LOAD, rd, base, 0, offset),
        Instr::Store { src, base, offset } => (opcode::STORE, 0, base, src, offset),
        Instr::Jump { target } => (opcode::JUMP, 0, 0, 0, target),
        Instr::BranchIfZero { rs1, target } => (opcode::BRANCH_IF_ZERO, 0, rs1, 0, target),
        Instr::Call { target } => (opcode::CALL, 0, 0, 0, target),
        Instr::Ret => (opcode::RET, 0, 0, 0, 0),
        Instr::SubmitCommands { addr, len } => (opcode::SUBMIT_COMMANDS, 0, addr, len, 0),
        Instr::SubmitAudio { addr, len } => (opcode::SUBMIT_AUDIO, 0, addr, len, 0),
    };
    let imm = imm.to_le_bytes();
    [op, rd, rs1, rs2, imm[0], imm[1], imm[2], imm[3]]
}

/// Assemble a sequence of instructions into contiguous code bytes.
pub fn assemble(instrs: &[Instr]) -> Vec<u8> {
    let mut out = Vec::with_capacity(instrs.len() * INSTRUCTION_BYTES as usize);
    for &instr in instrs {
        out.extend_from_slice(&encode(instr));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_matches_encode() {
        let samples = [
            Instr::Halt,
            Instr::LoadImm { rd: 3, imm: 0xDEAD },
            Instr::Store {
                src: 7,
                base: 2,
                offset: 0x40,
            },
            Instr::BranchIfZero {
                rs1: 1,
                target: 0x1_0030,
            },
            Instr::SubmitCommands { addr: 2, len: 3 },
        ];
        for instr in samples {
            assert_eq!(decode(encode(instr)), Ok(instr));
        }
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut word = encode(Instr::Halt);
        word[0] = 0xFF;
        assert_eq!(decode(word), Err(0xFF));

        // Register operand past the register file is rejected the same way.
        let word = [opcode::MOV, 40, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode(word), Err(opcode::MOV));
    }

    #[test]
    fn block_terminators() {
        assert!(Instr::Jump { target: 0 }.is_block_terminator());
        assert!(Instr::Ret.is_block_terminator());
        assert!(Instr::Halt.is_block_terminator());
        assert!(!Instr::SubmitCommands { addr: 0, len: 0 }.is_block_terminator());
        assert!(!Instr::Add { rd: 0, rs1: 0, rs2: 0 }.is_block_terminator());
    }
}
