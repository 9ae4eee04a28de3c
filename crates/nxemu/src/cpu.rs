//! Per-core guest instruction execution.
//!
//! Each [`ExecutionCore`] emulates one hardware core against the shared
//! arena, using ahead-of-time translation: guest code is decoded once per
//! straight-line block, cached, and re-executed without re-decoding on
//! later visits. A batch executes at most `max_instructions` guest
//! instructions, then returns control to the owning scheduler loop.
//!
//! # Cache coherency
//!
//! Guest code may modify itself, including across cores. Every cached
//! block stores a checksum of its source bytes which is re-verified on
//! lookup; a mismatch retranslates the block before it runs again. Stores
//! issued by this core additionally invalidate intersecting blocks
//! immediately, so locally patched code never executes stale.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use nxemu_hw::memory_map::register_bank;
use nxemu_hw::specs;
use thiserror::Error;
use tracing::{debug, trace};

use crate::audio::AudioFrame;
use crate::gpu::CommandBuffer;
use crate::isa::{self, INSTRUCTION_BYTES, Instr};
use crate::memory::MemoryArena;

/// Longest straight-line block the translator will build.
const MAX_BLOCK_INSTRS: usize = 64;

/// Status register bits mirrored to the register bank.
pub mod status {
    /// Set once the core has executed `Halt`.
    pub const HALTED: u64 = 1;
}

/// A fault that halts this core's progress. Other cores are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoreFault {
    /// Illegal or unimplemented opcode reached the decoder.
    #[error("illegal opcode {opcode:#04x} at pc {pc:#x}")]
    Decode { pc: u64, opcode: u8 },
    /// A guest access fell outside the arena.
    #[error("memory fault at {addr:#x} ({len} bytes) near pc {pc:#x}")]
    Memory { pc: u64, addr: u64, len: usize },
}

/// This core's exclusively-owned register state.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    pub gpr: [u64; specs::cpu::REGISTER_COUNT],
    pub pc: u64,
    pub status: u64,
}

impl RegisterFile {
    fn new() -> Self {
        Self {
            gpr: [0; specs::cpu::REGISTER_COUNT],
            pc: 0,
            status: 0,
        }
    }
}

/// Result of one execution batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Guest instructions actually executed (never above the batch bound).
    pub executed: usize,
    /// At most one completed command buffer; extras stay queued for the
    /// next batch in creation order.
    pub commands: Option<CommandBuffer>,
    /// Audio frames emitted during this batch.
    pub audio: Vec<AudioFrame>,
    /// Whether the core executed `Halt` during this batch.
    pub halted: bool,
}

#[derive(Debug)]
struct CachedBlock {
    instrs: Vec<Instr>,
    byte_len: usize,
    checksum: u64,
}

/// AOT block cache keyed by block start address.
#[derive(Debug, Default)]
struct TranslationCache {
    blocks: HashMap<u64, CachedBlock>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl TranslationCache {
    fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Drop every block intersecting `[addr, addr + len)`. Returns how
    /// many were dropped.
    fn invalidate_range(&mut self, addr: u64, len: usize) -> usize {
        let end = addr.saturating_add(len as u64);
        let before = self.blocks.len();
        self.blocks
            .retain(|&base, block| base >= end || base + block.byte_len as u64 <= addr);
        let dropped = before - self.blocks.len();
        self.invalidations += dropped as u64;
        dropped
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x1_0000_01b3);
    }
    hash
}

enum Flow {
    /// Fall through to the next instruction.
    Next,
    /// Control flow already updated the program counter.
    Jumped,
    /// `Halt` executed.
    Halted,
}

/// One emulated hardware core bound to the shared arena.
pub struct ExecutionCore {
    core_id: usize,
    designated: bool,
    arena: Arc<MemoryArena>,
    regs: RegisterFile,
    cache: TranslationCache,
    pending_commands: VecDeque<CommandBuffer>,
    halted: bool,
}

impl ExecutionCore {
    /// Create a core. `designated` marks the single core authorized to
    /// produce graphics and audio work; submit system calls on any other
    /// core are dropped.
    pub fn new(core_id: usize, designated: bool, arena: Arc<MemoryArena>) -> Self {
        Self {
            core_id,
            designated,
            arena,
            regs: RegisterFile::new(),
            cache: TranslationCache::default(),
            pending_commands: VecDeque::new(),
            halted: false,
        }
    }

    pub fn core_id(&self) -> usize {
        self.core_id
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn pc(&self) -> u64 {
        self.regs.pc
    }

    /// Registers, for inspection between batches.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Translation cache counters: (hits, misses, invalidations).
    pub fn cache_stats(&self) -> (u64, u64, u64) {
        (self.cache.hits, self.cache.misses, self.cache.invalidations)
    }

    /// Reset for a freshly loaded program: registers cleared, the core id
    /// seeded, the translation cache dropped.
    pub fn reset(&mut self, entry: u64) {
        self.regs = RegisterFile::new();
        self.regs.pc = entry;
        self.regs.gpr[isa::reg::CORE_ID as usize] = self.core_id as u64;
        self.cache.clear();
        self.pending_commands.clear();
        self.halted = false;
        debug!(core = self.core_id, entry = format_args!("{entry:#x}"), "core reset");
    }

    /// Execute up to `max_instructions` guest instructions.
    ///
    /// The batch ends at the instruction budget, at a halt, or at the
    /// first block boundary after a command buffer was completed (the
    /// yield point). At most one command buffer is returned per call;
    /// additional completed buffers are deferred to later batches in
    /// creation order.
    ///
    /// # Panics
    ///
    /// Panics when `max_instructions` is zero. The dispatcher rejects a
    /// zero batch bound at spawn; direct callers must do the same.
    pub fn run_batch(&mut self, max_instructions: usize) -> Result<BatchOutcome, CoreFault> {
        assert!(max_instructions > 0, "batch bound must be positive");

        let mut executed = 0usize;
        let mut audio = Vec::new();
        let buffers_before = self.pending_commands.len();

        'batch: while executed < max_instructions && !self.halted {
            let block_base = self.regs.pc;
            self.ensure_block(block_base)?;

            let mut index = offset_into_block(block_base, self.regs.pc);
            loop {
                if executed >= max_instructions {
                    break 'batch;
                }
                let Some(block) = self.cache.blocks.get(&block_base) else {
                    // The block invalidated itself; re-enter via lookup.
                    break;
                };
                let Some(&instr) = block.instrs.get(index) else {
                    break;
                };

                let invalidations_before = self.cache.invalidations;
                let flow = self.execute(instr, &mut audio)?;
                executed += 1;

                match flow {
                    Flow::Next => {
                        self.regs.pc += INSTRUCTION_BYTES;
                        index += 1;
                    }
                    Flow::Jumped => break,
                    Flow::Halted => {
                        self.halted = true;
                        self.regs.status |= status::HALTED;
                        break 'batch;
                    }
                }

                if self.cache.invalidations != invalidations_before {
                    // A store touched translated code; re-enter via lookup
                    // so nothing stale executes.
                    break;
                }
            }

            // Yield point: a command buffer completed during this batch.
            if self.pending_commands.len() > buffers_before {
                break;
            }
        }

        self.sync_register_bank();

        Ok(BatchOutcome {
            executed,
            commands: self.pending_commands.pop_front(),
            audio,
            halted: self.halted,
        })
    }

    /// Verify or (re)build the cached block starting at `pc`.
    fn ensure_block(&mut self, pc: u64) -> Result<(), CoreFault> {
        if let Some(block) = self.cache.blocks.get(&pc) {
            let bytes = self
                .arena
                .view(pc, block.byte_len)
                .map_err(|_| CoreFault::Memory {
                    pc,
                    addr: pc,
                    len: block.byte_len,
                })?;
            if fnv1a(bytes) == block.checksum {
                self.cache.hits += 1;
                return Ok(());
            }
            // Source bytes changed under the cached translation.
            self.cache.blocks.remove(&pc);
            self.cache.invalidations += 1;
            trace!(core = self.core_id, base = format_args!("{pc:#x}"), "stale block retranslated");
        }

        let block = self.translate_block(pc)?;
        self.cache.misses += 1;
        self.cache.blocks.insert(pc, block);
        Ok(())
    }

    /// Decode a straight-line block starting at `pc`.
    fn translate_block(&self, pc: u64) -> Result<CachedBlock, CoreFault> {
        let mut instrs = Vec::new();
        let mut cursor = pc;

        loop {
            let mut word = [0u8; INSTRUCTION_BYTES as usize];
            self.arena
                .read_bytes(cursor, &mut word)
                .map_err(|_| CoreFault::Memory {
                    pc: cursor,
                    addr: cursor,
                    len: word.len(),
                })?;
            let instr = isa::decode(word).map_err(|opcode| CoreFault::Decode {
                pc: cursor,
                opcode,
            })?;

            instrs.push(instr);
            cursor += INSTRUCTION_BYTES;

            if instr.is_block_terminator() || instrs.len() >= MAX_BLOCK_INSTRS {
                break;
            }
        }

        let byte_len = instrs.len() * INSTRUCTION_BYTES as usize;
        let checksum = fnv1a(self.arena.view(pc, byte_len).map_err(|_| {
            CoreFault::Memory {
                pc,
                addr: pc,
                len: byte_len,
            }
        })?);

        Ok(CachedBlock {
            instrs,
            byte_len,
            checksum,
        })
    }

    fn execute(&mut self, instr: Instr, audio: &mut Vec<AudioFrame>) -> Result<Flow, CoreFault> {
        let flow = match instr {
            Instr::Halt => Flow::Halted,
            Instr::LoadImm { rd, imm } => {
                self.regs.gpr[rd as usize] = imm as u64;
                Flow::Next
            }
            Instr::Mov { rd, rs1 } => {
                self.regs.gpr[rd as usize] = self.regs.gpr[rs1 as usize];
                Flow::Next
            }
            Instr::Add { rd, rs1, rs2 } => {
                self.regs.gpr[rd as usize] =
                    self.regs.gpr[rs1 as usize].wrapping_add(self.regs.gpr[rs2 as usize]);
                Flow::Next
            }
            Instr::Sub { rd, rs1, rs2 } => {
                self.regs.gpr[rd as usize] =
                    self.regs.gpr[rs1 as usize].wrapping_sub(self.regs.gpr[rs2 as usize]);
                Flow::Next
            }
            Instr::AddImm { rd, rs1, imm } => {
                self.regs.gpr[rd as usize] = self.regs.gpr[rs1 as usize].wrapping_add(imm as u64);
                Flow::Next
            }
            Instr::Load { rd, base, offset } => {
                let addr = self.regs.gpr[base as usize].wrapping_add(offset as u64);
                self.regs.gpr[rd as usize] =
                    self.arena.read_u64(addr).map_err(|_| CoreFault::Memory {
                        pc: self.regs.pc,
                        addr,
                        len: 8,
                    })?;
                Flow::Next
            }
            Instr::Store { src, base, offset } => {
                let addr = self.regs.gpr[base as usize].wrapping_add(offset as u64);
                self.arena
                    .write_u64(addr, self.regs.gpr[src as usize])
                    .map_err(|_| CoreFault::Memory {
                        pc: self.regs.pc,
                        addr,
                        len: 8,
                    })?;
                // Coherency: patched code must not execute stale.
                self.cache.invalidate_range(addr, 8);
                Flow::Next
            }
            Instr::Jump { target } => {
                self.regs.pc = target as u64;
                Flow::Jumped
            }
            Instr::BranchIfZero { rs1, target } => {
                if self.regs.gpr[rs1 as usize] == 0 {
                    self.regs.pc = target as u64;
                    Flow::Jumped
                } else {
                    Flow::Next
                }
            }
            Instr::Call { target } => {
                self.regs.gpr[isa::reg::LINK as usize] = self.regs.pc + INSTRUCTION_BYTES;
                self.regs.pc = target as u64;
                Flow::Jumped
            }
            Instr::Ret => {
                self.regs.pc = self.regs.gpr[isa::reg::LINK as usize];
                Flow::Jumped
            }
            Instr::SubmitCommands { addr, len } => {
                let offset = self.regs.gpr[addr as usize];
                let len = self.regs.gpr[len as usize] as usize;
                if self.designated {
                    // The guest controls the range; it must be validated
                    // before any host allocation.
                    let bytes = self
                        .arena
                        .view(offset, len)
                        .map_err(|_| CoreFault::Memory {
                            pc: self.regs.pc,
                            addr: offset,
                            len,
                        })?
                        .to_vec();
                    self.pending_commands.push_back(CommandBuffer::new(bytes));
                    trace!(core = self.core_id, bytes = len, "command buffer completed");
                } else {
                    // Only the designated core produces graphics work.
                    trace!(core = self.core_id, "dropping submit from non-designated core");
                }
                Flow::Next
            }
            Instr::SubmitAudio { addr, len } => {
                let offset = self.regs.gpr[addr as usize];
                let sample_count = self.regs.gpr[len as usize] as usize;
                if self.designated {
                    // Saturate so an absurd count lands in the bounds
                    // check instead of wrapping the multiply.
                    let byte_len = sample_count.saturating_mul(4);
                    let samples = self
                        .arena
                        .view(offset, byte_len)
                        .map_err(|_| CoreFault::Memory {
                            pc: self.regs.pc,
                            addr: offset,
                            len: byte_len,
                        })?
                        .chunks_exact(4)
                        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .collect();
                    audio.push(AudioFrame::new(samples));
                } else {
                    trace!(core = self.core_id, "dropping audio from non-designated core");
                }
                Flow::Next
            }
        };
        Ok(flow)
    }

    /// Mirror the register file into this core's arena bank so the
    /// scheduler can observe it without a separate copy. Each core writes
    /// only its own bank.
    fn sync_register_bank(&self) {
        let base = register_bank::BASE
            + self.core_id.min(register_bank::MAX_CORES - 1) as u64 * register_bank::PER_CORE_SIZE;
        for (i, &value) in self.regs.gpr.iter().enumerate() {
            let _ = self.arena.write_u64(base + i as u64 * 8, value);
        }
        let count = self.regs.gpr.len() as u64;
        let _ = self.arena.write_u64(base + count * 8, self.regs.pc);
        let _ = self.arena.write_u64(base + (count + 1) * 8, self.regs.status);
    }
}

fn offset_into_block(block_base: u64, pc: u64) -> usize {
    ((pc - block_base) / INSTRUCTION_BYTES) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{Instr::*, assemble, reg};
    use nxemu_hw::memory_map::program;

    const ENTRY: u64 = program::BASE;
    /// Scratch data area inside the test arena, clear of the code.
    const DATA: u64 = ENTRY + 0x1_0000;

    fn core_with(code: &[Instr]) -> ExecutionCore {
        let arena = Arc::new(MemoryArena::allocate(0x200_0000).unwrap());
        arena.write_bytes(ENTRY, &assemble(code)).unwrap();
        let mut core = ExecutionCore::new(0, true, arena);
        core.reset(ENTRY);
        core
    }

    fn counting_loop() -> Vec<Instr> {
        // x2 counts up forever.
        vec![
            AddImm { rd: 2, rs1: 2, imm: 1 },
            Jump { target: ENTRY as u32 },
        ]
    }

    #[test]
    fn batch_never_exceeds_the_instruction_bound() {
        let mut core = core_with(&counting_loop());
        for bound in [1, 7, 500] {
            let outcome = core.run_batch(bound).unwrap();
            assert_eq!(outcome.executed, bound);
            assert!(outcome.commands.is_none());
        }
        // Increments equal executed add-immediates: every other instruction.
        let total: u64 = core.registers().gpr[2];
        assert!(total > 0);
    }

    #[test]
    fn halt_ends_the_batch_early() {
        let mut core = core_with(&[
            LoadImm { rd: 5, imm: 99 },
            Halt,
        ]);
        let outcome = core.run_batch(1000).unwrap();
        assert_eq!(outcome.executed, 2);
        assert!(outcome.halted);
        assert!(core.is_halted());
        assert_eq!(core.registers().gpr[5], 99);
        assert_eq!(core.registers().status & status::HALTED, status::HALTED);

        // A halted core stays put.
        let outcome = core.run_batch(1000).unwrap();
        assert_eq!(outcome.executed, 0);
    }

    #[test]
    fn submit_yields_the_batch_with_one_buffer() {
        let data = DATA;
        let code = vec![
            LoadImm { rd: 2, imm: data as u32 },
            LoadImm { rd: 3, imm: 4 },
            SubmitCommands { addr: 2, len: 3 },
            Jump { target: ENTRY as u32 },
        ];
        let mut core = core_with(&code);
        core.arena.write_bytes(data, &[9, 8, 7, 6]).unwrap();

        let outcome = core.run_batch(1_000_000).unwrap();
        // Yields at the block boundary after the submit, not at the bound.
        assert_eq!(outcome.executed, 4);
        assert_eq!(outcome.commands.unwrap().bytes(), &[9, 8, 7, 6]);
    }

    #[test]
    fn second_buffer_in_one_batch_is_deferred_in_creation_order() {
        let first = DATA;
        let second = DATA + 0x100;
        let code = vec![
            LoadImm { rd: 2, imm: first as u32 },
            LoadImm { rd: 3, imm: 2 },
            LoadImm { rd: 4, imm: second as u32 },
            SubmitCommands { addr: 2, len: 3 },
            SubmitCommands { addr: 4, len: 3 },
            Halt,
        ];
        let mut core = core_with(&code);
        core.arena.write_bytes(first, &[0xAA, 0xAA]).unwrap();
        core.arena.write_bytes(second, &[0xBB, 0xBB]).unwrap();

        let outcome = core.run_batch(100).unwrap();
        assert_eq!(outcome.commands.unwrap().bytes(), &[0xAA, 0xAA]);

        // The second buffer was queued, not dropped, and arrives next.
        let outcome = core.run_batch(100).unwrap();
        assert_eq!(outcome.executed, 0);
        assert_eq!(outcome.commands.unwrap().bytes(), &[0xBB, 0xBB]);
    }

    #[test]
    fn illegal_opcode_is_a_decode_fault() {
        let mut core = core_with(&[LoadImm { rd: 2, imm: 1 }]);
        // Overwrite the second slot with an undefined opcode.
        core.arena
            .write_bytes(ENTRY + INSTRUCTION_BYTES, &[0xEE, 0, 0, 0, 0, 0, 0, 0])
            .unwrap();
        let fault = core.run_batch(10).unwrap_err();
        assert_eq!(
            fault,
            CoreFault::Decode {
                pc: ENTRY + INSTRUCTION_BYTES,
                opcode: 0xEE,
            }
        );
    }

    #[test]
    fn oversized_submit_length_is_a_memory_fault() {
        // The sample count makes the byte length overflow a 64-bit
        // multiply; the core must fault, not abort the host allocator.
        let code = vec![
            LoadImm { rd: 2, imm: DATA as u32 },
            Load { rd: 3, base: 2, offset: 0 },
            SubmitAudio { addr: 2, len: 3 },
            Halt,
        ];
        let mut core = core_with(&code);
        core.arena.write_u64(DATA, 1 << 63).unwrap();
        let fault = core.run_batch(100).unwrap_err();
        assert!(matches!(fault, CoreFault::Memory { addr, .. } if addr == DATA));

        // A huge-but-representable length through the command path must
        // fault before anything is allocated for the buffer.
        let code = vec![
            LoadImm { rd: 2, imm: DATA as u32 },
            Load { rd: 3, base: 2, offset: 0 },
            SubmitCommands { addr: 2, len: 3 },
            Halt,
        ];
        let mut core = core_with(&code);
        core.arena.write_u64(DATA, u64::MAX / 2).unwrap();
        let fault = core.run_batch(100).unwrap_err();
        assert!(matches!(fault, CoreFault::Memory { addr, .. } if addr == DATA));
    }

    #[test]
    #[should_panic(expected = "batch bound must be positive")]
    fn zero_batch_bound_panics() {
        let _ = core_with(&[Halt]).run_batch(0);
    }

    #[test]
    fn out_of_range_access_is_a_memory_fault() {
        let mut core = core_with(&[
            LoadImm { rd: 2, imm: u32::MAX },
            Load { rd: 3, base: 2, offset: 0 },
            Halt,
        ]);
        let fault = core.run_batch(10).unwrap_err();
        assert!(matches!(fault, CoreFault::Memory { addr, .. } if addr == u32::MAX as u64));
    }

    #[test]
    fn externally_patched_code_retranslates_via_checksum() {
        // Loop body loads x5 = 5; another core patches the immediate.
        let code = vec![
            LoadImm { rd: 5, imm: 5 },
            Jump { target: ENTRY as u32 },
        ];
        let mut core = core_with(&code);
        core.run_batch(4).unwrap();
        assert_eq!(core.registers().gpr[5], 5);

        // Simulate cross-core self-modifying code: patch the immediate.
        core.arena
            .write_bytes(ENTRY, &isa::encode(LoadImm { rd: 5, imm: 7 }))
            .unwrap();
        core.run_batch(2).unwrap();
        assert_eq!(core.registers().gpr[5], 7);

        let (hits, misses, invalidations) = core.cache_stats();
        assert!(hits > 0);
        assert!(misses >= 2); // original block plus the retranslation
        assert!(invalidations >= 1);
    }

    #[test]
    fn local_store_invalidates_cached_code_immediately() {
        // Block A patches block B's first instruction from Halt to Ret
        // (both encode with an all-zero operand tail, so a register store
        // of the opcode byte suffices), then jumps to it.
        let block_b = ENTRY + 4 * INSTRUCTION_BYTES;
        let code = vec![
            LoadImm { rd: 2, imm: block_b as u32 },
            LoadImm { rd: 3, imm: isa::opcode::RET as u32 },
            Store { src: 3, base: 2, offset: 0 },
            Jump { target: block_b as u32 },
            // block B:
            Halt,
        ];
        let mut core = core_with(&code);
        // Warm the cache for block B so the store has something to kill.
        core.regs.pc = block_b;
        core.ensure_block(block_b).unwrap();
        core.regs.pc = ENTRY;
        // Give Ret somewhere safe to land.
        core.regs.gpr[reg::LINK as usize] = ENTRY + 3 * INSTRUCTION_BYTES;

        let outcome = core.run_batch(6).unwrap();
        // Ret executed instead of the cached Halt.
        assert!(!outcome.halted);
        assert!(!core.is_halted());
    }

    #[test]
    fn non_designated_core_drops_graphics_and_audio() {
        let arena = Arc::new(MemoryArena::allocate(0x200_0000).unwrap());
        let code = vec![
            LoadImm { rd: 2, imm: DATA as u32 },
            LoadImm { rd: 3, imm: 4 },
            SubmitCommands { addr: 2, len: 3 },
            SubmitAudio { addr: 2, len: 3 },
            Halt,
        ];
        arena.write_bytes(ENTRY, &assemble(&code)).unwrap();
        let mut core = ExecutionCore::new(2, false, arena);
        core.reset(ENTRY);

        let outcome = core.run_batch(100).unwrap();
        assert!(outcome.commands.is_none());
        assert!(outcome.audio.is_empty());
        assert!(outcome.halted);
    }

    #[test]
    fn register_bank_mirrors_registers_after_a_batch() {
        let mut core = core_with(&[LoadImm { rd: 7, imm: 0x1234 }, Halt]);
        core.run_batch(10).unwrap();

        let bank = register_bank::BASE;
        assert_eq!(core.arena.read_u64(bank + 7 * 8).unwrap(), 0x1234);
        let pc_slot = bank + specs::cpu::REGISTER_COUNT as u64 * 8;
        assert_eq!(core.arena.read_u64(pc_slot).unwrap(), core.pc());
        assert_eq!(core.arena.read_u64(pc_slot + 8).unwrap(), status::HALTED);
    }

    #[test]
    fn audio_submission_reads_interleaved_f32() {
        let data = DATA;
        let code = vec![
            LoadImm { rd: 2, imm: data as u32 },
            LoadImm { rd: 3, imm: 4 },
            SubmitAudio { addr: 2, len: 3 },
            Halt,
        ];
        let mut core = core_with(&code);
        let mut bytes = Vec::new();
        for v in [0.25f32, -0.25, 0.5, -0.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        core.arena.write_bytes(data, &bytes).unwrap();

        let outcome = core.run_batch(100).unwrap();
        assert_eq!(outcome.audio.len(), 1);
        assert_eq!(outcome.audio[0].samples, vec![0.25, -0.25, 0.5, -0.5]);
    }
}
