//! Session lifecycle: the frontend-facing emulator surface.
//!
//! A session moves strictly forward through its states; the four verbs
//! (`initialize`, `load_program`, `run_cycle`, `shutdown`) each check the
//! current state and refuse out-of-order use with
//! [`EmulatorError::State`].

use std::sync::Arc;
use std::time::Duration;

use nxemu_hw::memory_map::{self, program};
use nxemu_hw::specs;
use tracing::{debug, info};

use crate::error::{EmulatorError, LoadError};
use crate::image::Image;
use crate::input::InputSnapshot;
use crate::memory::MemoryArena;
use crate::scheduler::{CoreEvent, CoreState, Dispatcher};

/// Where a session is in its lifecycle. Transitions are monotonic:
/// `Running` is the only state re-entered (once per outer tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Arena allocated, core threads parked, nothing loaded.
    Initialized,
    /// A program is in memory and the cores are executing it.
    Loaded,
    /// At least one outer tick has been driven.
    Running,
    /// Core threads joined; the session is spent.
    ShutDown,
}

/// Session construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct EmulatorConfig {
    pub core_count: usize,
    pub dram_size: usize,
    pub batch_instructions: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            core_count: specs::cpu::CORE_COUNT,
            dram_size: memory_map::dram::SIZE,
            batch_instructions: specs::cpu::INSTRUCTIONS_PER_BATCH,
        }
    }
}

/// One emulator run, from arena allocation to joined core threads.
pub struct EmulatorSession {
    state: SessionState,
    arena: Arc<MemoryArena>,
    dispatcher: Dispatcher,
}

impl EmulatorSession {
    /// Allocate the arena and spawn the core threads.
    pub fn initialize(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        info!(
            cores = config.core_count,
            dram = config.dram_size,
            batch = config.batch_instructions,
            "initializing session"
        );
        let arena = Arc::new(MemoryArena::allocate(config.dram_size)?);
        let dispatcher = Dispatcher::spawn(
            Arc::clone(&arena),
            config.core_count,
            config.batch_instructions,
        )?;

        Ok(Self {
            state: SessionState::Initialized,
            arena,
            dispatcher,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn core_count(&self) -> usize {
        self.dispatcher.core_count()
    }

    /// Parse `file`, place its sections in guest memory, and start every
    /// core at the image's entry point. `name` is the display name used in
    /// status reporting.
    ///
    /// On failure the session stays at its pre-load state. Loading over a
    /// running program is refused; loads are serialized against ticks.
    pub fn load_program(&mut self, name: &str, file: &[u8]) -> Result<(), EmulatorError> {
        if !matches!(self.state, SessionState::Initialized | SessionState::Loaded) {
            return Err(EmulatorError::State { state: self.state });
        }

        let image = Image::parse(file).map_err(LoadError::Image)?;
        if !(program::BASE..program::END).contains(&image.entry) {
            return Err(LoadError::EntryOutsideProgramRegion { entry: image.entry }.into());
        }
        // Every section must land inside the reserved program region
        // (and the arena, when the arena is the smaller of the two).
        let limit = program::END.min(self.arena.capacity() as u64);
        for (index, section) in image.sections.iter().enumerate() {
            let end = section.load_address.saturating_add(section.size as u64);
            if section.load_address < program::BASE || end > limit {
                return Err(LoadError::SectionOutsideProgramRegion { index }.into());
            }
        }

        for section in &image.sections {
            self.arena
                .write_bytes(section.load_address, image.section_bytes(section))?;
            debug!(
                at = format_args!("{:#x}", section.load_address),
                bytes = section.size,
                "section placed"
            );
        }

        self.dispatcher.load_program(image.entry);
        self.state = SessionState::Loaded;
        info!(name, entry = format_args!("{:#x}", image.entry), "program loaded");
        Ok(())
    }

    /// Drive one outer tick with the given input snapshot. Returns
    /// immediately; results surface on the event stream.
    pub fn run_cycle(&mut self, input: &InputSnapshot) -> Result<(), EmulatorError> {
        if !matches!(self.state, SessionState::Loaded | SessionState::Running) {
            return Err(EmulatorError::State { state: self.state });
        }
        self.dispatcher.run_outer_tick(input);
        self.state = SessionState::Running;
        Ok(())
    }

    pub fn poll_event(&self) -> Option<CoreEvent> {
        self.dispatcher.poll_event()
    }

    pub fn wait_event(&self, timeout: Duration) -> Option<CoreEvent> {
        self.dispatcher.wait_event(timeout)
    }

    /// Observed state of one core, or `None` for an out-of-range id.
    pub fn core_state(&self, core_id: usize) -> Option<CoreState> {
        self.dispatcher.core_state(core_id)
    }

    pub fn total_executed(&self) -> u64 {
        self.dispatcher.total_executed()
    }

    /// Read one core's registers from its arena bank, as of the core's
    /// last completed batch.
    pub fn core_registers(&self, core_id: usize) -> Result<CoreRegisters, EmulatorError> {
        let base = memory_map::register_bank::BASE
            + core_id as u64 * memory_map::register_bank::PER_CORE_SIZE;
        let mut gpr = [0u64; specs::cpu::REGISTER_COUNT];
        for (i, slot) in gpr.iter_mut().enumerate() {
            *slot = self.arena.read_u64(base + i as u64 * 8)?;
        }
        let count = gpr.len() as u64;
        Ok(CoreRegisters {
            gpr,
            pc: self.arena.read_u64(base + count * 8)?,
            status: self.arena.read_u64(base + (count + 1) * 8)?,
        })
    }

    /// Log a per-core execution summary, for end-of-run diagnostics.
    pub fn log_final_state(&self) {
        for core_id in 0..self.dispatcher.core_count() {
            let Some(state) = self.dispatcher.core_state(core_id) else {
                continue;
            };
            let executed = self.dispatcher.core_executed(core_id);
            match self.core_registers(core_id) {
                Ok(regs) => info!(
                    core = core_id,
                    ?state,
                    executed,
                    pc = format_args!("{:#x}", regs.pc),
                    "final core state"
                ),
                Err(_) => info!(core = core_id, ?state, executed, "final core state"),
            }
        }
        info!(total = self.dispatcher.total_executed(), "instructions executed");
    }

    /// Stop and join every core thread. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::ShutDown {
            return;
        }
        self.dispatcher.shutdown();
        self.state = SessionState::ShutDown;
        info!("session shut down");
    }
}

/// A core's register bank as mirrored into the arena.
#[derive(Debug, Clone, Copy)]
pub struct CoreRegisters {
    pub gpr: [u64; specs::cpu::REGISTER_COUNT],
    pub pc: u64,
    pub status: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageBuilder;
    use crate::isa::{Instr::*, assemble};

    fn test_config() -> EmulatorConfig {
        EmulatorConfig {
            core_count: 2,
            dram_size: 0x200_0000,
            batch_instructions: 100,
        }
    }

    #[test]
    fn verbs_refuse_out_of_order_use() {
        let mut session = EmulatorSession::initialize(test_config()).unwrap();
        // Cannot tick before anything is loaded.
        assert!(matches!(
            session.run_cycle(&InputSnapshot::neutral()),
            Err(EmulatorError::State { .. })
        ));

        session.shutdown();
        assert_eq!(session.state(), SessionState::ShutDown);
        // A spent session refuses to load.
        let image = ImageBuilder::new(program::BASE)
            .section(program::BASE, assemble(&[Halt]))
            .build();
        assert!(matches!(
            session.load_program("test", &image),
            Err(EmulatorError::State { .. })
        ));
    }

    #[test]
    fn load_rejects_entry_and_sections_outside_the_program_region() {
        let mut session = EmulatorSession::initialize(test_config()).unwrap();

        let image = ImageBuilder::new(0x10).build();
        assert!(matches!(
            session.load_program("test", &image),
            Err(EmulatorError::Load(LoadError::EntryOutsideProgramRegion { entry: 0x10 }))
        ));

        let image = ImageBuilder::new(program::BASE)
            .section(0x100, assemble(&[Halt]))
            .build();
        assert!(matches!(
            session.load_program("test", &image),
            Err(EmulatorError::Load(LoadError::SectionOutsideProgramRegion { index: 0 }))
        ));
    }

    #[test]
    fn load_rejects_sections_in_work_ram_even_when_the_arena_is_larger() {
        // An arena that extends past the program region must not let a
        // section load into work RAM.
        let mut session = EmulatorSession::initialize(EmulatorConfig {
            core_count: 1,
            dram_size: 0x800_0000,
            batch_instructions: 100,
        })
        .unwrap();
        assert!(program::END < 0x800_0000);

        let image = ImageBuilder::new(program::BASE)
            .section(program::BASE, assemble(&[Halt]))
            .section(program::END + 0x1000, assemble(&[Halt]))
            .build();
        assert!(matches!(
            session.load_program("test", &image),
            Err(EmulatorError::Load(LoadError::SectionOutsideProgramRegion { index: 1 }))
        ));
    }

    #[test]
    fn loaded_program_executes_and_registers_read_back() {
        let mut session = EmulatorSession::initialize(test_config()).unwrap();
        let image = ImageBuilder::new(program::BASE)
            .section(
                program::BASE,
                assemble(&[LoadImm { rd: 9, imm: 0xBEEF }, Halt]),
            )
            .build();
        session.load_program("test", &image).unwrap();
        session.run_cycle(&InputSnapshot::neutral()).unwrap();

        // Both cores halt; drain until the designated core reports in.
        let mut halted = 0;
        while halted < 2 {
            match session.wait_event(Duration::from_secs(2)) {
                Some(CoreEvent::Halted { .. }) => halted += 1,
                Some(_) => {}
                None => panic!("cores never halted"),
            }
        }

        let regs = session.core_registers(0).unwrap();
        assert_eq!(regs.gpr[9], 0xBEEF);
        // x1 carries the core id.
        assert_eq!(session.core_registers(1).unwrap().gpr[1], 1);
        assert_eq!(session.total_executed(), 4);
        session.shutdown();
    }
}
