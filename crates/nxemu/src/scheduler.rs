//! Cross-core scheduling.
//!
//! Each emulated core runs on its own OS thread, owning its
//! [`ExecutionCore`] exclusively. The dispatcher talks to core threads
//! over channels: control messages in, execution events out. Channel
//! delivery together with the explicit fences below form the
//! happens-before edges between host-side arena writes and guest batches.
//!
//! Core 0 is the designated core: it runs exactly one batch per outer
//! tick, so its graphics and audio output stays paced to the frontend.
//! The remaining cores free-run, checking for control between batches.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering, fence};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nxemu_hw::memory_map;
use tracing::{debug, info, warn};

use crate::audio::AudioFrame;
use crate::cpu::{CoreFault, ExecutionCore};
use crate::error::EmulatorError;
use crate::gpu::CommandBuffer;
use crate::input::InputSnapshot;
use crate::memory::MemoryArena;

/// How long a free-running core parks when it has nothing to do.
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Host-to-core control.
#[derive(Debug, Clone, Copy)]
enum ControlMessage {
    /// A program was placed in the arena; reset and start from `entry`.
    Load { entry: u64 },
    /// Designated core only: run one batch against the current input
    /// snapshot.
    RunTick,
    Shutdown,
}

/// Core-to-host execution events, in per-core order.
#[derive(Debug)]
pub enum CoreEvent {
    /// A completed command buffer from the designated core.
    Commands { core: usize, buffer: CommandBuffer },
    /// An audio frame from the designated core.
    Audio { core: usize, frame: AudioFrame },
    /// The core faulted and stopped. Other cores keep running.
    Fault { core: usize, fault: CoreFault },
    /// The core executed a halt.
    Halted { core: usize },
}

/// Observable per-core lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreState {
    Idle = 0,
    Running = 1,
    Halted = 2,
    Faulted = 3,
}

impl CoreState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CoreState::Running,
            2 => CoreState::Halted,
            3 => CoreState::Faulted,
            _ => CoreState::Idle,
        }
    }
}

/// Shared per-core bookkeeping the dispatcher reads without blocking.
struct CoreStatus {
    state: AtomicU8,
    executed: AtomicU64,
}

impl CoreStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CoreState::Idle as u8),
            executed: AtomicU64::new(0),
        }
    }
}

struct CoreHandle {
    control: Sender<ControlMessage>,
    thread: Option<JoinHandle<()>>,
}

/// Owns the core threads and the event stream back from them.
pub struct Dispatcher {
    arena: Arc<MemoryArena>,
    cores: Vec<CoreHandle>,
    status: Vec<Arc<CoreStatus>>,
    events: Receiver<CoreEvent>,
}

impl Dispatcher {
    /// Spawn `core_count` core threads against `arena`. Core 0 becomes the
    /// designated core.
    pub fn spawn(
        arena: Arc<MemoryArena>,
        core_count: usize,
        batch_instructions: usize,
    ) -> Result<Self, EmulatorError> {
        if core_count == 0 {
            return Err(EmulatorError::Initialization(
                "at least one core is required".into(),
            ));
        }
        if core_count > memory_map::register_bank::MAX_CORES {
            return Err(EmulatorError::Initialization(format!(
                "{core_count} cores exceeds the {} register banks",
                memory_map::register_bank::MAX_CORES
            )));
        }
        if batch_instructions == 0 {
            return Err(EmulatorError::Initialization(
                "batch instruction bound must be positive".into(),
            ));
        }
        if arena.capacity() < memory_map::MIN_ARENA_SIZE as usize {
            return Err(EmulatorError::Initialization(format!(
                "arena of {} bytes cannot hold the guest memory map",
                arena.capacity()
            )));
        }

        let (event_tx, event_rx) = mpsc::channel();
        let mut cores = Vec::with_capacity(core_count);
        let mut status = Vec::with_capacity(core_count);

        for core_id in 0..core_count {
            let (control_tx, control_rx) = mpsc::channel();
            let core_status = Arc::new(CoreStatus::new());
            let core = ExecutionCore::new(core_id, core_id == 0, Arc::clone(&arena));
            let thread_status = Arc::clone(&core_status);
            let thread_events = event_tx.clone();

            let thread = std::thread::Builder::new()
                .name(format!("core-{core_id}"))
                .spawn(move || {
                    core_thread(core, batch_instructions, control_rx, thread_events, thread_status)
                })
                .map_err(|err| {
                    EmulatorError::Initialization(format!("spawning core {core_id}: {err}"))
                })?;

            cores.push(CoreHandle {
                control: control_tx,
                thread: Some(thread),
            });
            status.push(core_status);
        }

        info!(cores = core_count, batch = batch_instructions, "core threads running");
        Ok(Self {
            arena,
            cores,
            status,
            events: event_rx,
        })
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Start every core at `entry`. The program bytes must already be in
    /// the arena; the send provides the happens-before edge to each core.
    pub fn load_program(&self, entry: u64) {
        fence(Ordering::SeqCst);
        for (core_id, core) in self.cores.iter().enumerate() {
            if core.control.send(ControlMessage::Load { entry }).is_err() {
                warn!(core = core_id, "core thread gone before load");
            }
        }
    }

    /// Drive one outer tick: publish the input snapshot into the arena,
    /// then wake the designated core for one batch. Non-blocking; the
    /// batch's events arrive on the event stream.
    pub fn run_outer_tick(&self, input: &InputSnapshot) {
        let encoded = input.encode();
        if let Err(err) = self.arena.write_bytes(memory_map::input::BASE, &encoded) {
            warn!(%err, "input region write failed");
        }
        fence(Ordering::SeqCst);
        if self.cores[0].control.send(ControlMessage::RunTick).is_err() {
            warn!("designated core gone; tick dropped");
        }
    }

    /// Next pending event, if any.
    pub fn poll_event(&self) -> Option<CoreEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn wait_event(&self, timeout: Duration) -> Option<CoreEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Observed state of one core, or `None` for an out-of-range id.
    pub fn core_state(&self, core_id: usize) -> Option<CoreState> {
        self.status
            .get(core_id)
            .map(|s| CoreState::from_u8(s.state.load(Ordering::SeqCst)))
    }

    /// Instructions executed by one core so far. Zero for an
    /// out-of-range id.
    pub fn core_executed(&self, core_id: usize) -> u64 {
        self.status
            .get(core_id)
            .map_or(0, |s| s.executed.load(Ordering::SeqCst))
    }

    /// Instructions executed across all cores.
    pub fn total_executed(&self) -> u64 {
        self.status
            .iter()
            .map(|s| s.executed.load(Ordering::SeqCst))
            .sum()
    }

    /// Stop and join every core thread.
    pub fn shutdown(&mut self) {
        for core in &self.cores {
            let _ = core.control.send(ControlMessage::Shutdown);
        }
        for (core_id, core) in self.cores.iter_mut().enumerate() {
            if let Some(thread) = core.thread.take() {
                if thread.join().is_err() {
                    warn!(core = core_id, "core thread panicked");
                }
            }
        }
        debug!("all core threads joined");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of one core thread.
///
/// The designated core blocks on control and runs one batch per
/// `RunTick`. Free-running cores run batches back to back, draining
/// control between them; with nothing loaded (or after a halt or fault)
/// they park on the control channel.
fn core_thread(
    mut core: ExecutionCore,
    batch_instructions: usize,
    control: Receiver<ControlMessage>,
    events: Sender<CoreEvent>,
    status: Arc<CoreStatus>,
) {
    let core_id = core.core_id();
    let designated = core_id == 0;
    let mut running = false;

    loop {
        let message = if running && !designated {
            match control.try_recv() {
                Ok(message) => Some(message),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            // Parked, or tick-paced with no tick yet: wait for control.
            match control.recv_timeout(IDLE_POLL) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        match message {
            Some(ControlMessage::Shutdown) => break,
            Some(ControlMessage::Load { entry }) => {
                fence(Ordering::SeqCst);
                core.reset(entry);
                running = true;
                status.state.store(CoreState::Running as u8, Ordering::SeqCst);
                continue;
            }
            Some(ControlMessage::RunTick) => {
                if !designated {
                    // Ticks only pace the designated core.
                    continue;
                }
                if !running {
                    continue;
                }
            }
            None => {} // free-running core, no control pending
        }

        match core.run_batch(batch_instructions) {
            Ok(outcome) => {
                status.executed.fetch_add(outcome.executed as u64, Ordering::SeqCst);
                fence(Ordering::SeqCst);
                // Audio for a frame precedes the frame's command buffer.
                for frame in outcome.audio {
                    let _ = events.send(CoreEvent::Audio {
                        core: core_id,
                        frame,
                    });
                }
                if let Some(buffer) = outcome.commands {
                    let _ = events.send(CoreEvent::Commands {
                        core: core_id,
                        buffer,
                    });
                }
                if outcome.halted {
                    running = false;
                    status.state.store(CoreState::Halted as u8, Ordering::SeqCst);
                    info!(core = core_id, "core halted");
                    let _ = events.send(CoreEvent::Halted { core: core_id });
                }
            }
            Err(fault) => {
                running = false;
                status.state.store(CoreState::Faulted as u8, Ordering::SeqCst);
                warn!(core = core_id, %fault, "core faulted");
                let _ = events.send(CoreEvent::Fault {
                    core: core_id,
                    fault,
                });
            }
        }
    }

    debug!(core = core_id, "core thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{Instr::*, assemble};
    use nxemu_hw::memory_map::program;

    fn small_arena() -> Arc<MemoryArena> {
        Arc::new(MemoryArena::allocate(0x200_0000).unwrap())
    }

    #[test]
    fn spawn_rejects_zero_cores_and_tiny_arenas() {
        assert!(Dispatcher::spawn(small_arena(), 0, 100).is_err());
        assert!(Dispatcher::spawn(small_arena(), 4, 0).is_err());
        let tiny = Arc::new(MemoryArena::allocate(0x100).unwrap());
        assert!(Dispatcher::spawn(tiny, 4, 100).is_err());
    }

    #[test]
    fn designated_core_runs_one_batch_per_tick() {
        let arena = small_arena();
        let code = assemble(&[
            AddImm { rd: 2, rs1: 2, imm: 1 },
            Jump { target: program::BASE as u32 },
        ]);
        arena.write_bytes(program::BASE, &code).unwrap();

        let dispatcher = Dispatcher::spawn(Arc::clone(&arena), 1, 10).unwrap();
        dispatcher.load_program(program::BASE);
        for _ in 0..3 {
            dispatcher.run_outer_tick(&InputSnapshot::neutral());
        }

        // Wait for the ticks to land; a single tick-paced core executes
        // exactly batch-bound instructions per tick, so three ticks cap
        // at 30.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while dispatcher.core_executed(0) < 30 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(dispatcher.core_executed(0), 30);
        assert_eq!(dispatcher.core_state(0), Some(CoreState::Running));
    }

    #[test]
    fn tick_publishes_the_input_snapshot_before_the_batch() {
        let arena = small_arena();
        // Core 0 loads the snapshot's button word into x3 and halts.
        let code = assemble(&[
            LoadImm { rd: 2, imm: memory_map::input::BASE as u32 },
            Load { rd: 3, base: 2, offset: 0 },
            Halt,
        ]);
        arena.write_bytes(program::BASE, &code).unwrap();

        let dispatcher = Dispatcher::spawn(Arc::clone(&arena), 1, 100).unwrap();
        dispatcher.load_program(program::BASE);
        let mut snapshot = InputSnapshot::neutral();
        snapshot.a = true;
        dispatcher.run_outer_tick(&snapshot);

        match dispatcher.wait_event(Duration::from_secs(2)) {
            Some(CoreEvent::Halted { core: 0 }) => {}
            other => panic!("expected halt, got {other:?}"),
        }
        // The guest observed the published bitmask (a = bit 0), visible in
        // its mirrored register bank.
        let x3 = arena
            .read_u64(memory_map::register_bank::BASE + 3 * 8)
            .unwrap();
        assert_eq!(x3 & 1, 1);
    }

    #[test]
    fn fault_on_one_core_leaves_the_others_running() {
        let arena = small_arena();
        // Core 0 (x1 == 0) loops; other cores fall into an illegal word.
        let trap = program::BASE + 3 * crate::isa::INSTRUCTION_BYTES;
        let code = assemble(&[
            BranchIfZero { rs1: 1, target: (program::BASE + 2 * 8) as u32 },
            Jump { target: trap as u32 },
            // core 0 loop target:
            Jump { target: (program::BASE + 2 * 8) as u32 },
        ]);
        arena.write_bytes(program::BASE, &code).unwrap();
        arena
            .write_bytes(trap, &[0xEE, 0, 0, 0, 0, 0, 0, 0])
            .unwrap();

        let dispatcher = Dispatcher::spawn(Arc::clone(&arena), 2, 50).unwrap();
        dispatcher.load_program(program::BASE);
        dispatcher.run_outer_tick(&InputSnapshot::neutral());

        match dispatcher.wait_event(Duration::from_secs(2)) {
            Some(CoreEvent::Fault {
                core: 1,
                fault: CoreFault::Decode { opcode: 0xEE, .. },
            }) => {}
            other => panic!("expected core 1 decode fault, got {other:?}"),
        }
        assert_eq!(dispatcher.core_state(1), Some(CoreState::Faulted));
        assert_eq!(dispatcher.core_state(0), Some(CoreState::Running));
    }

    #[test]
    fn out_of_range_core_ids_are_reported_absent() {
        let mut dispatcher = Dispatcher::spawn(small_arena(), 2, 100).unwrap();
        assert_eq!(dispatcher.core_state(2), None);
        assert_eq!(dispatcher.core_state(usize::MAX), None);
        assert_eq!(dispatcher.core_executed(usize::MAX), 0);
        dispatcher.shutdown();
    }

    #[test]
    fn shutdown_joins_every_thread() {
        let dispatcher = Dispatcher::spawn(small_arena(), 4, 100);
        let mut dispatcher = dispatcher.unwrap();
        dispatcher.shutdown();
        assert!(dispatcher.cores.iter().all(|c| c.thread.is_none()));
    }
}
