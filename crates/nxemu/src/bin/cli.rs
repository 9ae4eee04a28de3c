use std::time::{Duration, Instant};

use clap::Parser;
use nxemu::{
    Args, AudioQueue, CommandTranslator, CoreEvent, CoreState, EmulatorSession, InputSnapshot,
    OffscreenTarget,
};
use tracing::info;

/// Why the headless run ended.
#[derive(Debug)]
enum StopReason {
    AllCoresStopped,
    InstructionLimit,
    Timeout,
    Fault,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let image_data = match args.load_image_data() {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to load image: {}", e);
            std::process::exit(2);
        }
    };
    let image_name = args.image_name();

    info!("=== Creating Session ===");
    let mut session = match EmulatorSession::initialize(args.to_config()) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to initialize: {}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = session.load_program(&image_name, &image_data) {
        eprintln!("Failed to load program: {}", e);
        std::process::exit(2);
    }

    info!("=== Running (Headless) ===");
    let started = Instant::now();
    let timeout = args.timeout_ms.map(Duration::from_millis);
    let mut translator = CommandTranslator::new(Box::new(OffscreenTarget::default()));
    let mut audio = AudioQueue::default();
    let mut faulted = false;

    let stop_reason = loop {
        session
            .run_cycle(&InputSnapshot::neutral())
            .expect("session is running");

        // Give the designated core a moment, then drain its events.
        while let Some(event) = session.wait_event(Duration::from_millis(2)) {
            match event {
                CoreEvent::Commands { buffer, .. } => {
                    translator
                        .translate_and_submit(&buffer)
                        .expect("offscreen target cannot fail");
                }
                CoreEvent::Audio { frame, .. } => audio.enqueue(frame),
                CoreEvent::Fault { core, fault } => {
                    eprintln!("core {} faulted: {}", core, fault);
                    faulted = true;
                }
                CoreEvent::Halted { core } => info!(core, "core halted"),
            }
        }

        let all_stopped = (0..session.core_count()).all(|core| {
            matches!(
                session.core_state(core),
                Some(CoreState::Halted | CoreState::Faulted)
            )
        });
        if all_stopped {
            break if faulted {
                StopReason::Fault
            } else {
                StopReason::AllCoresStopped
            };
        }
        if let Some(max) = args.max_instructions
            && session.total_executed() >= max
        {
            break StopReason::InstructionLimit;
        }
        if let Some(timeout) = timeout
            && started.elapsed() >= timeout
        {
            break StopReason::Timeout;
        }
    };

    info!("=== Emulation Complete ===");
    info!("Stop reason: {:?}", stop_reason);
    info!("Frames presented: {}", translator.frames_presented());
    info!("Commands skipped: {}", translator.faults_skipped());
    info!("Audio scheduled: {:?}", audio.scheduled_duration());
    info!("Elapsed: {:?}", started.elapsed());
    session.log_final_state();
    session.shutdown();

    let exit_code = match stop_reason {
        StopReason::Fault => 2,
        StopReason::Timeout => 1,
        StopReason::AllCoresStopped | StopReason::InstructionLimit => 0,
    };
    std::process::exit(exit_code);
}
