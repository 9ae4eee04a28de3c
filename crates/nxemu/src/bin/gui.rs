use clap::Parser;
use nxemu::{Args, EmulatorSession, display};
use tracing::info;

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let image_data =
        args.load_image_data().unwrap_or_else(|e| panic!("Failed to load image: {}", e));
    let image_name = args.image_name();

    info!("=== Creating Session ===");
    let mut session = EmulatorSession::initialize(args.to_config())
        .unwrap_or_else(|e| panic!("Failed to initialize: {}", e));
    session
        .load_program(&image_name, &image_data)
        .unwrap_or_else(|e| panic!("Failed to load program: {}", e));

    info!("=== Starting Emulator with Display ===");
    display::run(session).expect("Failed to run display");
}
