//! Command line arguments shared by the frontends.

use std::path::PathBuf;

use clap::Parser;
use nxemu_hw::specs;

use crate::demo;
use crate::session::EmulatorConfig;

#[derive(Parser, Debug)]
#[command(version, about = "game console emulator", long_about = None)]
pub struct Args {
    /// Path to a program image to run.
    #[arg(conflicts_with = "demo", required_unless_present = "demo")]
    pub image: Option<PathBuf>,

    /// Run the built-in demo image instead of a file.
    #[arg(long)]
    pub demo: bool,

    /// Number of emulated cores.
    #[arg(long, default_value_t = specs::cpu::CORE_COUNT)]
    pub cores: usize,

    /// Guest DRAM size in MiB.
    #[arg(long, default_value_t = 4096)]
    pub dram_mib: usize,

    /// Guest instructions per execution batch.
    #[arg(long, default_value_t = specs::cpu::INSTRUCTIONS_PER_BATCH)]
    pub batch_instructions: usize,

    /// Stop after this many instructions on the designated core
    /// (headless frontend only).
    #[arg(short = 'i', long)]
    pub max_instructions: Option<u64>,

    /// Stop after this many milliseconds (headless frontend only).
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl Args {
    pub fn to_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            core_count: self.cores,
            dram_size: self.dram_mib * 1024 * 1024,
            batch_instructions: self.batch_instructions,
        }
    }

    /// Display name for status reporting.
    pub fn image_name(&self) -> String {
        match &self.image {
            Some(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            None => "demo".to_string(),
        }
    }

    /// The image bytes to load: the named file, or the built-in demo.
    pub fn load_image_data(&self) -> std::io::Result<Vec<u8>> {
        match &self.image {
            Some(path) => std::fs::read(path),
            None => Ok(demo::demo_image()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_and_image_are_mutually_exclusive() {
        assert!(Args::try_parse_from(["nxemu", "--demo", "game.nxpg"]).is_err());
        assert!(Args::try_parse_from(["nxemu"]).is_err());

        let args = Args::try_parse_from(["nxemu", "--demo", "--cores", "2"]).unwrap();
        assert!(args.demo);
        assert_eq!(args.to_config().core_count, 2);
    }
}
