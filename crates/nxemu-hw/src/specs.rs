/// CPU specifications
pub mod cpu {
    /// Number of guest CPU cores
    pub const CORE_COUNT: usize = 4;

    /// Guest CPU frequency (1.02 GHz)
    pub const FREQ_HZ: u64 = 1_020_000_000;

    /// General-purpose registers per core
    pub const REGISTER_COUNT: usize = 32;

    /// Default guest instructions per execution batch.
    ///
    /// Sized so one batch stays within a cooperative time slice at 60 Hz.
    pub const INSTRUCTIONS_PER_BATCH: usize = 500_000;
}

/// Display specifications
pub mod display {
    /// Output width in pixels
    pub const WIDTH: u32 = 1280;

    /// Output height in pixels
    pub const HEIGHT: u32 = 720;

    /// Display refresh rate (60 Hz)
    pub const REFRESH_RATE_HZ: u32 = 60;
}

/// Audio specifications
pub mod audio {
    /// Output sample rate (48 kHz)
    pub const SAMPLE_RATE_HZ: u32 = 48_000;

    /// Output channel count (stereo)
    pub const CHANNELS: usize = 2;
}
