//! Audio sample queue.
//!
//! Guest execution produces interleaved stereo PCM frames; the sink
//! de-interleaves them into per-channel buffers and schedules them at the
//! current output clock. The queue is bounded: when the output device
//! cannot drain fast enough, the oldest block is dropped and counted,
//! trading completeness for bounded latency. Device output plumbing past
//! this queue is the frontend's concern.

use std::collections::VecDeque;
use std::time::Duration;

use nxemu_hw::specs::audio;
use tracing::warn;

/// An ordered sequence of interleaved stereo samples (L0 R0 L1 R1 ...)
/// at the nominal 48 kHz rate. Consumed once, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Sample pairs in this frame.
    pub fn pair_count(&self) -> usize {
        self.samples.len() / audio::CHANNELS
    }
}

/// One de-interleaved block, ready for per-channel device buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBlock {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Default queue depth in blocks (~latency bound at one frame per tick).
pub const DEFAULT_QUEUE_BLOCKS: usize = 8;

/// Bounded playback queue fed by guest audio frames.
#[derive(Debug)]
pub struct AudioQueue {
    blocks: VecDeque<ChannelBlock>,
    capacity_blocks: usize,
    underruns: u64,
    scheduled_samples: u64,
}

impl AudioQueue {
    pub fn new(capacity_blocks: usize) -> Self {
        Self {
            blocks: VecDeque::with_capacity(capacity_blocks),
            capacity_blocks: capacity_blocks.max(1),
            underruns: 0,
            scheduled_samples: 0,
        }
    }

    /// Accept one frame: de-interleave and schedule it at the current
    /// output clock. If the queue is full the oldest block is dropped and
    /// counted as an underrun; frames are never reordered or silently lost.
    pub fn enqueue(&mut self, frame: AudioFrame) {
        let pairs = frame.pair_count();
        if frame.samples.len() % audio::CHANNELS != 0 {
            warn!(
                "audio frame with {} samples is not stereo-aligned; trailing sample ignored",
                frame.samples.len()
            );
        }
        if pairs == 0 {
            return;
        }

        let mut left = Vec::with_capacity(pairs);
        let mut right = Vec::with_capacity(pairs);
        for pair in frame.samples.chunks_exact(audio::CHANNELS) {
            left.push(pair[0]);
            right.push(pair[1]);
        }

        if self.blocks.len() == self.capacity_blocks {
            self.blocks.pop_front();
            self.underruns += 1;
        }
        self.blocks.push_back(ChannelBlock { left, right });
        self.scheduled_samples += pairs as u64;
    }

    /// Take the next block for playback, oldest first.
    pub fn dequeue(&mut self) -> Option<ChannelBlock> {
        self.blocks.pop_front()
    }

    /// Blocks currently queued.
    pub fn queued_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Frames dropped due to queue overflow, for diagnostics.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Position of the output clock: total audio scheduled so far.
    pub fn scheduled_duration(&self) -> Duration {
        Duration::from_secs_f64(self.scheduled_samples as f64 / audio::SAMPLE_RATE_HZ as f64)
    }
}

impl Default for AudioQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_BLOCKS)
    }
}
