//! Controller state sampling.
//!
//! Once per outer tick the frontend polls the sampler for an immutable
//! [`InputSnapshot`], which the dispatcher serializes into the arena's
//! input region for the designated core's next batch. The snapshot is
//! consumed by exactly one tick and never retained.

use nxemu_hw::memory_map;

/// Analog-stick axes below this magnitude clamp to exactly zero.
pub const STICK_DEAD_ZONE: f32 = 0.1;

/// Bytes in the encoded snapshot (button bitmask + four axes).
pub const ENCODED_LEN: usize = 4 + 4 * 4;

// The encoding must fit the arena region reserved for it.
const _: () = assert!(ENCODED_LEN <= memory_map::input::SIZE);

/// One analog stick, each axis in [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StickVector {
    pub x: f32,
    pub y: f32,
}

/// The fixed named button set plus two analog sticks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputSnapshot {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub l: bool,
    pub r: bool,
    pub zl: bool,
    pub zr: bool,
    pub plus: bool,
    pub minus: bool,
    pub home: bool,
    pub capture: bool,
    pub left_stick: StickVector,
    pub right_stick: StickVector,
}

impl InputSnapshot {
    /// All buttons released, both sticks at exactly (0.0, 0.0).
    pub fn neutral() -> Self {
        Self::default()
    }

    fn button_bits(&self) -> u32 {
        let buttons = [
            self.a, self.b, self.x, self.y, self.l, self.r, self.zl, self.zr, self.plus,
            self.minus, self.home, self.capture,
        ];
        buttons
            .iter()
            .enumerate()
            .fold(0, |bits, (i, &pressed)| bits | ((pressed as u32) << i))
    }

    /// Serialize for the arena's input region: a button bitmask followed
    /// by left X/Y and right X/Y as little-endian f32.
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut out = [0u8; ENCODED_LEN];
        out[0..4].copy_from_slice(&self.button_bits().to_le_bytes());
        let axes = [
            self.left_stick.x,
            self.left_stick.y,
            self.right_stick.x,
            self.right_stick.y,
        ];
        for (slot, axis) in out[4..].chunks_exact_mut(4).zip(axes) {
            slot.copy_from_slice(&axis.to_bits().to_le_bytes());
        }
        out
    }
}

fn apply_dead_zone(value: f32) -> f32 {
    if value.abs() > STICK_DEAD_ZONE { value } else { 0.0 }
}

/// Polls raw controller state into per-tick snapshots.
///
/// The frontend owns the raw state (keyboard mapping, gamepad, ...) and
/// writes it through [`InputSampler::raw_mut`]; `poll` is side-effect-free
/// from the core's perspective.
#[derive(Debug, Default)]
pub struct InputSampler {
    connected: bool,
    raw: InputSnapshot,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark whether a physical controller (or key mapping) is present.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Raw state as reported by the device, before dead-zone handling.
    pub fn raw_mut(&mut self) -> &mut InputSnapshot {
        &mut self.raw
    }

    /// Produce the snapshot for this tick.
    ///
    /// With no controller present this is the neutral snapshot. Axis
    /// values inside the dead zone clamp to exactly zero; values outside
    /// pass through unmodified.
    pub fn poll(&self) -> InputSnapshot {
        if !self.connected {
            return InputSnapshot::neutral();
        }
        let mut snapshot = self.raw;
        snapshot.left_stick.x = apply_dead_zone(snapshot.left_stick.x);
        snapshot.left_stick.y = apply_dead_zone(snapshot.left_stick.y);
        snapshot.right_stick.x = apply_dead_zone(snapshot.right_stick.x);
        snapshot.right_stick.y = apply_dead_zone(snapshot.right_stick.y);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_controller_polls_neutral() {
        let sampler = InputSampler::new();
        let snapshot = sampler.poll();
        assert_eq!(snapshot, InputSnapshot::neutral());
        assert!(!snapshot.a);
        assert_eq!(snapshot.left_stick.x, 0.0);
        assert_eq!(snapshot.right_stick.y, 0.0);
    }

    #[test]
    fn dead_zone_clamps_small_axis_values_to_exactly_zero() {
        let mut sampler = InputSampler::new();
        sampler.set_connected(true);
        sampler.raw_mut().left_stick.x = 0.05;
        sampler.raw_mut().left_stick.y = -0.09;
        sampler.raw_mut().right_stick.x = 0.5;

        let snapshot = sampler.poll();
        assert_eq!(snapshot.left_stick.x, 0.0);
        assert_eq!(snapshot.left_stick.y, 0.0);
        assert_eq!(snapshot.right_stick.x, 0.5);
    }

    #[test]
    fn buttons_pass_through_when_connected() {
        let mut sampler = InputSampler::new();
        sampler.set_connected(true);
        sampler.raw_mut().a = true;
        sampler.raw_mut().plus = true;

        let snapshot = sampler.poll();
        assert!(snapshot.a && snapshot.plus);
        assert!(!snapshot.b);
    }

    #[test]
    fn encoding_packs_buttons_then_axes() {
        let mut snapshot = InputSnapshot::neutral();
        snapshot.a = true;
        snapshot.zl = true;
        snapshot.left_stick.x = 0.5;

        let bytes = snapshot.encode();
        let bits = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(bits, 0b0100_0001);
        let lx = f32::from_bits(u32::from_le_bytes(bytes[4..8].try_into().unwrap()));
        assert_eq!(lx, 0.5);
    }
}
