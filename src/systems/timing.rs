//! Clock resources for the fixed simulation tick and the variable frame tick.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Loop tuning.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Upper bound on real time fed to the accumulator per frame.
    pub max_frame_delta: f32,
    /// Despawn bullets once they have ended.
    pub despawn_ended_bullets: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0, // 30 Hz
            max_frame_delta: 0.1,
            despawn_ended_bullets: true,
        }
    }
}

impl SimConfig {
    /// Parse from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Replace unusable timing values with the defaults. A fixed timestep
    /// must be positive and finite or the accumulator never drains.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            log::warn!(
                "fixedTimestep {} is not a positive duration, using {}",
                self.fixed_timestep,
                defaults.fixed_timestep
            );
            self.fixed_timestep = defaults.fixed_timestep;
        }
        if !(self.max_frame_delta.is_finite() && self.max_frame_delta >= 0.0) {
            log::warn!(
                "maxFrameDelta {} is not a valid duration, using {}",
                self.max_frame_delta,
                defaults.max_frame_delta
            );
            self.max_frame_delta = defaults.max_frame_delta;
        }
        self
    }
}

/// Global simulation tick counter. Increments each fixed update.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Delta time of the current fixed tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Delta time of the current render frame.
#[derive(Resource, Default)]
pub struct FrameDelta(pub f32);

/// Variable-rate frame statistics.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct FrameClock {
    pub delta: f32,
    pub elapsed: f32,
    pub frames: u64,
    /// Smoothed frames per second.
    pub fps: f32,
}

impl FrameClock {
    pub fn advance(&mut self, delta: f32) {
        self.delta = delta;
        self.elapsed += delta;
        self.frames += 1;
        if delta > 0.0 {
            let instant = 1.0 / delta;
            self.fps = if self.fps == 0.0 { instant } else { self.fps * 0.9 + instant * 0.1 };
        }
    }
}

pub fn frame_clock_system(delta: Res<FrameDelta>, mut clock: ResMut<FrameClock>) {
    clock.advance(delta.0);
}
