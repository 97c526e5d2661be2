//! ECS Systems for the Arcfire simulation.
//!
//! **Fixed schedule** (one run per fixed tick, chained):
//! - host systems added through `SimWorld::add_fixed_systems`
//! - `actor_index_system` - Rebuilds the actor position index
//! - `bullet_system` - Advances every bullet by `DeltaTime`
//! - `reap_ended_bullets_system` - Despawns ended bullets
//!
//! **Frame schedule** (one run per render frame):
//! - `frame_clock_system` - Updates `FrameClock`
//! - host systems added through `SimWorld::add_frame_systems`

pub mod bullets;
pub mod timing;

pub use bullets::*;
pub use timing::*;

use bevy_ecs::prelude::*;

/// Ordering of the fixed schedule.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimSet {
    /// Host gameplay (unit movement, spawning).
    Gameplay,
    Index,
    Bullets,
    Cleanup,
}
