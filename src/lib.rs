//! Arcfire - Simulation Core
//!
//! A config-driven actor/bullet kernel: a trigger interpreter, a flight
//! controller for straight, accelerating, arcing and homing shots, and a
//! fixed-timestep loop decoupled from rendering with lazy visual binding.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod bullet;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod flight;
pub mod runner;
pub mod systems;
pub mod trigger;
pub mod visual;
pub mod world;

pub use api::SimWorld;
pub use bullet::{Bullet, BulletContext, BulletEnded, BulletPhase, BulletProgram, DamageRequest};
pub use components::*;
pub use config::{BulletConfig, ConfigStore, ConfigTable, LevelConfig, MapConfig, TriggerEvent};
pub use error::{ConfigError, ListenerError, SimError, VisualError};
pub use events::{BulletEvent, BulletEventKind, Emitter, EndReason, ListenerId};
pub use flight::{ArcSampling, FlightConfig, FlightController, FlightEnd, FlightStep, FlightTarget};
pub use runner::{GameRunner, RunState};
pub use systems::*;
pub use trigger::{Action, Condition, HandlerTable, TriggerHost, TriggerProgram};
pub use visual::{
    DebugOverlay, LoadState, VisualBinder, VisualFactory, VisualManager, VisualRequest,
    VisualTransform,
};
pub use world::{ActorSnapshot, Snapshot};
