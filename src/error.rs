//! Error types shared across the simulation kernel.

use crate::bullet::BulletPhase;
use crate::components::ActorId;
use thiserror::Error;

/// Errors surfaced by the public simulation API.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("level config not found: {0}")]
    LevelNotFound(u32),
    #[error("map config not found: {0}")]
    MapNotFound(u32),
    #[error("bullet config not found: {0}")]
    BulletConfigNotFound(u32),
    #[error("actor not found: {0}")]
    ActorNotFound(ActorId),
    #[error("actor id already in use: {0}")]
    DuplicateActor(ActorId),
    #[error("bullet {id} cannot start from {from:?}")]
    InvalidTransition { id: ActorId, from: BulletPhase },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while decoding configuration tables.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("table key {key:?} is not a numeric id")]
    BadKey { key: String },
    #[error("config id mismatch: keyed as {key}, declares {declared}")]
    IdMismatch { key: u32, declared: u32 },
}

/// Failure to materialize a visual for an actor.
#[derive(Debug, Clone, Error)]
pub enum VisualError {
    #[error("no model config for {0:?}")]
    MissingModel(String),
    #[error("resource load failed: {0}")]
    Load(String),
}

/// Error returned by an event listener. Logged, never propagated.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
