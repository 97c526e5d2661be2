//! ECS Components for the Arcfire simulation.
//!
//! Components are plain data. Units and buildings carry an [`Actor`]
//! directly; bullets carry a [`crate::bullet::Bullet`], which owns its actor.

use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Unique identifier for an actor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Faction/camp the actor fights for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Faction(pub u32);

/// What kind of entity an actor represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorKind {
    Unit,
    Building,
    Bullet,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Unit => "unit",
            ActorKind::Building => "building",
            ActorKind::Bullet => "bullet",
        }
    }
}

/// Opaque handle of a visual owned by the external visual manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualId(pub String);

impl VisualId {
    /// Visual id conventionally derived from the actor it represents.
    pub fn for_actor(id: ActorId) -> Self {
        Self(format!("sprite_{}", id.0))
    }
}

// ============================================================================
// ACTOR
// ============================================================================

/// Minimal simulated entity.
///
/// Axis convention: `x` is horizontal, `y` is height, `z` is depth.
/// Rotation is stored in degrees.
#[derive(Component, Debug, Clone)]
pub struct Actor {
    id: ActorId,
    kind: ActorKind,
    pub model_id: String,
    pub config_id: u32,
    pub faction: Faction,
    position: Vec3,
    rotation: f32,
    scale: f32,
    visible: bool,
    active: bool,
    visual: Option<VisualId>,
}

impl Actor {
    pub fn new(id: ActorId, kind: ActorKind, model_id: impl Into<String>, faction: Faction) -> Self {
        Self {
            id,
            kind,
            model_id: model_id.into(),
            config_id: 0,
            faction,
            position: Vec3::ZERO,
            rotation: 0.0,
            scale: 1.0,
            visible: true,
            active: true,
            visual: None,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_config_id(mut self, config_id: u32) -> Self {
        self.config_id = config_id;
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Translate by a displacement vector.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = degrees;
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Scale is floored at 0.1.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.max(0.1);
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn visual(&self) -> Option<&VisualId> {
        self.visual.as_ref()
    }

    pub fn set_visual(&mut self, visual: Option<VisualId>) {
        self.visual = visual;
    }

    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }
}
