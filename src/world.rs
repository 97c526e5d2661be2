//! Snapshot types.
//!
//! The `Snapshot` struct is the read-only view of the simulation the render
//! pass syncs visuals from. It is taken after all fixed ticks of a frame.

use crate::bullet::Bullet;
use crate::components::*;
use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Snapshot of a single actor's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub kind: ActorKind,
    pub model_id: String,
    pub config_id: u32,
    pub faction: Faction,
    pub position: Vec3,
    pub rotation: f32,
    pub scale: f32,
    pub visible: bool,
    pub active: bool,
    pub visual: Option<VisualId>,
}

impl From<&Actor> for ActorSnapshot {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id(),
            kind: actor.kind(),
            model_id: actor.model_id.clone(),
            config_id: actor.config_id,
            faction: actor.faction,
            position: actor.position(),
            rotation: actor.rotation(),
            scale: actor.scale(),
            visible: actor.is_visible(),
            active: actor.is_active(),
            visual: actor.visual().cloned(),
        }
    }
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    /// Units, buildings and bullets, ordered by id.
    pub actors: Vec<ActorSnapshot>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut actors: Vec<ActorSnapshot> = world
            .query::<&Actor>()
            .iter(world)
            .map(ActorSnapshot::from)
            .collect();
        actors.extend(
            world
                .query::<&Bullet>()
                .iter(world)
                .map(|b| ActorSnapshot::from(b.actor())),
        );
        actors.sort_by_key(|a| a.id);
        Self { tick, time, actors }
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorSnapshot> {
        self.actors
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &self.actors[i])
    }

    pub fn count_kind(&self, kind: ActorKind) -> usize {
        self.actors.iter().filter(|a| a.kind == kind).count()
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = Snapshot {
            tick: 42,
            time: 1.4,
            actors: vec![ActorSnapshot {
                id: ActorId(3),
                kind: ActorKind::Bullet,
                model_id: "fx_arrow".to_string(),
                config_id: 1001,
                faction: Faction(1),
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation: 90.0,
                scale: 1.0,
                visible: true,
                active: true,
                visual: Some(VisualId::for_actor(ActorId(3))),
            }],
        };

        let json = snapshot.to_json().unwrap();
        assert!(json.contains(r#""kind":"bullet""#));
        assert!(json.contains(r#""modelId":"fx_arrow""#));
        assert!(json.contains(r#""visual":"sprite_3""#));

        let restored: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.tick, 42);
        assert_eq!(restored.actor(ActorId(3)).map(|a| a.position), Some(Vec3::new(1.0, 2.0, 3.0)));
    }
}
