//! Bullet systems and the actor position index they resolve targets through.

use crate::bullet::{Bullet, BulletContext, BulletEnded, BulletPhase, DamageRequest};
use crate::components::{Actor, ActorId};
use crate::systems::timing::{DeltaTime, SimConfig};
use bevy_ecs::prelude::*;
use glam::Vec3;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Positions of every active actor, rebuilt at the start of each fixed tick.
///
/// Shared by handle with [`WorldContext`] so bullets can look units up while
/// the ECS world is mutably borrowed.
#[derive(Resource, Debug, Clone, Default)]
pub struct ActorIndex(Arc<RwLock<HashMap<ActorId, Vec3>>>);

impl ActorIndex {
    pub fn position(&self, id: ActorId) -> Option<Vec3> {
        self.0.read().ok()?.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rebuild(&self, entries: impl IntoIterator<Item = (ActorId, Vec3)>) {
        match self.0.write() {
            Ok(mut map) => {
                map.clear();
                map.extend(entries);
            }
            Err(_) => log::error!("actor index lock poisoned; positions are stale"),
        }
    }

    pub fn clear(&self) {
        self.rebuild(std::iter::empty());
    }
}

/// Context handed to every bullet spawned into a [`crate::SimWorld`]: unit
/// lookups hit the actor index first, everything else goes to the host's
/// context if one was set.
#[derive(Clone)]
pub struct WorldContext {
    index: ActorIndex,
    inner: Option<Arc<dyn BulletContext>>,
}

impl WorldContext {
    pub fn new(index: ActorIndex, inner: Option<Arc<dyn BulletContext>>) -> Self {
        Self { index, inner }
    }
}

impl BulletContext for WorldContext {
    fn unit_position(&self, id: ActorId) -> Option<Vec3> {
        self.index
            .position(id)
            .or_else(|| self.inner.as_ref().and_then(|ctx| ctx.unit_position(id)))
    }

    fn on_bullet_end(&self, ended: &BulletEnded) {
        if let Some(ctx) = &self.inner {
            ctx.on_bullet_end(ended);
        }
    }

    fn default_target_unit(&self) -> Option<ActorId> {
        self.inner.as_ref().and_then(|ctx| ctx.default_target_unit())
    }

    fn default_target_position(&self) -> Option<Vec3> {
        self.inner.as_ref().and_then(|ctx| ctx.default_target_position())
    }

    fn cause_damage(&self, request: &DamageRequest) -> Option<bool> {
        self.inner.as_ref().and_then(|ctx| ctx.cause_damage(request))
    }
}

/// Refresh the index from every active actor and bullet.
pub fn actor_index_system(index: Res<ActorIndex>, actors: Query<&Actor>, bullets: Query<&Bullet>) {
    let units = actors.iter().filter(|a| a.is_active()).map(|a| (a.id(), a.position()));
    let shots = bullets
        .iter()
        .filter(|b| b.is_active())
        .map(|b| (b.id(), b.actor().position()));
    index.rebuild(units.chain(shots));
}

pub fn bullet_system(dt: Res<DeltaTime>, mut bullets: Query<&mut Bullet>) {
    for mut bullet in bullets.iter_mut() {
        bullet.update(dt.0);
    }
}

pub fn reap_ended_bullets_system(
    mut commands: Commands,
    config: Res<SimConfig>,
    bullets: Query<(Entity, &Bullet)>,
) {
    if !config.despawn_ended_bullets {
        return;
    }
    for (entity, bullet) in bullets.iter() {
        if bullet.phase() == BulletPhase::Ended {
            log::trace!("despawning {}", bullet.id());
            commands.entity(entity).despawn();
        }
    }
}
