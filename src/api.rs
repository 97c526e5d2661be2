//! Public API for the simulation.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When `step(dt)` is called,
//! the simulation accumulates time and runs fixed updates as needed. This ensures deterministic
//! behavior regardless of frame rate. `frame_update(dt)` runs the variable-rate frame schedule
//! once; the render pass reads a `snapshot()` taken after both.

use crate::bullet::{Bullet, BulletContext};
use crate::components::*;
use crate::error::{ListenerError, SimError};
use crate::events::{BulletEvent, BulletEventKind};
use crate::systems::*;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use std::sync::{Arc, Mutex};

/// The main simulation world container.
///
/// Holds the ECS world and both schedules, providing a clean API for:
/// - Spawning actors and bullets
/// - Stepping the simulation forward
/// - Extracting state snapshots and bullet events
pub struct SimWorld {
    world: World,
    fixed: Schedule,
    frame: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
    events: Arc<Mutex<Vec<BulletEvent>>>,
    context: Option<Arc<dyn BulletContext>>,
}

impl SimWorld {
    /// Create a new empty simulation world.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a new simulation world with custom configuration.
    pub fn with_config(config: SimConfig) -> Self {
        let config = config.sanitized();
        let mut world = World::new();

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(FrameDelta::default());
        world.insert_resource(FrameClock::default());
        world.insert_resource(SimTick(0));
        world.insert_resource(ActorIndex::default());
        world.insert_resource(config);

        let mut fixed = Schedule::default();
        fixed.configure_sets((SimSet::Gameplay, SimSet::Index, SimSet::Bullets, SimSet::Cleanup).chain());
        fixed.add_systems((
            actor_index_system.in_set(SimSet::Index),
            bullet_system.in_set(SimSet::Bullets),
            reap_ended_bullets_system.in_set(SimSet::Cleanup),
        ));

        let mut frame = Schedule::default();
        frame.add_systems(frame_clock_system);

        Self {
            world,
            fixed,
            frame,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
            events: Arc::new(Mutex::new(Vec::new())),
            context: None,
        }
    }

    /// Host context every subsequently spawned bullet falls back to.
    pub fn set_context(&mut self, context: Option<Arc<dyn BulletContext>>) {
        self.context = context;
    }

    /// Add host systems to the fixed schedule. They run before bullets.
    pub fn add_fixed_systems<M>(&mut self, systems: impl IntoSystemConfigs<M>) {
        self.fixed.add_systems(systems.in_set(SimSet::Gameplay));
    }

    /// Add host systems to the frame schedule, after the frame clock.
    pub fn add_frame_systems<M>(&mut self, systems: impl IntoSystemConfigs<M>) {
        self.frame.add_systems(systems.after(frame_clock_system));
    }

    pub fn config(&self) -> SimConfig {
        self.world.get_resource::<SimConfig>().cloned().unwrap_or_default()
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed updates
    /// as needed. Returns the number of fixed updates run.
    pub fn step(&mut self, dt: f32) -> u32 {
        let fixed_dt = self.world
            .get_resource::<SimConfig>()
            .map(|c| c.fixed_timestep)
            .filter(|step| step.is_finite() && *step > 0.0)
            .unwrap_or(1.0 / 30.0);
        if !dt.is_finite() {
            log::warn!("ignoring non-finite step {}", dt);
            return 0;
        }

        self.time_accumulator += dt.max(0.0);

        let mut ticks = 0;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
            ticks += 1;
        }
        ticks
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        if let Some(mut dt_res) = self.world.get_resource_mut::<DeltaTime>() {
            dt_res.0 = dt;
        }
        if let Some(mut tick_res) = self.world.get_resource_mut::<SimTick>() {
            tick_res.increment();
        }

        self.fixed.run(&mut self.world);

        self.tick += 1;
        self.time += dt;
    }

    /// Run the variable-rate frame schedule once.
    pub fn frame_update(&mut self, dt: f32) {
        if let Some(mut delta) = self.world.get_resource_mut::<FrameDelta>() {
            delta.0 = dt;
        }
        self.frame.run(&mut self.world);
    }

    pub fn frame_clock(&self) -> FrameClock {
        self.world.get_resource::<FrameClock>().copied().unwrap_or_default()
    }

    // ========================================================================
    // ACTORS
    // ========================================================================

    /// Spawn a unit or building.
    pub fn spawn_actor(&mut self, actor: Actor) -> Result<Entity, SimError> {
        self.ensure_free(actor.id())?;
        Ok(self.world.spawn(actor).id())
    }

    /// Start a bullet against this world's context and spawn it.
    ///
    /// Its events are queued for [`SimWorld::drain_events`].
    pub fn spawn_bullet(&mut self, mut bullet: Bullet) -> Result<Entity, SimError> {
        self.ensure_free(bullet.id())?;
        for kind in [BulletEventKind::Started, BulletEventKind::Ended, BulletEventKind::TriggerFired] {
            let queue = Arc::clone(&self.events);
            bullet.on(kind, move |event| {
                queue
                    .lock()
                    .map_err(|_| ListenerError::new("bullet event queue poisoned"))?
                    .push(event.clone());
                Ok(())
            });
        }

        // Units spawned since the last tick must be resolvable at start.
        self.refresh_index();
        let ctx: Arc<dyn BulletContext> = Arc::new(self.context_handle());
        bullet.start(Some(ctx))?;
        Ok(self.world.spawn(bullet).id())
    }

    /// Remove an actor or bullet. Active bullets are ended first.
    pub fn remove_actor(&mut self, id: ActorId) -> Result<(), SimError> {
        let entity = self.entity_of(id).ok_or(SimError::ActorNotFound(id))?;
        if let Some(mut bullet) = self.world.get_mut::<Bullet>(entity) {
            bullet.end(Some(crate::events::EndReason::Other("removed".into())));
        }
        self.world.despawn(entity);
        self.refresh_index();
        Ok(())
    }

    /// Clone of an actor's current state.
    pub fn actor(&mut self, id: ActorId) -> Option<Actor> {
        let entity = self.entity_of(id)?;
        let entity = self.world.entity(entity);
        entity
            .get::<Actor>()
            .or_else(|| entity.get::<Bullet>().map(Bullet::actor))
            .cloned()
    }

    /// Run `f` on an actor's mutable state.
    pub fn with_actor_mut<R>(&mut self, id: ActorId, f: impl FnOnce(&mut Actor) -> R) -> Result<R, SimError> {
        let entity = self.entity_of(id).ok_or(SimError::ActorNotFound(id))?;
        let mut entity = self.world.entity_mut(entity);
        if let Some(mut actor) = entity.get_mut::<Actor>() {
            return Ok(f(&mut actor));
        }
        match entity.get_mut::<Bullet>() {
            Some(mut bullet) => Ok(f(bullet.actor_mut())),
            None => Err(SimError::ActorNotFound(id)),
        }
    }

    /// Link or unlink an actor's visual.
    pub fn set_visual(&mut self, id: ActorId, visual: Option<VisualId>) -> Result<(), SimError> {
        self.with_actor_mut(id, |actor| actor.set_visual(visual))
    }

    pub fn actor_count(&mut self) -> usize {
        let units = self.world.query::<&Actor>().iter(&self.world).count();
        units + self.world.query::<&Bullet>().iter(&self.world).count()
    }

    /// Despawn everything and reset the clocks. Config and context are kept.
    pub fn reset(&mut self) {
        let entities: Vec<Entity> = self
            .world
            .query_filtered::<Entity, Or<(With<Actor>, With<Bullet>)>>()
            .iter(&self.world)
            .collect();
        for entity in entities {
            self.world.despawn(entity);
        }
        self.tick = 0;
        self.time = 0.0;
        self.time_accumulator = 0.0;
        if let Some(mut tick) = self.world.get_resource_mut::<SimTick>() {
            tick.0 = 0;
        }
        self.world.insert_resource(FrameClock::default());
        self.refresh_index();
        self.drain_events();
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world, self.tick, self.time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    /// Bullet events emitted since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<BulletEvent> {
        match self.events.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => {
                log::error!("bullet event queue poisoned");
                Vec::new()
            }
        }
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Get the elapsed simulation time.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn context_handle(&self) -> WorldContext {
        let index = self.world.get_resource::<ActorIndex>().cloned().unwrap_or_default();
        WorldContext::new(index, self.context.clone())
    }

    fn refresh_index(&mut self) {
        let mut actors = self.world.query::<&Actor>();
        let units: Vec<_> = actors
            .iter(&self.world)
            .filter(|a| a.is_active())
            .map(|a| (a.id(), a.position()))
            .collect();
        let shots: Vec<_> = self
            .world
            .query::<&Bullet>()
            .iter(&self.world)
            .filter(|b| b.is_active())
            .map(|b| (b.id(), b.actor().position()))
            .collect();
        if let Some(index) = self.world.get_resource::<ActorIndex>() {
            index.rebuild(units.into_iter().chain(shots));
        }
    }

    fn entity_of(&mut self, id: ActorId) -> Option<Entity> {
        let unit = self
            .world
            .query::<(Entity, &Actor)>()
            .iter(&self.world)
            .find(|(_, a)| a.id() == id)
            .map(|(e, _)| e);
        unit.or_else(|| {
            self.world
                .query::<(Entity, &Bullet)>()
                .iter(&self.world)
                .find(|(_, b)| b.id() == id)
                .map(|(e, _)| e)
        })
    }

    fn ensure_free(&mut self, id: ActorId) -> Result<(), SimError> {
        match self.entity_of(id) {
            Some(_) => Err(SimError::DuplicateActor(id)),
            None => Ok(()),
        }
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}
