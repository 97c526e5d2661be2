//! Frame driver: fixed-step simulation, one frame update, one render pass.
//!
//! The host calls [`GameRunner::frame`] from its per-frame callback with a
//! monotonic timestamp. Real elapsed time is clamped to
//! `SimConfig::max_frame_delta` so a suspended tab does not cause a runaway
//! catch-up. The render pass runs after every fixed tick of the frame, so it
//! never observes a partially stepped simulation.

use crate::api::SimWorld;
use crate::bullet::{Bullet, BulletProgram};
use crate::components::{Actor, ActorId, ActorKind, Faction};
use crate::config::{ConfigTable, LevelConfig, MapConfig};
use crate::error::SimError;
use crate::trigger::{HandlerTable, TriggerProgram};
use crate::visual::{
    BindOutcome, DebugOverlay, VisualBinder, VisualFactory, VisualManager, VisualRequest,
    VisualTransform,
};
use crate::world::Snapshot;
use bevy_ecs::entity::Entity;
use glam::Vec3;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Stopped,
}

pub struct GameRunner<C, F, M>
where
    C: ConfigTable,
    F: VisualFactory,
    M: VisualManager<Visual = F::Visual>,
{
    sim: SimWorld,
    configs: C,
    factory: F,
    visuals: M,
    binder: VisualBinder<F::Visual>,
    state: RunState,
    last_frame: Option<f64>,
    level: Option<Arc<LevelConfig>>,
    map: Option<Arc<MapConfig>>,
    overlay: DebugOverlay,
    overlay_dirty: bool,
    bullet_handlers: HandlerTable<Bullet>,
    programs: HashMap<u32, Arc<BulletProgram>>,
}

impl<C, F, M> GameRunner<C, F, M>
where
    C: ConfigTable,
    F: VisualFactory,
    M: VisualManager<Visual = F::Visual>,
{
    pub fn new(sim: SimWorld, configs: C, factory: F, visuals: M) -> Self {
        Self {
            sim,
            configs,
            factory,
            visuals,
            binder: VisualBinder::new(),
            state: RunState::Idle,
            last_frame: None,
            level: None,
            map: None,
            overlay: DebugOverlay::default(),
            overlay_dirty: false,
            bullet_handlers: HandlerTable::new(),
            programs: HashMap::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn sim(&self) -> &SimWorld {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut SimWorld {
        &mut self.sim
    }

    pub fn visuals(&self) -> &M {
        &self.visuals
    }

    pub fn binder(&self) -> &VisualBinder<F::Visual> {
        &self.binder
    }

    pub fn level(&self) -> Option<&LevelConfig> {
        self.level.as_deref()
    }

    pub fn map(&self) -> Option<&MapConfig> {
        self.map.as_deref()
    }

    pub fn overlay(&self) -> DebugOverlay {
        self.overlay
    }

    /// Custom condition/action handlers for bullets fired from now on.
    pub fn set_bullet_handlers(&mut self, handlers: HandlerTable<Bullet>) {
        self.bullet_handlers = handlers;
        self.programs.clear();
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Reset the world to a level's initial actors and start running.
    /// `map_id` overrides the level's own map.
    pub fn load_level(&mut self, level_id: u32, map_id: Option<u32>) -> Result<(), SimError> {
        let level = self.configs.level(level_id).ok_or(SimError::LevelNotFound(level_id))?;
        let map_id = map_id.unwrap_or(level.map_id);
        let map = self.configs.map(map_id).ok_or(SimError::MapNotFound(map_id))?;

        self.clear_visuals();
        self.sim.reset();
        for spawn in &level.actors {
            if spawn.kind == ActorKind::Bullet {
                log::warn!("level {}: bullets cannot be placed ({})", level_id, spawn.id);
                continue;
            }
            let mut actor = Actor::new(spawn.id, spawn.kind, spawn.model_id.clone(), spawn.faction)
                .with_position(spawn.position.into())
                .with_config_id(spawn.config_id);
            actor.set_rotation(spawn.rotation);
            actor.set_scale(spawn.scale);
            self.sim.spawn_actor(actor)?;
        }

        log::info!("loaded level {} on map {} ({} actors)", level.id, map.id, level.actors.len());
        self.level = Some(level);
        self.map = Some(map);
        self.overlay_dirty = true;
        self.last_frame = None;
        self.state = RunState::Running;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Paused;
        }
    }

    /// Paused wall time is not simulated.
    pub fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.last_frame = None;
            self.state = RunState::Running;
        }
    }

    /// Stop the loop, drop every visual and clear the world.
    pub fn stop(&mut self) {
        self.clear_visuals();
        self.sim.reset();
        self.last_frame = None;
        self.state = RunState::Stopped;
    }

    pub fn set_show_blocked_cells(&mut self, show: bool) {
        self.overlay.show_blocked_cells = show;
        self.overlay_dirty = true;
    }

    pub fn set_show_build_cells(&mut self, show: bool) {
        self.overlay.show_build_cells = show;
        self.overlay_dirty = true;
    }

    /// Fire a bullet from the config table.
    pub fn fire_bullet(
        &mut self,
        id: ActorId,
        config_id: u32,
        faction: Faction,
        position: Vec3,
    ) -> Result<Entity, SimError> {
        let config = self.configs.bullet(config_id).ok_or(SimError::BulletConfigNotFound(config_id))?;
        let handlers = &self.bullet_handlers;
        let program = self
            .programs
            .entry(config_id)
            .or_insert_with(|| Arc::new(TriggerProgram::compile(&config, handlers.clone())))
            .clone();
        self.sim.spawn_bullet(Bullet::with_program(id, config, program, faction, position))
    }

    // ========================================================================
    // FRAME
    // ========================================================================

    /// Run one display frame at time `now` (seconds). Returns the number of
    /// fixed ticks run.
    pub fn frame(&mut self, now: f64) -> u32 {
        if self.state != RunState::Running {
            return 0;
        }
        let max_delta = self.sim.config().max_frame_delta;
        let delta = match self.last_frame {
            Some(last) => ((now - last).max(0.0) as f32).min(max_delta),
            None => 0.0,
        };
        self.last_frame = Some(now);

        let ticks = self.sim.step(delta);
        self.sim.frame_update(delta);
        self.render();
        ticks
    }

    fn render(&mut self) {
        let snapshot = self.sim.snapshot();
        let live = |id: ActorId| snapshot.actor(id).is_some_and(|a| a.active);

        for outcome in self.binder.poll(live) {
            match outcome {
                BindOutcome::Attached { actor, visual_id, visual } => {
                    self.visuals.add(visual_id.clone(), visual);
                    if let Err(err) = self.sim.set_visual(actor, Some(visual_id)) {
                        log::warn!("visual attached to missing actor: {}", err);
                    }
                }
                BindOutcome::Discarded { actor } => {
                    log::debug!("{} went away while its visual loaded", actor);
                }
                BindOutcome::Failed { request, error } => {
                    log::warn!("visual for {} failed: {}", request.actor, error);
                    if let Some(placeholder) = self.factory.placeholder(&request) {
                        let visual_id = self.binder.bind(request.actor);
                        self.visuals.add(visual_id.clone(), placeholder);
                        if let Err(err) = self.sim.set_visual(request.actor, Some(visual_id)) {
                            log::warn!("placeholder attached to missing actor: {}", err);
                        }
                    }
                }
            }
        }

        self.request_visuals(&snapshot);
        self.release_visuals(&snapshot);

        for (actor, visual_id) in self.binder.bound() {
            if let Some(state) = snapshot.actor(actor) {
                self.visuals.apply(visual_id, &VisualTransform::from(state));
            }
        }

        if self.overlay_dirty {
            self.visuals.debug_overlay(&self.overlay, self.map.as_deref());
            self.overlay_dirty = false;
        }
    }

    fn request_visuals(&mut self, snapshot: &Snapshot) {
        for actor in &snapshot.actors {
            if !actor.active || actor.visual.is_some() || !self.binder.can_request(actor.id) {
                continue;
            }
            let request = VisualRequest::from(actor);
            let future = self.factory.load(&request);
            self.binder.request(request, future);
        }
    }

    fn release_visuals(&mut self, snapshot: &Snapshot) {
        let is_dead = |id: ActorId| !snapshot.actor(id).is_some_and(|a| a.active);
        let cancelled = self.binder.cancel_where(&is_dead);
        if cancelled > 0 {
            log::debug!("cancelled {} visual loads", cancelled);
        }

        // Every state of a dead actor goes, not just bound visuals.
        let dead: Vec<ActorId> = self.binder.tracked().filter(|id| is_dead(*id)).collect();
        for actor in dead {
            let Some(visual_id) = self.binder.release(actor) else {
                continue;
            };
            self.visuals.remove(&visual_id);
            if snapshot.actor(actor).is_some() {
                if let Err(err) = self.sim.set_visual(actor, None) {
                    log::warn!("visual released from missing actor: {}", err);
                }
            }
        }
    }

    fn clear_visuals(&mut self) {
        for visual_id in self.binder.clear() {
            self.visuals.remove(&visual_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::VisualId;
    use crate::config::{ActionConfig, ActorSpawn, BulletConfig, ConfigStore, Point3, SegmentConfig, TriggerConfig, TriggerEvent};
    use crate::error::VisualError;
    use crate::visual::testing::{deferred, Slot};
    use crate::visual::VisualFuture;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Loads resolve only when the test fills their slot.
    #[derive(Default)]
    struct HandFactory {
        slots: Rc<RefCell<HashMap<ActorId, Slot<String>>>>,
        loads: Rc<RefCell<u32>>,
        placeholder: bool,
    }

    impl VisualFactory for HandFactory {
        type Visual = String;

        fn load(&mut self, request: &VisualRequest) -> VisualFuture<String> {
            *self.loads.borrow_mut() += 1;
            let (slot, future) = deferred();
            self.slots.borrow_mut().insert(request.actor, slot);
            future
        }

        fn placeholder(&mut self, _request: &VisualRequest) -> Option<String> {
            self.placeholder.then(|| "placeholder".to_string())
        }
    }

    #[derive(Default)]
    struct Stage {
        visuals: HashMap<VisualId, String>,
        transforms: HashMap<VisualId, Vec<VisualTransform>>,
        overlays: Vec<DebugOverlay>,
    }

    impl VisualManager for Stage {
        type Visual = String;

        fn add(&mut self, id: VisualId, visual: String) {
            self.visuals.insert(id, visual);
        }
        fn remove(&mut self, id: &VisualId) -> bool {
            self.visuals.remove(id).is_some()
        }
        fn contains(&self, id: &VisualId) -> bool {
            self.visuals.contains_key(id)
        }
        fn apply(&mut self, id: &VisualId, transform: &VisualTransform) {
            self.transforms.entry(id.clone()).or_default().push(*transform);
        }
        fn debug_overlay(&mut self, overlay: &DebugOverlay, _map: Option<&MapConfig>) {
            self.overlays.push(*overlay);
        }
    }

    fn store() -> ConfigStore {
        let mut store = ConfigStore::new();
        store.insert_map(MapConfig {
            id: 3,
            name: "plains".into(),
            width: 100.0,
            height: 60.0,
            blocked_cells: vec![4, 5],
            build_cells: vec![9],
        });
        store.insert_level(LevelConfig {
            id: 1,
            name: "first".into(),
            map_id: 3,
            actors: vec![
                ActorSpawn {
                    id: ActorId(1),
                    kind: ActorKind::Unit,
                    model_id: "archer".into(),
                    config_id: 10,
                    faction: Faction(1),
                    position: Point3 { x: 0.0, y: 0.0, z: 0.0 },
                    rotation: 0.0,
                    scale: 1.0,
                },
                ActorSpawn {
                    id: ActorId(2),
                    kind: ActorKind::Building,
                    model_id: "tower".into(),
                    config_id: 20,
                    faction: Faction(2),
                    position: Point3 { x: 30.0, y: 0.0, z: 0.0 },
                    rotation: 0.0,
                    scale: 2.0,
                },
            ],
        });
        store.insert_bullet(BulletConfig {
            id: 500,
            name: "arrow".into(),
            description: None,
            model_id: "fx_arrow".into(),
            segments: vec![SegmentConfig {
                id: 1,
                name: None,
                triggers: vec![TriggerConfig {
                    event_type: TriggerEvent::BulletStart,
                    params: None,
                    conditions: None,
                    actions: Some(vec![ActionConfig::new(
                        "bulletFlyToTarget",
                        json!({ "targetActorNo": 2, "speed": 20, "collisionRadius": 0.5 }),
                    )]),
                }],
                conditions: None,
                actions: None,
            }],
        });
        store
    }

    type TestRunner = GameRunner<ConfigStore, HandFactory, Stage>;

    fn runner(factory: HandFactory) -> TestRunner {
        GameRunner::new(SimWorld::new(), store(), factory, Stage::default())
    }

    fn resolve(slots: &Rc<RefCell<HashMap<ActorId, Slot<String>>>>, id: u64, result: Result<String, VisualError>) {
        let slots = slots.borrow();
        *slots[&ActorId(id)].borrow_mut() = Some(result);
    }

    #[test]
    fn test_load_level_errors() {
        let mut runner = runner(HandFactory::default());
        assert!(matches!(runner.load_level(9, None), Err(SimError::LevelNotFound(9))));
        assert!(matches!(runner.load_level(1, Some(8)), Err(SimError::MapNotFound(8))));
        assert_eq!(runner.state(), RunState::Idle);
    }

    #[test]
    fn test_frame_clamps_delta() {
        let mut runner = runner(HandFactory::default());
        runner.load_level(1, None).unwrap();
        assert_eq!(runner.frame(10.0), 0);
        // Five seconds of wall time run at most 0.1s of simulation.
        let ticks = runner.frame(15.0);
        assert!(ticks <= 3, "ran {} ticks", ticks);
        assert!(runner.sim().current_time() <= 0.1 + 1e-4);
    }

    #[test]
    fn test_visuals_bind_lazily_once() {
        let factory = HandFactory::default();
        let slots = Rc::clone(&factory.slots);
        let loads = Rc::clone(&factory.loads);
        let mut runner = runner(factory);
        runner.load_level(1, None).unwrap();

        runner.frame(0.0);
        runner.frame(0.016);
        assert_eq!(*loads.borrow(), 2);

        resolve(&slots, 1, Ok("archer-sprite".into()));
        runner.frame(0.032);
        let sprite = VisualId::for_actor(ActorId(1));
        assert_eq!(runner.visuals().visuals.get(&sprite).map(String::as_str), Some("archer-sprite"));
        assert_eq!(runner.sim_mut().actor(ActorId(1)).unwrap().visual(), Some(&sprite));
        assert_eq!(runner.visuals().transforms[&sprite].len(), 1);

        runner.frame(0.048);
        assert_eq!(runner.visuals().transforms[&sprite].len(), 2);
        assert_eq!(*loads.borrow(), 2);
    }

    #[test]
    fn test_visual_for_removed_actor_is_discarded() {
        let factory = HandFactory::default();
        let slots = Rc::clone(&factory.slots);
        let mut runner = runner(factory);
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);

        runner.sim_mut().remove_actor(ActorId(2)).unwrap();
        resolve(&slots, 2, Ok("tower-sprite".into()));
        runner.frame(0.016);

        assert!(!runner.visuals().contains(&VisualId::for_actor(ActorId(2))));
        assert!(runner.binder().state(ActorId(2)).is_none());
    }

    #[test]
    fn test_dead_bullets_leave_no_load_state() {
        let factory = HandFactory::default();
        let loads = Rc::clone(&factory.loads);
        let mut runner = runner(factory);
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);

        let mut now = 0.0;
        for n in 0..200 {
            let id = ActorId(1000 + n);
            runner.fire_bullet(id, 500, Faction(1), Vec3::ZERO).unwrap();
            now += 0.016;
            runner.frame(now);
            runner.sim_mut().remove_actor(id).unwrap();
            now += 0.016;
            runner.frame(now);
        }

        // Loads never resolved; only the two level actors are still tracked.
        assert_eq!(*loads.borrow(), 202);
        assert_eq!(runner.binder().pending_count(), 2);
        assert_eq!(runner.binder().tracked().count(), 2);
    }

    #[test]
    fn test_failed_load_forgotten_when_actor_removed() {
        let factory = HandFactory::default();
        let slots = Rc::clone(&factory.slots);
        let mut runner = runner(factory);
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);

        resolve(&slots, 2, Err(VisualError::Load("timeout".into())));
        runner.frame(0.016);
        assert_eq!(runner.binder().state(ActorId(2)), Some(&crate::visual::LoadState::Failed));

        runner.sim_mut().remove_actor(ActorId(2)).unwrap();
        runner.frame(0.032);
        assert!(runner.binder().state(ActorId(2)).is_none());
    }

    #[test]
    fn test_failed_load_uses_placeholder() {
        let factory = HandFactory { placeholder: true, ..Default::default() };
        let slots = Rc::clone(&factory.slots);
        let mut runner = runner(factory);
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);

        resolve(&slots, 1, Err(VisualError::MissingModel("archer".into())));
        runner.frame(0.016);
        let sprite = VisualId::for_actor(ActorId(1));
        assert_eq!(runner.visuals().visuals.get(&sprite).map(String::as_str), Some("placeholder"));
    }

    #[test]
    fn test_bullet_visual_released_after_hit() {
        let factory = HandFactory::default();
        let slots = Rc::clone(&factory.slots);
        let mut runner = runner(factory);
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);

        runner.fire_bullet(ActorId(100), 500, Faction(1), Vec3::ZERO).unwrap();
        runner.frame(0.016);
        resolve(&slots, 100, Ok("arrow-sprite".into()));
        runner.frame(0.032);
        let arrow = VisualId::for_actor(ActorId(100));
        assert!(runner.visuals().contains(&arrow));

        let mut now = 0.032;
        for _ in 0..100 {
            now += 0.05;
            runner.frame(now);
        }
        assert!(!runner.visuals().contains(&arrow));
        assert!(runner.binder().state(ActorId(100)).is_none());
    }

    #[test]
    fn test_kept_bullet_is_unlinked_from_its_visual() {
        let factory = HandFactory::default();
        let slots = Rc::clone(&factory.slots);
        let sim = SimWorld::with_config(crate::systems::SimConfig { despawn_ended_bullets: false, ..Default::default() });
        let mut runner = GameRunner::new(sim, store(), factory, Stage::default());
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);

        runner.fire_bullet(ActorId(100), 500, Faction(1), Vec3::ZERO).unwrap();
        runner.frame(0.016);
        resolve(&slots, 100, Ok("arrow-sprite".into()));
        runner.frame(0.032);

        let mut now = 0.032;
        for _ in 0..100 {
            now += 0.05;
            runner.frame(now);
        }
        let arrow = runner.sim_mut().actor(ActorId(100)).unwrap();
        assert!(!arrow.is_active());
        assert_eq!(arrow.visual(), None);
        assert!(!runner.visuals().contains(&VisualId::for_actor(ActorId(100))));
    }

    #[test]
    fn test_pause_resume_skips_paused_time() {
        let mut runner = runner(HandFactory::default());
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);
        runner.frame(0.05);
        let tick = runner.sim().current_tick();

        runner.pause();
        assert_eq!(runner.frame(0.09), 0);
        runner.resume();
        runner.frame(30.0);
        assert_eq!(runner.sim().current_tick(), tick);
    }

    #[test]
    fn test_stop_clears_visuals() {
        let factory = HandFactory::default();
        let slots = Rc::clone(&factory.slots);
        let mut runner = runner(factory);
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);
        resolve(&slots, 1, Ok("archer-sprite".into()));
        runner.frame(0.016);
        assert_eq!(runner.visuals().visuals.len(), 1);

        runner.stop();
        assert!(runner.visuals().visuals.is_empty());
        assert_eq!(runner.state(), RunState::Stopped);
        assert_eq!(runner.frame(1.0), 0);
    }

    #[test]
    fn test_debug_toggles_redraw_overlay() {
        let mut runner = runner(HandFactory::default());
        runner.load_level(1, None).unwrap();
        runner.frame(0.0);
        runner.set_show_blocked_cells(true);
        runner.frame(0.016);
        runner.frame(0.032);

        let overlays = &runner.visuals().overlays;
        assert_eq!(overlays.len(), 2);
        assert!(overlays[1].show_blocked_cells);
        assert!(!overlays[1].show_build_cells);
    }
}
