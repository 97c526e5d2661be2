//! Bullet entity: an actor driven by its config's triggers and an attachable
//! flight phase.
//!
//! Lifecycle: `Pending → Active → Ended`. `start` fires `bulletStart`
//! triggers, a collision fires `bulletHit` then ends the bullet, and `end`
//! fires `bulletEnd` exactly once. All external coupling goes through the
//! [`BulletContext`] passed to `start`.

use crate::components::{Actor, ActorId, ActorKind, Faction};
use crate::config::{BulletConfig, DamageParams, DamageTriggerType, FlyToTargetParams, TriggerEvent};
use crate::error::{ListenerError, SimError};
use crate::events::{BulletEvent, BulletEventKind, Emitter, EndReason, ListenerId};
use crate::flight::{FlightConfig, FlightController, FlightEnd, FlightStep, FlightTarget};
use crate::trigger::{HandlerTable, TriggerHost, TriggerProgram};
use bevy_ecs::prelude::*;
use glam::Vec3;
use std::fmt;
use std::sync::Arc;

/// Trigger program specialised for bullets.
pub type BulletProgram = TriggerProgram<Bullet>;

/// Horizontal displacement below this does not change facing.
const FACING_EPSILON: f32 = 1e-4;

// ============================================================================
// CONTEXT
// ============================================================================

/// Payload of the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletEnded {
    pub id: ActorId,
    pub reason: Option<EndReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRequest {
    pub attacker: ActorId,
    pub target: ActorId,
    pub amount: u32,
}

/// Runtime services supplied by whoever fires the bullet. Every method is
/// optional.
pub trait BulletContext: Send + Sync {
    fn unit_position(&self, _id: ActorId) -> Option<Vec3> {
        None
    }

    fn on_bullet_end(&self, _ended: &BulletEnded) {}

    fn default_target_unit(&self) -> Option<ActorId> {
        None
    }

    fn default_target_position(&self) -> Option<Vec3> {
        None
    }

    /// `None` means the context has no damage channel.
    fn cause_damage(&self, _request: &DamageRequest) -> Option<bool> {
        None
    }
}

// ============================================================================
// BULLET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletPhase {
    Pending,
    Active,
    Ended,
}

#[derive(Component)]
pub struct Bullet {
    actor: Actor,
    config: Arc<BulletConfig>,
    program: Arc<BulletProgram>,
    phase: BulletPhase,
    elapsed: f32,
    flight: Option<FlightController>,
    ctx: Option<Arc<dyn BulletContext>>,
    end_reason: Option<EndReason>,
    events: Emitter,
}

impl fmt::Debug for Bullet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bullet")
            .field("actor", &self.actor)
            .field("config", &self.config.id)
            .field("phase", &self.phase)
            .field("elapsed", &self.elapsed)
            .field("flight", &self.flight)
            .field("end_reason", &self.end_reason)
            .finish_non_exhaustive()
    }
}

impl Bullet {
    /// Bullet with no custom handlers.
    pub fn new(id: ActorId, config: Arc<BulletConfig>, faction: Faction, position: Vec3) -> Self {
        let program = Arc::new(TriggerProgram::compile(&config, HandlerTable::new()));
        Self::with_program(id, config, program, faction, position)
    }

    /// Bullet sharing an already compiled program.
    pub fn with_program(
        id: ActorId,
        config: Arc<BulletConfig>,
        program: Arc<BulletProgram>,
        faction: Faction,
        position: Vec3,
    ) -> Self {
        let mut actor = Actor::new(id, ActorKind::Bullet, config.model_id.clone(), faction)
            .with_position(position)
            .with_config_id(config.id);
        actor.set_active(false);
        Self {
            actor,
            config,
            program,
            phase: BulletPhase::Pending,
            elapsed: 0.0,
            flight: None,
            ctx: None,
            end_reason: None,
            events: Emitter::new(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.actor.id()
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn actor_mut(&mut self) -> &mut Actor {
        &mut self.actor
    }

    pub fn config(&self) -> &Arc<BulletConfig> {
        &self.config
    }

    pub fn phase(&self) -> BulletPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == BulletPhase::Active
    }

    pub fn is_flying(&self) -> bool {
        self.flight.as_ref().is_some_and(FlightController::is_active)
    }

    pub fn flight(&self) -> Option<&FlightController> {
        self.flight.as_ref()
    }

    /// Current flight target, if a flight phase is attached.
    pub fn target_position(&self) -> Option<Vec3> {
        self.flight.as_ref().and_then(FlightController::target_position)
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    pub fn on<F>(&mut self, kind: BulletEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&BulletEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    pub fn off(&mut self, kind: BulletEventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    pub fn start(&mut self, ctx: Option<Arc<dyn BulletContext>>) -> Result<(), SimError> {
        if self.phase != BulletPhase::Pending {
            return Err(SimError::InvalidTransition { id: self.id(), from: self.phase });
        }
        self.ctx = ctx;
        self.elapsed = 0.0;
        self.phase = BulletPhase::Active;
        self.actor.set_active(true);

        self.run_triggers(&TriggerEvent::BulletStart);
        // A start trigger may already have ended the bullet.
        if self.phase != BulletPhase::Active {
            log::debug!("{} ended during start", self.id());
            return Ok(());
        }
        self.events.emit(&BulletEvent::Started { id: self.id() });
        log::debug!("{} started", self.id());
        Ok(())
    }

    pub fn update(&mut self, dt: f32) {
        if self.phase != BulletPhase::Active {
            return;
        }
        self.elapsed += dt;

        let Some(flight) = self.flight.as_mut().filter(|f| f.is_active()) else {
            return;
        };
        let step = flight.update(self.actor.position(), dt);
        let stop_on_hit = flight.stop_on_hit();

        match step {
            FlightStep::Moved(d) => {
                if d.x.abs() > FACING_EPSILON || d.z.abs() > FACING_EPSILON {
                    self.actor.set_rotation(d.z.atan2(-d.x).to_degrees());
                }
                self.actor.translate(d);
            }
            FlightStep::Ended(_) if !stop_on_hit => {}
            FlightStep::Ended(FlightEnd::Hit) => {
                log::trace!("{} hit its target", self.id());
                self.run_triggers(&TriggerEvent::BulletHit);
                self.end(Some(EndReason::Hit));
            }
            FlightStep::Ended(FlightEnd::TargetLost) => self.end(Some(EndReason::TargetLost)),
            FlightStep::Ended(FlightEnd::Inactive) => {}
        }
    }

    /// No-op unless the bullet is active.
    pub fn end(&mut self, reason: Option<EndReason>) {
        if self.phase != BulletPhase::Active {
            return;
        }
        self.phase = BulletPhase::Ended;
        self.actor.set_active(false);
        self.end_reason = reason.clone();

        self.run_triggers(&TriggerEvent::BulletEnd);
        self.events.emit(&BulletEvent::Ended { id: self.id(), reason: reason.clone() });
        if let Some(ctx) = &self.ctx {
            ctx.on_bullet_end(&BulletEnded { id: self.id(), reason });
        }
        log::debug!("{} ended ({:?})", self.id(), self.end_reason);
    }

    fn run_triggers(&mut self, event: &TriggerEvent) {
        let program = Arc::clone(&self.program);
        program.run(self, event);
    }

    /// Explicit target first; otherwise the context's default unit (tracked
    /// live) with its default position as fallback.
    fn flight_target(&self, params: &FlyToTargetParams) -> FlightTarget {
        let explicit = FlightTarget {
            unit: params.target_unit,
            position: params.target_position.map(Vec3::from),
        };
        if explicit.unit.is_some() || explicit.position.is_some() {
            return explicit;
        }
        match &self.ctx {
            Some(ctx) => FlightTarget {
                unit: ctx.default_target_unit(),
                position: ctx.default_target_position(),
            },
            None => FlightTarget::default(),
        }
    }
}

impl TriggerHost for Bullet {
    fn elapsed(&self) -> f32 {
        self.elapsed
    }

    fn position(&self) -> Vec3 {
        self.actor.position()
    }

    fn unit_position(&self, id: ActorId) -> Option<Vec3> {
        self.ctx.as_ref().and_then(|ctx| ctx.unit_position(id))
    }

    fn fly_to_target(&mut self, params: &FlyToTargetParams) {
        let target = self.flight_target(params);
        let resolvable = target.unit.and_then(|id| self.unit_position(id)).is_some()
            || target.position.is_some();
        if !resolvable {
            log::warn!("{}: flyToTarget has no resolvable target", self.id());
            return;
        }

        let ctx = self.ctx.clone();
        let resolver = Box::new(move |id: ActorId| ctx.as_ref().and_then(|ctx| ctx.unit_position(id)));
        let config = FlightConfig::from_params(params, target);
        self.flight = Some(FlightController::new(config, self.actor.position(), resolver));
    }

    fn damage(&mut self, params: &DamageParams) {
        let Some(ctx) = self.ctx.clone() else {
            log::warn!("{}: damage without a runtime context", self.id());
            return;
        };
        if params.trigger_type == Some(DamageTriggerType::Range) {
            log::warn!("{}: range damage is not supported", self.id());
            return;
        }
        let Some(target) = ctx.default_target_unit() else {
            log::warn!("{}: damage has no target", self.id());
            return;
        };

        if params.damage_key.is_some() {
            log::warn!("{}: damageKey needs a skill table, ignored", self.id());
        }
        if params.damage_ratio_key.is_some() {
            log::warn!("{}: damageRatioKey needs a skill table, ignored", self.id());
        }
        let mut damage = params.damage_value.unwrap_or(0.0);
        if let Some(ratio) = params.damage_ratio.filter(|r| *r != 0.0) {
            damage *= ratio;
        }
        if damage <= 0.0 {
            log::warn!("{}: damage is not positive ({})", self.id(), damage);
            return;
        }

        let request = DamageRequest { attacker: self.id(), target, amount: damage.floor() as u32 };
        match ctx.cause_damage(&request) {
            Some(applied) => log::debug!("{} dealt {} to {} (applied: {})", self.id(), request.amount, target, applied),
            None => log::warn!("{}: context has no damage channel", self.id()),
        }
    }

    fn trigger_fired(&mut self, segment_id: u32, event: &TriggerEvent) {
        self.events.emit(&BulletEvent::TriggerFired {
            id: self.id(),
            segment_id,
            event: event.clone(),
        });
    }
}
