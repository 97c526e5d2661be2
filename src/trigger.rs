//! Event → condition → action interpreter.
//!
//! A config's segments are compiled once into a [`TriggerProgram`], which is
//! then run against any [`TriggerHost`]. Bullets are the first host; other
//! entity kinds can reuse the same program shape with their own handler table.

use crate::components::ActorId;
use crate::config::{
    ActionConfig, BulletConfig, ConditionConfig, CustomParams, DamageParams, DistanceLessParams,
    FlyToTargetParams, LifetimeParams, SegmentConfig, TriggerEvent,
};
use glam::Vec3;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// DECODED CONDITIONS / ACTIONS
// ============================================================================

#[derive(Debug, Clone)]
pub enum Condition {
    LifetimeGreater(LifetimeParams),
    DistanceLess(DistanceLessParams),
    Custom(CustomParams),
    Unrecognized { kind: String },
    Malformed { kind: String, reason: String },
}

#[derive(Debug, Clone)]
pub enum Action {
    FlyToTarget(FlyToTargetParams),
    Damage(DamageParams),
    Custom(CustomParams),
    Unrecognized { kind: String },
    Malformed { kind: String, reason: String },
}

fn decode_params<T: DeserializeOwned>(params: &Value) -> Result<T, String> {
    // Missing params decode like an empty object so all-default structs work.
    let params = if params.is_null() { Value::Object(Default::default()) } else { params.clone() };
    serde_json::from_value(params).map_err(|e| e.to_string())
}

impl Condition {
    pub fn decode(raw: &ConditionConfig) -> Self {
        let decoded = match raw.kind.as_str() {
            "lifetimeGreater" | "bulletLifetimeGreater" => {
                decode_params(&raw.params).map(Condition::LifetimeGreater)
            }
            "distanceLess" | "bulletDistanceLess" => {
                decode_params(&raw.params).map(Condition::DistanceLess)
            }
            "custom" | "customCondition" => decode_params(&raw.params).map(Condition::Custom),
            _ => return Condition::Unrecognized { kind: raw.kind.clone() },
        };
        decoded.unwrap_or_else(|reason| Condition::Malformed { kind: raw.kind.clone(), reason })
    }
}

impl Action {
    pub fn decode(raw: &ActionConfig) -> Self {
        let decoded = match raw.kind.as_str() {
            "flyToTarget" | "bulletFlyToTarget" => decode_params(&raw.params).map(Action::FlyToTarget),
            "damage" | "bulletDamage" => decode_params(&raw.params).map(Action::Damage),
            "custom" | "customAction" => decode_params(&raw.params).map(Action::Custom),
            _ => return Action::Unrecognized { kind: raw.kind.clone() },
        };
        decoded.unwrap_or_else(|reason| Action::Malformed { kind: raw.kind.clone(), reason })
    }
}

// ============================================================================
// HOST + HANDLER TABLE
// ============================================================================

/// Entity the interpreter reads state from and applies actions to.
pub trait TriggerHost {
    /// Seconds since the host started.
    fn elapsed(&self) -> f32;
    fn position(&self) -> Vec3;
    fn unit_position(&self, id: ActorId) -> Option<Vec3>;
    fn fly_to_target(&mut self, params: &FlyToTargetParams);
    fn damage(&mut self, params: &DamageParams);
    /// Called after a trigger's actions have run.
    fn trigger_fired(&mut self, _segment_id: u32, _event: &TriggerEvent) {}
}

pub type ConditionHandler<H> = Arc<dyn Fn(&H, &Value) -> bool + Send + Sync>;
pub type ActionHandler<H> = Arc<dyn Fn(&mut H, &Value) + Send + Sync>;

/// Named handlers for `custom` conditions and actions.
pub struct HandlerTable<H> {
    conditions: HashMap<String, ConditionHandler<H>>,
    actions: HashMap<String, ActionHandler<H>>,
}

impl<H> Default for HandlerTable<H> {
    fn default() -> Self {
        Self { conditions: HashMap::new(), actions: HashMap::new() }
    }
}

impl<H> Clone for HandlerTable<H> {
    fn clone(&self) -> Self {
        Self { conditions: self.conditions.clone(), actions: self.actions.clone() }
    }
}

impl<H> fmt::Debug for HandlerTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<H> HandlerTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_condition<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&H, &Value) -> bool + Send + Sync + 'static,
    {
        self.conditions.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn register_action<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut H, &Value) + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn condition(&self, name: &str) -> Option<&ConditionHandler<H>> {
        self.conditions.get(name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionHandler<H>> {
        self.actions.get(name)
    }
}

// ============================================================================
// PROGRAM
// ============================================================================

#[derive(Debug, Clone)]
struct CompiledTrigger {
    event: TriggerEvent,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
}

#[derive(Debug, Clone)]
struct CompiledSegment {
    id: u32,
    triggers: Vec<CompiledTrigger>,
}

/// Decoded, immutable form of a config's segments.
pub struct TriggerProgram<H> {
    segments: Vec<CompiledSegment>,
    handlers: HandlerTable<H>,
}

impl<H> fmt::Debug for TriggerProgram<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerProgram")
            .field("segments", &self.segments)
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl<H: TriggerHost> TriggerProgram<H> {
    pub fn compile(config: &BulletConfig, handlers: HandlerTable<H>) -> Self {
        Self::from_segments(&config.segments, handlers)
    }

    pub fn from_segments(segments: &[SegmentConfig], handlers: HandlerTable<H>) -> Self {
        let segments = segments
            .iter()
            .map(|segment| CompiledSegment {
                id: segment.id,
                triggers: segment
                    .triggers
                    .iter()
                    .map(|trigger| {
                        let conditions = trigger
                            .conditions
                            .as_ref()
                            .or(segment.conditions.as_ref())
                            .map(|list| list.iter().map(Condition::decode).collect())
                            .unwrap_or_default();
                        let actions = trigger
                            .actions
                            .as_ref()
                            .or(segment.actions.as_ref())
                            .map(|list| list.iter().map(Action::decode).collect())
                            .unwrap_or_default();
                        CompiledTrigger { event: trigger.event_type.clone(), conditions, actions }
                    })
                    .collect(),
            })
            .collect();
        Self { segments, handlers }
    }

    /// True if any trigger listens for `event`.
    pub fn handles(&self, event: &TriggerEvent) -> bool {
        self.segments
            .iter()
            .any(|s| s.triggers.iter().any(|t| &t.event == event))
    }

    /// Run every trigger listening for `event`. Returns how many fired.
    pub fn run(&self, host: &mut H, event: &TriggerEvent) -> usize {
        let mut fired = 0;
        for segment in &self.segments {
            for trigger in segment.triggers.iter().filter(|t| &t.event == event) {
                if !self.check_all(host, &trigger.conditions) {
                    continue;
                }
                for action in &trigger.actions {
                    self.execute(host, action);
                }
                host.trigger_fired(segment.id, event);
                fired += 1;
            }
        }
        fired
    }

    fn check_all(&self, host: &H, conditions: &[Condition]) -> bool {
        conditions.iter().all(|c| self.check(host, c))
    }

    fn check(&self, host: &H, condition: &Condition) -> bool {
        match condition {
            Condition::LifetimeGreater(p) => host.elapsed() >= p.lifetime_sec,
            Condition::DistanceLess(p) => {
                let target = p
                    .target_position
                    .map(Vec3::from)
                    .or_else(|| p.target_unit.and_then(|id| host.unit_position(id)));
                match target {
                    Some(target) => host.position().distance(target) <= p.max_distance,
                    None => false,
                }
            }
            Condition::Custom(p) => match self.handlers.condition(&p.name) {
                Some(handler) => handler(host, &p.params),
                None => {
                    log::warn!("unregistered custom condition {:?}", p.name);
                    false
                }
            },
            Condition::Unrecognized { kind } => {
                log::warn!("unsupported condition type {:?}", kind);
                false
            }
            Condition::Malformed { kind, reason } => {
                log::warn!("malformed {} condition: {}", kind, reason);
                false
            }
        }
    }

    fn execute(&self, host: &mut H, action: &Action) {
        match action {
            Action::FlyToTarget(p) => host.fly_to_target(p),
            Action::Damage(p) => host.damage(p),
            Action::Custom(p) => match self.handlers.action(&p.name) {
                Some(handler) => handler(host, &p.params),
                None => log::warn!("unregistered custom action {:?}", p.name),
            },
            Action::Unrecognized { kind } => log::warn!("unsupported action type {:?}", kind),
            Action::Malformed { kind, reason } => log::warn!("malformed {} action: {}", kind, reason),
        }
    }
}
