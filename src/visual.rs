//! Lazy, race-safe binding of visuals to actors.
//!
//! Visual loads are `!Send` futures produced by a [`VisualFactory`] and
//! polled cooperatively once per render pass. Each actor's load is tracked as
//! an explicit [`LoadState`]; a load that resolves after its actor went away
//! is discarded instead of attached.

use crate::components::{ActorId, ActorKind, Faction, VisualId};
use crate::config::MapConfig;
use crate::error::VisualError;
use crate::world::ActorSnapshot;
use glam::Vec3;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

pub type VisualFuture<V> = Pin<Box<dyn Future<Output = Result<V, VisualError>>>>;

/// What the factory needs to build an actor's visual.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualRequest {
    pub actor: ActorId,
    pub kind: ActorKind,
    pub model_id: String,
    pub config_id: u32,
    pub faction: Faction,
}

impl From<&ActorSnapshot> for VisualRequest {
    fn from(actor: &ActorSnapshot) -> Self {
        Self {
            actor: actor.id,
            kind: actor.kind,
            model_id: actor.model_id.clone(),
            config_id: actor.config_id,
            faction: actor.faction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualTransform {
    pub position: Vec3,
    /// Degrees.
    pub rotation: f32,
    pub scale: f32,
    pub visible: bool,
}

impl From<&ActorSnapshot> for VisualTransform {
    fn from(actor: &ActorSnapshot) -> Self {
        Self {
            position: actor.position,
            rotation: actor.rotation,
            scale: actor.scale,
            visible: actor.visible,
        }
    }
}

/// Debug layers drawn over the current map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugOverlay {
    pub show_blocked_cells: bool,
    pub show_build_cells: bool,
}

/// Builds visuals: config lookup, resource load, construction.
pub trait VisualFactory {
    type Visual;

    fn load(&mut self, request: &VisualRequest) -> VisualFuture<Self::Visual>;

    /// Stand-in used when a load fails.
    fn placeholder(&mut self, _request: &VisualRequest) -> Option<Self::Visual> {
        None
    }
}

/// Owns the visuals in the render backend.
pub trait VisualManager {
    type Visual;

    fn add(&mut self, id: VisualId, visual: Self::Visual);
    fn remove(&mut self, id: &VisualId) -> bool;
    fn contains(&self, id: &VisualId) -> bool;
    fn apply(&mut self, id: &VisualId, transform: &VisualTransform);

    fn debug_overlay(&mut self, _overlay: &DebugOverlay, _map: Option<&MapConfig>) {}
}

// ============================================================================
// BINDER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Requested,
    Resolved(VisualId),
    Failed,
    Cancelled,
}

/// Result of a resolved load, reported by [`VisualBinder::poll`].
pub enum BindOutcome<V> {
    /// Actor still live: attach `visual` under `visual_id`.
    Attached { actor: ActorId, visual_id: VisualId, visual: V },
    /// Actor went away while loading; the visual was dropped.
    Discarded { actor: ActorId },
    Failed { request: VisualRequest, error: VisualError },
}

impl<V> std::fmt::Debug for BindOutcome<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindOutcome::Attached { actor, visual_id, .. } => {
                write!(f, "Attached({}, {:?})", actor, visual_id)
            }
            BindOutcome::Discarded { actor } => write!(f, "Discarded({})", actor),
            BindOutcome::Failed { request, error } => {
                write!(f, "Failed({}, {})", request.actor, error)
            }
        }
    }
}

struct PendingLoad<V> {
    request: VisualRequest,
    future: VisualFuture<V>,
}

pub struct VisualBinder<V> {
    states: BTreeMap<ActorId, LoadState>,
    pending: BTreeMap<ActorId, PendingLoad<V>>,
}

impl<V> Default for VisualBinder<V> {
    fn default() -> Self {
        Self { states: BTreeMap::new(), pending: BTreeMap::new() }
    }
}

impl<V> VisualBinder<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, actor: ActorId) -> Option<&LoadState> {
        self.states.get(&actor)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Actors with any load state, bound or not.
    pub fn tracked(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.states.keys().copied()
    }

    /// A new load may start only for actors with no state or a cancelled one.
    pub fn can_request(&self, actor: ActorId) -> bool {
        matches!(self.states.get(&actor), None | Some(LoadState::Cancelled))
    }

    /// Track a started load. Returns false (and drops `future`) if the actor
    /// already has a load in flight or a visual.
    pub fn request(&mut self, request: VisualRequest, future: VisualFuture<V>) -> bool {
        let actor = request.actor;
        if !self.can_request(actor) {
            return false;
        }
        self.states.insert(actor, LoadState::Requested);
        self.pending.insert(actor, PendingLoad { request, future });
        true
    }

    /// Poll every pending load once. Resolved loads are re-checked against
    /// `is_live` before being reported as attachable.
    pub fn poll(&mut self, is_live: impl Fn(ActorId) -> bool) -> Vec<BindOutcome<V>> {
        let mut cx = Context::from_waker(Waker::noop());
        let mut ready = Vec::new();
        for (actor, load) in self.pending.iter_mut() {
            if let Poll::Ready(result) = load.future.as_mut().poll(&mut cx) {
                ready.push((*actor, result));
            }
        }

        let mut outcomes = Vec::with_capacity(ready.len());
        for (actor, result) in ready {
            let Some(load) = self.pending.remove(&actor) else {
                continue;
            };
            let outcome = match result {
                Ok(_) if !is_live(actor) => {
                    self.states.insert(actor, LoadState::Cancelled);
                    BindOutcome::Discarded { actor }
                }
                Ok(visual) => {
                    let visual_id = VisualId::for_actor(actor);
                    self.states.insert(actor, LoadState::Resolved(visual_id.clone()));
                    BindOutcome::Attached { actor, visual_id, visual }
                }
                Err(error) => {
                    self.states.insert(actor, LoadState::Failed);
                    BindOutcome::Failed { request: load.request, error }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Record a visual attached outside the load path (e.g. a placeholder).
    pub fn bind(&mut self, actor: ActorId) -> VisualId {
        let visual_id = VisualId::for_actor(actor);
        self.pending.remove(&actor);
        self.states.insert(actor, LoadState::Resolved(visual_id.clone()));
        visual_id
    }

    /// Drop in-flight loads whose actor is no longer live.
    pub fn cancel_where(&mut self, is_dead: impl Fn(ActorId) -> bool) -> usize {
        let dead: Vec<ActorId> = self.pending.keys().copied().filter(|a| is_dead(*a)).collect();
        for actor in &dead {
            self.pending.remove(actor);
            self.states.insert(*actor, LoadState::Cancelled);
        }
        dead.len()
    }

    /// Forget an actor in any state; returns its visual if one was bound.
    pub fn release(&mut self, actor: ActorId) -> Option<VisualId> {
        self.pending.remove(&actor);
        match self.states.remove(&actor) {
            Some(LoadState::Resolved(visual_id)) => Some(visual_id),
            _ => None,
        }
    }

    pub fn bound(&self) -> impl Iterator<Item = (ActorId, &VisualId)> {
        self.states.iter().filter_map(|(actor, state)| match state {
            LoadState::Resolved(visual_id) => Some((*actor, visual_id)),
            _ => None,
        })
    }

    /// Forget everything; returns the visuals that were bound.
    pub fn clear(&mut self) -> Vec<VisualId> {
        self.pending.clear();
        let bound = self.bound().map(|(_, v)| v.clone()).collect();
        self.states.clear();
        bound
    }
}
