//! Lifecycle events published by bullets, and a small per-entity emitter.

use crate::components::ActorId;
use crate::config::TriggerEvent;
use crate::error::ListenerError;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Why a bullet ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Hit,
    TargetLost,
    Other(String),
}

impl EndReason {
    pub fn as_str(&self) -> &str {
        match self {
            EndReason::Hit => "hit",
            EndReason::TargetLost => "targetLost",
            EndReason::Other(reason) => reason,
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulletEvent {
    Started { id: ActorId },
    Ended { id: ActorId, reason: Option<EndReason> },
    TriggerFired { id: ActorId, segment_id: u32, event: TriggerEvent },
}

impl BulletEvent {
    pub fn kind(&self) -> BulletEventKind {
        match self {
            BulletEvent::Started { .. } => BulletEventKind::Started,
            BulletEvent::Ended { .. } => BulletEventKind::Ended,
            BulletEvent::TriggerFired { .. } => BulletEventKind::TriggerFired,
        }
    }

    pub fn bullet(&self) -> ActorId {
        match self {
            BulletEvent::Started { id }
            | BulletEvent::Ended { id, .. }
            | BulletEvent::TriggerFired { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulletEventKind {
    Started,
    Ended,
    TriggerFired,
}

/// Handle returned by [`Emitter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Box<dyn FnMut(&BulletEvent) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Default)]
pub struct Emitter {
    next_id: u64,
    listeners: HashMap<BulletEventKind, Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Emitter").field("listeners", &counts).finish()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: BulletEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&BulletEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(kind).or_default().push((id, Box::new(listener)));
        id
    }

    /// Returns false if the listener was not subscribed to `kind`.
    pub fn off(&mut self, kind: BulletEventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        list.len() != before
    }

    pub fn listener_count(&self, kind: BulletEventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver to every listener of the event's kind. A listener that fails
    /// or panics is logged and does not stop delivery to the rest.
    pub fn emit(&mut self, event: &BulletEvent) {
        let Some(list) = self.listeners.get_mut(&event.kind()) else {
            return;
        };
        for (id, listener) in list.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::error!("listener {:?} failed on {:?}: {}", id, event.kind(), err),
                Err(payload) => log::error!(
                    "listener {:?} panicked on {:?}: {}",
                    id,
                    event.kind(),
                    panic_message(payload.as_ref())
                ),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut emitter = Emitter::new();
        emitter.on(BulletEventKind::Started, |_| Err(ListenerError::new("boom")));
        let sink = Arc::clone(&seen);
        emitter.on(BulletEventKind::Started, move |event| {
            sink.lock().unwrap().push(event.bullet());
            Ok(())
        });

        emitter.emit(&BulletEvent::Started { id: ActorId(5) });
        assert_eq!(*seen.lock().unwrap(), vec![ActorId(5)]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut emitter = Emitter::new();
        emitter.on(BulletEventKind::Ended, |_| panic!("listener blew up"));
        let sink = Arc::clone(&seen);
        emitter.on(BulletEventKind::Ended, move |event| {
            sink.lock().unwrap().push(event.bullet());
            Ok(())
        });

        let ended = BulletEvent::Ended { id: ActorId(8), reason: Some(EndReason::Hit) };
        emitter.emit(&ended);
        emitter.emit(&ended);
        assert_eq!(*seen.lock().unwrap(), vec![ActorId(8), ActorId(8)]);
        assert_eq!(emitter.listener_count(BulletEventKind::Ended), 2);
    }

    #[test]
    fn test_off_unsubscribes() {
        let count = Arc::new(Mutex::new(0));
        let mut emitter = Emitter::new();
        let sink = Arc::clone(&count);
        let id = emitter.on(BulletEventKind::Ended, move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });
        let ended = BulletEvent::Ended { id: ActorId(1), reason: Some(EndReason::Hit) };

        emitter.emit(&ended);
        assert!(emitter.off(BulletEventKind::Ended, id));
        assert!(!emitter.off(BulletEventKind::Ended, id));
        emitter.emit(&ended);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(emitter.listener_count(BulletEventKind::Ended), 0);
    }

    #[test]
    fn test_listeners_only_see_their_kind() {
        let count = Arc::new(Mutex::new(0));
        let mut emitter = Emitter::new();
        let sink = Arc::clone(&count);
        emitter.on(BulletEventKind::TriggerFired, move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });
        emitter.emit(&BulletEvent::Started { id: ActorId(1) });
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn test_end_reason_names() {
        assert_eq!(EndReason::Hit.to_string(), "hit");
        assert_eq!(EndReason::TargetLost.as_str(), "targetLost");
        assert_eq!(EndReason::Other("expired".into()).as_str(), "expired");
    }
}
