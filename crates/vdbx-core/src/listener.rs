//! Command lifecycle listeners
//!
//! Listeners are registered by identity: the same `Arc` registered twice is
//! one registration, while two distinct instances stay distinct even when
//! they compare equal.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::context::ExecutionContext;

/// Lifecycle point reached by the command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommandEvent {
    Started,
    /// The context was handed to another execution of the same command
    Reused { count: u64 },
    Closed,
}

impl fmt::Display for CommandEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandEvent::Started => write!(f, "started"),
            CommandEvent::Reused { count } => write!(f, "reused#{}", count),
            CommandEvent::Closed => write!(f, "closed"),
        }
    }
}

/// Observer of command lifecycle events
pub trait CommandListener: Send + Sync {
    fn on_event(&self, event: &CommandEvent, ctx: &ExecutionContext);
}

impl<F> CommandListener for F
where
    F: Fn(&CommandEvent, &ExecutionContext) + Send + Sync,
{
    fn on_event(&self, event: &CommandEvent, ctx: &ExecutionContext) {
        self(event, ctx)
    }
}

/// Insertion-ordered set of listeners keyed by `Arc` identity
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn CommandListener>>>,
}

fn same_listener(a: &Arc<dyn CommandListener>, b: &Arc<dyn CommandListener>) -> bool {
    // Compare data pointers only; vtable pointers are not unique.
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the listener was already registered
    pub fn add(&self, listener: Arc<dyn CommandListener>) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Returns `false` when the listener was not registered
    pub fn remove(&self, listener: &Arc<dyn CommandListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn contains(&self, listener: &Arc<dyn CommandListener>) -> bool {
        self.listeners.lock().iter().any(|l| same_listener(l, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Listeners registered right now, in registration order.
    ///
    /// Dispatch iterates this copy so listeners can change the registry
    /// while being notified.
    pub fn snapshot(&self) -> Vec<Arc<dyn CommandListener>> {
        self.listeners.lock().clone()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn CommandListener> {
        Arc::new(|_: &CommandEvent, _: &ExecutionContext| {})
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = ListenerRegistry::new();
        let listener = noop();

        assert!(registry.add(listener.clone()));
        assert!(!registry.add(listener.clone()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_instances_stay_distinct() {
        let registry = ListenerRegistry::new();
        registry.add(noop());
        registry.add(noop());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = ListenerRegistry::new();
        let member = noop();
        registry.add(member.clone());

        assert!(!registry.remove(&noop()));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&member));

        assert!(registry.remove(&member));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_keeps_order() {
        let registry = ListenerRegistry::new();
        let first = noop();
        let second = noop();
        registry.add(first.clone());
        registry.add(second.clone());

        let snapshot = registry.snapshot();
        assert!(same_listener(&snapshot[0], &first));
        assert!(same_listener(&snapshot[1], &second));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(CommandEvent::Reused { count: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "reused", "count": 2 }));
        assert_eq!(CommandEvent::Closed.to_string(), "closed");
    }
}
