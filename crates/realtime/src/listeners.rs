//! Listener registry and event fan-out.
//!
//! Listeners are keyed by a closed set of [`ListenerKey`] kinds so a
//! project id can never collide with an event-type name. Dispatch runs
//! three passes in a fixed order: listeners for the event's type, then
//! listeners for its project, then wildcard listeners.

use std::collections::HashMap;
use std::sync::Arc;

use torgman_core::types::ProjectId;

use crate::messages::{EventType, ServerEvent};

/// A registered event handler.
///
/// Handlers run synchronously on the manager task and must not block.
/// Identity (for removal) is the `Arc` allocation.
pub type Listener = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&ServerEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a listener is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerKey {
    /// Every dispatched event.
    All,
    /// Events of one type, from any project.
    Event(EventType),
    /// Events of any type for one project.
    Project(ProjectId),
}

/// Ordered listener lists per key.
///
/// Duplicate registration is allowed and invokes the handler once per
/// registration.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: HashMap<ListenerKey, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener under `key`.
    pub fn add(&mut self, key: ListenerKey, listener: Listener) {
        self.entries.entry(key).or_default().push(listener);
    }

    /// Remove the first registration of `listener` under `key`.
    ///
    /// Returns whether anything was removed.
    pub fn remove(&mut self, key: &ListenerKey, listener: &Listener) -> bool {
        let Some(list) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            self.entries.remove(key);
        }
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total number of registrations across all keys.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every matching listener; returns how many ran.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let passes = [
            ListenerKey::Event(event.kind),
            ListenerKey::Project(event.project_id.clone()),
            ListenerKey::All,
        ];

        let mut invoked = 0;
        for key in &passes {
            if let Some(list) = self.entries.get(key) {
                for listener in list {
                    listener(event);
                    invoked += 1;
                }
            }
        }
        invoked
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Listener {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        listener(move |_event| log.lock().unwrap().push(tag.clone()))
    }

    #[test]
    fn dispatch_runs_type_then_project_then_wildcard() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.add(ListenerKey::All, recorder(&log, "all"));
        registry.add(ListenerKey::Project("p1".into()), recorder(&log, "project"));
        registry.add(ListenerKey::Event(EventType::Status), recorder(&log, "type"));

        let invoked = registry.dispatch(&ServerEvent::new("p1", EventType::Status));

        assert_eq!(invoked, 3);
        assert_eq!(*log.lock().unwrap(), vec!["type", "project", "all"]);
    }

    #[test]
    fn registration_order_is_invocation_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.add(ListenerKey::All, recorder(&log, "first"));
        registry.add(ListenerKey::All, recorder(&log, "second"));

        registry.dispatch(&ServerEvent::new("p1", EventType::Heartbeat));

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn other_project_is_not_invoked() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.add(ListenerKey::Project("p2".into()), recorder(&log, "p2"));

        assert_eq!(registry.dispatch(&ServerEvent::new("p1", EventType::Status)), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn project_named_like_event_type_does_not_collide() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.add(ListenerKey::Project("status".into()), recorder(&log, "project"));

        registry.dispatch(&ServerEvent::new("p1", EventType::Status));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn duplicate_registration_invokes_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        let handler = recorder(&log, "dup");
        registry.add(ListenerKey::All, Arc::clone(&handler));
        registry.add(ListenerKey::All, handler);

        assert_eq!(registry.dispatch(&ServerEvent::new("p1", EventType::Error)), 2);
    }

    #[test]
    fn remove_takes_one_occurrence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        let handler = recorder(&log, "dup");
        registry.add(ListenerKey::All, Arc::clone(&handler));
        registry.add(ListenerKey::All, Arc::clone(&handler));

        assert!(registry.remove(&ListenerKey::All, &handler));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_matches_identity_not_behaviour() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.add(ListenerKey::All, recorder(&log, "same"));

        let lookalike = recorder(&log, "same");
        assert!(!registry.remove(&ListenerKey::All, &lookalike));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        let handler = recorder(&log, "x");

        assert!(!registry.remove(&ListenerKey::Event(EventType::Status), &handler));
        assert!(registry.is_empty());
    }
}
