//! # Event Registry
//!
//! A publish/subscribe directory keyed by event type. The connection manager
//! publishes every parsed frame here; diagnostic panels subscribe to the types
//! they care about, and the update processor listens on the wildcard channel.
//!
//! A bounded ring of the most recent events serves late-joining consumers that
//! want to show "the last N events" without having been subscribed at the time.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::listeners::{Listeners, Subscription};
use crate::models::RawEvent;

/// Default capacity of the recent-events ring.
pub const DEFAULT_RING_SIZE: usize = 100;

type TypeMap = HashMap<String, Arc<Listeners<RawEvent>>>;

pub struct EventRegistry {
    // Per-type lists, removed again when their last handler unsubscribes
    by_type: Arc<Mutex<TypeMap>>,
    wildcard: Arc<Listeners<RawEvent>>,
    recent: Mutex<VecDeque<RawEvent>>,
    capacity: usize,
}

impl EventRegistry {
    /// Creates a registry whose recent-events ring holds `capacity` events
    /// (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            by_type: Arc::new(Mutex::new(HashMap::new())),
            wildcard: Listeners::new("event:*"),
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Registers `handler` for events whose type equals `event_type`.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&RawEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        // Added under the map lock so a concurrent prune cannot orphan the list
        let sub = self
            .by_type
            .lock()
            .entry(event_type.to_string())
            .or_insert_with(|| Listeners::new("event"))
            .add(handler);
        log::debug!("Subscribed handler #{} to '{}'", sub.id(), event_type);

        let map = Arc::downgrade(&self.by_type);
        let key = event_type.to_string();
        sub.on_removed(move || {
            if let Some(map) = map.upgrade() {
                let mut map = map.lock();
                if map.get(&key).is_some_and(|list| list.is_empty()) {
                    map.remove(&key);
                }
            }
        })
    }

    /// Registers `handler` for every event type. Wildcard handlers run after
    /// the handlers of the event's own type.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RawEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.wildcard.add(handler)
    }

    /// Records `event` in the ring and delivers it to every current handler of
    /// its type, then to the wildcard handlers. Returns how many handlers
    /// accepted it.
    pub fn publish(&self, event: &RawEvent) -> usize {
        {
            let mut recent = self.recent.lock();
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        let typed = self.by_type.lock().get(&event.event_type).cloned();
        let mut delivered = typed.map(|list| list.emit(event)).unwrap_or(0);
        delivered += self.wildcard.emit(event);
        delivered
    }

    /// The most recent `limit` events in arrival order. Consumers needing
    /// strict chronology should sort by `timestamp`.
    pub fn recent_events(&self, limit: usize) -> Vec<RawEvent> {
        let recent = self.recent.lock();
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }

    /// Number of handlers registered for `event_type` (wildcard excluded).
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.by_type
            .lock()
            .get(event_type)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Capacity of the recent-events ring.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every handler. Recorded events are kept.
    pub fn clear_handlers(&self) {
        self.by_type.lock().clear();
        self.wildcard.clear();
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RING_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: &str, n: u64) -> RawEvent {
        RawEvent::new(kind, json!({ "n": n }))
    }

    #[test]
    fn delivers_only_to_matching_type() {
        let registry = EventRegistry::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _ = registry.subscribe("guardian_update", move |e| {
            s.lock().push(e.data["n"].as_u64().unwrap_or_default());
            Ok(())
        });

        registry.publish(&event("guardian_update", 1));
        registry.publish(&event("system_health", 2));
        registry.publish(&event("guardian_update", 3));

        assert_eq!(*seen.lock(), vec![1, 3]);
    }

    #[test]
    fn each_event_reaches_each_handler_exactly_once() {
        let registry = EventRegistry::default();
        let hits = Arc::new(Mutex::new(0u32));
        for _ in 0..3 {
            let h = hits.clone();
            let _ = registry.subscribe("x", move |_| {
                *h.lock() += 1;
                Ok(())
            });
        }
        let w = hits.clone();
        let _ = registry.subscribe_all(move |_| {
            *w.lock() += 10;
            Ok(())
        });

        assert_eq!(registry.publish(&event("x", 0)), 4);
        assert_eq!(*hits.lock(), 13);
    }

    #[test]
    fn unsubscribe_is_precise_per_registration() {
        let registry = EventRegistry::default();
        let a = registry.subscribe("x", |_| Ok(()));
        let _b = registry.subscribe("x", |_| Ok(()));
        let _c = registry.subscribe("y", |_| Ok(()));

        assert!(a.unsubscribe());
        assert_eq!(registry.handler_count("x"), 1);
        assert_eq!(registry.handler_count("y"), 1);
    }

    #[test]
    fn last_unsubscribe_prunes_the_type() {
        let registry = EventRegistry::default();
        let a = registry.subscribe("x", |_| Ok(()));
        let b = registry.subscribe("x", |_| Ok(()));

        assert!(a.unsubscribe());
        assert!(registry.by_type.lock().contains_key("x"));
        assert!(b.unsubscribe());
        assert!(!registry.by_type.lock().contains_key("x"));

        // A fresh subscription recreates the list
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let _c = registry.subscribe("x", move |_| {
            *h.lock() += 1;
            Ok(())
        });
        registry.publish(&event("x", 1));
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn faulty_handler_does_not_block_delivery() {
        let registry = EventRegistry::default();
        let _ = registry.subscribe("x", |_| anyhow::bail!("broken panel"));
        let ok = Arc::new(Mutex::new(false));
        let o = ok.clone();
        let _ = registry.subscribe("x", move |_| {
            *o.lock() = true;
            Ok(())
        });

        assert_eq!(registry.publish(&event("x", 0)), 1);
        assert!(*ok.lock());
    }

    #[test]
    fn ring_buffer_keeps_latest_events() {
        let registry = EventRegistry::new(3);
        for n in 0..5 {
            registry.publish(&event(if n % 2 == 0 { "a" } else { "b" }, n));
        }

        let ns: Vec<u64> = registry
            .recent_events(10)
            .iter()
            .map(|e| e.data["n"].as_u64().unwrap_or_default())
            .collect();
        assert_eq!(ns, vec![2, 3, 4]);

        let last_two: Vec<u64> = registry
            .recent_events(2)
            .iter()
            .map(|e| e.data["n"].as_u64().unwrap_or_default())
            .collect();
        assert_eq!(last_two, vec![3, 4]);
        assert!(registry.recent_events(0).is_empty());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let registry = EventRegistry::new(0);
        registry.publish(&event("a", 1));
        registry.publish(&event("a", 2));
        assert_eq!(registry.capacity(), 1);
        assert_eq!(registry.recent_events(5).len(), 1);
    }
}
