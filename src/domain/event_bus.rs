//! Synchronous publish/subscribe fan-out for realtime events.
//!
//! [`EventBus`] delivers every [`RealtimeEvent`] to the listeners that are
//! registered at the moment of publishing. There is no buffering: a listener
//! registered after an event fired never observes it. The listener list is
//! snapshotted before iteration, so listeners may subscribe or unsubscribe
//! (themselves or others) while a dispatch is in flight.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::{EventKind, RealtimeEvent};

type Listener = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

struct Registration {
    id: u64,
    kind: Option<EventKind>,
    listener: Listener,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl BusInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }
}

/// Fan-out bus for [`RealtimeEvent`]s.
///
/// Cloning is cheap; all clones share the same listener list. Listeners run
/// synchronously on the publishing task and should return quickly.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for every event kind.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    /// Registers a listener for a single event kind.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(listener))
    }

    fn register(&self, kind: Option<EventKind>, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push(Registration { id, kind, listener });
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every matching listener registered right now.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still run. Returns the number of listeners invoked.
    pub fn publish(&self, event: &RealtimeEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .inner
            .listeners()
            .iter()
            .filter(|r| r.kind.is_none_or(|k| k == kind))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(event = %kind, "event listener panicked");
            }
        }
        snapshot.len()
    }

    /// Returns the current number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Disposer for a registered listener.
///
/// Dropping the subscription unregisters the listener.
#[derive(Debug)]
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Unregisters the listener. Safe to call from inside a listener.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn dispose(&self) -> bool {
        self.bus.upgrade().is_some_and(|bus| bus.remove(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::MemberId;
    use std::sync::atomic::AtomicUsize;

    fn join(id: u64) -> RealtimeEvent {
        RealtimeEvent::Join {
            member: MemberId::from(id),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&RealtimeEvent) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_factory = Arc::clone(&log);
        let factory = move |tag: &str| -> Box<dyn Fn(&RealtimeEvent) + Send + Sync> {
            let log = Arc::clone(&log_for_factory);
            let tag = tag.to_string();
            Box::new(move |event: &RealtimeEvent| {
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(format!("{tag}:{}", event.kind()));
            })
        };
        (log, factory)
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[test]
    fn publish_without_listeners_returns_zero() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&join(1)), 0);
    }

    #[test]
    fn every_listener_receives_event() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let _a = bus.subscribe(make("a"));
        let _b = bus.subscribe(make("b"));

        assert_eq!(bus.publish(&join(1)), 2);
        assert_eq!(entries(&log), vec!["a:join", "b:join"]);
    }

    #[test]
    fn kind_filter_skips_other_events() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let _users = bus.on(EventKind::Users, make("users"));

        bus.publish(&join(1));
        bus.publish(&RealtimeEvent::Users { members: vec![] });
        assert_eq!(entries(&log), vec!["users:users"]);
    }

    #[test]
    fn late_listener_misses_past_events() {
        let bus = EventBus::new();
        bus.publish(&join(1));
        let (log, make) = recorder();
        let _late = bus.subscribe(make("late"));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let sub = bus.subscribe(make("a"));
        assert_eq!(bus.listener_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.listener_count(), 0);
        bus.publish(&join(1));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn unsubscribe_during_dispatch_does_not_skip_remaining() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in_listener = Arc::clone(&slot);
        let first = bus.subscribe(move |_| {
            // Removes itself on first delivery.
            let taken = slot_in_listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            drop(taken);
        });
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(first);
        let _second = bus.subscribe(make("second"));
        let _third = bus.subscribe(make("third"));

        assert_eq!(bus.publish(&join(1)), 3);
        assert_eq!(entries(&log), vec!["second:join", "third:join"]);
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let _before = bus.subscribe(make("before"));
        let _broken = bus.on(EventKind::Join, |_| panic!("listener bug"));
        let _after = bus.subscribe(make("after"));

        assert_eq!(bus.publish(&join(1)), 3);
        assert_eq!(entries(&log), vec!["before:join", "after:join"]);

        bus.publish(&join(2));
        assert_eq!(bus.listener_count(), 3);
        assert_eq!(entries(&log).len(), 4);
    }

    #[test]
    fn subscribe_during_dispatch_takes_effect_next_publish() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let held: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let bus_in_listener = bus.clone();
        let calls_in_listener = Arc::clone(&calls);
        let held_in_listener = Arc::clone(&held);
        let _adder = bus.on(EventKind::Join, move |_| {
            let calls = Arc::clone(&calls_in_listener);
            let sub = bus_in_listener.on(EventKind::Leave, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
            held_in_listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(sub);
        });

        assert_eq!(bus.publish(&join(1)), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        bus.publish(&RealtimeEvent::Leave {
            member: MemberId::from(1),
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        sub.unsubscribe();
    }
}
