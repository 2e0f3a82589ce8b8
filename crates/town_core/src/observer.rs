//! Publisher-owned listener lists with RAII unsubscription.
//!
//! A publisher owns an [`Observers`] list. Subscribing hands back a
//! [`Subscription`] guard; dropping the guard removes the listener, so a
//! subscriber that goes away can never be called again and there is no
//! separate "unsubscribe with the same delegate" step to get wrong.
//!
//! Listeners are called in registration order. A listener may subscribe
//! new listeners or drop subscriptions (including its own) while it is
//! being notified; new listeners are first called on the next notification.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

struct Slot<L: ?Sized> {
    alive: Rc<Cell<bool>>,
    callback: Box<L>,
}

/// Type-erased handle used by [`Subscription`] to compact its list.
trait Prune {
    fn prune(&self);
}

impl<L: ?Sized> Prune for RefCell<Vec<Slot<L>>> {
    fn prune(&self) {
        // The list is only borrowed for short splices, never across a
        // callback, so this only fails if called from inside a splice.
        if let Ok(mut slots) = self.try_borrow_mut() {
            slots.retain(|slot| slot.alive.get());
        }
    }
}

/// Ordered list of listeners of type `L` (usually `dyn FnMut(...)`).
pub struct Observers<L: ?Sized> {
    slots: Rc<RefCell<Vec<Slot<L>>>>,
}

impl<L: ?Sized> Default for Observers<L> {
    fn default() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<L: ?Sized + 'static> fmt::Debug for Observers<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<L: ?Sized + 'static> Observers<L> {
    /// Create an empty listener list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned guard
    /// is dropped (or the publisher is dropped).
    pub fn subscribe(&self, callback: Box<L>) -> Subscription {
        let alive = Rc::new(Cell::new(true));
        self.slots.borrow_mut().push(Slot {
            alive: Rc::clone(&alive),
            callback,
        });

        let list: Rc<dyn Prune> = self.slots.clone();
        Subscription {
            alive,
            list: Rc::downgrade(&list),
            detached: false,
        }
    }

    /// Call every live listener in registration order.
    pub fn notify(&self, mut call: impl FnMut(&mut L)) {
        let mut current = std::mem::take(&mut *self.slots.borrow_mut());

        for slot in &mut current {
            if slot.alive.get() {
                call(&mut *slot.callback);
            }
        }

        let mut slots = self.slots.borrow_mut();
        let added = std::mem::take(&mut *slots);
        current.extend(added);
        current.retain(|slot| slot.alive.get());
        *slots = current;
    }

    /// Number of live listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.alive.get())
            .count()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard for a registered listener. Dropping it unregisters the listener.
#[must_use = "dropping a Subscription immediately unregisters the listener"]
pub struct Subscription {
    alive: Rc<Cell<bool>>,
    list: Weak<dyn Prune>,
    detached: bool,
}

impl Subscription {
    /// Whether the listener is still registered with a live publisher.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.alive.get() && self.list.strong_count() > 0
    }

    /// Keep the listener registered for the publisher's whole lifetime.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        self.alive.set(false);
        if let Some(list) = self.list.upgrade() {
            list.prune();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Listener = dyn FnMut(&u32);

    fn recorder(log: &Rc<RefCell<Vec<(u8, u32)>>>, tag: u8) -> Box<Listener> {
        let log = Rc::clone(log);
        Box::new(move |value: &u32| log.borrow_mut().push((tag, *value)))
    }

    #[test]
    fn test_notify_in_registration_order() {
        let observers: Observers<Listener> = Observers::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _a = observers.subscribe(recorder(&log, 1));
        let _b = observers.subscribe(recorder(&log, 2));
        let _c = observers.subscribe(recorder(&log, 3));

        observers.notify(|cb| cb(&7));

        assert_eq!(*log.borrow(), vec![(1, 7), (2, 7), (3, 7)]);
    }

    #[test]
    fn test_debug_reports_live_listeners() {
        let observers: Observers<Listener> = Observers::new();
        let _a = observers.subscribe(Box::new(|_: &u32| {}));
        let b = observers.subscribe(Box::new(|_: &u32| {}));
        drop(b);
        assert_eq!(format!("{observers:?}"), "Observers { listeners: 1 }");
    }

    #[test]
    fn test_drop_unsubscribes() {
        let observers: Observers<Listener> = Observers::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = observers.subscribe(recorder(&log, 1));
        let _b = observers.subscribe(recorder(&log, 2));
        assert_eq!(observers.len(), 2);

        drop(a);
        assert_eq!(observers.len(), 1);

        observers.notify(|cb| cb(&1));
        assert_eq!(*log.borrow(), vec![(2, 1)]);
    }

    #[test]
    fn test_detach_keeps_listener() {
        let observers: Observers<Listener> = Observers::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        observers.subscribe(recorder(&log, 1)).detach();

        observers.notify(|cb| cb(&5));
        assert_eq!(*log.borrow(), vec![(1, 5)]);
    }

    #[test]
    fn test_unsubscribe_during_notify() {
        let observers: Observers<Listener> = Observers::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let held: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let held_in_cb = Rc::clone(&held);
        let first = observers.subscribe(Box::new(move |_: &u32| {
            held_in_cb.borrow_mut().take();
        }));
        let second = observers.subscribe(recorder(&log, 2));
        *held.borrow_mut() = Some(second);

        // The first listener drops the second before it runs.
        observers.notify(|cb| cb(&9));
        assert!(log.borrow().is_empty());
        assert_eq!(observers.len(), 1);
        drop(first);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_subscribe_during_notify_runs_next_time() {
        let observers: Rc<Observers<Listener>> = Rc::new(Observers::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let late: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let obs = Rc::clone(&observers);
        let late_in_cb = Rc::clone(&late);
        let log_in_cb = Rc::clone(&log);
        let _first = observers.subscribe(Box::new(move |_: &u32| {
            if late_in_cb.borrow().is_empty() {
                let sub = obs.subscribe(recorder(&log_in_cb, 9));
                late_in_cb.borrow_mut().push(sub);
            }
        }));

        observers.notify(|cb| cb(&1));
        assert!(log.borrow().is_empty());

        observers.notify(|cb| cb(&2));
        assert_eq!(*log.borrow(), vec![(9, 2)]);
    }

    #[test]
    fn test_subscription_outlives_publisher() {
        let observers: Observers<Listener> = Observers::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = observers.subscribe(recorder(&log, 1));
        assert!(sub.is_active());
        drop(observers);
        assert!(!sub.is_active());
        drop(sub);
    }
}
