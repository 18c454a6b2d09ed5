//! The observable-attribute capability and its subscription plumbing.
//!
//! Sources never own their observers: [`ObservableAttributeSource::observe`]
//! hands back a [`Subscription`] guard that holds the only strong reference
//! to the callback, and the source keeps a `Weak`. Dropping the guard
//! unsubscribes; dead entries are pruned lazily on the next notification.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::ObjectRef;
use crate::vm::Value;

/// What an object declares about one of its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrDescriptor {
    /// Declared and reports changes.
    Observable,
    /// Declared (or reserved) but explicitly excluded from observation.
    NotObservable,
    /// Not declared at all.
    Absent,
}

/// One attribute change, as reported to observers.
#[derive(Clone)]
pub struct AttributeChange {
    pub object: ObjectRef,
    pub name: Rc<str>,
    pub old: Value,
    pub new: Value,
}

impl fmt::Debug for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeChange")
            .field("object", &self.object.type_name())
            .field("name", &self.name)
            .field("old", &self.old)
            .field("new", &self.new)
            .finish()
    }
}

/// Callback invoked with each change of an observed attribute.
pub type ChangeCallback = Rc<dyn Fn(&AttributeChange)>;

/// Capability of objects whose attributes can be observed.
pub trait ObservableAttributeSource {
    /// Describe the named attribute.
    fn describe_attribute(&self, name: &str) -> AttrDescriptor;

    /// Invoke `callback` on every change of `name` until the returned
    /// guard is dropped.
    fn observe(&self, name: &str, callback: ChangeCallback) -> Subscription;
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for an attribute observer. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _callback: ChangeCallback,
}

impl Subscription {
    pub fn new(callback: ChangeCallback) -> Self {
        Self {
            _callback: callback,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ObserverList
// ---------------------------------------------------------------------------

/// Per-attribute weak observer storage, for implementors of
/// [`ObservableAttributeSource`].
#[derive(Default)]
pub struct ObserverList {
    entries: RefCell<Vec<(Rc<str>, Weak<dyn Fn(&AttributeChange)>)>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `name` and return its guard.
    pub fn subscribe(&self, name: &str, callback: ChangeCallback) -> Subscription {
        self.entries
            .borrow_mut()
            .push((Rc::from(name), Rc::downgrade(&callback)));
        Subscription::new(callback)
    }

    /// Live callbacks for `name`, in registration order. Prunes dead
    /// entries for every name as a side effect.
    pub fn live(&self, name: &str) -> Vec<ChangeCallback> {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        entries
            .iter()
            .filter(|(n, _)| &**n == name)
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    /// Deliver `change` to every live observer of its attribute.
    ///
    /// Callbacks are collected before any runs, so an observer may
    /// subscribe or unsubscribe re-entrantly.
    pub fn dispatch(&self, change: &AttributeChange) {
        for callback in self.live(&change.name) {
            callback(change);
        }
    }

    /// Number of live observers across all attributes.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Record;
    use std::cell::Cell;

    fn change(name: &str) -> AttributeChange {
        AttributeChange {
            object: Rc::new(Record::new("Thing")),
            name: Rc::from(name),
            old: Value::Int(0),
            new: Value::Int(1),
        }
    }

    #[test]
    fn dispatch_reaches_matching_observers_only() {
        let list = ObserverList::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = list.subscribe("x", Rc::new(move |_: &AttributeChange| h.set(h.get() + 1)));

        list.dispatch(&change("x"));
        list.dispatch(&change("y"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_the_guard_unsubscribes() {
        let list = ObserverList::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = list.subscribe("x", Rc::new(move |_: &AttributeChange| h.set(h.get() + 1)));
        assert_eq!(list.len(), 1);

        drop(sub);
        assert!(list.is_empty());
        list.dispatch(&change("x"));
        assert_eq!(hits.get(), 0);
    }
}
