//! The hookup algorithm shared by every binder.

use std::collections::HashMap;
use std::rc::Rc;

use slotmap::SlotMap;
use tracing::{debug, trace};

use super::handler::ListenerHandle;
use super::subjects::{SubjectArena, SubjectId};
use crate::notify::{Disconnector, ListenerId, NotifierProxy};
use crate::object::{AttrDescriptor, ObjectRef};
use crate::vm::Value;

/// Outcome of [`BindingPolicy::do_binding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hookup {
    /// A new listener was attached.
    Attached(ListenerId),
    /// This (object, attribute) pair already has a listener.
    AlreadyBound(ListenerId),
    /// The value is not an object.
    NotAnObject,
    /// The object has no observable-attribute capability.
    NotObservable,
    /// The object does not offer this attribute for observation.
    Unobservable(AttrDescriptor),
    /// The notifier channel is gone.
    Detached,
}

/// Registry of listener handles for one notifier channel.
///
/// Holds at most one [`ListenerHandle`] per (object identity, attribute).
/// The registry belongs to one generation of the channel: once the channel
/// is reset (or dropped), the next hookup discards every handle and starts
/// over with a fresh disconnector.
#[derive(Debug)]
pub struct BindingPolicy {
    disconnector: Disconnector,
    subjects: SubjectArena,
    listeners: SlotMap<ListenerId, ListenerHandle>,
    index: HashMap<(SubjectId, Rc<str>), ListenerId>,
}

impl BindingPolicy {
    pub fn new(notifier: &NotifierProxy) -> Self {
        Self {
            disconnector: notifier.disconnector(),
            subjects: SubjectArena::new(),
            listeners: SlotMap::with_key(),
            index: HashMap::new(),
        }
    }

    /// Listen to `attr` on `obj` unless it is not observable or already
    /// listened to in this generation.
    pub fn do_binding(&mut self, obj: &Value, attr: &str) -> Hookup {
        let Some(obj) = obj.as_object() else {
            return Hookup::NotAnObject;
        };
        let Some(source) = obj.observable() else {
            return Hookup::NotObservable;
        };
        match source.describe_attribute(attr) {
            AttrDescriptor::Observable => {}
            other => return Hookup::Unobservable(other),
        }
        if !self.resync() {
            return Hookup::Detached;
        }

        let subject = self.subjects.intern(obj);
        let key = (subject, Rc::<str>::from(attr));
        if let Some(&id) = self.index.get(&key) {
            return Hookup::AlreadyBound(id);
        }

        let name = Rc::clone(&key.1);
        let disconnector = self.disconnector.clone();
        let id = self.listeners.insert_with_key(|id| {
            ListenerHandle::attach(id, subject, source, name, disconnector)
        });
        self.index.insert(key, id);
        debug!(
            type_name = obj.type_name(),
            attr,
            generation = self.disconnector.generation(),
            "listener attached"
        );
        Hookup::Attached(id)
    }

    /// Start a new registry if the disconnector went stale. Returns false
    /// when the channel no longer exists.
    fn resync(&mut self) -> bool {
        if self.disconnector.is_connected() {
            return true;
        }
        let fresh = self.disconnector.renew();
        if !self.listeners.is_empty() {
            debug!(
                dropped = self.listeners.len(),
                generation = self.disconnector.generation(),
                "registry generation ended"
            );
        }
        self.clear();
        match fresh {
            Some(disconnector) => {
                self.disconnector = disconnector;
                true
            }
            None => false,
        }
    }

    /// Drop every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
        self.index.clear();
        self.subjects.clear();
    }

    /// Drop listeners whose subject has been dropped. Returns how many.
    pub fn prune(&mut self) -> usize {
        let dead = self.subjects.prune();
        if dead.is_empty() {
            return 0;
        }
        let before = self.listeners.len();
        self.listeners
            .retain(|_, handle| !dead.contains(&handle.subject()));
        self.index.retain(|(subject, _), _| !dead.contains(subject));
        let removed = before - self.listeners.len();
        trace!(removed, "pruned listeners of dropped subjects");
        removed
    }

    /// Whether `obj.attr` is listened to in the current generation.
    pub fn contains(&self, obj: &ObjectRef, attr: &str) -> bool {
        self.disconnector.is_connected()
            && self
                .subjects
                .find(obj)
                .is_some_and(|subject| self.index.contains_key(&(subject, Rc::from(attr))))
    }

    /// Live listeners in the current generation.
    pub fn len(&self) -> usize {
        if self.disconnector.is_connected() {
            self.listeners.len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.disconnector.generation()
    }
}
