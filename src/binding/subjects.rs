//! Identity-keyed arena of monitored subjects.
//!
//! Subjects are objects whose attributes a binding policy listens to. The
//! arena hands each one a stable [`SubjectId`] on first sight, keyed by the
//! object's allocation address, and keeps only a `Weak` to it: tracking an
//! object never extends its lifetime and never requires it to implement
//! `Hash` or `Eq`.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use slotmap::{new_key_type, SlotMap};

use crate::object::{Object, ObjectRef};

new_key_type! {
    /// Stable handle for one monitored object.
    pub struct SubjectId;
}

#[derive(Default)]
pub struct SubjectArena {
    slots: SlotMap<SubjectId, Weak<dyn Object>>,
    by_address: HashMap<usize, SubjectId>,
}

fn address(obj: &ObjectRef) -> usize {
    Rc::as_ptr(obj) as *const () as usize
}

impl SubjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id for `obj`, assigning a fresh one on first sight.
    pub fn intern(&mut self, obj: &ObjectRef) -> SubjectId {
        let addr = address(obj);
        if let Some(id) = self.by_address.get(&addr).copied() {
            if self.is_alive(id) {
                return id;
            }
            self.slots.remove(id);
        }
        let id = self.slots.insert(Rc::downgrade(obj));
        self.by_address.insert(addr, id);
        id
    }

    /// The id already assigned to `obj`, if any.
    pub fn find(&self, obj: &ObjectRef) -> Option<SubjectId> {
        self.by_address
            .get(&address(obj))
            .copied()
            .filter(|id| self.is_alive(*id))
    }

    pub fn get(&self, id: SubjectId) -> Option<ObjectRef> {
        self.slots.get(id).and_then(Weak::upgrade)
    }

    pub fn is_alive(&self, id: SubjectId) -> bool {
        self.slots.get(id).is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Forget every subject that has been dropped. Returns their ids.
    pub fn prune(&mut self) -> Vec<SubjectId> {
        let dead: Vec<SubjectId> = self
            .slots
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(id, _)| id)
            .collect();
        for id in &dead {
            self.slots.remove(*id);
        }
        self.by_address.retain(|_, id| self.slots.contains_key(*id));
        dead
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_address.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for SubjectArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectArena")
            .field("len", &self.slots.len())
            .finish()
    }
}
