//! Notification events delivered through a [`NotifierProxy`](super::NotifierProxy).

use slotmap::new_key_type;

use crate::object::AttributeChange;

new_key_type! {
    /// Identifies one listener handle inside a binding policy.
    pub struct ListenerId;
}

/// A dependency of an expression changed.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// The listener that observed the change.
    pub emitter: ListenerId,
    /// What changed: the object, attribute name, old and new values.
    pub metadata: AttributeChange,
}

impl NotificationEvent {
    pub fn new(emitter: ListenerId, metadata: AttributeChange) -> Self {
        Self { emitter, metadata }
    }

    /// Name of the attribute that changed.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
