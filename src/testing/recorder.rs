//! Collecting notification events for assertions.

use std::cell::RefCell;
use std::rc::Rc;

use crate::expression::ExpressionBinding;
use crate::notify::{ListenerId, NotificationEvent};
use crate::vm::Value;

/// A notification event, flattened for comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub emitter: ListenerId,
    pub type_name: String,
    pub name: String,
    pub old: Value,
    pub new: Value,
}

impl From<&NotificationEvent> for RecordedEvent {
    fn from(event: &NotificationEvent) -> Self {
        Self {
            emitter: event.emitter,
            type_name: event.metadata.object.type_name().to_owned(),
            name: event.metadata.name.to_string(),
            old: event.metadata.old.clone(),
            new: event.metadata.new.clone(),
        }
    }
}

/// Shared event log. Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier callback that records every event.
    pub fn notify_callback(&self) -> impl Fn(&NotificationEvent) + 'static {
        let events = Rc::clone(&self.events);
        move |event: &NotificationEvent| events.borrow_mut().push(event.into())
    }

    /// An invalidation callback for [`ExpressionBinding::new`].
    pub fn callback(&self) -> impl Fn(&ExpressionBinding, &NotificationEvent) + 'static {
        let events = Rc::clone(&self.events);
        move |_: &ExpressionBinding, event: &NotificationEvent| {
            events.borrow_mut().push(event.into())
        }
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.borrow().clone()
    }

    /// `"Type.attr"` for every event, in order.
    pub fn names(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|e| format!("{}.{}", e.type_name, e.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}
