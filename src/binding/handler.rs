//! Listener handles: one change subscription per (subject, attribute).

use std::rc::Rc;

use super::subjects::SubjectId;
use crate::notify::{Disconnector, ListenerId, NotificationEvent};
use crate::object::{AttributeChange, ChangeCallback, ObservableAttributeSource, Subscription};

/// Forwards changes of one attribute of one subject to a notifier channel.
///
/// The subscription callback captures only the listener id and a
/// [`Disconnector`]; it holds neither the subject nor the channel strongly.
/// Once the channel is reset the callback keeps firing but delivers
/// nothing. Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct ListenerHandle {
    subject: SubjectId,
    attr: Rc<str>,
    _subscription: Subscription,
}

impl ListenerHandle {
    pub fn attach(
        id: ListenerId,
        subject: SubjectId,
        source: &dyn ObservableAttributeSource,
        attr: Rc<str>,
        disconnector: Disconnector,
    ) -> Self {
        let callback: ChangeCallback = Rc::new(move |change: &AttributeChange| {
            let event = NotificationEvent::new(id, change.clone());
            disconnector.notify(&event);
        });
        let subscription = source.observe(&attr, callback);
        Self {
            subject,
            attr,
            _subscription: subscription,
        }
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }
}
