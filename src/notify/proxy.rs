//! The disconnectable notifier channel.
//!
//! A [`NotifierProxy`] forwards events to one callback. Listeners never
//! hold the proxy itself: they hold a [`Disconnector`], a weak handle
//! stamped with the generation it was issued in. [`NotifierProxy::reset`]
//! bumps the generation, which makes every outstanding disconnector stale
//! at once without touching the listeners. Stale disconnectors drop
//! events silently. Dropping the last proxy handle has the same effect.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::event::NotificationEvent;

/// Consumer of notification events.
pub type NotifyCallback = Rc<dyn Fn(&NotificationEvent)>;

struct ProxyInner {
    callback: NotifyCallback,
    generation: Cell<u64>,
}

// ---------------------------------------------------------------------------
// NotifierProxy
// ---------------------------------------------------------------------------

/// Shared handle to a notifier channel. Clones refer to the same channel.
#[derive(Clone)]
pub struct NotifierProxy {
    inner: Rc<ProxyInner>,
}

impl NotifierProxy {
    pub fn new(callback: impl Fn(&NotificationEvent) + 'static) -> Self {
        Self::from_callback(Rc::new(callback))
    }

    pub fn from_callback(callback: NotifyCallback) -> Self {
        Self {
            inner: Rc::new(ProxyInner {
                callback,
                generation: Cell::new(0),
            }),
        }
    }

    /// Invoke the callback synchronously.
    pub fn notify(&self, event: &NotificationEvent) {
        (self.inner.callback)(event);
    }

    /// Invalidate every disconnector issued so far.
    pub fn reset(&self) {
        let next = self.inner.generation.get().wrapping_add(1);
        self.inner.generation.set(next);
        debug!(generation = next, "notifier reset");
    }

    /// A token for the current generation.
    pub fn disconnector(&self) -> Disconnector {
        Disconnector {
            proxy: Rc::downgrade(&self.inner),
            generation: self.inner.generation.get(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.get()
    }
}

impl fmt::Debug for NotifierProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierProxy")
            .field("generation", &self.inner.generation.get())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Disconnector
// ---------------------------------------------------------------------------

/// Weak, generation-stamped handle to a notifier channel.
#[derive(Clone)]
pub struct Disconnector {
    proxy: Weak<ProxyInner>,
    generation: u64,
}

impl Disconnector {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the channel is alive and has not been reset since issue.
    pub fn is_connected(&self) -> bool {
        self.proxy
            .upgrade()
            .is_some_and(|inner| inner.generation.get() == self.generation)
    }

    /// A token for the channel's current generation, if it is still alive.
    pub fn renew(&self) -> Option<Disconnector> {
        self.proxy.upgrade().map(|inner| Disconnector {
            proxy: Rc::downgrade(&inner),
            generation: inner.generation.get(),
        })
    }

    /// Deliver `event` if still connected. Returns whether it was delivered.
    pub fn notify(&self, event: &NotificationEvent) -> bool {
        let Some(inner) = self.proxy.upgrade() else {
            trace!(name = event.name(), "notifier dropped, event discarded");
            return false;
        };
        if inner.generation.get() != self.generation {
            trace!(
                name = event.name(),
                issued = self.generation,
                current = inner.generation.get(),
                "stale disconnector, event discarded"
            );
            return false;
        }
        (inner.callback)(event);
        true
    }
}

impl fmt::Debug for Disconnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disconnector")
            .field("generation", &self.generation)
            .field("connected", &self.is_connected())
            .finish()
    }
}
