//! Notification events and the channel that carries them.

pub mod event;
pub mod proxy;

pub use event::{ListenerId, NotificationEvent};
pub use proxy::{Disconnector, NotifierProxy, NotifyCallback};
