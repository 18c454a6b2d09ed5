//! Turning observed accesses into change listeners.
//!
//! [`AttributeBinder`] and [`GetattrBinder`] are the hooks monitors call
//! during evaluation. Both delegate to a [`BindingPolicy`], which attaches at
//! most one [`ListenerHandle`] per (object identity, attribute) and forwards
//! changes to the notifier channel it was created for.

pub mod handler;
pub mod monitors;
pub mod policy;
pub mod subjects;

pub use handler::ListenerHandle;
pub use monitors::{getattr_access, AttributeBinder, GetattrBinder};
pub use policy::{BindingPolicy, Hookup};
pub use subjects::{SubjectArena, SubjectId};
