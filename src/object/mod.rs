//! The object system expressions operate on.
//!
//! Any type can take part in expressions by implementing [`Object`]. Types
//! that can report attribute changes additionally expose the
//! [`ObservableAttributeSource`] capability through [`Object::observable`];
//! everything else is evaluated normally but never tracked.

pub mod attribute;
pub mod model;
pub mod record;

use std::rc::Rc;

use crate::vm::Value;

pub use attribute::{
    AttrDescriptor, AttributeChange, ChangeCallback, ObservableAttributeSource, ObserverList,
    Subscription,
};
pub use model::{Model, ModelError, Schema};
pub use record::Record;

/// A shared object reachable from expressions.
pub trait Object: 'static {
    /// Name used in error messages and listings.
    fn type_name(&self) -> &str;

    /// Read an attribute. `None` means the attribute does not exist.
    fn get_attr(&self, name: &str) -> Option<Value>;

    /// The change-notification capability, if this object has one.
    fn observable(&self) -> Option<&dyn ObservableAttributeSource> {
        None
    }
}

/// Shared handle to a dynamically typed object.
pub type ObjectRef = Rc<dyn Object>;
