//! Observable objects described by a [`Schema`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::attribute::{
    AttrDescriptor, AttributeChange, ChangeCallback, ObservableAttributeSource, ObserverList,
    Subscription,
};
use super::{Object, ObjectRef};
use crate::vm::Value;

/// Errors raised when mutating a [`Model`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("'{type_name}' object has no attribute '{attr}' and does not accept new ones")]
    Disallowed { type_name: String, attr: String },
    #[error("'{type_name}' object has been dropped")]
    Dropped { type_name: String },
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Attribute declarations shared by every [`Model`] of one type.
#[derive(Debug, Clone)]
pub struct Schema {
    type_name: Rc<str>,
    declared: HashMap<Rc<str>, bool>,
    strict: bool,
}

impl Schema {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: Rc::from(type_name),
            declared: HashMap::new(),
            strict: false,
        }
    }

    /// Declare an attribute that reports changes.
    pub fn observable(mut self, name: &str) -> Self {
        self.declared.insert(Rc::from(name), true);
        self
    }

    /// Declare an attribute that never reports changes.
    pub fn unobservable(mut self, name: &str) -> Self {
        self.declared.insert(Rc::from(name), false);
        self
    }

    /// Reject undeclared attributes. They describe as
    /// [`AttrDescriptor::NotObservable`] and cannot be set.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn describe(&self, name: &str) -> AttrDescriptor {
        match self.declared.get(name) {
            Some(true) => AttrDescriptor::Observable,
            Some(false) => AttrDescriptor::NotObservable,
            None if self.strict => AttrDescriptor::NotObservable,
            None => AttrDescriptor::Absent,
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// An object whose declared attributes can be observed.
///
/// Always lives behind an `Rc` so change events can carry the object.
pub struct Model {
    schema: Rc<Schema>,
    values: RefCell<HashMap<Rc<str>, Value>>,
    observers: ObserverList,
    this: Weak<Model>,
}

impl Model {
    pub fn new(schema: &Rc<Schema>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            schema: Rc::clone(schema),
            values: RefCell::new(HashMap::new()),
            observers: ObserverList::new(),
            this: this.clone(),
        })
    }

    /// Set an initial value without notifying (builder, before sharing).
    pub fn with(self: Rc<Self>, name: &str, value: impl Into<Value>) -> Rc<Self> {
        self.values.borrow_mut().insert(Rc::from(name), value.into());
        self
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.borrow().get(name).cloned()
    }

    /// Assign an attribute. Observers of an observable attribute are
    /// notified when the value actually changes.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let value = value.into();
        let descriptor = self.schema.describe(name);
        if self.schema.strict && !self.schema.declared.contains_key(name) {
            return Err(ModelError::Disallowed {
                type_name: self.schema.type_name.to_string(),
                attr: name.to_owned(),
            });
        }

        let name: Rc<str> = Rc::from(name);
        let old = self
            .values
            .borrow_mut()
            .insert(Rc::clone(&name), value.clone())
            .unwrap_or_default();
        if descriptor != AttrDescriptor::Observable || old == value {
            return Ok(());
        }

        let object: ObjectRef = self.this.upgrade().ok_or_else(|| ModelError::Dropped {
            type_name: self.schema.type_name.to_string(),
        })?;
        self.observers.dispatch(&AttributeChange {
            object,
            name,
            old,
            new: value,
        });
        Ok(())
    }

    /// Live observers across all attributes.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Object for Model {
    fn type_name(&self) -> &str {
        &self.schema.type_name
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn observable(&self) -> Option<&dyn ObservableAttributeSource> {
        Some(self)
    }
}

impl ObservableAttributeSource for Model {
    fn describe_attribute(&self, name: &str) -> AttrDescriptor {
        self.schema.describe(name)
    }

    fn observe(&self, name: &str, callback: ChangeCallback) -> Subscription {
        self.observers.subscribe(name, callback)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type_name", &self.schema.type_name)
            .field("values", &self.values.borrow())
            .field("observers", &self.observers)
            .finish()
    }
}
