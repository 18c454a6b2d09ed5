//! A plain attribute bag with no change notification.

use std::collections::HashMap;
use std::rc::Rc;

use super::Object;
use crate::vm::Value;

/// Fixed attributes, readable from expressions but never observable.
#[derive(Debug)]
pub struct Record {
    type_name: Rc<str>,
    attrs: HashMap<Rc<str>, Value>,
}

impl Record {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: Rc::from(type_name),
            attrs: HashMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(Rc::from(name), value.into());
        self
    }
}

impl Object for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.get(name).cloned()
    }
}
