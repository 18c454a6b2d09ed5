//! The concrete hooks that feed accesses into a [`BindingPolicy`].

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use tracing::{trace, warn};

use super::policy::{BindingPolicy, Hookup};
use crate::monitor::{AttributeHook, CallHook};
use crate::notify::NotifierProxy;
use crate::vm::{Builtin, Value};

fn bind(policy: &RefCell<BindingPolicy>, obj: &Value, attr: &str) {
    match policy.try_borrow_mut() {
        Ok(mut policy) => {
            let hookup = policy.do_binding(obj, attr);
            trace!(attr, ?hookup, "hookup");
        }
        Err(_) => warn!(attr, "binding policy busy, access not tracked"),
    }
}

/// Listens to every attribute an expression reads with `LOAD_ATTR`.
#[derive(Debug)]
pub struct AttributeBinder {
    policy: RefCell<BindingPolicy>,
}

impl AttributeBinder {
    pub fn new(notifier: &NotifierProxy) -> Self {
        Self {
            policy: RefCell::new(BindingPolicy::new(notifier)),
        }
    }

    pub fn policy(&self) -> Ref<'_, BindingPolicy> {
        self.policy.borrow()
    }

    /// See [`BindingPolicy::prune`].
    pub fn prune(&self) -> usize {
        self.policy
            .try_borrow_mut()
            .map_or(0, |mut policy| policy.prune())
    }
}

impl AttributeHook for AttributeBinder {
    fn monitor_attribute(&self, obj: &Value, attr: &str) {
        bind(&self.policy, obj, attr);
    }
}

/// Listens to attributes an expression reads through `getattr`.
///
/// Only `getattr(obj, name)` and `getattr(obj, name, default)` with a
/// textual name count; every other call is ignored.
#[derive(Debug)]
pub struct GetattrBinder {
    policy: RefCell<BindingPolicy>,
}

impl GetattrBinder {
    pub fn new(notifier: &NotifierProxy) -> Self {
        Self {
            policy: RefCell::new(BindingPolicy::new(notifier)),
        }
    }

    pub fn policy(&self) -> Ref<'_, BindingPolicy> {
        self.policy.borrow()
    }

    /// See [`BindingPolicy::prune`].
    pub fn prune(&self) -> usize {
        self.policy
            .try_borrow_mut()
            .map_or(0, |mut policy| policy.prune())
    }
}

impl CallHook for GetattrBinder {
    fn monitor_function(&self, func: &Value, args: &[Value], kwargs: &[(Rc<str>, Value)]) {
        if let Some((obj, attr)) = getattr_access(func, args, kwargs) {
            bind(&self.policy, obj, attr);
        }
    }
}

/// The object and attribute name of a dynamic `getattr` lookup, if the
/// call is one.
pub fn getattr_access<'a>(
    func: &Value,
    args: &'a [Value],
    kwargs: &[(Rc<str>, Value)],
) -> Option<(&'a Value, &'a str)> {
    if !matches!(func, Value::Builtin(Builtin::GetAttr)) || !kwargs.is_empty() {
        return None;
    }
    match args {
        [obj, name] | [obj, name, _] => name.as_str().map(|name| (obj, name)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Model, Schema};

    #[test]
    fn getattr_shapes() {
        let obj = Value::Int(0);
        let getattr = Value::Builtin(Builtin::GetAttr);
        let name = Value::str("x");

        assert!(getattr_access(&getattr, &[obj.clone(), name.clone()], &[]).is_some());
        assert!(
            getattr_access(&getattr, &[obj.clone(), name.clone(), Value::None], &[]).is_some()
        );
        assert!(getattr_access(&getattr, &[obj.clone()], &[]).is_none());
        assert!(getattr_access(&getattr, &[obj.clone(), Value::Int(1)], &[]).is_none());
        assert!(getattr_access(
            &getattr,
            &[obj.clone(), name.clone()],
            &[(Rc::from("default"), Value::None)]
        )
        .is_none());
        assert!(getattr_access(&Value::Builtin(Builtin::Len), &[obj, name], &[]).is_none());
    }

    #[test]
    fn binders_attach_through_their_policy() {
        let proxy = NotifierProxy::new(|_| {});
        let schema = Rc::new(Schema::new("Point").observable("x"));
        let p = Value::Object(Model::new(&schema));

        let attrs = AttributeBinder::new(&proxy);
        attrs.monitor_attribute(&p, "x");
        attrs.monitor_attribute(&p, "x");
        assert_eq!(attrs.policy().len(), 1);

        let calls = GetattrBinder::new(&proxy);
        calls.monitor_function(&Value::Builtin(Builtin::GetAttr), &[p.clone(), Value::str("x")], &[]);
        calls.monitor_function(&Value::Builtin(Builtin::Len), &[p], &[]);
        assert_eq!(calls.policy().len(), 1);
    }
}
