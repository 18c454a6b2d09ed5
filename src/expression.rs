//! Expression bindings: an instrumented expression plus the dependency
//! listeners its last evaluation attached.
//!
//! An [`ExpressionBinding`] owns the notifier channel, both binders and the
//! instrumented code. Every [`evaluate`](ExpressionBinding::evaluate) resets
//! the channel first, so the dependencies of the previous evaluation are
//! severed and exactly the ones read this time are listened to. A change to
//! any of them marks the binding dirty and runs its invalidation callback.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::binding::{AttributeBinder, GetattrBinder};
use crate::config::BindingConfig;
use crate::monitor::{instrument_with, AttributeMonitor, CallMonitor, InstrumentError, Monitor};
use crate::notify::{NotificationEvent, NotifierProxy};
use crate::vm::{self, Code, EvalError, Scope, Value};

type InvalidateFn = dyn Fn(&ExpressionBinding, &NotificationEvent);

struct Inner {
    original: Code,
    instrumented: Option<Code>,
    scope: Scope,
    notifier: NotifierProxy,
    attributes: Option<AttributeMonitor<AttributeBinder>>,
    getattr: Option<CallMonitor<GetattrBinder>>,
    on_invalidate: Box<InvalidateFn>,
    last: RefCell<Option<Result<Value, EvalError>>>,
    dirty: Cell<bool>,
    evaluating: Cell<bool>,
}

/// A tracked expression. Clones share the same binding.
#[derive(Clone)]
pub struct ExpressionBinding {
    inner: Rc<Inner>,
}

impl ExpressionBinding {
    /// Instrument `code` according to `config`.
    ///
    /// `on_invalidate` runs synchronously whenever a dependency read by the
    /// latest evaluation changes. It is not called for changes made while
    /// the expression itself is evaluating; those only mark it dirty.
    pub fn new(
        code: Code,
        scope: Scope,
        config: BindingConfig,
        on_invalidate: impl Fn(&ExpressionBinding, &NotificationEvent) + 'static,
    ) -> Result<Self, InstrumentError> {
        let mut failure = None;
        let inner = Rc::new_cyclic(|this: &Weak<Inner>| {
            let this = this.clone();
            let notifier = NotifierProxy::new(move |event| {
                if let Some(inner) = this.upgrade() {
                    ExpressionBinding { inner }.invalidate(event);
                }
            });
            let attributes = config
                .monitor_attributes
                .then(|| AttributeMonitor::new(AttributeBinder::new(&notifier)));
            let getattr = config
                .monitor_getattr
                .then(|| CallMonitor::new(GetattrBinder::new(&notifier)));

            let mut monitors: Vec<&dyn Monitor> = Vec::new();
            if let Some(monitor) = &attributes {
                monitors.push(monitor);
            }
            if let Some(monitor) = &getattr {
                monitors.push(monitor);
            }
            let instrumented = if !config.tracks_anything() {
                None
            } else {
                match instrument_with(&code, &monitors, config.verify_stack) {
                    Ok(instrumented) => Some(instrumented),
                    Err(err) => {
                        failure = Some(err);
                        None
                    }
                }
            };
            drop(monitors);

            Inner {
                original: code,
                instrumented,
                scope,
                notifier,
                attributes,
                getattr,
                on_invalidate: Box::new(on_invalidate),
                last: RefCell::new(None),
                dirty: Cell::new(true),
                evaluating: Cell::new(false),
            }
        });

        if let Some(err) = failure {
            if !config.fallback_uninstrumented {
                return Err(err);
            }
            warn!(
                code = inner.original.name(),
                error = %err,
                "instrumentation failed, dependencies will not be tracked"
            );
        }
        Ok(Self { inner })
    }

    /// Build a binding that re-evaluates on every invalidation and passes
    /// each result (starting with the first) to `sink`.
    pub fn reactive(
        code: Code,
        scope: Scope,
        config: BindingConfig,
        sink: impl Fn(Result<Value, EvalError>) + 'static,
    ) -> Result<Self, InstrumentError> {
        let sink = Rc::new(sink);
        let on_change = Rc::clone(&sink);
        let binding = Self::new(code, scope, config, move |binding, _| {
            on_change(binding.evaluate());
        })?;
        sink(binding.evaluate());
        Ok(binding)
    }

    /// Sever every dependency, run the code and record the new ones.
    pub fn evaluate(&self) -> Result<Value, EvalError> {
        let inner = &self.inner;
        inner.notifier.reset();
        inner.dirty.set(false);
        inner.evaluating.set(true);
        let result = vm::evaluate(self.code(), &inner.scope);
        inner.evaluating.set(false);

        debug!(
            code = inner.original.name(),
            ok = result.is_ok(),
            dependencies = self.dependency_count(),
            "evaluated"
        );
        *inner.last.borrow_mut() = Some(result.clone());
        result
    }

    /// The result of the latest evaluation, if any.
    pub fn value(&self) -> Option<Result<Value, EvalError>> {
        self.inner.last.borrow().clone()
    }

    /// Whether a dependency changed since the latest evaluation (or there
    /// has been none).
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Sever every dependency without re-evaluating.
    pub fn reset(&self) {
        self.inner.notifier.reset();
        self.inner.dirty.set(true);
    }

    /// The code that [`evaluate`](Self::evaluate) runs.
    pub fn code(&self) -> &Code {
        self.inner
            .instrumented
            .as_ref()
            .unwrap_or(&self.inner.original)
    }

    pub fn original(&self) -> &Code {
        &self.inner.original
    }

    /// Whether dependency tracking is active.
    pub fn is_instrumented(&self) -> bool {
        self.inner.instrumented.is_some()
    }

    pub fn notifier(&self) -> &NotifierProxy {
        &self.inner.notifier
    }

    /// Listeners attached by the latest evaluation.
    pub fn dependency_count(&self) -> usize {
        let attrs = self
            .inner
            .attributes
            .as_ref()
            .map_or(0, |m| m.hook().policy().len());
        let getattr = self
            .inner
            .getattr
            .as_ref()
            .map_or(0, |m| m.hook().policy().len());
        attrs + getattr
    }

    /// Drop listeners whose objects have been dropped.
    pub fn prune(&self) -> usize {
        let attrs = self.inner.attributes.as_ref().map_or(0, |m| m.hook().prune());
        let getattr = self.inner.getattr.as_ref().map_or(0, |m| m.hook().prune());
        attrs + getattr
    }

    fn invalidate(&self, event: &NotificationEvent) {
        self.inner.dirty.set(true);
        if self.inner.evaluating.get() {
            trace!(name = event.name(), "changed during evaluation");
            return;
        }
        debug!(
            code = self.inner.original.name(),
            name = event.name(),
            "invalidated"
        );
        (self.inner.on_invalidate)(self, event);
    }
}

impl fmt::Debug for ExpressionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionBinding")
            .field("code", &self.inner.original.name())
            .field("instrumented", &self.is_instrumented())
            .field("dirty", &self.is_dirty())
            .field("generation", &self.inner.notifier.generation())
            .finish_non_exhaustive()
    }
}
