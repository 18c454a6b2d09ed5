//! Call-site monitoring.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::Monitor;
use crate::vm::{ArgSpec, EvalError, Insertion, Instruction, Kwargs, NativeFunction, Value};

/// Receives every `CALL_FUNCTION` an instrumented expression performs,
/// with the arguments it is about to be called with.
pub trait CallHook: 'static {
    fn monitor_function(&self, func: &Value, args: &[Value], kwargs: &[(Rc<str>, Value)]);
}

/// Splices a side-call to [`CallHook::monitor_function`] in front of every
/// `CALL_FUNCTION`.
///
/// Only the plain call form is instrumented. `CALL_FUNCTION_VAR`,
/// `CALL_FUNCTION_KW` and `CALL_FUNCTION_VAR_KW` sites run untouched.
pub struct CallMonitor<H> {
    hook: Rc<H>,
}

impl<H: CallHook> CallMonitor<H> {
    pub fn new(hook: H) -> Self {
        Self { hook: Rc::new(hook) }
    }

    pub fn hook(&self) -> &Rc<H> {
        &self.hook
    }

    fn binder(&self) -> Rc<NativeFunction> {
        let weak: Weak<H> = Rc::downgrade(&self.hook);
        NativeFunction::new("call_binder", move |args, _| {
            let [func, bundle, raw] = args else {
                return Err(EvalError::Type(format!(
                    "call_binder expected 3 arguments, got {}",
                    args.len()
                )));
            };
            let items = bundle.as_tuple().ok_or_else(|| {
                EvalError::Type(format!("call_binder expected a tuple, got {}", bundle.type_name()))
            })?;
            if let (Some(hook), Value::Int(raw)) = (weak.upgrade(), raw) {
                let (args, kwargs) = split_arguments(items, ArgSpec::decode(*raw as u16));
                hook.monitor_function(func, args, &kwargs);
            }
            // UNPACK_SEQUENCE reverses, so hand back (reversed bundle, func)
            // to land func below the bundle and the bundle in order.
            let reversed = Value::tuple(items.iter().rev().cloned());
            Ok(Value::tuple([reversed, func.clone()]))
        })
    }
}

impl<H: CallHook> Monitor for CallMonitor<H> {
    fn insertion_code(&self, code: &[Instruction]) -> Vec<Insertion> {
        let binder = self.binder();
        let mut insertions = Vec::new();
        for (idx, op) in code.iter().enumerate() {
            match op {
                Instruction::CallFunction(raw) => {
                    trace!(index = idx, argspec = raw, "call site");
                    insertions.push(Insertion::new(idx, call_site(&binder, *raw)));
                }
                op if op.is_call() => {
                    debug!(
                        index = idx,
                        opname = op.opname(),
                        "call form not instrumented, dependencies reached through it are untracked"
                    );
                }
                _ => {}
            }
        }
        insertions
    }
}

impl<H> fmt::Debug for CallMonitor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallMonitor")
            .field("hook", &std::any::type_name::<H>())
            .finish()
    }
}

/// Split a call bundle into positional arguments and `(name, value)`
/// keyword pairs. Pairs whose name is not text are skipped.
pub fn split_arguments(bundle: &[Value], spec: ArgSpec) -> (&[Value], Kwargs) {
    let positional = usize::from(spec.positional).min(bundle.len());
    let (args, rest) = bundle.split_at(positional);
    let kwargs = rest
        .chunks_exact(2)
        .filter_map(|pair| match &pair[0] {
            Value::Str(name) => Some((Rc::clone(name), pair[1].clone())),
            _ => None,
        })
        .collect();
    (args, kwargs)
}

/// The stack-neutral sequence injected before a `CALL_FUNCTION raw`.
///
/// ```text
///                         func a1 .. an
/// BUILD_TUPLE n           func (a1 .. an)
/// LOAD_CONST binder       func (a1 .. an) binder
/// ROT_THREE               binder func (a1 .. an)
/// LOAD_CONST raw          binder func (a1 .. an) raw
/// CALL_FUNCTION 3         ((an .. a1), func)
/// UNPACK_SEQUENCE 2       func (an .. a1)
/// UNPACK_SEQUENCE n       func a1 .. an
/// ```
pub fn call_site(binder: &Rc<NativeFunction>, raw: u16) -> Vec<Instruction> {
    let slots = ArgSpec::decode(raw).stack_slots();
    vec![
        Instruction::BuildTuple(slots),
        Instruction::LoadConst(Value::Native(Rc::clone(binder))),
        Instruction::RotThree,
        Instruction::LoadConst(Value::Int(i64::from(raw))),
        Instruction::CallFunction(0x0003),
        Instruction::UnpackSequence(2),
        Instruction::UnpackSequence(slots),
    ]
}
