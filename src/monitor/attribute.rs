//! Attribute-access monitoring.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::Monitor;
use crate::vm::{Insertion, Instruction, NativeFunction, Value};

/// Receives every attribute access an instrumented expression performs.
pub trait AttributeHook: 'static {
    /// Called with the object on top of the stack and the attribute name,
    /// immediately before the `LOAD_ATTR` runs.
    fn monitor_attribute(&self, obj: &Value, attr: &str);
}

/// Splices a side-call to [`AttributeHook::monitor_attribute`] in front of
/// every `LOAD_ATTR`.
///
/// The injected side-call holds the hook weakly: once the monitor is
/// dropped, previously instrumented code keeps running and the side-call
/// does nothing.
pub struct AttributeMonitor<H> {
    hook: Rc<H>,
}

impl<H: AttributeHook> AttributeMonitor<H> {
    pub fn new(hook: H) -> Self {
        Self { hook: Rc::new(hook) }
    }

    pub fn hook(&self) -> &Rc<H> {
        &self.hook
    }

    fn binder(&self) -> Rc<NativeFunction> {
        let weak: Weak<H> = Rc::downgrade(&self.hook);
        NativeFunction::new("attribute_binder", move |args, _| {
            if let (Some(hook), [obj, attr]) = (weak.upgrade(), args) {
                if let Some(attr) = attr.as_str() {
                    hook.monitor_attribute(obj, attr);
                }
            }
            Ok(Value::None)
        })
    }
}

impl<H: AttributeHook> Monitor for AttributeMonitor<H> {
    fn insertion_code(&self, code: &[Instruction]) -> Vec<Insertion> {
        let binder = self.binder();
        code.iter()
            .enumerate()
            .filter_map(|(idx, op)| match op {
                Instruction::LoadAttr(attr) => {
                    trace!(index = idx, attr = &**attr, "attribute site");
                    Some(Insertion::new(idx, attribute_site(&binder, attr)))
                }
                _ => None,
            })
            .collect()
    }
}

impl<H> fmt::Debug for AttributeMonitor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeMonitor")
            .field("hook", &std::any::type_name::<H>())
            .finish()
    }
}

/// The stack-neutral sequence injected before a `LOAD_ATTR`.
///
/// ```text
/// DUP_TOP                 obj obj
/// LOAD_CONST binder       obj obj binder
/// ROT_TWO                 obj binder obj
/// LOAD_CONST "attr"       obj binder obj "attr"
/// CALL_FUNCTION 2         obj result
/// POP_TOP                 obj
/// ```
pub fn attribute_site(binder: &Rc<NativeFunction>, attr: &Rc<str>) -> Vec<Instruction> {
    vec![
        Instruction::DupTop,
        Instruction::LoadConst(Value::Native(Rc::clone(binder))),
        Instruction::RotTwo,
        Instruction::LoadConst(Value::Str(Rc::clone(attr))),
        Instruction::CallFunction(0x0002),
        Instruction::PopTop,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{evaluate, Code, Scope};
    use crate::object::Record;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Log(RefCell<Vec<String>>);

    impl AttributeHook for Log {
        fn monitor_attribute(&self, obj: &Value, attr: &str) {
            self.0
                .borrow_mut()
                .push(format!("{}.{attr}", obj.type_name()));
        }
    }

    fn chained() -> Code {
        Code::parse_listing("LOAD_NAME a\nLOAD_ATTR b\nLOAD_ATTR c\nRETURN_VALUE").unwrap()
    }

    fn scope() -> Scope {
        let inner = Rc::new(Record::new("Inner").with("c", 5));
        let outer = Rc::new(Record::new("Outer").with("b", Value::Object(inner)));
        Scope::new().with("a", Value::Object(outer))
    }

    #[test]
    fn one_directive_per_load_attr() {
        let monitor = AttributeMonitor::new(Log::default());
        let code = chained();
        let directives = monitor.insertion_code(code.instructions());
        let indices: Vec<usize> = directives.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(directives.iter().all(|d| d.ops.len() == 6));
    }

    #[test]
    fn injected_code_reports_each_access_in_order() {
        let monitor = AttributeMonitor::new(Log::default());
        let code = chained();
        let spliced = code
            .splice(&monitor.insertion_code(code.instructions()))
            .unwrap();

        assert_eq!(evaluate(&spliced, &scope()), Ok(Value::Int(5)));
        assert_eq!(*monitor.hook().0.borrow(), vec!["Outer.b", "Inner.c"]);
    }

    #[test]
    fn dropped_monitor_turns_side_calls_into_no_ops() {
        let monitor = AttributeMonitor::new(Log::default());
        let code = chained();
        let spliced = code
            .splice(&monitor.insertion_code(code.instructions()))
            .unwrap();
        drop(monitor);

        assert_eq!(evaluate(&spliced, &scope()), Ok(Value::Int(5)));
    }

    #[test]
    fn site_listing() {
        let binder = NativeFunction::new("attribute_binder", |_, _| Ok(Value::None));
        let code = Code::new(attribute_site(&binder, &Rc::from("x")));
        insta::assert_snapshot!(code.to_string(), @r#"
DUP_TOP
LOAD_CONST <native attribute_binder>
ROT_TWO
LOAD_CONST "x"
CALL_FUNCTION 0x0002
POP_TOP
"#);
    }
}
