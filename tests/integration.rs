//! Integration tests for exprwatch.
//!
//! These tests exercise the public API from outside the crate: expressions
//! are assembled from listings, instrumented, evaluated against observable
//! models, and the resulting listeners are checked through the public
//! counters and recorded notification events.

use std::cell::RefCell;
use std::rc::Rc;

use exprwatch::binding::{BindingPolicy, GetattrBinder, Hookup};
use exprwatch::monitor::{instrument, CallHook, CallMonitor};
use exprwatch::object::{Model, Schema};
use exprwatch::testing::EventRecorder;
use exprwatch::vm::{evaluate, Builtin, EvalError, NativeFunction};
use exprwatch::{BindingConfig, Code, ExpressionBinding, NotifierProxy, Scope, Value};

fn listing(text: &str) -> Code {
    Code::parse_listing(text).unwrap()
}

fn point(x: i64, y: i64) -> Rc<Model> {
    let schema = Rc::new(Schema::new("Point").observable("x").observable("y"));
    Model::new(&schema).with("x", x).with("y", y)
}

// ---------------------------------------------------------------------------
// One listener per (object, attribute)
// ---------------------------------------------------------------------------

#[test]
fn test_repeated_reads_attach_one_listener() {
    let p = point(3, 0);
    let code = listing(
        "LOAD_NAME p
         LOAD_ATTR x
         LOAD_NAME p
         LOAD_ATTR x
         BINARY_MULTIPLY
         RETURN_VALUE",
    );
    let recorder = EventRecorder::new();
    let binding = ExpressionBinding::new(
        code,
        Scope::new().with("p", Value::Object(p.clone())),
        BindingConfig::default(),
        recorder.callback(),
    )
    .unwrap();

    assert_eq!(binding.evaluate(), Ok(Value::Int(9)));
    assert_eq!(binding.dependency_count(), 1);
    assert_eq!(p.observer_count(), 1);

    p.set("x", 4).unwrap();
    assert_eq!(recorder.names(), vec!["Point.x"]);
    let event = &recorder.events()[0];
    assert_eq!(event.old, Value::Int(3));
    assert_eq!(event.new, Value::Int(4));
}

#[test]
fn test_reevaluating_does_not_accumulate_listeners() {
    let p = point(1, 2);
    let code = listing("LOAD_NAME p\nLOAD_ATTR x\nLOAD_NAME p\nLOAD_ATTR y\nBINARY_ADD\nRETURN_VALUE");
    let binding = ExpressionBinding::new(
        code,
        Scope::new().with("p", Value::Object(p.clone())),
        BindingConfig::default(),
        |_, _| {},
    )
    .unwrap();

    for _ in 0..5 {
        binding.evaluate().unwrap();
    }
    assert_eq!(binding.dependency_count(), 2);
    assert_eq!(p.observer_count(), 2);
}

// ---------------------------------------------------------------------------
// Reset
// ---------------------------------------------------------------------------

#[test]
fn test_reset_severs_every_listener() {
    let a = point(1, 0);
    let b = point(2, 0);
    let code = listing("LOAD_NAME a\nLOAD_ATTR x\nLOAD_NAME b\nLOAD_ATTR x\nBINARY_ADD\nRETURN_VALUE");
    let recorder = EventRecorder::new();
    let binding = ExpressionBinding::new(
        code,
        Scope::new()
            .with("a", Value::Object(a.clone()))
            .with("b", Value::Object(b.clone())),
        BindingConfig::default(),
        recorder.callback(),
    )
    .unwrap();
    binding.evaluate().unwrap();
    assert_eq!(binding.dependency_count(), 2);

    binding.reset();
    assert_eq!(binding.dependency_count(), 0);
    a.set("x", 10).unwrap();
    b.set("x", 20).unwrap();
    assert!(recorder.is_empty());

    assert_eq!(binding.evaluate(), Ok(Value::Int(30)));
    a.set("x", 11).unwrap();
    assert_eq!(recorder.names(), vec!["Point.x"]);
}

#[test]
fn test_proxy_reset_invalidates_outstanding_disconnectors() {
    let recorder = EventRecorder::new();
    let proxy = NotifierProxy::new(recorder.notify_callback());
    let p = point(0, 0);
    let mut policy = BindingPolicy::new(&proxy);
    policy.do_binding(&Value::Object(p.clone()), "x");

    let before = proxy.generation();
    proxy.reset();
    assert!(proxy.generation() > before);
    p.set("x", 1).unwrap();
    assert!(recorder.is_empty());
}

// ---------------------------------------------------------------------------
// Identity keying
// ---------------------------------------------------------------------------

#[test]
fn test_equal_objects_are_listened_to_separately() {
    let a = point(1, 1);
    let b = point(1, 1);
    let code = listing("LOAD_NAME a\nLOAD_ATTR x\nLOAD_NAME b\nLOAD_ATTR x\nBINARY_ADD\nRETURN_VALUE");
    let binding = ExpressionBinding::new(
        code,
        Scope::new()
            .with("a", Value::Object(a.clone()))
            .with("b", Value::Object(b.clone())),
        BindingConfig::default(),
        |_, _| {},
    )
    .unwrap();
    binding.evaluate().unwrap();
    assert_eq!(binding.dependency_count(), 2);
    assert_eq!(a.observer_count(), 1);
    assert_eq!(b.observer_count(), 1);
}

#[test]
fn test_one_object_under_two_names_is_listened_to_once() {
    let p = point(2, 0);
    let code = listing("LOAD_NAME a\nLOAD_ATTR x\nLOAD_NAME b\nLOAD_ATTR x\nBINARY_ADD\nRETURN_VALUE");
    let binding = ExpressionBinding::new(
        code,
        Scope::new()
            .with("a", Value::Object(p.clone()))
            .with("b", Value::Object(p.clone())),
        BindingConfig::default(),
        |_, _| {},
    )
    .unwrap();
    assert_eq!(binding.evaluate(), Ok(Value::Int(4)));
    assert_eq!(binding.dependency_count(), 1);
    assert_eq!(p.observer_count(), 1);
}

// ---------------------------------------------------------------------------
// Call monitoring
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CallSpy {
    calls: RefCell<Vec<(String, Vec<Value>, Vec<(String, Value)>)>>,
}

impl CallHook for CallSpy {
    fn monitor_function(&self, func: &Value, args: &[Value], kwargs: &[(Rc<str>, Value)]) {
        let name = match func {
            Value::Native(f) => f.name().to_owned(),
            Value::Builtin(b) => b.name().to_owned(),
            other => other.type_name().to_owned(),
        };
        let kwargs = kwargs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.calls.borrow_mut().push((name, args.to_vec(), kwargs));
    }
}

fn describe_call() -> Rc<NativeFunction> {
    NativeFunction::new("f", |args, kwargs| {
        let mut parts: Vec<Value> = args.to_vec();
        for (name, value) in kwargs {
            parts.push(Value::tuple([Value::str(&**name), value.clone()]));
        }
        Ok(Value::tuple(parts))
    })
}

#[test]
fn test_call_monitor_sees_positional_and_keyword_arguments() {
    // f(a, b, k=v)
    let code = listing(
        "LOAD_NAME f
         LOAD_NAME a
         LOAD_NAME b
         LOAD_CONST \"k\"
         LOAD_NAME v
         CALL_FUNCTION 0x0102
         RETURN_VALUE",
    );
    let scope = Scope::new()
        .with("f", describe_call())
        .with("a", 1)
        .with("b", "two")
        .with("v", 3.5);

    let monitor = CallMonitor::new(CallSpy::default());
    let instrumented = instrument(&code, &[&monitor]).unwrap();
    assert_eq!(instrumented.len(), code.len() + 7);

    let expected = Value::tuple([
        Value::Int(1),
        Value::str("two"),
        Value::tuple([Value::str("k"), Value::Float(3.5)]),
    ]);
    assert_eq!(evaluate(&code, &scope), Ok(expected.clone()));
    assert_eq!(evaluate(&instrumented, &scope), Ok(expected));

    let calls = monitor.hook().calls.borrow();
    assert_eq!(calls.len(), 1);
    let (name, args, kwargs) = &calls[0];
    assert_eq!(name, "f");
    assert_eq!(args, &vec![Value::Int(1), Value::str("two")]);
    assert_eq!(kwargs, &vec![("k".to_owned(), Value::Float(3.5))]);
}

#[test]
fn test_call_monitor_sees_nested_calls_in_evaluation_order() {
    // abs(len("abc") - 5)
    let code = listing(
        "LOAD_NAME abs
         LOAD_NAME len
         LOAD_CONST \"abc\"
         CALL_FUNCTION 1
         LOAD_CONST 5
         BINARY_SUBTRACT
         CALL_FUNCTION 1
         RETURN_VALUE",
    );
    let monitor = CallMonitor::new(CallSpy::default());
    let instrumented = instrument(&code, &[&monitor]).unwrap();
    assert_eq!(evaluate(&instrumented, &Scope::new()), Ok(Value::Int(2)));

    let names: Vec<String> = monitor
        .hook()
        .calls
        .borrow()
        .iter()
        .map(|(name, _, _)| name.clone())
        .collect();
    assert_eq!(names, vec!["len", "abs"]);
}

#[test]
fn test_dropped_monitor_leaves_instrumented_code_working() {
    let code = listing("LOAD_NAME len\nLOAD_CONST \"abcd\"\nCALL_FUNCTION 1\nRETURN_VALUE");
    let monitor = CallMonitor::new(CallSpy::default());
    let instrumented = instrument(&code, &[&monitor]).unwrap();
    drop(monitor);
    assert_eq!(evaluate(&instrumented, &Scope::new()), Ok(Value::Int(4)));
}

// ---------------------------------------------------------------------------
// getattr recognition
// ---------------------------------------------------------------------------

#[test]
fn test_getattr_two_and_three_argument_forms_are_tracked() {
    let p = point(1, 2);
    // getattr(p, "x") + getattr(p, "y", 0)
    let code = listing(
        "LOAD_NAME getattr
         LOAD_NAME p
         LOAD_CONST \"x\"
         CALL_FUNCTION 2
         LOAD_NAME getattr
         LOAD_NAME p
         LOAD_CONST \"y\"
         LOAD_CONST 0
         CALL_FUNCTION 3
         BINARY_ADD
         RETURN_VALUE",
    );
    let recorder = EventRecorder::new();
    let binding = ExpressionBinding::new(
        code,
        Scope::new().with("p", Value::Object(p.clone())),
        BindingConfig::default().with_monitor_attributes(false),
        recorder.callback(),
    )
    .unwrap();

    assert_eq!(binding.evaluate(), Ok(Value::Int(3)));
    assert_eq!(binding.dependency_count(), 2);

    p.set("y", 10).unwrap();
    assert_eq!(recorder.names(), vec!["Point.y"]);
}

#[test]
fn test_getattr_with_keywords_or_other_callees_is_ignored() {
    let proxy = NotifierProxy::new(|_| {});
    let binder = GetattrBinder::new(&proxy);
    let p = Value::Object(point(0, 0));

    binder.monitor_function(
        &Value::Builtin(Builtin::GetAttr),
        &[p.clone(), Value::str("x")],
        &[(Rc::from("default"), Value::None)],
    );
    binder.monitor_function(&Value::Builtin(Builtin::Len), &[p.clone(), Value::str("x")], &[]);
    binder.monitor_function(&Value::Builtin(Builtin::GetAttr), &[p.clone(), Value::Int(7)], &[]);
    assert!(binder.policy().is_empty());

    binder.monitor_function(&Value::Builtin(Builtin::GetAttr), &[p, Value::str("x")], &[]);
    assert_eq!(binder.policy().len(), 1);
}

#[test]
fn test_getattr_keyword_call_fails_without_tracking() {
    let p = point(0, 0);
    // getattr(p, "x", default=None)
    let code = listing(
        "LOAD_NAME getattr
         LOAD_NAME p
         LOAD_CONST \"x\"
         LOAD_CONST \"default\"
         LOAD_CONST None
         CALL_FUNCTION 0x0102
         RETURN_VALUE",
    );
    let binding = ExpressionBinding::new(
        code,
        Scope::new().with("p", Value::Object(p.clone())),
        BindingConfig::default(),
        |_, _| {},
    )
    .unwrap();
    assert!(matches!(binding.evaluate(), Err(EvalError::Type(_))));
    assert_eq!(binding.dependency_count(), 0);
    assert_eq!(p.observer_count(), 0);
}

// ---------------------------------------------------------------------------
// Weak references
// ---------------------------------------------------------------------------

#[test]
fn test_listeners_do_not_keep_objects_alive() {
    let proxy = NotifierProxy::new(|_| {});
    let mut policy = BindingPolicy::new(&proxy);
    let p = point(0, 0);
    let weak = Rc::downgrade(&p);

    assert!(matches!(
        policy.do_binding(&Value::Object(p.clone()), "x"),
        Hookup::Attached(_)
    ));
    assert_eq!(Rc::strong_count(&p), 1);

    drop(p);
    assert!(weak.upgrade().is_none());
    assert_eq!(policy.prune(), 1);
    assert!(policy.is_empty());
}

#[test]
fn test_listeners_do_not_keep_the_channel_alive() {
    let p = point(0, 0);
    let proxy = NotifierProxy::new(|_| panic!("channel should be gone"));
    let mut policy = BindingPolicy::new(&proxy);
    policy.do_binding(&Value::Object(p.clone()), "x");

    drop(proxy);
    p.set("x", 1).unwrap();
    assert_eq!(
        policy.do_binding(&Value::Object(p.clone()), "y"),
        Hookup::Detached
    );
}

// ---------------------------------------------------------------------------
// Reactive expressions
// ---------------------------------------------------------------------------

fn collecting() -> (Rc<RefCell<Vec<Value>>>, impl Fn(Result<Value, EvalError>)) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = {
        let seen = Rc::clone(&seen);
        move |result: Result<Value, EvalError>| seen.borrow_mut().push(result.unwrap())
    };
    (seen, sink)
}

#[test]
fn test_reactive_binding_reevaluates_on_change() {
    let p = point(1, 0);
    let (seen, sink) = collecting();
    let _binding = ExpressionBinding::reactive(
        listing("LOAD_NAME p\nLOAD_ATTR x\nLOAD_CONST 1\nBINARY_ADD\nRETURN_VALUE"),
        Scope::new().with("p", Value::Object(p.clone())),
        BindingConfig::default(),
        sink,
    )
    .unwrap();

    p.set("x", 5).unwrap();
    p.set("x", 5).unwrap();
    p.set("y", 9).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Int(2), Value::Int(6)]);
}

#[test]
fn test_reactive_binding_follows_the_branch_taken() {
    let schema = Rc::new(
        Schema::new("State")
            .observable("flag")
            .observable("a")
            .observable("b"),
    );
    let s = Model::new(&schema).with("flag", true).with("a", 1).with("b", 2);
    // s.a if s.flag else s.b
    let code = listing(
        "LOAD_NAME s
         LOAD_ATTR flag
         POP_JUMP_IF_FALSE other
         LOAD_NAME s
         LOAD_ATTR a
         RETURN_VALUE
         other:
         LOAD_NAME s
         LOAD_ATTR b
         RETURN_VALUE",
    );
    let (seen, sink) = collecting();
    let binding = ExpressionBinding::reactive(
        code,
        Scope::new().with("s", Value::Object(s.clone())),
        BindingConfig::default(),
        sink,
    )
    .unwrap();
    assert_eq!(binding.dependency_count(), 2);

    s.set("b", 20).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Int(1)]);

    s.set("flag", false).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Int(1), Value::Int(20)]);

    s.set("a", 100).unwrap();
    assert_eq!(seen.borrow().len(), 2);

    s.set("b", 21).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![Value::Int(1), Value::Int(20), Value::Int(21)]
    );
    assert_eq!(s.observer_count(), 2);
}
