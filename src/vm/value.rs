//! Runtime values manipulated by the expression VM.
//!
//! Scalars and tuples are plain data. Objects, builtins and native functions
//! are reference types: they compare by identity, never by content, so that
//! instrumentation can reason about "the same object" without requiring any
//! notion of equality from the object system.

use std::fmt;
use std::rc::Rc;

use crate::object::{Object, ObjectRef};

use super::builtins::Builtin;
use super::error::EvalError;

/// Keyword arguments in call order: `(name, value)` pairs.
pub type Kwargs = Vec<(Rc<str>, Value)>;

/// Signature of a host closure callable from instrumented code.
pub type NativeFn = dyn Fn(&[Value], &[(Rc<str>, Value)]) -> Result<Value, EvalError>;

// ---------------------------------------------------------------------------
// NativeFunction
// ---------------------------------------------------------------------------

/// A host closure that can be loaded as a constant and called by the VM.
///
/// Monitors use these as the side-calls they splice into an expression.
pub struct NativeFunction {
    name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    /// Wrap a closure under a display name.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value], &[(Rc<str>, Value)]) -> Result<Value, EvalError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            func: Box::new(func),
        })
    }

    /// The display name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the closure.
    pub fn call(&self, args: &[Value], kwargs: &[(Rc<str>, Value)]) -> Result<Value, EvalError> {
        (self.func)(args, kwargs)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed VM value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    Object(ObjectRef),
    Builtin(Builtin),
    Native(Rc<NativeFunction>),
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Build a tuple value from any iterator of values.
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::Object(obj) => obj.type_name(),
            Value::Builtin(_) => "builtin_function",
            Value::Native(_) => "native_function",
        }
    }

    /// Truthiness used by conditional jumps and `UNARY_NOT`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Object(_) | Value::Builtin(_) | Value::Native(_) => true,
        }
    }

    /// Borrow the text of a `Str` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    /// Borrow the items of a `Tuple` value.
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(&**items),
            _ => None,
        }
    }

    /// Borrow the shared object of an `Object` value.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

}

/// Identity comparison for shared objects (ignores vtable pointers).
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const (),
        Rc::as_ptr(b) as *const (),
    )
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => same_object(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(&items).finish(),
            Value::Object(obj) => write!(
                f,
                "Object(<{} at {:p}>)",
                obj.type_name(),
                Rc::as_ptr(obj) as *const ()
            ),
            Value::Builtin(b) => write!(f, "Builtin({})", b.name()),
            Value::Native(n) => write!(f, "Native({})", n.name()),
        }
    }
}

/// Literal rendering, as used by listings and the `str` builtin.
///
/// Strings render quoted; use [`Value::as_str`] for the raw text.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{:?}", &**s),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Object(obj) => write!(f, "<{} object>", obj.type_name()),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
            Value::Native(n) => write!(f, "<native {}>", n.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Builtin> for Value {
    fn from(b: Builtin) -> Self {
        Value::Builtin(b)
    }
}

impl From<Rc<NativeFunction>> for Value {
    fn from(n: Rc<NativeFunction>) -> Self {
        Value::Native(n)
    }
}
