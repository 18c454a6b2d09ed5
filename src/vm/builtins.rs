//! Builtin functions resolvable by name from any expression.

use std::rc::Rc;

use super::error::EvalError;
use super::value::Value;

/// The builtin callables. `getattr` is the dynamic attribute lookup
/// primitive that call monitors look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    GetAttr,
    Len,
    Str,
    Abs,
}

impl Builtin {
    pub const ALL: [Builtin; 4] = [Builtin::GetAttr, Builtin::Len, Builtin::Str, Builtin::Abs];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::GetAttr => "getattr",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Abs => "abs",
        }
    }

    /// Resolve a global name to a builtin.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn call(self, args: &[Value], kwargs: &[(Rc<str>, Value)]) -> Result<Value, EvalError> {
        if !kwargs.is_empty() {
            return Err(EvalError::Type(format!(
                "{}() takes no keyword arguments",
                self.name()
            )));
        }
        match self {
            Builtin::GetAttr => getattr(args),
            Builtin::Len => {
                let [value] = expect_args::<1>(self, args)?;
                let len = match value {
                    Value::Str(s) => s.chars().count(),
                    Value::Tuple(items) => items.len(),
                    other => {
                        return Err(EvalError::Type(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                i64::try_from(len).map(Value::Int).map_err(|_| EvalError::Overflow)
            }
            Builtin::Str => {
                let [value] = expect_args::<1>(self, args)?;
                Ok(match value {
                    Value::Str(_) => value.clone(),
                    other => Value::from(other.to_string()),
                })
            }
            Builtin::Abs => {
                let [value] = expect_args::<1>(self, args)?;
                match value {
                    Value::Int(i) => i.checked_abs().map(Value::Int).ok_or(EvalError::Overflow),
                    Value::Float(x) => Ok(Value::Float(x.abs())),
                    other => Err(EvalError::Type(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                }
            }
        }
    }
}

fn expect_args<const N: usize>(builtin: Builtin, args: &[Value]) -> Result<&[Value; N], EvalError> {
    args.try_into().map_err(|_| {
        EvalError::Type(format!(
            "{}() takes exactly {} argument(s) ({} given)",
            builtin.name(),
            N,
            args.len()
        ))
    })
}

/// `getattr(obj, name[, default])`.
fn getattr(args: &[Value]) -> Result<Value, EvalError> {
    let (target, name, default) = match args {
        [target, name] => (target, name, None),
        [target, name, default] => (target, name, Some(default)),
        _ => {
            return Err(EvalError::Type(format!(
                "getattr expected 2 or 3 arguments, got {}",
                args.len()
            )))
        }
    };
    let Some(name) = name.as_str() else {
        return Err(EvalError::Type(
            "getattr(): attribute name must be string".to_owned(),
        ));
    };
    match (load_attr(target, name), default) {
        (Ok(value), _) => Ok(value),
        (Err(EvalError::Attribute { .. }), Some(default)) => Ok(default.clone()),
        (Err(err), _) => Err(err),
    }
}

/// Attribute lookup shared by `LOAD_ATTR` and `getattr`.
pub fn load_attr(target: &Value, name: &str) -> Result<Value, EvalError> {
    let found = match target {
        Value::Object(obj) => obj.get_attr(name),
        _ => None,
    };
    found.ok_or_else(|| EvalError::Attribute {
        type_name: target.type_name().to_owned(),
        attr: name.to_owned(),
    })
}
