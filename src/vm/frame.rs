//! The interpreter: evaluates a [`Code`] against a [`Scope`].

use std::collections::HashMap;
use std::rc::Rc;

use super::builtins::{load_attr, Builtin};
use super::code::Code;
use super::error::EvalError;
use super::instruction::{ArgSpec, BinaryOp, CompareOp, Instruction, Label};
use super::value::{Kwargs, Value};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Name bindings visible to an expression. Builtins are consulted after the
/// scope, so a scope entry can shadow one.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: HashMap<Rc<str>, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name (builder).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.names.insert(Rc::from(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names.get(name)
    }

    /// Resolve a name: scope first, then builtins.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name)
            .cloned()
            .or_else(|| Builtin::lookup(name).map(Value::Builtin))
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Execution state for one evaluation.
pub struct Frame<'a> {
    code: &'a Code,
    scope: &'a Scope,
    stack: Vec<Value>,
    labels: HashMap<Label, usize>,
    pc: usize,
}

impl<'a> Frame<'a> {
    pub fn new(code: &'a Code, scope: &'a Scope) -> Self {
        let labels = code
            .instructions()
            .iter()
            .enumerate()
            .filter_map(|(idx, op)| match op {
                Instruction::SetLabel(label) => Some((*label, idx)),
                _ => None,
            })
            .collect();
        Self {
            code,
            scope,
            stack: Vec::new(),
            labels,
            pc: 0,
        }
    }

    /// Index of the next instruction to execute.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Current stack height. Useful when stepping.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Run to `RETURN_VALUE`.
    pub fn run(mut self) -> Result<Value, EvalError> {
        loop {
            if let Some(value) = self.step()? {
                return Ok(value);
            }
        }
    }

    /// Execute one instruction. Returns the result once `RETURN_VALUE` runs.
    pub fn step(&mut self) -> Result<Option<Value>, EvalError> {
        let index = self.pc;
        let op = self
            .code
            .instructions()
            .get(index)
            .ok_or(EvalError::MissingReturn)?;
        self.pc += 1;

        let effect = op.stack_effect(false);
        if self.stack.len() < effect.pops {
            return Err(EvalError::StackUnderflow {
                index,
                opname: op.opname(),
            });
        }

        match op {
            Instruction::SetLabel(_) => {}
            Instruction::LoadConst(value) => self.stack.push(value.clone()),
            Instruction::LoadName(name) => {
                let value = self
                    .scope
                    .resolve(name)
                    .ok_or_else(|| EvalError::Name(name.to_string()))?;
                self.stack.push(value);
            }
            Instruction::LoadAttr(name) => {
                let target = self.pop();
                self.stack.push(load_attr(&target, name)?);
            }
            Instruction::DupTop => {
                let top = self.top().clone();
                self.stack.push(top);
            }
            Instruction::RotTwo => {
                let len = self.stack.len();
                self.stack.swap(len - 1, len - 2);
            }
            Instruction::RotThree => {
                let top = self.pop();
                let len = self.stack.len();
                self.stack.insert(len - 2, top);
            }
            Instruction::PopTop => {
                self.pop();
            }
            Instruction::BuildTuple(n) => {
                let items = self.pop_n(*n);
                self.stack.push(Value::tuple(items));
            }
            Instruction::UnpackSequence(n) => {
                let seq = self.pop();
                let items = seq.as_tuple().ok_or_else(|| {
                    EvalError::Type(format!("cannot unpack non-sequence {}", seq.type_name()))
                })?;
                if items.len() != *n {
                    return Err(EvalError::Unpack {
                        expected: *n,
                        found: items.len(),
                    });
                }
                self.stack.extend(items.iter().rev().cloned());
            }
            Instruction::Binary(bin) => {
                let rhs = self.pop();
                let lhs = self.pop();
                self.stack.push(binary(*bin, &lhs, &rhs)?);
            }
            Instruction::Compare(cmp) => {
                let rhs = self.pop();
                let lhs = self.pop();
                self.stack.push(Value::Bool(compare(*cmp, &lhs, &rhs)?));
            }
            Instruction::UnaryNot => {
                let value = self.pop();
                self.stack.push(Value::Bool(!value.is_truthy()));
            }
            Instruction::UnaryNegative => {
                let value = self.pop();
                let negated = match value {
                    Value::Int(i) => Value::Int(i.checked_neg().ok_or(EvalError::Overflow)?),
                    Value::Float(x) => Value::Float(-x),
                    other => {
                        return Err(EvalError::Type(format!(
                            "bad operand type for unary -: '{}'",
                            other.type_name()
                        )))
                    }
                };
                self.stack.push(negated);
            }
            Instruction::CallFunction(raw) => self.call(*raw, false, false)?,
            Instruction::CallFunctionVar(raw) => self.call(*raw, true, false)?,
            Instruction::CallFunctionKw(raw) => self.call(*raw, false, true)?,
            Instruction::CallFunctionVarKw(raw) => self.call(*raw, true, true)?,
            Instruction::Jump(label) => self.jump(*label)?,
            Instruction::PopJumpIfFalse(label) => {
                if !self.pop().is_truthy() {
                    self.jump(*label)?;
                }
            }
            Instruction::PopJumpIfTrue(label) => {
                if self.pop().is_truthy() {
                    self.jump(*label)?;
                }
            }
            Instruction::JumpIfFalseOrPop(label) => {
                if self.top().is_truthy() {
                    self.pop();
                } else {
                    self.jump(*label)?;
                }
            }
            Instruction::JumpIfTrueOrPop(label) => {
                if self.top().is_truthy() {
                    self.jump(*label)?;
                } else {
                    self.pop();
                }
            }
            Instruction::ReturnValue => return Ok(Some(self.pop())),
        }
        Ok(None)
    }

    // Callers check the stack effect before popping, so these never underflow.
    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    fn top(&self) -> &Value {
        self.stack.last().unwrap_or(&Value::None)
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    fn jump(&mut self, label: Label) -> Result<(), EvalError> {
        self.pc = *self
            .labels
            .get(&label)
            .ok_or(EvalError::UndefinedLabel(label))?;
        Ok(())
    }

    /// Stack layout, bottom to top: callable, positional args, keyword
    /// name/value pairs, then `*args` and `**kwargs` when present.
    fn call(&mut self, raw: u16, var: bool, kw: bool) -> Result<(), EvalError> {
        let spec = ArgSpec::decode(raw);
        let extra_kwargs = if kw { Some(self.pop()) } else { None };
        let extra_args = if var { Some(self.pop()) } else { None };
        let slots = self.pop_n(spec.stack_slots());
        let func = self.pop();

        let positional = usize::from(spec.positional);
        let mut args = slots[..positional].to_vec();
        let mut kwargs: Kwargs = Vec::with_capacity(usize::from(spec.keyword));
        for pair in slots[positional..].chunks_exact(2) {
            kwargs.push(keyword_pair(&pair[0], &pair[1])?);
        }
        if let Some(star) = extra_args {
            let items = star.as_tuple().ok_or_else(|| {
                EvalError::Type(format!("argument after * must be a tuple, not {}", star.type_name()))
            })?;
            args.extend(items.iter().cloned());
        }
        if let Some(mapping) = extra_kwargs {
            let pairs = mapping.as_tuple().ok_or_else(|| {
                EvalError::Type(format!(
                    "argument after ** must be a mapping, not {}",
                    mapping.type_name()
                ))
            })?;
            for pair in pairs.iter() {
                match pair.as_tuple() {
                    Some([name, value]) => kwargs.push(keyword_pair(name, value)?),
                    _ => {
                        return Err(EvalError::Type(
                            "argument after ** must be a tuple of (name, value) pairs".to_owned(),
                        ))
                    }
                }
            }
        }

        let result = call_value(&func, &args, &kwargs)?;
        self.stack.push(result);
        Ok(())
    }
}

fn keyword_pair(name: &Value, value: &Value) -> Result<(Rc<str>, Value), EvalError> {
    match name {
        Value::Str(name) => Ok((Rc::clone(name), value.clone())),
        other => Err(EvalError::Type(format!(
            "keywords must be strings, not {}",
            other.type_name()
        ))),
    }
}

/// Invoke any callable value.
pub fn call_value(
    func: &Value,
    args: &[Value],
    kwargs: &[(Rc<str>, Value)],
) -> Result<Value, EvalError> {
    match func {
        Value::Builtin(builtin) => builtin.call(args, kwargs),
        Value::Native(native) => native.call(args, kwargs),
        other => Err(EvalError::Type(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    use Value::{Float, Int};

    let unsupported = || {
        EvalError::Type(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.opname(),
            lhs.type_name(),
            rhs.type_name()
        ))
    };

    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::from(format!("{a}{b}"))),
        (BinaryOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned()))
        }
        (_, Int(a), Int(b)) => {
            let (a, b) = (*a, *b);
            let checked = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::TrueDivide => {
                    if b == 0 {
                        return Err(EvalError::ZeroDivision);
                    }
                    return Ok(Float(a as f64 / b as f64));
                }
                BinaryOp::Modulo => {
                    if b == 0 {
                        return Err(EvalError::ZeroDivision);
                    }
                    if b == -1 {
                        // checked_rem rejects i64::MIN % -1.
                        Some(0)
                    } else {
                        // Result takes the sign of the divisor.
                        a.checked_rem(b)
                            .map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
                    }
                }
            };
            checked.map(Int).ok_or(EvalError::Overflow)
        }
        (_, Int(_) | Float(_), Int(_) | Float(_)) => {
            let (a, b) = (as_float(lhs), as_float(rhs));
            match op {
                BinaryOp::Add => Ok(Float(a + b)),
                BinaryOp::Subtract => Ok(Float(a - b)),
                BinaryOp::Multiply => Ok(Float(a * b)),
                BinaryOp::TrueDivide | BinaryOp::Modulo if b == 0.0 => Err(EvalError::ZeroDivision),
                BinaryOp::TrueDivide => Ok(Float(a / b)),
                BinaryOp::Modulo => Ok(Float(a - b * (a / b).floor())),
            }
        }
        _ => Err(unsupported()),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    use std::cmp::Ordering;

    match op {
        CompareOp::Eq => return Ok(lhs == rhs),
        CompareOp::Ne => return Ok(lhs != rhs),
        _ => {}
    }
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            as_float(lhs).partial_cmp(&as_float(rhs))
        }
        _ => {
            return Err(EvalError::Type(format!(
                "'{}' not supported between '{}' and '{}'",
                op.mnemonic(),
                lhs.type_name(),
                rhs.type_name()
            )))
        }
    };
    Ok(match (op, ordering) {
        (_, None) => false,
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
        (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
    })
}

/// Evaluate `code` against `scope`.
pub fn evaluate(code: &Code, scope: &Scope) -> Result<Value, EvalError> {
    Frame::new(code, scope).run()
}
