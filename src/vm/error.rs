//! Error types for evaluation, stack analysis and splicing.

use super::instruction::Label;

/// Errors raised while evaluating a [`Code`](super::Code).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("name `{0}` is not defined")]
    Name(String),
    #[error("'{type_name}' object has no attribute '{attr}'")]
    Attribute { type_name: String, attr: String },
    #[error("type error: {0}")]
    Type(String),
    #[error("expected {expected} values to unpack, got {found}")]
    Unpack { expected: usize, found: usize },
    #[error("division by zero")]
    ZeroDivision,
    #[error("integer overflow")]
    Overflow,
    #[error("stack underflow at instruction {index} ({opname})")]
    StackUnderflow { index: usize, opname: &'static str },
    #[error("jump to undefined label {0}")]
    UndefinedLabel(Label),
    #[error("code ended without RETURN_VALUE")]
    MissingReturn,
}

/// Errors found by static stack-depth analysis of a code sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("stack underflow at instruction {index} ({opname}): depth {depth}, needs {needs}")]
    Underflow {
        index: usize,
        opname: &'static str,
        depth: usize,
        needs: usize,
    },
    #[error("inconsistent stack depth at instruction {index}: {first} vs {second}")]
    Inconsistent {
        index: usize,
        first: usize,
        second: usize,
    },
    #[error("jump to undefined label {0}")]
    UndefinedLabel(Label),
    #[error("label {0} defined more than once")]
    DuplicateLabel(Label),
    #[error("execution falls off the end of the code")]
    FallsOffEnd,
}

/// Errors from [`Code::splice`](super::Code::splice).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpliceError {
    #[error("insertion index {index} is past the end of the code (len {len})")]
    OutOfRange { index: usize, len: usize },
}
