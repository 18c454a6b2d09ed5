//! A small stack VM for compiled expressions.
//!
//! Code objects are immutable instruction sequences. Instrumentation never
//! edits one in place: it splices directives into a copy with
//! [`Code::splice`] and checks the result with [`Code::stack_profile`].

pub mod builtins;
pub mod code;
pub mod error;
pub mod frame;
pub mod instruction;
pub mod listing;
pub mod value;

pub use builtins::Builtin;
pub use code::{Code, Insertion, StackProfile};
pub use error::{EvalError, SpliceError, StackError};
pub use frame::{call_value, evaluate, Frame, Scope};
pub use instruction::{ArgSpec, BinaryOp, CompareOp, Instruction, Label, StackEffect};
pub use listing::ListingError;
pub use value::{same_object, Kwargs, NativeFunction, Value};
