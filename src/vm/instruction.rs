//! The instruction set: one enum variant per operation, with typed operands
//! and explicit stack-effect annotations.

use std::fmt;
use std::rc::Rc;

use super::value::Value;

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// A jump target. Placed in a sequence with [`Instruction::SetLabel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArgSpec
// ---------------------------------------------------------------------------

/// Decoded operand of the `CALL_FUNCTION` family.
///
/// The low byte counts positional arguments; the next byte counts keyword
/// arguments, each of which occupies two stack slots (name, then value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArgSpec {
    pub positional: u8,
    pub keyword: u8,
}

impl ArgSpec {
    pub fn new(positional: u8, keyword: u8) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    /// Split a raw operand. Only the low 16 bits are significant.
    pub fn decode(raw: u16) -> Self {
        Self {
            positional: (raw & 0xFF) as u8,
            keyword: ((raw >> 8) & 0xFF) as u8,
        }
    }

    pub fn encode(self) -> u16 {
        u16::from(self.positional) | (u16::from(self.keyword) << 8)
    }

    /// Number of stack slots between the callable and the top of stack.
    pub fn stack_slots(self) -> usize {
        usize::from(self.positional) + 2 * usize::from(self.keyword)
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    TrueDivide,
    Modulo,
}

impl BinaryOp {
    pub fn opname(self) -> &'static str {
        match self {
            BinaryOp::Add => "BINARY_ADD",
            BinaryOp::Subtract => "BINARY_SUBTRACT",
            BinaryOp::Multiply => "BINARY_MULTIPLY",
            BinaryOp::TrueDivide => "BINARY_TRUE_DIVIDE",
            BinaryOp::Modulo => "BINARY_MODULO",
        }
    }
}

/// Comparison operators for `COMPARE_OP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl CompareOp {
    /// Listing mnemonic (`lt`, `eq`, ...).
    pub fn mnemonic(self) -> &'static str {
        match self {
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// StackEffect
// ---------------------------------------------------------------------------

/// How many slots an instruction pops and then pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

impl StackEffect {
    const fn new(pops: usize, pushes: usize) -> Self {
        Self { pops, pushes }
    }

    /// Net change in stack height.
    pub fn net(self) -> isize {
        self.pushes as isize - self.pops as isize
    }
}

// ---------------------------------------------------------------------------
// Instruction
// ---------------------------------------------------------------------------

/// A single VM instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Pseudo-instruction marking a jump target. No runtime effect.
    SetLabel(Label),
    LoadConst(Value),
    LoadName(Rc<str>),
    LoadAttr(Rc<str>),
    DupTop,
    RotTwo,
    /// Moves TOS down to the third position, lifting the other two.
    RotThree,
    PopTop,
    BuildTuple(usize),
    /// Pops a tuple and pushes its items so that item 0 ends on top.
    UnpackSequence(usize),
    Binary(BinaryOp),
    Compare(CompareOp),
    UnaryNot,
    UnaryNegative,
    /// Raw operand, see [`ArgSpec`].
    CallFunction(u16),
    /// Like `CallFunction`, with a `*args` tuple on top of the keyword pairs.
    CallFunctionVar(u16),
    /// Like `CallFunction`, with a `**kwargs` pair tuple on top.
    CallFunctionKw(u16),
    /// Both `*args` and `**kwargs` (the latter on top).
    CallFunctionVarKw(u16),
    Jump(Label),
    PopJumpIfFalse(Label),
    PopJumpIfTrue(Label),
    /// Jumps keeping TOS if it is falsy, otherwise pops it and falls through.
    JumpIfFalseOrPop(Label),
    /// Jumps keeping TOS if it is truthy, otherwise pops it and falls through.
    JumpIfTrueOrPop(Label),
    ReturnValue,
}

impl Instruction {
    /// Listing name in upper snake case.
    pub fn opname(&self) -> &'static str {
        match self {
            Instruction::SetLabel(_) => "SET_LABEL",
            Instruction::LoadConst(_) => "LOAD_CONST",
            Instruction::LoadName(_) => "LOAD_NAME",
            Instruction::LoadAttr(_) => "LOAD_ATTR",
            Instruction::DupTop => "DUP_TOP",
            Instruction::RotTwo => "ROT_TWO",
            Instruction::RotThree => "ROT_THREE",
            Instruction::PopTop => "POP_TOP",
            Instruction::BuildTuple(_) => "BUILD_TUPLE",
            Instruction::UnpackSequence(_) => "UNPACK_SEQUENCE",
            Instruction::Binary(op) => op.opname(),
            Instruction::Compare(_) => "COMPARE_OP",
            Instruction::UnaryNot => "UNARY_NOT",
            Instruction::UnaryNegative => "UNARY_NEGATIVE",
            Instruction::CallFunction(_) => "CALL_FUNCTION",
            Instruction::CallFunctionVar(_) => "CALL_FUNCTION_VAR",
            Instruction::CallFunctionKw(_) => "CALL_FUNCTION_KW",
            Instruction::CallFunctionVarKw(_) => "CALL_FUNCTION_VAR_KW",
            Instruction::Jump(_) => "JUMP_FORWARD",
            Instruction::PopJumpIfFalse(_) => "POP_JUMP_IF_FALSE",
            Instruction::PopJumpIfTrue(_) => "POP_JUMP_IF_TRUE",
            Instruction::JumpIfFalseOrPop(_) => "JUMP_IF_FALSE_OR_POP",
            Instruction::JumpIfTrueOrPop(_) => "JUMP_IF_TRUE_OR_POP",
            Instruction::ReturnValue => "RETURN_VALUE",
        }
    }

    /// Stack effect of executing this instruction.
    ///
    /// `jump` selects the branch-taken effect for conditional jumps; it is
    /// ignored by every other instruction.
    pub fn stack_effect(&self, jump: bool) -> StackEffect {
        match self {
            Instruction::SetLabel(_) | Instruction::Jump(_) => StackEffect::new(0, 0),
            Instruction::LoadConst(_) | Instruction::LoadName(_) => StackEffect::new(0, 1),
            Instruction::LoadAttr(_) | Instruction::UnaryNot | Instruction::UnaryNegative => {
                StackEffect::new(1, 1)
            }
            Instruction::DupTop => StackEffect::new(1, 2),
            Instruction::RotTwo => StackEffect::new(2, 2),
            Instruction::RotThree => StackEffect::new(3, 3),
            Instruction::PopTop | Instruction::ReturnValue => StackEffect::new(1, 0),
            Instruction::BuildTuple(n) => StackEffect::new(*n, 1),
            Instruction::UnpackSequence(n) => StackEffect::new(1, *n),
            Instruction::Binary(_) | Instruction::Compare(_) => StackEffect::new(2, 1),
            Instruction::CallFunction(raw) => {
                StackEffect::new(ArgSpec::decode(*raw).stack_slots() + 1, 1)
            }
            Instruction::CallFunctionVar(raw) | Instruction::CallFunctionKw(raw) => {
                StackEffect::new(ArgSpec::decode(*raw).stack_slots() + 2, 1)
            }
            Instruction::CallFunctionVarKw(raw) => {
                StackEffect::new(ArgSpec::decode(*raw).stack_slots() + 3, 1)
            }
            Instruction::PopJumpIfFalse(_) | Instruction::PopJumpIfTrue(_) => {
                StackEffect::new(1, 0)
            }
            Instruction::JumpIfFalseOrPop(_) | Instruction::JumpIfTrueOrPop(_) => {
                if jump {
                    StackEffect::new(1, 1)
                } else {
                    StackEffect::new(1, 0)
                }
            }
        }
    }

    /// The label this instruction may transfer control to.
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instruction::Jump(l)
            | Instruction::PopJumpIfFalse(l)
            | Instruction::PopJumpIfTrue(l)
            | Instruction::JumpIfFalseOrPop(l)
            | Instruction::JumpIfTrueOrPop(l) => Some(*l),
            _ => None,
        }
    }

    /// Whether control never continues to the next instruction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Instruction::Jump(_) | Instruction::ReturnValue)
    }

    /// Whether this is any member of the call family.
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Instruction::CallFunction(_)
                | Instruction::CallFunctionVar(_)
                | Instruction::CallFunctionKw(_)
                | Instruction::CallFunctionVarKw(_)
        )
    }
}

/// Listing line for a single instruction (labels render as `L<n>:`).
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::SetLabel(label) => write!(f, "{label}:"),
            Instruction::LoadConst(value) => write!(f, "{} {value}", self.opname()),
            Instruction::LoadName(name) | Instruction::LoadAttr(name) => {
                write!(f, "{} {name}", self.opname())
            }
            Instruction::BuildTuple(n) | Instruction::UnpackSequence(n) => {
                write!(f, "{} {n}", self.opname())
            }
            Instruction::Compare(op) => write!(f, "{} {}", self.opname(), op.mnemonic()),
            Instruction::CallFunction(raw)
            | Instruction::CallFunctionVar(raw)
            | Instruction::CallFunctionKw(raw)
            | Instruction::CallFunctionVarKw(raw) => write!(f, "{} {raw:#06x}", self.opname()),
            other => match other.jump_target() {
                Some(label) => write!(f, "{} {label}", other.opname()),
                None => write!(f, "{}", other.opname()),
            },
        }
    }
}
