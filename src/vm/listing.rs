//! Textual instruction listings: a logos tokenizer and a small recursive
//! descent assembler that reads back what [`Code`]'s `Display` writes.
//!
//! ```text
//! # a.x if a else b
//! LOAD_NAME a
//! POP_JUMP_IF_FALSE else
//! LOAD_NAME a
//! LOAD_ATTR x
//! RETURN_VALUE
//! else:
//! LOAD_NAME b
//! RETURN_VALUE
//! ```
//!
//! Labels named `L<n>` keep their number; other label names are numbered
//! after the highest `L<n>` in order of first appearance. Only literal
//! constants (`None`, `True`, `False`, ints, floats, strings) can be
//! assembled; object and native constants are display-only.

use std::collections::HashMap;
use std::rc::Rc;
use std::str::FromStr;

use logos::Logos;

use super::code::Code;
use super::instruction::{BinaryOp, CompareOp, Instruction, Label};
use super::value::Value;

/// Errors from [`Code::parse_listing`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListingError {
    #[error("unexpected token at position {position}: {message}")]
    UnexpectedToken { position: usize, message: String },
    #[error("unexpected end of input: {0}")]
    UnexpectedEof(String),
    #[error("unknown opcode `{name}` at position {position}")]
    UnknownOpcode { position: usize, name: String },
    #[error("unrecognized input at byte {0}")]
    InvalidInput(usize),
    #[error("label `{0}` is never defined")]
    UndefinedLabel(String),
    #[error("label `{0}` is defined more than once")]
    DuplicateLabel(String),
    #[error("no label number left for `{0}`")]
    LabelOverflow(String),
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Listing token.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"([ \t\r\n\f]+|#[^\n]*)")]
pub enum Token {
    /// `0x0102`: call operands.
    #[regex(r"0x[0-9a-fA-F]+")]
    Hex,

    /// `1.5`, `-2.0e3`, `1e20`.
    #[regex(r"-?[0-9]+\.[0-9]+([eE][-+]?[0-9]+)?")]
    #[regex(r"-?[0-9]+[eE][-+]?[0-9]+")]
    Float,

    #[regex(r"-?[0-9]+")]
    Int,

    /// `-inf`; `inf` and `NaN` lex as words.
    #[token("-inf")]
    NegInf,

    /// Double-quoted string with backslash escapes.
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    /// Opcode names, identifiers, label names and keyword constants.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Word,

    #[token(":")]
    Colon,
}

/// A token with its source text and stream position.
#[derive(Debug, Clone)]
struct PToken {
    token: Token,
    text: String,
    pos: usize,
}

fn tokenize(input: &str) -> Result<Vec<PToken>, ListingError> {
    let mut tokens = Vec::new();
    for (pos, (result, span)) in Token::lexer(input).spanned().enumerate() {
        let token = result.map_err(|()| ListingError::InvalidInput(span.start))?;
        tokens.push(PToken {
            token,
            text: input[span].to_string(),
            pos,
        });
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// An instruction whose jump target is still a label name.
enum Pending {
    Ready(Instruction),
    Define(String),
    Jump(fn(Label) -> Instruction, String),
}

struct Parser {
    tokens: Vec<PToken>,
    cursor: usize,
}

impl Parser {
    fn is_eof(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    fn peek(&self) -> Option<&PToken> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self, context: &str) -> Result<PToken, ListingError> {
        let tok = self
            .tokens
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| ListingError::UnexpectedEof(context.to_owned()))?;
        self.cursor += 1;
        Ok(tok)
    }

    fn expect(&mut self, expected: Token, context: &str) -> Result<PToken, ListingError> {
        let tok = self.advance(context)?;
        if tok.token == expected {
            Ok(tok)
        } else {
            Err(unexpected(&tok, &format!("expected {expected:?} for {context}")))
        }
    }

    fn parse_item(&mut self) -> Result<Pending, ListingError> {
        let word = self.expect(Token::Word, "an opcode or label")?;
        if self.peek().is_some_and(|t| t.token == Token::Colon) {
            self.cursor += 1;
            return Ok(Pending::Define(word.text));
        }

        let simple =
            |op: Instruction| -> Result<Pending, ListingError> { Ok(Pending::Ready(op)) };
        match word.text.as_str() {
            "LOAD_CONST" => simple(Instruction::LoadConst(self.parse_const()?)),
            "LOAD_NAME" => simple(Instruction::LoadName(self.parse_ident("a name")?)),
            "LOAD_ATTR" => simple(Instruction::LoadAttr(self.parse_ident("an attribute")?)),
            "DUP_TOP" => simple(Instruction::DupTop),
            "ROT_TWO" => simple(Instruction::RotTwo),
            "ROT_THREE" => simple(Instruction::RotThree),
            "POP_TOP" => simple(Instruction::PopTop),
            "BUILD_TUPLE" => simple(Instruction::BuildTuple(self.parse_count()?)),
            "UNPACK_SEQUENCE" => simple(Instruction::UnpackSequence(self.parse_count()?)),
            "BINARY_ADD" => simple(Instruction::Binary(BinaryOp::Add)),
            "BINARY_SUBTRACT" => simple(Instruction::Binary(BinaryOp::Subtract)),
            "BINARY_MULTIPLY" => simple(Instruction::Binary(BinaryOp::Multiply)),
            "BINARY_TRUE_DIVIDE" => simple(Instruction::Binary(BinaryOp::TrueDivide)),
            "BINARY_MODULO" => simple(Instruction::Binary(BinaryOp::Modulo)),
            "COMPARE_OP" => {
                let tok = self.expect(Token::Word, "a comparison")?;
                let op = CompareOp::from_mnemonic(&tok.text)
                    .ok_or_else(|| unexpected(&tok, "expected lt, le, eq, ne, gt or ge"))?;
                simple(Instruction::Compare(op))
            }
            "UNARY_NOT" => simple(Instruction::UnaryNot),
            "UNARY_NEGATIVE" => simple(Instruction::UnaryNegative),
            "CALL_FUNCTION" => simple(Instruction::CallFunction(self.parse_argspec()?)),
            "CALL_FUNCTION_VAR" => simple(Instruction::CallFunctionVar(self.parse_argspec()?)),
            "CALL_FUNCTION_KW" => simple(Instruction::CallFunctionKw(self.parse_argspec()?)),
            "CALL_FUNCTION_VAR_KW" => {
                simple(Instruction::CallFunctionVarKw(self.parse_argspec()?))
            }
            "JUMP_FORWARD" => self.parse_jump(Instruction::Jump),
            "POP_JUMP_IF_FALSE" => self.parse_jump(Instruction::PopJumpIfFalse),
            "POP_JUMP_IF_TRUE" => self.parse_jump(Instruction::PopJumpIfTrue),
            "JUMP_IF_FALSE_OR_POP" => self.parse_jump(Instruction::JumpIfFalseOrPop),
            "JUMP_IF_TRUE_OR_POP" => self.parse_jump(Instruction::JumpIfTrueOrPop),
            "RETURN_VALUE" => simple(Instruction::ReturnValue),
            _ => Err(ListingError::UnknownOpcode {
                position: word.pos,
                name: word.text.clone(),
            }),
        }
    }

    fn parse_jump(&mut self, make: fn(Label) -> Instruction) -> Result<Pending, ListingError> {
        let tok = self.expect(Token::Word, "a jump target")?;
        Ok(Pending::Jump(make, tok.text))
    }

    fn parse_ident(&mut self, context: &str) -> Result<Rc<str>, ListingError> {
        let tok = self.expect(Token::Word, context)?;
        Ok(Rc::from(tok.text))
    }

    fn parse_count(&mut self) -> Result<usize, ListingError> {
        let tok = self.expect(Token::Int, "an item count")?;
        tok.text
            .parse()
            .map_err(|_| unexpected(&tok, "expected a non-negative count"))
    }

    fn parse_argspec(&mut self) -> Result<u16, ListingError> {
        let tok = self.advance("a call operand")?;
        let parsed = match tok.token {
            Token::Hex => u16::from_str_radix(&tok.text[2..], 16).ok(),
            Token::Int => tok.text.parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| unexpected(&tok, "expected a 16-bit call operand"))
    }

    fn parse_const(&mut self) -> Result<Value, ListingError> {
        let tok = self.advance("a constant")?;
        let value = match tok.token {
            Token::Int => tok.text.parse().ok().map(Value::Int),
            Token::Float => tok.text.parse().ok().map(Value::Float),
            Token::Str => unescape(&tok.text[1..tok.text.len() - 1]).map(Value::from),
            Token::Word => match tok.text.as_str() {
                "None" => Some(Value::None),
                "True" => Some(Value::Bool(true)),
                "False" => Some(Value::Bool(false)),
                "inf" => Some(Value::Float(f64::INFINITY)),
                "NaN" => Some(Value::Float(f64::NAN)),
                _ => None,
            },
            Token::NegInf => Some(Value::Float(f64::NEG_INFINITY)),
            Token::Hex | Token::Colon => None,
        };
        value.ok_or_else(|| unexpected(&tok, "expected a literal constant"))
    }
}

fn unexpected(tok: &PToken, message: &str) -> ListingError {
    ListingError::UnexpectedToken {
        position: tok.pos,
        message: format!("{message}, got {:?} '{}'", tok.token, tok.text),
    }
}

/// Undo the escapes `{:?}` produces for strings.
fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Assign label numbers: `L<n>` keeps `n`, anything else is numbered after.
fn resolve_labels(items: &[Pending]) -> Result<HashMap<String, Label>, ListingError> {
    let numbered = |name: &str| name.strip_prefix('L').and_then(|n| n.parse::<u32>().ok());

    let mut defined: Vec<&str> = Vec::new();
    for item in items {
        if let Pending::Define(name) = item {
            if defined.contains(&name.as_str()) {
                return Err(ListingError::DuplicateLabel(name.clone()));
            }
            defined.push(name);
        }
    }

    let mut next = defined
        .iter()
        .filter_map(|name| numbered(name))
        .max()
        .map_or(Some(0), |n| n.checked_add(1));
    let mut table = HashMap::new();
    for name in defined {
        let label = match numbered(name) {
            Some(n) => Label(n),
            None => {
                let n = next.ok_or_else(|| ListingError::LabelOverflow(name.to_owned()))?;
                next = n.checked_add(1);
                Label(n)
            }
        };
        table.insert(name.to_owned(), label);
    }
    Ok(table)
}

impl Code {
    /// Assemble a textual listing.
    pub fn parse_listing(input: &str) -> Result<Code, ListingError> {
        let mut parser = Parser {
            tokens: tokenize(input)?,
            cursor: 0,
        };
        let mut items = Vec::new();
        while !parser.is_eof() {
            items.push(parser.parse_item()?);
        }

        let labels = resolve_labels(&items)?;
        let lookup = |name: &String| {
            labels
                .get(name)
                .copied()
                .ok_or_else(|| ListingError::UndefinedLabel(name.clone()))
        };
        let instructions = items
            .iter()
            .map(|item| match item {
                Pending::Ready(op) => Ok(op.clone()),
                Pending::Define(name) => lookup(name).map(Instruction::SetLabel),
                Pending::Jump(make, name) => lookup(name).map(*make),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Code::new(instructions))
    }
}

impl FromStr for Code {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Code::parse_listing(s)
    }
}
