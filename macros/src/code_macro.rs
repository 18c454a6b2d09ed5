//! The code! macro: parse an instruction listing at compile time and generate
//! the `Code` constructor.

use std::collections::HashMap;

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{braced, Error, Expr, Ident, LitBool, LitFloat, LitInt, LitStr, Result, Token};

// ---------------------------------------------------------------------------
// AST types
// ---------------------------------------------------------------------------

/// A constant operand of LOAD_CONST.
#[derive(Debug, Clone)]
pub(crate) enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// `{ expr }`: any Rust expression convertible into a Value.
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub(crate) enum Operand {
    None,
    Const(Constant),
    Name(String),
    Count(usize),
    Call(u16),
    Compare(&'static str),
    Label(Ident),
}

#[derive(Debug, Clone)]
pub(crate) enum Statement {
    /// `name:` places a label.
    Label(Ident),
    /// `OPNAME operand;`
    Op {
        opname: Ident,
        operand: Operand,
    },
}

/// How an opcode's operand is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandKind {
    None,
    Const,
    Name,
    Count,
    Call,
    Compare,
    Label,
}

fn operand_kind(opname: &str) -> Option<OperandKind> {
    Some(match opname {
        "LOAD_CONST" => OperandKind::Const,
        "LOAD_NAME" | "LOAD_ATTR" => OperandKind::Name,
        "BUILD_TUPLE" | "UNPACK_SEQUENCE" => OperandKind::Count,
        "CALL_FUNCTION" | "CALL_FUNCTION_VAR" | "CALL_FUNCTION_KW" | "CALL_FUNCTION_VAR_KW" => {
            OperandKind::Call
        }
        "COMPARE_OP" => OperandKind::Compare,
        "JUMP_FORWARD" | "POP_JUMP_IF_FALSE" | "POP_JUMP_IF_TRUE" | "JUMP_IF_FALSE_OR_POP"
        | "JUMP_IF_TRUE_OR_POP" => OperandKind::Label,
        "DUP_TOP" | "ROT_TWO" | "ROT_THREE" | "POP_TOP" | "UNARY_NOT" | "UNARY_NEGATIVE"
        | "BINARY_ADD" | "BINARY_SUBTRACT" | "BINARY_MULTIPLY" | "BINARY_TRUE_DIVIDE"
        | "BINARY_MODULO" | "RETURN_VALUE" => OperandKind::None,
        _ => return None,
    })
}

/// The top-level input to the code! macro.
#[derive(Debug)]
pub(crate) struct CodeInput {
    pub statements: Vec<Statement>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl Parse for CodeInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut statements = Vec::new();
        while !input.is_empty() {
            statements.push(parse_statement(input)?);
        }
        Ok(CodeInput { statements })
    }
}

fn parse_statement(input: ParseStream) -> Result<Statement> {
    let ident: Ident = input.parse()?;
    if input.peek(Token![:]) {
        input.parse::<Token![:]>()?;
        return Ok(Statement::Label(ident));
    }

    let kind = operand_kind(&ident.to_string())
        .ok_or_else(|| Error::new(ident.span(), format!("unknown opcode `{}`", ident)))?;
    let operand = match kind {
        OperandKind::None => Operand::None,
        OperandKind::Const => Operand::Const(parse_constant(input)?),
        OperandKind::Name => {
            if input.peek(LitStr) {
                Operand::Name(input.parse::<LitStr>()?.value())
            } else {
                Operand::Name(input.parse::<Ident>()?.to_string())
            }
        }
        OperandKind::Count => Operand::Count(input.parse::<LitInt>()?.base10_parse()?),
        OperandKind::Call => Operand::Call(input.parse::<LitInt>()?.base10_parse()?),
        OperandKind::Compare => {
            let op: Ident = input.parse()?;
            let variant = match op.to_string().as_str() {
                "lt" => "Lt",
                "le" => "Le",
                "eq" => "Eq",
                "ne" => "Ne",
                "gt" => "Gt",
                "ge" => "Ge",
                other => {
                    return Err(Error::new(
                        op.span(),
                        format!("unknown comparison `{}`", other),
                    ))
                }
            };
            Operand::Compare(variant)
        }
        OperandKind::Label => Operand::Label(input.parse()?),
    };
    input.parse::<Token![;]>()?;

    Ok(Statement::Op {
        opname: ident,
        operand,
    })
}

fn parse_constant(input: ParseStream) -> Result<Constant> {
    if input.peek(syn::token::Brace) {
        let content;
        braced!(content in input);
        return Ok(Constant::Expr(content.parse()?));
    }
    if input.peek(LitStr) {
        return Ok(Constant::Str(input.parse::<LitStr>()?.value()));
    }
    if input.peek(LitBool) {
        return Ok(Constant::Bool(input.parse::<LitBool>()?.value));
    }

    let negative = input.peek(Token![-]);
    if negative {
        input.parse::<Token![-]>()?;
    }
    if input.peek(LitFloat) {
        let value: f64 = input.parse::<LitFloat>()?.base10_parse()?;
        return Ok(Constant::Float(if negative { -value } else { value }));
    }
    if input.peek(LitInt) {
        let value: i64 = input.parse::<LitInt>()?.base10_parse()?;
        return Ok(Constant::Int(if negative { -value } else { value }));
    }
    if negative {
        return Err(input.error("expected a number after `-`"));
    }

    let ident: Ident = input.parse()?;
    match ident.to_string().as_str() {
        "None" => Ok(Constant::None),
        "True" => Ok(Constant::Bool(true)),
        "False" => Ok(Constant::Bool(false)),
        other => Err(Error::new(
            ident.span(),
            format!("expected a literal constant or `{{ expr }}`, got `{}`", other),
        )),
    }
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

/// Assign label numbers in order of definition.
fn number_labels(statements: &[Statement]) -> Result<HashMap<String, u32>> {
    let mut labels = HashMap::new();
    for stmt in statements {
        if let Statement::Label(name) = stmt {
            let next = labels.len() as u32;
            if labels.insert(name.to_string(), next).is_some() {
                return Err(Error::new(
                    name.span(),
                    format!("label `{}` is defined twice", name),
                ));
            }
        }
    }
    Ok(labels)
}

fn generate_constant(constant: &Constant) -> TokenStream {
    match constant {
        Constant::None => quote! { ::exprwatch::vm::Value::None },
        Constant::Bool(b) => quote! { ::exprwatch::vm::Value::Bool(#b) },
        Constant::Int(i) => quote! { ::exprwatch::vm::Value::Int(#i) },
        Constant::Float(x) => quote! { ::exprwatch::vm::Value::Float(#x) },
        Constant::Str(s) => quote! { ::exprwatch::vm::Value::str(#s) },
        Constant::Expr(expr) => quote! { ::exprwatch::vm::Value::from(#expr) },
    }
}

fn generate_statement(stmt: &Statement, labels: &HashMap<String, u32>) -> Result<TokenStream> {
    let label_ref = |ident: &Ident| -> Result<TokenStream> {
        let n = labels.get(&ident.to_string()).ok_or_else(|| {
            Error::new(ident.span(), format!("label `{}` is never defined", ident))
        })?;
        Ok(quote! { ::exprwatch::vm::Label(#n) })
    };

    let (opname, operand) = match stmt {
        Statement::Label(name) => {
            let label = label_ref(name)?;
            return Ok(quote! { ::exprwatch::vm::Instruction::SetLabel(#label) });
        }
        Statement::Op { opname, operand } => (opname, operand),
    };

    let tokens = match (opname.to_string().as_str(), operand) {
        ("LOAD_CONST", Operand::Const(c)) => {
            let value = generate_constant(c);
            quote! { ::exprwatch::vm::Instruction::LoadConst(#value) }
        }
        (op @ ("LOAD_NAME" | "LOAD_ATTR"), Operand::Name(name)) => {
            let variant = variant_ident(if op == "LOAD_NAME" { "LoadName" } else { "LoadAttr" });
            quote! { ::exprwatch::vm::Instruction::#variant(::std::rc::Rc::from(#name)) }
        }
        (op @ ("BUILD_TUPLE" | "UNPACK_SEQUENCE"), Operand::Count(n)) => {
            let variant = variant_ident(if op == "BUILD_TUPLE" { "BuildTuple" } else { "UnpackSequence" });
            quote! { ::exprwatch::vm::Instruction::#variant(#n) }
        }
        (op, Operand::Call(raw)) => {
            let variant = variant_ident(match op {
                "CALL_FUNCTION" => "CallFunction",
                "CALL_FUNCTION_VAR" => "CallFunctionVar",
                "CALL_FUNCTION_KW" => "CallFunctionKw",
                _ => "CallFunctionVarKw",
            });
            quote! { ::exprwatch::vm::Instruction::#variant(#raw) }
        }
        (_, Operand::Compare(variant)) => {
            let variant = variant_ident(variant);
            quote! {
                ::exprwatch::vm::Instruction::Compare(::exprwatch::vm::CompareOp::#variant)
            }
        }
        (op, Operand::Label(target)) => {
            let label = label_ref(target)?;
            let variant = variant_ident(match op {
                "JUMP_FORWARD" => "Jump",
                "POP_JUMP_IF_FALSE" => "PopJumpIfFalse",
                "POP_JUMP_IF_TRUE" => "PopJumpIfTrue",
                "JUMP_IF_FALSE_OR_POP" => "JumpIfFalseOrPop",
                _ => "JumpIfTrueOrPop",
            });
            quote! { ::exprwatch::vm::Instruction::#variant(#label) }
        }
        (op, Operand::None) => match op.strip_prefix("BINARY_") {
            Some(bin) => {
                let variant = variant_ident(&pascal_case(bin));
                quote! {
                    ::exprwatch::vm::Instruction::Binary(::exprwatch::vm::BinaryOp::#variant)
                }
            }
            None => {
                let variant = variant_ident(&pascal_case(op));
                quote! { ::exprwatch::vm::Instruction::#variant }
            }
        },
        (op, _) => {
            return Err(Error::new(
                opname.span(),
                format!("invalid operand for `{}`", op),
            ))
        }
    };
    Ok(tokens)
}

fn variant_ident(name: &str) -> Ident {
    Ident::new(name, Span::call_site())
}

/// `TRUE_DIVIDE` -> `TrueDivide`.
fn pascal_case(upper_snake: &str) -> String {
    upper_snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect()
}

/// Entry point: generate code for the entire code! macro.
pub(crate) fn code_impl(input: TokenStream) -> Result<TokenStream> {
    let parsed: CodeInput = syn::parse2(input)?;

    if parsed.statements.is_empty() {
        return Err(Error::new(
            Span::call_site(),
            "code! macro requires at least one instruction",
        ));
    }

    let labels = number_labels(&parsed.statements)?;
    let instructions = parsed
        .statements
        .iter()
        .map(|stmt| generate_statement(stmt, &labels))
        .collect::<Result<Vec<_>>>()?;

    Ok(quote! {
        ::exprwatch::vm::Code::new(::std::vec![#(#instructions),*])
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    fn parse_code(tokens: TokenStream) -> Result<CodeInput> {
        syn::parse2(tokens)
    }

    #[test]
    fn parse_operands() {
        let parsed = parse_code(quote! {
            LOAD_NAME p;
            LOAD_ATTR "x";
            LOAD_CONST -3;
            BUILD_TUPLE 2;
            CALL_FUNCTION 0x0102;
            COMPARE_OP ge;
            RETURN_VALUE;
        })
        .unwrap();
        assert_eq!(parsed.statements.len(), 7);
        assert!(matches!(
            &parsed.statements[2],
            Statement::Op { operand: Operand::Const(Constant::Int(-3)), .. }
        ));
        assert!(matches!(
            &parsed.statements[4],
            Statement::Op { operand: Operand::Call(0x0102), .. }
        ));
        assert!(matches!(
            &parsed.statements[5],
            Statement::Op { operand: Operand::Compare("Ge"), .. }
        ));
    }

    #[test]
    fn parse_labels() {
        let parsed = parse_code(quote! {
            LOAD_NAME a;
            JUMP_IF_FALSE_OR_POP done;
            LOAD_NAME b;
            done:
            RETURN_VALUE;
        })
        .unwrap();
        assert!(matches!(&parsed.statements[3], Statement::Label(l) if l == "done"));
    }

    #[test]
    fn parse_error_unknown_opcode() {
        let err = parse_code(quote! { LOAD_FAST x; }).unwrap_err();
        assert!(err.to_string().contains("unknown opcode"));
    }

    #[test]
    fn parse_error_missing_semicolon() {
        assert!(parse_code(quote! { POP_TOP RETURN_VALUE; }).is_err());
    }

    #[test]
    fn codegen_variants() {
        let code = code_impl(quote! {
            LOAD_NAME p;
            LOAD_ATTR x;
            LOAD_CONST { 1.5 };
            BINARY_TRUE_DIVIDE;
            RETURN_VALUE;
        })
        .unwrap()
        .to_string();
        assert!(code.contains("Instruction :: LoadName"), "got: {}", code);
        assert!(code.contains("Instruction :: LoadAttr"), "got: {}", code);
        assert!(code.contains("Value :: from (1.5)"), "got: {}", code);
        assert!(code.contains("BinaryOp :: TrueDivide"), "got: {}", code);
        assert!(code.contains("Instruction :: ReturnValue"), "got: {}", code);
    }

    #[test]
    fn codegen_labels_resolve() {
        let code = code_impl(quote! {
            LOAD_NAME a;
            POP_JUMP_IF_FALSE skip;
            LOAD_CONST 1;
            RETURN_VALUE;
            skip:
            LOAD_CONST 2;
            RETURN_VALUE;
        })
        .unwrap()
        .to_string();
        assert!(code.contains("PopJumpIfFalse (:: exprwatch :: vm :: Label (0u32))"), "got: {}", code);
        assert!(code.contains("SetLabel (:: exprwatch :: vm :: Label (0u32))"), "got: {}", code);
    }

    #[test]
    fn codegen_undefined_label_is_error() {
        let err = code_impl(quote! { JUMP_FORWARD nowhere; }).unwrap_err();
        assert!(err.to_string().contains("never defined"));
    }

    #[test]
    fn codegen_duplicate_label_is_error() {
        let err = code_impl(quote! { a: a: RETURN_VALUE; }).unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn codegen_empty_is_error() {
        assert!(code_impl(quote! {}).is_err());
    }

    #[test]
    fn pascal_case_conversion() {
        assert_eq!(pascal_case("TRUE_DIVIDE"), "TrueDivide");
        assert_eq!(pascal_case("DUP_TOP"), "DupTop");
        assert_eq!(pascal_case("RETURN_VALUE"), "ReturnValue");
    }
}
