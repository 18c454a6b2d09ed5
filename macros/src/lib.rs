//! Proc macros for exprwatch: `code!` instruction listings checked at compile time.
//!
//! This crate is not meant to be used directly. Enable the `macros` feature on `exprwatch`.

use proc_macro::TokenStream;

mod code_macro;

/// Build a `Code` object from an instruction listing.
///
/// Every instruction is written as its opname followed by an optional
/// operand and a semicolon. Labels are declared with `name:` and referenced
/// by jumps. Unknown opcodes, malformed operands and undefined labels are
/// compile errors.
///
/// # Operands
///
/// - `LOAD_CONST`: `None`, `True`, `False`, a number, a string, or `{ expr }`
///   for any expression convertible into a `Value`
/// - `LOAD_NAME`, `LOAD_ATTR`: an identifier or a string
/// - `BUILD_TUPLE`, `UNPACK_SEQUENCE`: a count
/// - `CALL_FUNCTION*`: the raw argument word (`0x0102` is one keyword and
///   two positional arguments)
/// - `COMPARE_OP`: `lt`, `le`, `eq`, `ne`, `gt` or `ge`
/// - jumps: a label
///
/// # Example
///
/// ```ignore
/// let code = code! {
///     LOAD_NAME a;
///     JUMP_IF_FALSE_OR_POP done;
///     LOAD_NAME b;
///     LOAD_ATTR value;
///     done:
///     RETURN_VALUE;
/// };
/// ```
#[proc_macro]
pub fn code(input: TokenStream) -> TokenStream {
    code_macro::code_impl(input.into())
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
