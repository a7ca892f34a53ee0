//! Native operations and the process-wide builtin scope.
//!
//! The builtin scope is an ordinary [`Scope`] built once at startup and
//! never mutated afterwards; it is the parent of every root scope. It
//! binds the canonical type names and `true`/`false` to themselves and
//! declares the arithmetic, comparison and text rewrites whose bodies are
//! `builtin <opcode>` forms dispatched to the native functions below.

use std::{cmp::Ordering, collections::HashMap, sync::OnceLock};

use ecow::EcoString;
use num_traits::Zero;

use crate::{
    error::Diagnostic,
    position::SourcePos,
    scope::Scope,
    tree::Tree,
    types::CANONICAL_TYPES,
};

/// Arguments handed to a native function: the values bound by the
/// winning candidate, in binding order.
#[derive(Debug)]
pub struct NativeCall<'a> {
    /// Evaluated bound values.
    pub args: &'a [Tree],
    /// Position of the call site, for result trees and diagnostics.
    pub pos: SourcePos,
}

/// A native function: receives the bound arguments, returns a tree.
pub type NativeFn = fn(&NativeCall<'_>) -> Result<Tree, Diagnostic>;

/// The opcode of a `builtin <opcode> …` body, if the body is one.
#[must_use]
pub fn builtin_opcode(body: &Tree) -> Option<EcoString> {
    let mut node = body.clone();
    loop {
        let (left, right) = node.prefix_parts()?;
        if left.is_name("builtin") {
            return right.as_name().map(Into::into);
        }
        node = left;
    }
}

/// Look up a native function by opcode.
#[must_use]
pub fn native(opcode: &str) -> Option<NativeFn> {
    natives().get(opcode).copied()
}

/// The process-wide builtin scope, parent of every root scope.
pub fn builtin_scope() -> &'static Scope {
    static SCOPE: OnceLock<Scope> = OnceLock::new();
    SCOPE.get_or_init(|| {
        let scope = Scope::new();
        for type_name in CANONICAL_TYPES {
            self_bind(&scope, type_name);
        }
        for name in ["integer", "decimal", "symbol", "true", "false"] {
            self_bind(&scope, name);
        }

        for numeric in ["natural", "real"] {
            binary(&scope, "+", numeric, "add");
            binary(&scope, "-", numeric, "sub");
            binary(&scope, "*", numeric, "mul");
            binary(&scope, "/", numeric, "div");
        }
        binary(&scope, "rem", "natural", "rem");
        binary(&scope, "mod", "natural", "rem");

        for comparable in ["natural", "real", "text", "name", "boolean"] {
            binary(&scope, "=", comparable, "equal");
            binary(&scope, "<>", comparable, "different");
            binary(&scope, "<", comparable, "less");
            binary(&scope, "<=", comparable, "less_or_equal");
            binary(&scope, ">", comparable, "greater");
            binary(&scope, ">=", comparable, "greater_or_equal");
        }

        binary(&scope, "&", "text", "concat");
        binary(&scope, "and", "boolean", "and");
        binary(&scope, "or", "boolean", "or");
        unary(&scope, "not", "boolean", "not");

        unary(&scope, "left", "infix", "infix_left");
        unary(&scope, "right", "infix", "infix_right");
        unary(&scope, "name", "infix", "infix_name");

        scope
    })
}

/// A fresh root scope for one program, parented to the builtins.
#[must_use]
pub fn standard_scope() -> Scope {
    builtin_scope().child()
}

fn self_bind(scope: &Scope, name: &str) {
    let tree = Tree::name(name, SourcePos::NOWHERE);
    let _ = scope.define(tree.clone(), tree, true);
}

fn typed(param: &str, type_name: &str) -> Tree {
    let pos = SourcePos::NOWHERE;
    Tree::infix(":", Tree::name(param, pos), Tree::name(type_name, pos), pos)
}

fn builtin_body(opcode: &str, params: &[&str]) -> Tree {
    let pos = SourcePos::NOWHERE;
    let mut body = Tree::prefix(Tree::name("builtin", pos), Tree::name(opcode, pos), pos);
    for param in params {
        body = Tree::prefix(body, Tree::name(*param, pos), pos);
    }
    body
}

fn binary(scope: &Scope, operator: &str, type_name: &str, opcode: &str) {
    let pos = SourcePos::NOWHERE;
    let pattern = Tree::infix(
        operator,
        typed("X", type_name),
        typed("Y", type_name),
        pos,
    );
    let _ = scope.define(pattern, builtin_body(opcode, &["X", "Y"]), true);
}

fn unary(scope: &Scope, operator: &str, type_name: &str, opcode: &str) {
    let pos = SourcePos::NOWHERE;
    let pattern = Tree::prefix(
        Tree::name(operator, pos),
        typed("X", type_name),
        pos,
    );
    let _ = scope.define(pattern, builtin_body(opcode, &["X"]), true);
}

fn natives() -> &'static HashMap<&'static str, NativeFn> {
    static NATIVES: OnceLock<HashMap<&'static str, NativeFn>> = OnceLock::new();
    NATIVES.get_or_init(|| {
        let mut map: HashMap<&'static str, NativeFn> = HashMap::new();
        let _ = map.insert("add", native_add as NativeFn);
        let _ = map.insert("sub", native_sub);
        let _ = map.insert("mul", native_mul);
        let _ = map.insert("div", native_div);
        let _ = map.insert("rem", native_rem);
        let _ = map.insert("equal", native_equal);
        let _ = map.insert("different", native_different);
        let _ = map.insert("less", native_less);
        let _ = map.insert("less_or_equal", native_less_or_equal);
        let _ = map.insert("greater", native_greater);
        let _ = map.insert("greater_or_equal", native_greater_or_equal);
        let _ = map.insert("concat", native_concat);
        let _ = map.insert("and", native_and);
        let _ = map.insert("or", native_or);
        let _ = map.insert("not", native_not);
        let _ = map.insert("infix_left", native_infix_left);
        let _ = map.insert("infix_right", native_infix_right);
        let _ = map.insert("infix_name", native_infix_name);
        map
    })
}

fn two_args<'c>(call: &'c NativeCall<'_>) -> Result<(&'c Tree, &'c Tree), Diagnostic> {
    match call.args {
        [a, b] => Ok((a, b)),
        _ => Err(Diagnostic::error(
            "builtin operation expects two arguments",
            call.pos,
        )),
    }
}

fn one_arg<'c>(call: &'c NativeCall<'_>) -> Result<&'c Tree, Diagnostic> {
    match call.args {
        [a] => Ok(a),
        _ => Err(Diagnostic::error(
            "builtin operation expects one argument",
            call.pos,
        )),
    }
}

fn operand_mismatch(call: &NativeCall<'_>, a: &Tree, b: &Tree) -> Diagnostic {
    Diagnostic::error("builtin operation cannot combine $1 and $2", call.pos)
        .with_arg(a.clone())
        .with_arg(b.clone())
}

fn native_add(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    if let (Some((x, _)), Some((y, _))) = (a.as_natural(), b.as_natural()) {
        return Ok(Tree::natural(x + y, call.pos));
    }
    if let (Some(x), Some(y)) = (a.as_real(), b.as_real()) {
        return Ok(Tree::real(x + y, call.pos));
    }
    Err(operand_mismatch(call, a, b))
}

fn native_sub(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    if let (Some((x, _)), Some((y, _))) = (a.as_natural(), b.as_natural()) {
        if y > x {
            return Err(Diagnostic::error(
                "natural subtraction $1 - $2 would be negative",
                call.pos,
            )
            .with_arg(a.clone())
            .with_arg(b.clone()));
        }
        return Ok(Tree::natural(x - y, call.pos));
    }
    if let (Some(x), Some(y)) = (a.as_real(), b.as_real()) {
        return Ok(Tree::real(x - y, call.pos));
    }
    Err(operand_mismatch(call, a, b))
}

fn native_mul(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    if let (Some((x, _)), Some((y, _))) = (a.as_natural(), b.as_natural()) {
        return Ok(Tree::natural(x * y, call.pos));
    }
    if let (Some(x), Some(y)) = (a.as_real(), b.as_real()) {
        return Ok(Tree::real(x * y, call.pos));
    }
    Err(operand_mismatch(call, a, b))
}

fn native_div(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    if let (Some((x, _)), Some((y, _))) = (a.as_natural(), b.as_natural()) {
        if y.is_zero() {
            return Err(Diagnostic::error("division of $1 by zero", call.pos)
                .with_arg(a.clone()));
        }
        return Ok(Tree::natural(x / y, call.pos));
    }
    if let (Some(x), Some(y)) = (a.as_real(), b.as_real()) {
        return Ok(Tree::real(x / y, call.pos));
    }
    Err(operand_mismatch(call, a, b))
}

fn native_rem(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    if let (Some((x, _)), Some((y, _))) = (a.as_natural(), b.as_natural()) {
        if y.is_zero() {
            return Err(Diagnostic::error("division of $1 by zero", call.pos)
                .with_arg(a.clone()));
        }
        return Ok(Tree::natural(x % y, call.pos));
    }
    Err(operand_mismatch(call, a, b))
}

fn compare(a: &Tree, b: &Tree) -> Option<Ordering> {
    if let (Some((x, _)), Some((y, _))) = (a.as_natural(), b.as_natural()) {
        return Some(x.cmp(y));
    }
    if let (Some(x), Some(y)) = (a.as_real(), b.as_real()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_text(), b.as_text()) {
        return Some(x.cmp(y));
    }
    if let (Some(x), Some(y)) = (a.as_name(), b.as_name()) {
        return Some(x.cmp(y));
    }
    None
}

fn boolean(value: bool, pos: SourcePos) -> Tree {
    Tree::name(if value { "true" } else { "false" }, pos)
}

fn comparison(
    call: &NativeCall<'_>,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    match compare(a, b) {
        Some(ordering) => Ok(boolean(accept(ordering), call.pos)),
        None => Err(operand_mismatch(call, a, b)),
    }
}

fn native_equal(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    comparison(call, Ordering::is_eq)
}

fn native_different(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    comparison(call, Ordering::is_ne)
}

fn native_less(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    comparison(call, Ordering::is_lt)
}

fn native_less_or_equal(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    comparison(call, Ordering::is_le)
}

fn native_greater(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    comparison(call, Ordering::is_gt)
}

fn native_greater_or_equal(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    comparison(call, Ordering::is_ge)
}

fn native_concat(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    match (a.as_text(), b.as_text()) {
        (Some(x), Some(y)) => {
            let mut joined = EcoString::from(x);
            joined.push_str(y);
            Ok(Tree::text(joined, call.pos))
        }
        _ => Err(operand_mismatch(call, a, b)),
    }
}

fn truth(tree: &Tree, pos: SourcePos) -> Result<bool, Diagnostic> {
    match tree.as_name() {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        _ => Err(Diagnostic::error("$1 is not a boolean value", pos).with_arg(tree.clone())),
    }
}

fn native_and(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    Ok(boolean(
        truth(a, call.pos)? && truth(b, call.pos)?,
        call.pos,
    ))
}

fn native_or(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let (a, b) = two_args(call)?;
    Ok(boolean(
        truth(a, call.pos)? || truth(b, call.pos)?,
        call.pos,
    ))
}

fn native_not(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    let value = one_arg(call)?;
    Ok(boolean(!truth(value, call.pos)?, call.pos))
}

fn infix_part(call: &NativeCall<'_>) -> Result<(EcoString, Tree, Tree), Diagnostic> {
    let value = one_arg(call)?;
    value
        .infix_parts()
        .map(|(name, left, right)| (name.into(), left, right))
        .ok_or_else(|| {
            Diagnostic::error("$1 is not an infix", call.pos).with_arg(value.clone())
        })
}

fn native_infix_left(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    infix_part(call).map(|(_, left, _)| left)
}

fn native_infix_right(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    infix_part(call).map(|(_, _, right)| right)
}

fn native_infix_name(call: &NativeCall<'_>) -> Result<Tree, Diagnostic> {
    infix_part(call).map(|(name, _, _)| Tree::text(name, call.pos))
}
