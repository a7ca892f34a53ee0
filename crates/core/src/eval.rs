//! The interpreter: evaluating trees by rewriting.
//!
//! Evaluation of an expression in a scope walks the cached rewrite
//! candidates for its call site, in lexical order, and applies the first
//! one whose runtime checks pass: arguments are evaluated in the caller's
//! scope strictly left to right (each caller expression at most once per
//! call site), bound in a fresh child of the declaration scope, then the
//! candidate's kind checks, equality conditions and type checks run, and
//! finally the body is evaluated in the argument scope. When nothing
//! matches, the expression evaluates to itself.

pub mod builtins;

use std::collections::HashMap;

use log::{debug, trace};

use crate::{
    bind::{Candidate, Condition},
    calls::rewrite_calls,
    error::{collector::Errors, Diagnostic, TiliaError, TiliaResult},
    scope::{pattern_base, Scope, ScopeErrorKind},
    syntax::{Syntax, ASSIGNMENT, DECLARATION, TYPE_AS},
    tree::{Kind, Tree},
    types::{runtime_kind, TypeContext},
};

use self::builtins::{builtin_opcode, native, NativeCall};

pub(super) mod constants {
    /// Default bound on evaluation depth.
    pub(super) const DEFAULT_MAX_DEPTH: usize = 1000;
}

/// A deferred value carries the scope it was written in, so that a later
/// evaluation resolves its free names where the caller meant them.
#[derive(Debug)]
struct ClosureInfo {
    scope: Scope,
    inner: Tree,
}

fn make_closure(scope: &Scope, value: &Tree) -> Tree {
    let wrapper = value.shallow_clone();
    wrapper.attach(ClosureInfo {
        scope: scope.clone(),
        inner: value.clone(),
    });
    wrapper
}

/// The tree-walking evaluator.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter with the default recursion bound.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: constants::DEFAULT_MAX_DEPTH,
        }
    }

    /// An interpreter with an explicit recursion bound.
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Evaluate `expr` in `scope`.
    ///
    /// Non-fatal problems are reported into `errors` and evaluation
    /// continues (usually by self-evaluation or by skipping a rewrite
    /// candidate).
    ///
    /// # Errors
    ///
    /// * [`TiliaError::StackOverflow`] when evaluation nests deeper than
    ///   the configured bound.
    /// * [`TiliaError::Fatal`] when a fatal diagnostic was raised.
    pub fn evaluate(&self, scope: &Scope, expr: &Tree, errors: &mut Errors) -> TiliaResult<Tree> {
        let mut ctx = EvalCtx {
            max_depth: self.max_depth,
            errors,
            depth: 0,
        };
        ctx.eval(scope, expr)
    }

    /// Check whether `value` has type `ty` in `scope`.
    #[must_use]
    pub fn type_check(&self, scope: &Scope, ty: &Tree, value: &Tree) -> bool {
        type_matches(scope, value, ty)
    }
}

struct EvalCtx<'e> {
    max_depth: usize,
    errors: &'e mut Errors,
    depth: usize,
}

impl EvalCtx<'_> {
    fn eval(&mut self, scope: &Scope, expr: &Tree) -> TiliaResult<Tree> {
        self.depth += 1;
        let result = self.eval_inner(scope, expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, scope: &Scope, expr: &Tree) -> TiliaResult<Tree> {
        if self.depth > self.max_depth {
            return Err(self.stack_overflow(expr));
        }
        if let Some(closure) = expr.info::<ClosureInfo>() {
            trace!("opening closure for {}", closure.inner);
            return self.eval(&closure.scope, &closure.inner);
        }

        match expr.kind() {
            Kind::Natural | Kind::Real | Kind::Text => Ok(expr.clone()),
            Kind::Block => match expr.block_child() {
                Some(child) => self.eval(&scope.child(), &child),
                None => Ok(expr.clone()),
            },
            Kind::Infix => {
                let Some((name, left, right)) = expr.infix_parts() else {
                    return Ok(expr.clone());
                };
                if Syntax::is_sequence(name) {
                    return self.sequence(scope, expr);
                }
                match name {
                    DECLARATION => {
                        self.declare(scope, &left, &right);
                        Ok(expr.clone())
                    }
                    ASSIGNMENT => {
                        let value = self.eval(scope, &right)?;
                        Ok(scope.assign(&pattern_base(&left), value))
                    }
                    TYPE_AS => {
                        let value = self.eval(scope, &left)?;
                        if !type_matches(scope, &value, &right) {
                            self.errors.report(
                                Diagnostic::error("$1 does not have type $2", expr.pos())
                                    .with_arg(value.clone())
                                    .with_arg(right.clone()),
                            );
                        }
                        Ok(value)
                    }
                    _ => self.apply(scope, expr),
                }
            }
            Kind::Name | Kind::Prefix | Kind::Postfix => self.apply(scope, expr),
        }
    }

    /// Two-pass evaluation of a statement sequence: declarations enter
    /// the scope first, then the remaining statements run in order; the
    /// last statement's value is the sequence's value.
    fn sequence(&mut self, scope: &Scope, expr: &Tree) -> TiliaResult<Tree> {
        let mut statements = Vec::new();
        self.declaration_pass(scope, expr, &mut statements);
        let mut result = Tree::empty(expr.pos());
        for statement in &statements {
            result = self.eval(scope, statement)?;
        }
        Ok(result)
    }

    fn declaration_pass(&mut self, scope: &Scope, expr: &Tree, statements: &mut Vec<Tree>) {
        if let Some((name, left, right)) = expr.infix_parts() {
            if Syntax::is_sequence(name) {
                self.declaration_pass(scope, &left, statements);
                self.declaration_pass(scope, &right, statements);
                return;
            }
            if name == DECLARATION {
                self.declare(scope, &left, &right);
                return;
            }
        }
        if !expr.is_empty_name() {
            statements.push(expr.clone());
        }
    }

    fn declare(&mut self, scope: &Scope, pattern: &Tree, body: &Tree) {
        match scope.declare(pattern.clone(), body.clone()) {
            Ok(_) => {}
            Err(ScopeErrorKind::Duplicate { existing, pattern }) => {
                self.errors.report(
                    Diagnostic::error("pattern $1 is already declared", pattern.pos())
                        .with_arg(pattern)
                        .with_note(Diagnostic::note("earlier declaration is kept", existing.pos())),
                );
            }
        }
    }

    /// Try the cached candidates for a call site, first match wins.
    fn apply(&mut self, scope: &Scope, expr: &Tree) -> TiliaResult<Tree> {
        let calls = rewrite_calls(scope, expr);
        let mut cache: HashMap<usize, Tree> = HashMap::new();

        'candidates: for candidate in &calls.candidates {
            let Some(rewrite) = candidate.rewrite.upgrade() else {
                continue;
            };
            let Some(declaration_scope) = candidate.declaration_scope() else {
                continue;
            };
            let Some((_, _, body)) = rewrite.infix_parts() else {
                continue;
            };

            let argument_scope = declaration_scope.child();
            let mut bound_values = Vec::with_capacity(candidate.bindings.len());
            for binding in &candidate.bindings {
                let value = if binding.deferred {
                    make_closure(scope, &binding.value)
                } else {
                    self.eval_argument(scope, expr, &binding.value, &mut cache)?
                };
                let _ = argument_scope.define(binding.name.clone(), value.clone(), true);
                bound_values.push(value);
            }

            for check in &candidate.kind_checks {
                let value = self.eval_argument(scope, expr, &check.value, &mut cache)?;
                if value.kind() != check.kind {
                    trace!("kind check failed: {} is no {}", value, check.kind);
                    continue 'candidates;
                }
            }

            for condition in &candidate.conditions {
                if !self.condition_holds(scope, expr, &argument_scope, condition, &mut cache)? {
                    continue 'candidates;
                }
            }

            for check in &candidate.type_checks {
                let value = self.eval_argument(scope, expr, &check.value, &mut cache)?;
                if !type_matches(&argument_scope, &value, &check.ty) {
                    self.errors.report(
                        Diagnostic::error("$1 does not have type $2", check.value.pos())
                            .with_arg(value)
                            .with_arg(check.ty.clone()),
                    );
                    continue 'candidates;
                }
            }

            debug!("applying {} to {}", candidate.pattern, expr);
            // A self-referential definition (`true is true`) stands for
            // itself; evaluating its body would never terminate.
            if body.structural_eq(&candidate.pattern) {
                return Ok(expr.clone());
            }
            if let Some(opcode) = builtin_opcode(&body) {
                return Ok(self.call_native(&opcode, &bound_values, expr));
            }
            return self.eval(&argument_scope, &body);
        }

        if calls.seen > 0 && matches!(expr.kind(), Kind::Prefix | Kind::Infix) {
            self.errors.report(
                Diagnostic::error("no pattern matches $1", expr.pos()).with_arg(expr.clone()),
            );
        }
        Ok(expr.clone())
    }

    fn condition_holds(
        &mut self,
        scope: &Scope,
        host: &Tree,
        argument_scope: &Scope,
        condition: &Condition,
        cache: &mut HashMap<usize, Tree>,
    ) -> TiliaResult<bool> {
        let (value, test) = if condition.guard {
            (
                self.eval(argument_scope, &condition.value)?,
                self.eval(argument_scope, &condition.test)?,
            )
        } else {
            (
                self.eval_argument(scope, host, &condition.value, cache)?,
                self.eval_argument(scope, host, &condition.test, cache)?,
            )
        };
        let holds = value.structural_eq(&test);
        if !holds {
            trace!("condition failed: {} is not {}", value, test);
        }
        Ok(holds)
    }

    /// Evaluate a caller-side expression, at most once per call site.
    fn eval_argument(
        &mut self,
        scope: &Scope,
        host: &Tree,
        expr: &Tree,
        cache: &mut HashMap<usize, Tree>,
    ) -> TiliaResult<Tree> {
        // A value matched structurally stands for itself here: evaluating
        // the host from inside its own application cannot make progress.
        if expr.same(host) {
            return Ok(host.clone());
        }
        if let Some(cached) = cache.get(&expr.key()) {
            return Ok(cached.clone());
        }
        let value = self.eval(scope, expr)?;
        let _ = cache.insert(expr.key(), value.clone());
        Ok(value)
    }

    fn call_native(&mut self, opcode: &str, args: &[Tree], expr: &Tree) -> Tree {
        let Some(function) = native(opcode) else {
            self.errors.report(
                Diagnostic::error("unknown builtin operation in $1", expr.pos())
                    .with_arg(expr.clone()),
            );
            return expr.clone();
        };
        let call = NativeCall {
            args,
            pos: expr.pos(),
        };
        match function(&call) {
            Ok(result) => result,
            Err(diagnostic) => {
                self.errors.report(diagnostic);
                expr.clone()
            }
        }
    }

    fn stack_overflow(&mut self, expr: &Tree) -> Box<TiliaError> {
        let diagnostic = Diagnostic::error("evaluation is nested too deeply in $1", expr.pos())
            .with_arg(expr.clone());
        let _ = self.errors.fatal(diagnostic.clone());
        Box::new(TiliaError::StackOverflow(diagnostic.escalate()))
    }
}

/// Does an evaluated value have the given type?
///
/// Canonical types check the kind tag (`boolean` checks for the two
/// boolean names); structural user types run a scratch pattern match;
/// user-named types are accepted dynamically.
fn type_matches(scope: &Scope, value: &Tree, ty: &Tree) -> bool {
    let types = TypeContext::new();
    let base = types.base_type(ty);
    if let Some(name) = base.as_name() {
        if name == "tree" {
            return true;
        }
        if name == "boolean" {
            return matches!(value.as_name(), Some("true" | "false"));
        }
        if let Some(kind) = runtime_kind(name) {
            return value.kind() == kind;
        }
        trace!("accepting dynamically typed value {} as {}", value, name);
        return true;
    }
    let synthetic = Tree::infix(
        DECLARATION,
        ty.clone(),
        Tree::empty(ty.pos()),
        ty.pos(),
    );
    let mut types = TypeContext::new();
    let candidate = Candidate::build(&synthetic, scope, value, &mut types);
    candidate.strength != crate::bind::BindingStrength::Failed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::eval::builtins::standard_scope;
    use crate::position::SourcePos;
    use pretty_assertions::assert_eq;

    const POS: SourcePos = SourcePos::NOWHERE;

    fn name(n: &str) -> Tree {
        Tree::name(n, POS)
    }

    fn eval_in(scope: &Scope, expr: &Tree) -> Tree {
        let mut errors = Errors::new();
        Interpreter::new().evaluate(scope, expr, &mut errors).unwrap()
    }

    #[test]
    fn test_constants_self_evaluate() {
        let scope = standard_scope();
        assert_eq!(eval_in(&scope, &Tree::natural(42u32, POS)).to_string(), "42");
        assert_eq!(eval_in(&scope, &Tree::text("t", POS)).as_text(), Some("t"));
    }

    #[test]
    fn test_unbound_name_self_evaluates_silently() {
        let scope = standard_scope();
        let mut errors = Errors::new();
        let result = Interpreter::new()
            .evaluate(&scope, &name("mystery"), &mut errors)
            .unwrap();
        assert!(result.is_name("mystery"));
        assert!(!errors.had_errors());
    }

    #[test]
    fn test_builtin_addition_through_registry() {
        let scope = standard_scope();
        let sum = Tree::infix(
            "+",
            Tree::natural(3u32, POS),
            Tree::natural(4u32, POS),
            POS,
        );
        assert_eq!(eval_in(&scope, &sum).to_string(), "7");
    }

    #[test]
    fn test_simple_rewrite_applies() {
        let scope = standard_scope();
        scope
            .declare(
                Tree::prefix(name("double"), name("X"), POS),
                Tree::infix("*", name("X"), Tree::natural(2u32, POS), POS),
            )
            .unwrap();
        let call = Tree::prefix(name("double"), Tree::natural(21u32, POS), POS);
        assert_eq!(eval_in(&scope, &call).to_string(), "42");
    }

    #[test]
    fn test_no_match_reports_for_call_forms_only() {
        let scope = standard_scope();
        scope
            .declare(
                Tree::prefix(name("f"), Tree::natural(0u32, POS), POS),
                Tree::natural(1u32, POS),
            )
            .unwrap();

        // `f 5` sees a candidate set but nothing applies: diagnostic.
        let mut errors = Errors::new();
        let call = Tree::prefix(name("f"), Tree::natural(5u32, POS), POS);
        let result = Interpreter::new().evaluate(&scope, &call, &mut errors).unwrap();
        assert!(result.structural_eq(&call));
        assert!(errors.had_errors());

        // `g 5` is pure data here: silent.
        let mut errors = Errors::new();
        let other = Tree::prefix(name("g"), Tree::natural(5u32, POS), POS);
        let _ = Interpreter::new().evaluate(&scope, &other, &mut errors).unwrap();
        assert!(!errors.had_errors());
    }

    #[test]
    fn test_recursion_limit_is_fatal() {
        let scope = standard_scope();
        scope
            .declare(
                Tree::prefix(name("spin"), name("X"), POS),
                Tree::prefix(name("spin"), Tree::paren(name("X"), POS), POS),
            )
            .unwrap();
        let call = Tree::prefix(name("spin"), Tree::natural(1u32, POS), POS);
        let mut errors = Errors::new();
        let err = Interpreter::with_max_depth(40)
            .evaluate(&scope, &call, &mut errors)
            .unwrap_err();
        assert!(matches!(*err, TiliaError::StackOverflow(_)));
        assert!(errors.is_fatal());
    }

    #[test]
    fn test_assignment_updates_nearest_binding() {
        let scope = standard_scope();
        let program = Tree::infix(
            "\n",
            Tree::infix(":=", name("counter"), Tree::natural(1u32, POS), POS),
            Tree::infix(
                "\n",
                Tree::infix(
                    ":=",
                    name("counter"),
                    Tree::infix("+", name("counter"), Tree::natural(2u32, POS), POS),
                    POS,
                ),
                name("counter"),
                POS,
            ),
            POS,
        );
        assert_eq!(eval_in(&scope, &program).to_string(), "3");
    }

    #[test]
    fn test_ascription_checks_types() {
        let scope = standard_scope();
        let good = Tree::infix(
            TYPE_AS,
            Tree::natural(1u32, POS),
            name("natural"),
            POS,
        );
        let mut errors = Errors::new();
        let _ = Interpreter::new().evaluate(&scope, &good, &mut errors).unwrap();
        assert!(!errors.had_errors());

        let bad = Tree::infix(TYPE_AS, Tree::natural(1u32, POS), name("text"), POS);
        let mut errors = Errors::new();
        let _ = Interpreter::new().evaluate(&scope, &bad, &mut errors).unwrap();
        assert!(errors.had_errors());
    }
}
