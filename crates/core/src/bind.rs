//! Pattern matching: deciding how a rewrite applies to a value.
//!
//! Given a rewrite `pattern is body` and a value expression, the binder
//! walks the pattern structurally and produces everything the interpreter
//! needs to try the rewrite at run time: parameter bindings in source
//! order, runtime equality conditions, dynamic kind checks, runtime type
//! checks for user types, and an overall strength. `Failed` candidates
//! are discarded; `Possible` ones carry at least one runtime check;
//! `Perfect` ones apply unconditionally.

use std::collections::HashMap;

use derive_more::Constructor;
use ecow::EcoString;
use log::trace;

use crate::{
    position::SourcePos,
    scope::{pattern_base, Scope},
    syntax::{Syntax, GUARD, TYPE_AS, TYPE_COLON},
    tree::{Kind, Tree, TreeRef, INDENT_OPEN},
    types::{is_canonical, runtime_kind, type_for_kind, TypeContext},
};

/// How strongly a pattern binds to a value.
///
/// Aggregation over a compound pattern takes the minimum of its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BindingStrength {
    /// The pattern cannot match the value.
    Failed,
    /// The pattern matches if runtime checks pass.
    Possible,
    /// The pattern matches unconditionally.
    Perfect,
}

/// One parameter bound to the value expression supplied by the caller.
#[derive(Debug, Clone, Constructor)]
pub struct Binding {
    /// The parameter name from the pattern.
    pub name: Tree,
    /// The caller-side expression providing the value.
    pub value: Tree,
    /// Pass the expression unevaluated, wrapped with the caller's scope.
    pub deferred: bool,
}

/// A runtime equality requirement between two evaluated trees.
#[derive(Debug, Clone, Constructor)]
pub struct Condition {
    /// Expression to evaluate and compare.
    pub value: Tree,
    /// Expected result, also evaluated before comparing.
    pub test: Tree,
    /// Guards evaluate `value` in the argument scope, where the
    /// parameters are visible; equality conditions use the caller's scope.
    pub guard: bool,
}

/// A runtime discriminator over the eight tree kinds.
#[derive(Debug, Clone, Constructor)]
pub struct KindCheck {
    /// Expression to evaluate and discriminate.
    pub value: Tree,
    /// The required kind.
    pub kind: Kind,
}

/// A runtime structural check of a value against a user type.
#[derive(Debug, Clone, Constructor)]
pub struct TypeCheck {
    /// Expression to evaluate and check.
    pub value: Tree,
    /// The required type, as a tree.
    pub ty: Tree,
}

/// A rewrite that may apply at a call site.
///
/// The rewrite and its declaration scope are held weakly: both live in
/// the scope chain, which outlives any evaluation that can reach this
/// candidate, and a strong reference from a cache hanging off a call-site
/// tree inside the rewrite's own body would cycle.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The declaration, an `is` or `:=` infix.
    pub rewrite: TreeRef,
    /// The scope the declaration lives in.
    pub scope: TreeRef,
    /// The pattern, cloned strongly for cheap access.
    pub pattern: Tree,
    /// Parameter bindings, in left-to-right pattern order.
    pub bindings: Vec<Binding>,
    /// Runtime kind checks, run before conditions.
    pub kind_checks: Vec<KindCheck>,
    /// Runtime equality conditions, including guards.
    pub conditions: Vec<Condition>,
    /// Runtime user-type checks, run after conditions.
    pub type_checks: Vec<TypeCheck>,
    /// Declared result type, from `pattern as type is body`.
    pub result_type: Option<Tree>,
    /// Overall strength; never `Failed` for stored candidates.
    pub strength: BindingStrength,
}

impl Candidate {
    /// Analyze how `rewrite`, declared in `scope`, applies to `value`.
    #[must_use]
    pub fn build(rewrite: &Tree, scope: &Scope, value: &Tree, types: &mut TypeContext) -> Self {
        let (pattern, result_type) = split_result_type(rewrite);
        let mut binder = Binder {
            types,
            base: pattern_base(&pattern),
            defined: None,
            declared: HashMap::new(),
            bound: HashMap::new(),
            bindings: Vec::new(),
            kind_checks: Vec::new(),
            conditions: Vec::new(),
            type_checks: Vec::new(),
        };
        let outcome = binder.bind(&pattern, value);
        let unconditional = binder.kind_checks.is_empty()
            && binder.conditions.is_empty()
            && binder.type_checks.is_empty();
        let strength = match outcome {
            BindingStrength::Failed => BindingStrength::Failed,
            _ if unconditional => BindingStrength::Perfect,
            _ => BindingStrength::Possible,
        };
        trace!(
            "candidate {} for {}: {:?} with {} bindings",
            pattern,
            value,
            strength,
            binder.bindings.len()
        );
        Self {
            rewrite: rewrite.downgrade(),
            scope: scope.tree().downgrade(),
            pattern,
            bindings: binder.bindings,
            kind_checks: binder.kind_checks,
            conditions: binder.conditions,
            type_checks: binder.type_checks,
            result_type,
            strength,
        }
    }

    /// The declaration scope, if still alive.
    #[must_use]
    pub fn declaration_scope(&self) -> Option<Scope> {
        Scope::from_tree(self.scope.upgrade()?)
    }
}

/// Split `pattern as type` off the left side of a rewrite.
fn split_result_type(rewrite: &Tree) -> (Tree, Option<Tree>) {
    let Some((_, pattern, _)) = rewrite.infix_parts() else {
        return (rewrite.clone(), None);
    };
    if let Some((TYPE_AS, inner, ty)) = pattern.infix_parts() {
        (inner, Some(ty))
    } else {
        (pattern, None)
    }
}

/// Should this argument be passed unevaluated, regardless of its formal
/// type? Indent and brace blocks, sequences and definitions are.
fn is_deferred_value(value: &Tree) -> bool {
    let mut subject = value.clone();
    if let (Some((open, _)), Some(child)) = (value.block_delimiters(), value.block_child()) {
        if open == INDENT_OPEN || open == "{" {
            return true;
        }
        subject = child;
    }
    subject
        .infix_name()
        .is_some_and(|name| Syntax::is_sequence(name) || name == crate::syntax::DECLARATION)
}

struct Binder<'t> {
    types: &'t mut TypeContext,
    /// Base of the whole pattern; the defining name absorbs into it.
    base: Tree,
    /// The defining form, once identified.
    defined: Option<Tree>,
    /// Declared types of parameters, from `:` annotations.
    declared: HashMap<EcoString, Tree>,
    /// First caller expression bound to each parameter name.
    bound: HashMap<EcoString, Tree>,
    bindings: Vec<Binding>,
    kind_checks: Vec<KindCheck>,
    conditions: Vec<Condition>,
    type_checks: Vec<TypeCheck>,
}

impl Binder<'_> {
    fn bind(&mut self, pattern: &Tree, value: &Tree) -> BindingStrength {
        use BindingStrength::{Failed, Perfect, Possible};

        if pattern.same(value) {
            return Perfect;
        }

        match pattern.kind() {
            Kind::Natural | Kind::Real | Kind::Text => {
                if value.kind() == pattern.kind() {
                    return if pattern.structural_eq(value) {
                        Perfect
                    } else {
                        Failed
                    };
                }
                let Some(constant_type) = type_for_kind(pattern.kind()) else {
                    return Failed;
                };
                let vtype = self.types.type_of(value);
                if self.unify_checked(value, &vtype, &constant_type).is_err() {
                    return Failed;
                }
                self.conditions
                    .push(Condition::new(value.clone(), pattern.clone(), false));
                Possible
            }

            Kind::Name => self.bind_name(pattern, value),

            Kind::Infix => {
                let Some((operator, left, right)) = pattern.infix_parts() else {
                    return Failed;
                };
                match operator {
                    TYPE_COLON | TYPE_AS => self.bind_annotated(pattern, &left, &right, value),
                    GUARD => self.bind_guarded(&left, &right, value),
                    _ => {
                        let operator: EcoString = operator.into();
                        self.bind_infix(pattern, &operator, &left, &right, value)
                    }
                }
            }

            Kind::Prefix => {
                let Some((p_op, p_arg)) = pattern.prefix_parts() else {
                    return Failed;
                };
                let Some((v_op, v_arg)) = value.prefix_parts() else {
                    return Failed;
                };
                self.bind_binary(&p_op, &v_op, &p_arg, &v_arg)
            }

            Kind::Postfix => {
                let Some((p_arg, p_op)) = pattern.postfix_parts() else {
                    return Failed;
                };
                let Some((v_arg, v_op)) = value.postfix_parts() else {
                    return Failed;
                };
                self.bind_binary(&p_op, &v_op, &p_arg, &v_arg)
            }

            Kind::Block => match pattern.block_child() {
                Some(child) => self.bind(&child, value),
                None => Failed,
            },
        }
    }

    fn bind_name(&mut self, pattern: &Tree, value: &Tree) -> BindingStrength {
        use BindingStrength::{Failed, Perfect};

        // The defining name absorbs: it is the form, not an argument.
        if self.base.same(pattern) {
            self.defined = Some(pattern.clone());
            return Perfect;
        }
        let Some(name) = pattern.as_name() else {
            return Failed;
        };
        let vtype = self.types.type_of(value);

        // A repeated parameter unifies types and adds an equality check
        // against the earlier binding; it gets no argument of its own.
        if let Some(earlier) = self.bound.get(name).cloned() {
            let earlier_type = self.types.type_of(&earlier);
            if self.unify_checked(value, &vtype, &earlier_type).is_err() {
                return Failed;
            }
            self.conditions
                .push(Condition::new(value.clone(), earlier, false));
            return Perfect;
        }

        let declared = match self.declared.get(name) {
            Some(declared) => declared.clone(),
            None => self.types.fresh_variable(),
        };
        if self.unify_checked(value, &vtype, &declared).is_err() {
            return Failed;
        }
        let _ = self.bound.insert(name.into(), value.clone());
        let deferred = self.is_deferred_parameter(&declared, value);
        self.bindings
            .push(Binding::new(pattern.clone(), value.clone(), deferred));
        Perfect
    }

    fn bind_annotated(
        &mut self,
        pattern: &Tree,
        param: &Tree,
        declared: &Tree,
        value: &Tree,
    ) -> BindingStrength {
        use BindingStrength::{Failed, Perfect};

        if let Some(name) = pattern_base(param).as_name() {
            let _ = self.declared.insert(name.into(), declared.clone());
        }
        if self.types.assign_type(pattern, declared.clone()).is_err() {
            return Failed;
        }
        if self.bind(param, value) == Failed {
            return Failed;
        }
        let vtype = self.types.type_of(value);
        if self.unify_checked(value, &vtype, declared).is_err() {
            return Failed;
        }
        Perfect
    }

    fn bind_guarded(&mut self, param: &Tree, guard: &Tree, value: &Tree) -> BindingStrength {
        use BindingStrength::{Failed, Possible};

        if self.bind(param, value) == Failed {
            return Failed;
        }
        let boolean = Tree::name("boolean", SourcePos::NOWHERE);
        let guard_type = self.types.type_of(guard);
        if self.types.unify(&boolean, &guard_type).is_err() {
            return Failed;
        }
        self.conditions.push(Condition::new(
            guard.clone(),
            Tree::name("true", guard.pos()),
            true,
        ));
        Possible
    }

    fn bind_infix(
        &mut self,
        pattern: &Tree,
        operator: &str,
        p_left: &Tree,
        p_right: &Tree,
        value: &Tree,
    ) -> BindingStrength {
        use BindingStrength::{Failed, Possible};

        if self.defined.is_none() {
            self.defined = Some(pattern.clone());
        }

        // Syntactically the same infix: match both sides structurally.
        if let Some((v_name, v_left, v_right)) = value.infix_parts() {
            if v_name == operator {
                let left = self.bind(p_left, &v_left);
                if left == Failed {
                    return Failed;
                }
                let right = self.bind(p_right, &v_right);
                return left.min(right);
            }
        }

        // The value may still evaluate to a matching infix: require the
        // kind at run time and match through the accessor forms.
        let vtype = self.types.type_of(value);
        let infix_type = Tree::name("infix", SourcePos::NOWHERE);
        if self.unify_checked(value, &vtype, &infix_type).is_err() {
            return Failed;
        }
        let pos = pattern.pos();
        let left_accessor = Tree::prefix(Tree::name("left", pos), value.clone(), pos);
        if self.bind(p_left, &left_accessor) == Failed {
            return Failed;
        }
        let right_accessor = Tree::prefix(Tree::name("right", pos), value.clone(), pos);
        if self.bind(p_right, &right_accessor) == Failed {
            return Failed;
        }
        let name_accessor = Tree::prefix(Tree::name("name", pos), value.clone(), pos);
        self.conditions.push(Condition::new(
            name_accessor,
            Tree::text(operator, pos),
            false,
        ));
        Possible
    }

    /// Prefix and postfix patterns must carry the same operator name as
    /// the value; the defining form binds before the operand is examined.
    fn bind_binary(
        &mut self,
        p_op: &Tree,
        v_op: &Tree,
        p_arg: &Tree,
        v_arg: &Tree,
    ) -> BindingStrength {
        use BindingStrength::Failed;

        let (Some(p_name), Some(v_name)) = (p_op.as_name(), v_op.as_name()) else {
            return Failed;
        };
        if p_name != v_name {
            return Failed;
        }
        if self.defined.is_none() {
            self.defined = Some(p_op.clone());
        }
        self.bind(p_arg, v_arg)
    }

    /// Unify the value type with what the pattern requires, emitting the
    /// runtime checks that a dynamic value needs.
    fn unify_checked(&mut self, value: &Tree, vtype: &Tree, wanted: &Tree) -> Result<Tree, ()> {
        let value_base = self.types.base_type(vtype);
        if value_base.is_name("tree") {
            let wanted_base = self.types.base_type(wanted);
            match wanted_base.as_name() {
                // Block-typed parameters are deferred, so their shape
                // cannot be checked on an evaluated value.
                Some("tree" | "block") => {}
                Some(name) if is_canonical(name) => {
                    if let Some(kind) = runtime_kind(name) {
                        self.kind_checks.push(KindCheck::new(value.clone(), kind));
                    }
                }
                Some(name) if name.starts_with('#') => {}
                Some(_) => {
                    self.type_checks
                        .push(TypeCheck::new(value.clone(), wanted.clone()));
                }
                None => {
                    self.type_checks
                        .push(TypeCheck::new(value.clone(), wanted.clone()));
                }
            }
        }
        self.types.unify(wanted, vtype).map_err(|_| ())
    }

    fn is_deferred_parameter(&self, declared: &Tree, value: &Tree) -> bool {
        let base = self.types.base_type(declared);
        base.is_name("tree") || base.is_name("block") || is_deferred_value(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const POS: SourcePos = SourcePos::NOWHERE;

    fn name(n: &str) -> Tree {
        Tree::name(n, POS)
    }

    fn rewrite(pattern: Tree, body: Tree) -> Tree {
        Tree::infix("is", pattern, body, POS)
    }

    fn build(pattern: Tree, value: &Tree) -> Candidate {
        let scope = Scope::new();
        let rewrite = rewrite(pattern, name("body"));
        let stored = scope
            .declare(
                rewrite.infix_parts().unwrap().1,
                rewrite.infix_parts().unwrap().2,
            )
            .unwrap();
        let mut types = TypeContext::new();
        Candidate::build(&stored, &scope, value, &mut types)
    }

    #[test]
    fn test_constant_pattern_against_same_constant() {
        let pattern = Tree::prefix(name("f"), Tree::natural(0u32, POS), POS);
        let value = Tree::prefix(name("f"), Tree::natural(0u32, POS), POS);
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Perfect);
        assert!(candidate.bindings.is_empty());
    }

    #[test]
    fn test_constant_pattern_against_other_constant_fails() {
        let pattern = Tree::prefix(name("f"), Tree::natural(0u32, POS), POS);
        let value = Tree::prefix(name("f"), Tree::natural(5u32, POS), POS);
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Failed);
    }

    #[test]
    fn test_constant_pattern_against_expression_needs_checks() {
        let pattern = Tree::prefix(name("f"), Tree::natural(0u32, POS), POS);
        let argument = Tree::paren(
            Tree::infix("-", name("N"), Tree::natural(1u32, POS), POS),
            POS,
        );
        let value = Tree::prefix(name("f"), argument, POS);
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Possible);
        assert_eq!(candidate.kind_checks.len(), 1);
        assert_eq!(candidate.kind_checks[0].kind, Kind::Natural);
        assert_eq!(candidate.conditions.len(), 1);
    }

    #[test]
    fn test_parameter_binds_argument_expression() {
        let pattern = Tree::prefix(name("f"), name("X"), POS, );
        let value = Tree::prefix(name("f"), Tree::natural(7u32, POS), POS);
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Perfect);
        assert_eq!(candidate.bindings.len(), 1);
        assert!(candidate.bindings[0].name.is_name("X"));
        assert_eq!(candidate.bindings[0].value.to_string(), "7");
    }

    #[test]
    fn test_operator_name_must_match() {
        let pattern = Tree::prefix(name("f"), name("X"), POS);
        let value = Tree::prefix(name("g"), Tree::natural(7u32, POS), POS);
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Failed);
    }

    #[test]
    fn test_typed_parameter_records_kind_check_for_dynamic_value() {
        let pattern = Tree::infix(
            "+",
            Tree::infix(":", name("X"), name("integer"), POS),
            Tree::infix(":", name("Y"), name("integer"), POS),
            POS,
        );
        let value = Tree::infix("+", name("a"), name("b"), POS);
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Possible);
        assert_eq!(candidate.bindings.len(), 2);
        assert_eq!(candidate.kind_checks.len(), 2);
        assert!(candidate
            .kind_checks
            .iter()
            .all(|check| check.kind == Kind::Natural));
    }

    #[test]
    fn test_typed_parameter_against_matching_constant_is_perfect() {
        let pattern = Tree::infix(
            "+",
            Tree::infix(":", name("X"), name("natural"), POS),
            Tree::infix(":", name("Y"), name("natural"), POS),
            POS,
        );
        let value = Tree::infix(
            "+",
            Tree::natural(3u32, POS),
            Tree::natural(4u32, POS),
            POS,
        );
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Perfect);
        assert_eq!(candidate.bindings.len(), 2);
    }

    #[test]
    fn test_typed_parameter_against_wrong_constant_fails() {
        let pattern = Tree::infix(
            ":",
            name("X"),
            name("natural"),
            POS,
        );
        let pattern = Tree::prefix(name("f"), Tree::paren(pattern, POS), POS);
        let value = Tree::prefix(name("f"), Tree::text("nope", POS), POS);
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Failed);
    }

    #[test]
    fn test_guard_adds_boolean_condition() {
        let inner = Tree::infix(
            ",",
            name("X"),
            name("Y"),
            POS,
        );
        let pattern = Tree::infix(
            "when",
            Tree::prefix(name("max"), inner, POS),
            Tree::infix(">", name("X"), name("Y"), POS),
            POS,
        );
        let value = Tree::prefix(
            name("max"),
            Tree::infix(
                ",",
                Tree::natural(3u32, POS),
                Tree::natural(7u32, POS),
                POS,
            ),
            POS,
        );
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Possible);
        let guard = candidate
            .conditions
            .iter()
            .find(|condition| condition.guard)
            .unwrap();
        assert_eq!(guard.value.to_string(), "X > Y");
        assert!(guard.test.is_name("true"));
    }

    #[test]
    fn test_repeated_parameter_adds_equality_condition() {
        let pattern = Tree::prefix(
            name("twice"),
            Tree::infix(",", name("X"), name("X"), POS),
            POS,
        );
        let value = Tree::prefix(
            name("twice"),
            Tree::infix(
                ",",
                Tree::natural(3u32, POS),
                Tree::natural(3u32, POS),
                POS,
            ),
            POS,
        );
        let candidate = build(pattern, &value);
        assert_eq!(candidate.bindings.len(), 1);
        assert_eq!(candidate.conditions.len(), 1);
        assert_eq!(candidate.strength, BindingStrength::Possible);
    }

    #[test]
    fn test_deferred_for_tree_typed_parameter() {
        let pattern = Tree::prefix(
            name("quote"),
            Tree::infix(":", name("X"), name("tree"), POS),
            POS,
        );
        let value = Tree::prefix(
            name("quote"),
            Tree::infix("+", name("a"), name("b"), POS),
            POS,
        );
        let candidate = build(pattern, &value);
        assert_eq!(candidate.strength, BindingStrength::Perfect);
        assert!(candidate.bindings[0].deferred);
    }

    #[test]
    fn test_brace_block_argument_is_always_deferred() {
        let pattern = Tree::prefix(name("run"), name("Body"), POS);
        let block = Tree::braces(
            Tree::prefix(name("print"), name("x"), POS),
            POS,
        );
        let value = Tree::prefix(name("run"), block, POS);
        let candidate = build(pattern, &value);
        assert!(candidate.bindings[0].deferred);
    }

    #[test]
    fn test_bindings_stay_in_source_order() {
        let pattern = Tree::prefix(
            name("f"),
            Tree::infix(",", name("A"), Tree::infix(",", name("B"), name("C"), POS), POS),
            POS,
        );
        let value = Tree::prefix(
            name("f"),
            Tree::infix(
                ",",
                Tree::natural(1u32, POS),
                Tree::infix(",", Tree::natural(2u32, POS), Tree::natural(3u32, POS), POS),
                POS,
            ),
            POS,
        );
        let candidate = build(pattern, &value);
        let order: Vec<_> = candidate
            .bindings
            .iter()
            .map(|binding| binding.name.to_string())
            .collect();
        assert_eq!(order, ["A", "B", "C"]);
    }

    #[test]
    fn test_result_type_annotation_is_split_off() {
        let scope = Scope::new();
        let pattern = Tree::infix(
            "as",
            Tree::prefix(name("f"), name("X"), POS),
            name("natural"),
            POS,
        );
        let stored = scope.declare(pattern, name("body")).unwrap();
        let value = Tree::prefix(name("f"), Tree::natural(1u32, POS), POS);
        let mut types = TypeContext::new();
        let candidate = Candidate::build(&stored, &scope, &value, &mut types);
        assert!(candidate.result_type.unwrap().is_name("natural"));
        assert_eq!(candidate.strength, BindingStrength::Perfect);
    }
}
