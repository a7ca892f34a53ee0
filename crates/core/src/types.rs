//! The type engine: unification over types that are themselves trees.
//!
//! Canonical types are named trees (`natural`, `real`, `text`, …); `tree`
//! is the dynamic type that matches anything; user types are arbitrary
//! patterns. A [`TypeContext`] records what is known about expressions
//! during the analysis of one rewrite candidate and substitutes the type
//! variables that inference introduces.

use std::collections::HashMap;

use ecow::EcoString;

use crate::{
    position::SourcePos,
    tree::{Kind, Tree},
};

/// [`TypeErrorKind`] describes the errors that can come up during unification
#[derive(thiserror::Error, Debug, displaydoc::Display)]
#[non_exhaustive]
pub enum TypeErrorKind {
    /// type `{wanted}` does not match type `{got}`
    Mismatch {
        /// The type required by the pattern side.
        wanted: Tree,
        /// The type inferred for the value side.
        got: Tree,
    },
}

pub(crate) type TypeResult<T> = Result<T, TypeErrorKind>;

/// Names of the canonical types, in kind order where applicable.
pub const CANONICAL_TYPES: [&str; 10] = [
    "natural", "real", "text", "name", "block", "prefix", "postfix", "infix", "tree", "boolean",
];

const ALIASES: [(&str, &str); 3] = [
    ("integer", "natural"),
    ("decimal", "real"),
    ("symbol", "name"),
];

/// Whether `name` denotes a canonical type.
#[must_use]
pub fn is_canonical(name: &str) -> bool {
    CANONICAL_TYPES.contains(&name)
}

/// The tree kind a value of the given canonical type must have at run
/// time, or `None` for `tree`, which accepts every kind.
#[must_use]
pub fn runtime_kind(name: &str) -> Option<Kind> {
    match name {
        "natural" => Some(Kind::Natural),
        "real" => Some(Kind::Real),
        "text" => Some(Kind::Text),
        "name" | "boolean" => Some(Kind::Name),
        "block" => Some(Kind::Block),
        "prefix" => Some(Kind::Prefix),
        "postfix" => Some(Kind::Postfix),
        "infix" => Some(Kind::Infix),
        _ => None,
    }
}

/// The canonical type tree for a constant of the given kind.
#[must_use]
pub fn type_for_kind(kind: Kind) -> Option<Tree> {
    let name = match kind {
        Kind::Natural => "natural",
        Kind::Real => "real",
        Kind::Text => "text",
        _ => return None,
    };
    Some(Tree::name(name, SourcePos::NOWHERE))
}

fn is_variable(ty: &Tree) -> bool {
    ty.as_name().is_some_and(|name| name.starts_with('#'))
}

/// Per-candidate type knowledge: recorded expression types and the
/// substitution for inference variables.
#[derive(Debug, Default)]
pub struct TypeContext {
    recorded: HashMap<usize, Tree>,
    substitution: HashMap<EcoString, Tree>,
    next_variable: u32,
}

impl TypeContext {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, unconstrained type variable.
    pub fn fresh_variable(&mut self) -> Tree {
        self.next_variable += 1;
        Tree::name(format!("#type{}", self.next_variable), SourcePos::NOWHERE)
    }

    /// The inferred type of an expression in this context.
    ///
    /// Falls back on shape: constants have their canonical type, `true`
    /// and `false` are boolean, everything else is only known to be a
    /// `tree` until evaluation tells us more.
    pub fn type_of(&mut self, expr: &Tree) -> Tree {
        if let Some(recorded) = self.recorded.get(&expr.key()) {
            return recorded.clone();
        }
        if let Some(ty) = type_for_kind(expr.kind()) {
            return ty;
        }
        match expr.as_name() {
            Some("true" | "false") => Tree::name("boolean", SourcePos::NOWHERE),
            _ => Tree::name("tree", SourcePos::NOWHERE),
        }
    }

    /// Record that `expr` has type `ty`, unifying with anything recorded
    /// before.
    ///
    /// # Errors
    ///
    /// * [`TypeErrorKind::Mismatch`] if the new type contradicts the
    ///   recorded one; the recorded type is left unchanged.
    pub fn assign_type(&mut self, expr: &Tree, ty: Tree) -> TypeResult<Tree> {
        let unified = match self.recorded.get(&expr.key()) {
            Some(previous) => {
                let previous = previous.clone();
                self.unify(&previous, &ty)?
            }
            None => ty,
        };
        let _ = self.recorded.insert(expr.key(), unified.clone());
        Ok(unified)
    }

    /// A type compatible with both arguments.
    ///
    /// # Errors
    ///
    /// * [`TypeErrorKind::Mismatch`] when no such type exists; the error
    ///   carries both sides, and through them both positions.
    pub fn unify(&mut self, wanted: &Tree, got: &Tree) -> TypeResult<Tree> {
        let wanted = self.base_type(wanted);
        let got = self.base_type(got);

        if wanted.structural_eq(&got) {
            return Ok(wanted);
        }
        if is_variable(&wanted) {
            self.bind_variable(&wanted, got.clone());
            return Ok(got);
        }
        if is_variable(&got) {
            self.bind_variable(&got, wanted.clone());
            return Ok(wanted);
        }
        // The generic `tree` means unknown-but-dynamic: the other side wins.
        if wanted.is_name("tree") {
            return Ok(got);
        }
        if got.is_name("tree") {
            return Ok(wanted);
        }

        let mismatch = || TypeErrorKind::Mismatch {
            wanted: wanted.clone(),
            got: got.clone(),
        };

        match (wanted.kind(), got.kind()) {
            (Kind::Name, Kind::Name) => Err(mismatch()),
            (Kind::Infix, Kind::Infix) => {
                let Some((wn, wl, wr)) = wanted.infix_parts() else {
                    return Err(mismatch());
                };
                let Some((gn, gl, gr)) = got.infix_parts() else {
                    return Err(mismatch());
                };
                if wn != gn {
                    return Err(mismatch());
                }
                let left = self.unify(&wl, &gl)?;
                let right = self.unify(&wr, &gr)?;
                Ok(Tree::infix(wn, left, right, wanted.pos()))
            }
            (Kind::Prefix, Kind::Prefix) => {
                let Some((wl, wr)) = wanted.prefix_parts() else {
                    return Err(mismatch());
                };
                let Some((gl, gr)) = got.prefix_parts() else {
                    return Err(mismatch());
                };
                let left = self.unify(&wl, &gl)?;
                let right = self.unify(&wr, &gr)?;
                Ok(Tree::prefix(left, right, wanted.pos()))
            }
            (Kind::Block, Kind::Block) => {
                let (Some(wc), Some(gc)) = (wanted.block_child(), got.block_child()) else {
                    return Err(mismatch());
                };
                let child = self.unify(&wc, &gc)?;
                Ok(Tree::paren(child, wanted.pos()))
            }
            _ => Err(mismatch()),
        }
    }

    /// Strip substitution entries and alias names off a type.
    #[must_use]
    pub fn base_type(&self, ty: &Tree) -> Tree {
        let mut current = ty.clone();
        let mut fuel = 32;
        while fuel > 0 {
            fuel -= 1;
            let Some(name) = current.as_name() else { break };
            if let Some(bound) = self.substitution.get(name) {
                current = bound.clone();
                continue;
            }
            if let Some((_, target)) = ALIASES.iter().find(|(alias, _)| *alias == name) {
                current = Tree::name(*target, current.pos());
                continue;
            }
            break;
        }
        current
    }

    fn bind_variable(&mut self, variable: &Tree, ty: Tree) {
        if let Some(name) = variable.as_name() {
            let _ = self.substitution.insert(name.into(), ty);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const POS: SourcePos = SourcePos::NOWHERE;

    fn ty(name: &str) -> Tree {
        Tree::name(name, POS)
    }

    #[test]
    fn test_identical_types_unify() {
        let mut context = TypeContext::new();
        let unified = context.unify(&ty("natural"), &ty("natural")).unwrap();
        assert!(unified.is_name("natural"));
    }

    #[test]
    fn test_tree_is_unknown_but_dynamic() {
        let mut context = TypeContext::new();
        assert!(context.unify(&ty("tree"), &ty("text")).unwrap().is_name("text"));
        assert!(context.unify(&ty("real"), &ty("tree")).unwrap().is_name("real"));
    }

    #[rstest]
    #[case("natural", "real")]
    #[case("text", "boolean")]
    fn test_distinct_canonicals_fail(#[case] a: &str, #[case] b: &str) {
        let mut context = TypeContext::new();
        let err = context.unify(&ty(a), &ty(b)).unwrap_err();
        assert!(matches!(err, TypeErrorKind::Mismatch { .. }));
    }

    #[test]
    fn test_variables_substitute() {
        let mut context = TypeContext::new();
        let var = context.fresh_variable();
        assert!(context.unify(&var, &ty("natural")).unwrap().is_name("natural"));
        // The variable is now pinned; a conflicting use fails.
        assert!(context.unify(&var, &ty("text")).is_err());
        assert!(context.base_type(&var).is_name("natural"));
    }

    #[test]
    fn test_aliases_resolve_to_base() {
        let context = TypeContext::new();
        assert!(context.base_type(&ty("integer")).is_name("natural"));
        assert!(context.base_type(&ty("decimal")).is_name("real"));
    }

    #[test]
    fn test_structural_types_recurse() {
        let mut context = TypeContext::new();
        let pointer_to = |inner: Tree| {
            Tree::prefix(
                Tree::name("pointer_to", POS),
                inner,
                POS,
            )
        };
        let var = context.fresh_variable();
        let unified = context
            .unify(&pointer_to(var), &pointer_to(ty("natural")))
            .unwrap();
        let (_, inner) = unified.prefix_parts().unwrap();
        assert!(inner.is_name("natural"));
    }

    #[test]
    fn test_assign_type_merges_with_previous() {
        let mut context = TypeContext::new();
        let expr = Tree::name("X", POS);
        let _ = context.assign_type(&expr, ty("tree")).unwrap();
        let merged = context.assign_type(&expr, ty("natural")).unwrap();
        assert!(merged.is_name("natural"));
        assert!(context.type_of(&expr).is_name("natural"));
    }

    #[test]
    fn test_shape_based_inference() {
        let mut context = TypeContext::new();
        assert!(context.type_of(&Tree::natural(3u32, POS)).is_name("natural"));
        assert!(context.type_of(&Tree::text("t", POS)).is_name("text"));
        assert!(context.type_of(&Tree::name("true", POS)).is_name("boolean"));
        assert!(context.type_of(&Tree::name("whatever", POS)).is_name("tree"));
    }
}
