//! Property tests for the evaluation core's quantified invariants.

use proptest::prelude::*;
use tilia_core::{builtins, Errors, Interpreter, Scope, SourcePos, Tree};

const POS: SourcePos = SourcePos::NOWHERE;

/// Atoms that have no binding in a fresh root scope.
fn unbound_atom() -> impl Strategy<Value = Tree> {
    prop_oneof![
        (0_u64..1_000_000).prop_map(|n| Tree::natural(n, POS)),
        (-1.0e6_f64..1.0e6).prop_map(|r| Tree::real(r, POS)),
        "[a-z]{1,8}".prop_map(|t| Tree::text(t, POS)),
        "u_[a-z]{1,6}".prop_map(|n| Tree::name(n, POS)),
    ]
}

/// Structures over unbound atoms, with operators nothing declares.
///
/// No block at the root: a block always evaluates to its child, so it is
/// the one shape that is not self-evaluating. Blocks inside an unbound
/// call form are fine, since the form never evaluates its operands.
fn unbound_tree() -> impl Strategy<Value = Tree> {
    unbound_atom().prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Tree::infix("~~", l, r, POS)),
            ("u_[a-z]{1,6}", inner.clone())
                .prop_map(|(op, arg)| Tree::prefix(Tree::name(op, POS), Tree::paren(arg, POS), POS)),
        ]
    })
}

proptest! {
    /// Trees made of unbound atoms evaluate to themselves.
    #[test]
    fn prop_self_evaluation(tree in unbound_tree()) {
        let scope = builtins::standard_scope();
        let mut errors = Errors::new();
        let result = Interpreter::new()
            .evaluate(&scope, &tree, &mut errors)
            .expect("no fatal error expected");
        prop_assert!(result.structural_eq(&tree));
    }

    /// Every declared pattern is found through the hash chain, and only
    /// declared patterns are.
    #[test]
    fn prop_hash_chain_finds_all_declarations(
        names in proptest::collection::hash_set("[a-z]{1,12}", 1..40)
    ) {
        let scope = Scope::new();
        let names: Vec<String> = names.into_iter().collect();
        for (index, name) in names.iter().enumerate() {
            scope
                .declare(Tree::name(name.as_str(), POS), Tree::natural(index as u64, POS))
                .expect("names are unique");
        }
        for (index, name) in names.iter().enumerate() {
            let body = scope.bound(name).expect("declared name must be bound");
            prop_assert_eq!(body.to_string(), index.to_string());
        }
        prop_assert!(scope.bound("never_declared_name").is_none());
    }

    /// Declaring the same pattern twice changes nothing semantically: the
    /// first body stays bound, the second declaration is rejected.
    #[test]
    fn prop_declaration_idempotence(name in "[a-z]{1,12}") {
        let scope = Scope::new();
        let pattern = || Tree::prefix(Tree::name(name.as_str(), POS), Tree::name("X", POS), POS);
        scope
            .declare(pattern(), Tree::natural(1_u32, POS))
            .expect("first declaration succeeds");
        let before = scope.local_entries().len();
        prop_assert!(scope.declare(pattern(), Tree::natural(2_u32, POS)).is_err());
        prop_assert_eq!(scope.local_entries().len(), before);

        let found = scope.lookup(name.as_str(), |rewrite, _| {
            rewrite.infix_parts().map(|(_, _, body)| body.to_string())
        });
        prop_assert_eq!(found, Some("1".to_string()));
    }
}
