//! The symbol table: scopes holding rewrite declarations.
//!
//! A scope is itself a tree of a fixed shape, `parent { frame }`: a prefix
//! whose left side is the parent scope (or the empty name at the root) and
//! whose right side is a block holding the local frame. The frame is
//! either the empty name, a single rewrite (an infix `is` or `:=`), or a
//! binary tree of rewrites joined by `;` separators, branching on
//! successive bits of the defining-name hash. Rewrites for the same
//! defining name (overloads) keep their insertion order in a `\n` chain at
//! their hash position.
//!
//! Keeping the table in tree form costs nothing — frames use the same
//! atomic child slots as every other tree — and keeps the language
//! homoiconic: a scope can be rendered, compared and passed around like
//! any other value.

use std::hash::{DefaultHasher, Hash, Hasher};

use ecow::EcoString;

use crate::{
    position::SourcePos,
    syntax::{Syntax, ASSIGNMENT, DECLARATION, SEQUENCE_NEWLINE, SEQUENCE_SEMICOLON},
    tree::{Kind, Tree},
};

/// [`ScopeErrorKind`] describes the errors that can come up in the symbol table
#[derive(thiserror::Error, Debug, displaydoc::Display)]
#[non_exhaustive]
pub enum ScopeErrorKind {
    /// pattern `{pattern}` is already declared
    Duplicate {
        /// The rewrite already stored for the pattern.
        existing: Tree,
        /// The pattern of the rejected declaration.
        pattern: Tree,
    },
}

pub(crate) type ScopeResult<T> = Result<T, ScopeErrorKind>;

/// Identity of a scope, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// A lexical frame of rewrite declarations, chained to its parent.
#[derive(Debug, Clone)]
pub struct Scope {
    tree: Tree,
}

impl Scope {
    /// A root scope with no parent.
    #[must_use]
    pub fn new() -> Self {
        let pos = SourcePos::NOWHERE;
        Self {
            tree: Tree::prefix(
                Tree::empty(pos),
                Tree::braces(Tree::empty(pos), pos),
                pos,
            ),
        }
    }

    /// A fresh empty scope whose parent is `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        let pos = SourcePos::NOWHERE;
        Self {
            tree: Tree::prefix(
                self.tree.clone(),
                Tree::braces(Tree::empty(pos), pos),
                pos,
            ),
        }
    }

    /// The tree this scope is made of.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Rebuild a scope handle from its tree shape.
    pub(crate) fn from_tree(tree: Tree) -> Option<Self> {
        let (left, right) = tree.prefix_parts()?;
        let valid_parent = left.is_empty_name() || left.prefix_parts().is_some();
        if valid_parent && right.block_child().is_some() {
            Some(Self { tree })
        } else {
            None
        }
    }

    /// The enclosing scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (left, _) = self.tree.prefix_parts()?;
        if left.is_empty_name() {
            None
        } else {
            Self::from_tree(left)
        }
    }

    /// Identity of this scope; child scopes have their own identity.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        ScopeId(self.tree.key())
    }

    /// Identity comparison.
    #[must_use]
    pub fn same(&self, other: &Scope) -> bool {
        self.tree.same(&other.tree)
    }

    fn local_block(&self) -> Tree {
        self.tree
            .prefix_parts()
            .map(|(_, block)| block)
            .unwrap_or_else(|| Tree::empty(SourcePos::NOWHERE))
    }

    /// Declare `pattern is body` in this scope.
    ///
    /// # Errors
    ///
    /// * [`ScopeErrorKind::Duplicate`] if a rewrite with a structurally
    ///   equal pattern is already present; the old binding is retained.
    pub fn declare(&self, pattern: Tree, body: Tree) -> ScopeResult<Tree> {
        self.insert(pattern, body, DECLARATION, false)
    }

    /// Declare `pattern is body`, replacing an existing declaration with
    /// the same pattern when `overwrite` is set.
    ///
    /// # Errors
    ///
    /// * [`ScopeErrorKind::Duplicate`] when `overwrite` is not set and the
    ///   pattern is already declared.
    pub fn define(&self, pattern: Tree, body: Tree, overwrite: bool) -> ScopeResult<Tree> {
        self.insert(pattern, body, DECLARATION, overwrite)
    }

    /// The body bound to a plain name, walking parents, or `None`.
    #[must_use]
    pub fn bound(&self, name: &str) -> Option<Tree> {
        self.lookup(name, |rewrite, _| {
            let (_, pattern, body) = rewrite.infix_parts()?;
            if pattern_base(&pattern).is_name(name) {
                Some(body)
            } else {
                None
            }
        })
    }

    /// Assign `value` to the nearest visible binding of `name`, creating a
    /// mutable binding in this scope only if none exists.
    pub fn assign(&self, name: &Tree, value: Tree) -> Tree {
        let Some(key) = name.as_name() else {
            return value;
        };
        let mutated = self.lookup(key, |rewrite, _| {
            let (_, pattern, _) = rewrite.infix_parts()?;
            if pattern_base(&pattern).is_name(key) {
                rewrite.right_cell()?.set(value.clone());
                Some(())
            } else {
                None
            }
        });
        if mutated.is_none() {
            let _ = self.insert(name.clone(), value.clone(), ASSIGNMENT, true);
        }
        value
    }

    /// Visit, innermost scope first, every rewrite whose defining name
    /// hashes compatibly with `key`; stops at the first non-empty answer.
    pub fn lookup<R>(
        &self,
        key: &str,
        mut visit: impl FnMut(&Tree, &Scope) -> Option<R>,
    ) -> Option<R> {
        let hash = key_hash(key);
        let mut scope = Some(self.clone());
        while let Some(current) = scope {
            if let Some(result) = current.lookup_local(hash, &mut visit) {
                return Some(result);
            }
            scope = current.parent();
        }
        None
    }

    fn lookup_local<R>(
        &self,
        hash: u64,
        visit: &mut impl FnMut(&Tree, &Scope) -> Option<R>,
    ) -> Option<R> {
        let block = self.local_block();
        let mut node = block.block_child()?;
        let mut depth = 0;
        loop {
            match classify(&node) {
                FrameNode::Empty | FrameNode::Foreign => return None,
                FrameNode::Rewrite => {
                    let compatible = entry_hash(&node)
                        .is_some_and(|h| remaining(h, depth) == remaining(hash, depth));
                    return if compatible { visit(&node, self) } else { None };
                }
                FrameNode::Chain => {
                    let head_hash = chain_first(&node).and_then(|e| entry_hash(&e));
                    if head_hash.map(|h| remaining(h, depth)) != Some(remaining(hash, depth)) {
                        return None;
                    }
                    let mut link = node.clone();
                    loop {
                        let (_, entry, rest) = link.infix_parts()?;
                        if let Some(result) = visit(&entry, self) {
                            return Some(result);
                        }
                        match classify(&rest) {
                            FrameNode::Rewrite => return visit(&rest, self),
                            FrameNode::Chain => link = rest,
                            _ => return None,
                        }
                    }
                }
                FrameNode::Branch => {
                    let (_, left, right) = node.infix_parts()?;
                    let bit = remaining(hash, depth) & 1;
                    node = if bit == 0 { left } else { right };
                    depth += 1;
                }
            }
        }
    }

    /// All local rewrites, flattened in order.
    #[must_use]
    pub fn local_entries(&self) -> Vec<Tree> {
        let mut out = Vec::new();
        if let Some(frame) = self.local_block().block_child() {
            flatten(&frame, &mut out);
        }
        out
    }

    fn insert(
        &self,
        pattern: Tree,
        body: Tree,
        operator: &str,
        overwrite: bool,
    ) -> ScopeResult<Tree> {
        let key = defining_key(&pattern).unwrap_or_default();
        let hash = key_hash(&key);
        let rewrite = Tree::infix(operator, pattern.clone(), body.clone(), pattern.pos());

        let mut owner = self.local_block();
        let mut which = Slot::Child;
        let mut depth: u32 = 0;
        loop {
            let Some(cell) = slot(&owner, which) else {
                return Ok(rewrite);
            };
            let current = cell.get();
            match classify(&current) {
                FrameNode::Empty | FrameNode::Foreign => {
                    cell.set(rewrite.clone());
                    return Ok(rewrite);
                }
                FrameNode::Rewrite => {
                    if let Some(result) =
                        self.try_replace(&current, &pattern, &body, overwrite)?
                    {
                        return Ok(result);
                    }
                    let existing_rem =
                        remaining(entry_hash(&current).unwrap_or(0), depth);
                    let new_rem = remaining(hash, depth);
                    if existing_rem == new_rem {
                        cell.set(Tree::infix(
                            SEQUENCE_NEWLINE,
                            current,
                            rewrite.clone(),
                            SourcePos::NOWHERE,
                        ));
                    } else {
                        cell.set(split(current, existing_rem, rewrite.clone(), new_rem));
                    }
                    return Ok(rewrite);
                }
                FrameNode::Chain => {
                    let head_rem = chain_first(&current)
                        .and_then(|e| entry_hash(&e))
                        .map(|h| remaining(h, depth));
                    let new_rem = remaining(hash, depth);
                    if head_rem == Some(new_rem) {
                        return self.append_to_chain(&current, rewrite, &pattern, &body, overwrite);
                    }
                    let existing_rem = head_rem.unwrap_or(0);
                    cell.set(split(current, existing_rem, rewrite.clone(), new_rem));
                    return Ok(rewrite);
                }
                FrameNode::Branch => {
                    let bit = remaining(hash, depth) & 1;
                    owner = current;
                    which = if bit == 0 { Slot::Left } else { Slot::Right };
                    depth += 1;
                }
            }
        }
    }

    /// Duplicate handling for one existing entry: replace the body when
    /// overwriting, reject otherwise, pass when patterns differ.
    fn try_replace(
        &self,
        existing: &Tree,
        pattern: &Tree,
        body: &Tree,
        overwrite: bool,
    ) -> ScopeResult<Option<Tree>> {
        let Some((_, existing_pattern, _)) = existing.infix_parts() else {
            return Ok(None);
        };
        if !existing_pattern.structural_eq(pattern) {
            return Ok(None);
        }
        if overwrite {
            if let Some(cell) = existing.right_cell() {
                cell.set(body.clone());
            }
            Ok(Some(existing.clone()))
        } else {
            Err(ScopeErrorKind::Duplicate {
                existing: existing.clone(),
                pattern: pattern.clone(),
            })
        }
    }

    fn append_to_chain(
        &self,
        chain: &Tree,
        rewrite: Tree,
        pattern: &Tree,
        body: &Tree,
        overwrite: bool,
    ) -> ScopeResult<Tree> {
        let mut link = chain.clone();
        loop {
            let Some((_, entry, rest)) = link.infix_parts() else {
                return Ok(rewrite);
            };
            if let Some(result) = self.try_replace(&entry, pattern, body, overwrite)? {
                return Ok(result);
            }
            match classify(&rest) {
                FrameNode::Rewrite => {
                    if let Some(result) = self.try_replace(&rest, pattern, body, overwrite)? {
                        return Ok(result);
                    }
                    if let Some(cell) = link.right_cell() {
                        cell.set(Tree::infix(
                            SEQUENCE_NEWLINE,
                            rest,
                            rewrite.clone(),
                            SourcePos::NOWHERE,
                        ));
                    }
                    return Ok(rewrite);
                }
                FrameNode::Chain => link = rest,
                _ => return Ok(rewrite),
            }
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Child,
    Left,
    Right,
}

fn slot<'t>(owner: &'t Tree, which: Slot) -> Option<&'t crate::tree::cell::TreeCell> {
    match which {
        Slot::Child => owner.child_cell(),
        Slot::Left => owner.left_cell(),
        Slot::Right => owner.right_cell(),
    }
}

/// Shape of one node inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameNode {
    /// The empty name: nothing stored here.
    Empty,
    /// A rewrite entry, `pattern is body` or `name := value`.
    Rewrite,
    /// Insertion-ordered rewrites for one defining name, a `\n` spine.
    Chain,
    /// A hash branch, a `;` infix.
    Branch,
    /// Anything else; treated as empty and replaced on insertion.
    Foreign,
}

fn classify(tree: &Tree) -> FrameNode {
    if tree.is_empty_name() {
        return FrameNode::Empty;
    }
    match tree.infix_name() {
        Some(name) if Syntax::is_definition(name) => FrameNode::Rewrite,
        Some(SEQUENCE_NEWLINE) => FrameNode::Chain,
        Some(SEQUENCE_SEMICOLON) => FrameNode::Branch,
        _ => FrameNode::Foreign,
    }
}

fn chain_first(chain: &Tree) -> Option<Tree> {
    chain.infix_parts().map(|(_, first, _)| first)
}

fn entry_hash(rewrite: &Tree) -> Option<u64> {
    let (_, pattern, _) = rewrite.infix_parts()?;
    defining_key(&pattern).map(|key| key_hash(&key))
}

fn flatten(node: &Tree, out: &mut Vec<Tree>) {
    match classify(node) {
        FrameNode::Empty | FrameNode::Foreign => {}
        FrameNode::Rewrite => out.push(node.clone()),
        FrameNode::Chain | FrameNode::Branch => {
            if let Some((_, left, right)) = node.infix_parts() {
                flatten(&left, out);
                flatten(&right, out);
            }
        }
    }
}

fn remaining(hash: u64, depth: u32) -> u64 {
    if depth >= u64::BITS {
        0
    } else {
        hash >> depth
    }
}

fn key_hash(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Build the smallest separator structure distinguishing two entries whose
/// remaining hash bits differ.
fn split(existing: Tree, existing_rem: u64, fresh: Tree, fresh_rem: u64) -> Tree {
    let pos = SourcePos::NOWHERE;
    let mut diverge = 0;
    while (existing_rem >> diverge) & 1 == (fresh_rem >> diverge) & 1 {
        diverge += 1;
    }
    let (left, right) = if (fresh_rem >> diverge) & 1 == 0 {
        (fresh, existing)
    } else {
        (existing, fresh)
    };
    let mut node = Tree::infix(SEQUENCE_SEMICOLON, left, right, pos);
    for level in (0..diverge).rev() {
        let bit = (fresh_rem >> level) & 1;
        node = if bit == 0 {
            Tree::infix(SEQUENCE_SEMICOLON, node, Tree::empty(pos), pos)
        } else {
            Tree::infix(SEQUENCE_SEMICOLON, Tree::empty(pos), node, pos)
        };
    }
    node
}

/// The defining name of a pattern: the leftmost name that is not itself a
/// parameter marker. Constants stand for themselves.
#[must_use]
pub fn defining_key(pattern: &Tree) -> Option<EcoString> {
    if let Some(name) = pattern.as_name() {
        return Some(name.into());
    }
    if let Some((value, _)) = pattern.as_natural() {
        return Some(value.to_string().into());
    }
    if let Some(value) = pattern.as_real() {
        return Some(format!("{value}").into());
    }
    if let Some(value) = pattern.as_text() {
        return Some(value.into());
    }
    if let Some(child) = pattern.block_child() {
        return defining_key(&child);
    }
    if let Some((name, left, _)) = pattern.infix_parts() {
        if name == ":" || name == "as" || name == "when" {
            return defining_key(&left);
        }
        // An infix whose left side is a call form is defined by that
        // form, not by the operator: `max X, Y` is a `max` rewrite.
        let mut stripped = left;
        while let Some(child) = stripped.block_child() {
            stripped = child;
        }
        if matches!(stripped.kind(), Kind::Prefix | Kind::Postfix) {
            return defining_key(&stripped);
        }
        return Some(name.into());
    }
    if let Some((left, _)) = pattern.prefix_parts() {
        return defining_key(&left);
    }
    if let Some((_, right)) = pattern.postfix_parts() {
        return defining_key(&right);
    }
    None
}

/// Strip blocks, type annotations and guards off a pattern.
#[must_use]
pub fn pattern_base(pattern: &Tree) -> Tree {
    if let Some(child) = pattern.block_child() {
        return pattern_base(&child);
    }
    if let Some((name, left, _)) = pattern.infix_parts() {
        if name == ":" || name == "as" || name == "when" {
            return pattern_base(&left);
        }
    }
    pattern.clone()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const POS: SourcePos = SourcePos::NOWHERE;

    fn rewrite_for(scope: &Scope, key: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let _: Option<()> = scope.lookup(key, |rewrite, _| {
            seen.push(rewrite.to_string());
            None
        });
        seen
    }

    #[test]
    fn test_declare_then_bound() {
        let scope = Scope::new();
        scope
            .declare(Tree::name("x", POS), Tree::natural(1u32, POS))
            .unwrap();
        let body = scope.bound("x").unwrap();
        assert_eq!(body.to_string(), "1");
        assert!(scope.bound("y").is_none());
    }

    #[test]
    fn test_duplicate_is_rejected_and_old_binding_kept() {
        let scope = Scope::new();
        scope
            .declare(Tree::name("x", POS), Tree::natural(1u32, POS))
            .unwrap();
        let err = scope
            .declare(Tree::name("x", POS), Tree::natural(2u32, POS))
            .unwrap_err();
        assert!(matches!(err, ScopeErrorKind::Duplicate { .. }));
        assert_eq!(scope.bound("x").unwrap().to_string(), "1");
    }

    #[test]
    fn test_define_with_overwrite_replaces_body() {
        let scope = Scope::new();
        scope
            .define(Tree::name("x", POS), Tree::natural(1u32, POS), false)
            .unwrap();
        scope
            .define(Tree::name("x", POS), Tree::natural(2u32, POS), true)
            .unwrap();
        assert_eq!(scope.bound("x").unwrap().to_string(), "2");
        assert_eq!(scope.local_entries().len(), 1);
    }

    #[test]
    fn test_overloads_keep_insertion_order() {
        let scope = Scope::new();
        let zero_pattern = Tree::prefix(
            Tree::name("factorial", POS),
            Tree::natural(0u32, POS),
            POS,
        );
        let n_pattern = Tree::prefix(Tree::name("factorial", POS), Tree::name("N", POS), POS);
        scope
            .declare(zero_pattern, Tree::natural(1u32, POS))
            .unwrap();
        scope.declare(n_pattern, Tree::name("body", POS)).unwrap();

        let seen = rewrite_for(&scope, "factorial");
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("factorial 0"));
        assert!(seen[1].starts_with("factorial N"));
    }

    #[test]
    fn test_lookup_walks_parents_innermost_first() {
        let outer = Scope::new();
        outer
            .declare(Tree::name("p", POS), Tree::text("outer", POS))
            .unwrap();
        let inner = outer.child();
        inner
            .declare(Tree::name("p", POS), Tree::text("inner", POS))
            .unwrap();

        assert_eq!(inner.bound("p").unwrap().to_string(), "\"inner\"");
        assert_eq!(outer.bound("p").unwrap().to_string(), "\"outer\"");
    }

    #[rstest]
    #[case(4)]
    #[case(32)]
    #[case(200)]
    fn test_every_declared_pattern_is_found(#[case] count: usize) {
        let scope = Scope::new();
        for index in 0..count {
            let name = format!("item_{index}");
            scope
                .declare(Tree::name(name, POS), Tree::natural(index as u32, POS))
                .unwrap();
        }
        for index in 0..count {
            let name = format!("item_{index}");
            let body = scope.bound(&name).unwrap();
            assert_eq!(body.to_string(), format!("{index}"));
        }
        assert!(scope.bound("item_missing").is_none());
        assert_eq!(scope.local_entries().len(), count);
    }

    #[test]
    fn test_assign_mutates_nearest_binding() {
        let outer = Scope::new();
        outer
            .declare(Tree::name("counter", POS), Tree::natural(0u32, POS))
            .unwrap();
        let inner = outer.child();
        let _ = inner.assign(&Tree::name("counter", POS), Tree::natural(5u32, POS));

        assert_eq!(outer.bound("counter").unwrap().to_string(), "5");
        assert!(inner.local_entries().is_empty());
    }

    #[test]
    fn test_assign_creates_in_current_frame_when_unbound() {
        let outer = Scope::new();
        let inner = outer.child();
        let _ = inner.assign(&Tree::name("fresh", POS), Tree::natural(9u32, POS));

        assert!(outer.bound("fresh").is_none());
        assert_eq!(inner.bound("fresh").unwrap().to_string(), "9");
    }

    #[rstest]
    #[case("foo X", "foo")]
    fn test_defining_key_of_prefix(#[case] _unused: &str, #[case] expected: &str) {
        let pattern = Tree::prefix(Tree::name("foo", POS), Tree::name("X", POS), POS);
        assert_eq!(defining_key(&pattern).unwrap(), expected);
    }

    #[test]
    fn test_defining_key_of_operator_pattern() {
        let pattern = Tree::infix(
            "+",
            Tree::infix(":", Tree::name("X", POS), Tree::name("integer", POS), POS),
            Tree::infix(":", Tree::name("Y", POS), Tree::name("integer", POS), POS),
            POS,
        );
        assert_eq!(defining_key(&pattern).unwrap(), "+");
    }

    #[test]
    fn test_defining_key_sees_through_blocks_and_guards() {
        let guarded = Tree::infix(
            "when",
            Tree::paren(
                Tree::prefix(Tree::name("max", POS), Tree::name("X", POS), POS),
                POS,
            ),
            Tree::name("G", POS),
            POS,
        );
        assert_eq!(defining_key(&guarded).unwrap(), "max");
    }
}
