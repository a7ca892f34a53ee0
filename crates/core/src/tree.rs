//! The parse-tree representation shared by every stage of evaluation.
//!
//! A [`Tree`] is a cheap, shared handle to one node of one of the eight
//! kinds. Sharing is the normal case: rewrites clone sub-trees instead of
//! mutating them, so the same node commonly appears in several places at
//! once. The handle counts references; the last drop frees the node and
//! the auxiliary [`info`] records attached to it.
//!
//! Interior nodes hold their children in [`cell::TreeCell`] slots so that
//! the few sanctioned mutations (fixing up a freshly built child, scope
//! insertion, `:=` assignment) are atomic with respect to concurrent
//! readers.

pub mod arena;
pub(crate) mod cell;
pub(crate) mod info;

use std::{
    fmt,
    sync::{Arc, Weak},
};

use ecow::EcoString;
use num_bigint::BigUint;

use crate::{
    position::SourcePos,
    tree::{cell::TreeCell, info::InfoList},
};

/// The eight kinds a tree node can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Kind {
    /// An arbitrary-precision natural number
    #[display("natural")]
    Natural,
    /// A binary64 floating-point number
    #[display("real")]
    Real,
    /// A text literal with its delimiters
    #[display("text")]
    Text,
    /// A symbol
    #[display("name")]
    Name,
    /// A delimited block with a single child
    #[display("block")]
    Block,
    /// An operator applied before its operand
    #[display("prefix")]
    Prefix,
    /// An operator applied after its operand
    #[display("postfix")]
    Postfix,
    /// A named binary operator
    #[display("infix")]
    Infix,
}

/// Payload of a node, one variant per [`Kind`].
#[derive(Debug)]
pub(crate) enum Form {
    Natural {
        value: BigUint,
        base: u8,
    },
    Real(f64),
    Text {
        value: EcoString,
        open: EcoString,
        close: EcoString,
    },
    Name(EcoString),
    Block {
        child: TreeCell,
        open: EcoString,
        close: EcoString,
    },
    Prefix {
        left: TreeCell,
        right: TreeCell,
    },
    Postfix {
        left: TreeCell,
        right: TreeCell,
    },
    Infix {
        name: EcoString,
        left: TreeCell,
        right: TreeCell,
    },
}

/// One allocated node. Users only ever see [`Tree`] handles.
#[derive(Debug)]
pub(crate) struct Node {
    form: Form,
    pos: SourcePos,
    infos: InfoList,
}

impl Node {
    fn new(form: Form, pos: SourcePos) -> Self {
        arena::node_created();
        Self {
            form,
            pos,
            infos: InfoList::new(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        arena::node_dropped();
    }
}

/// A shared, owning handle to a tree node.
///
/// Cloning acquires a reference, dropping releases it; both are atomic so
/// handles may be moved freely across threads. Use [`Tree::downgrade`] for
/// back-references that must not keep the node alive.
#[derive(Clone)]
pub struct Tree(Arc<Node>);

/// A non-owning handle, upgradable while the node is still alive.
#[derive(Clone, Debug)]
pub struct TreeRef(Weak<Node>);

impl TreeRef {
    /// Re-acquire an owning handle if the node has not been freed.
    #[must_use]
    pub fn upgrade(&self) -> Option<Tree> {
        self.0.upgrade().map(Tree)
    }
}

/// Delimiters marking a block that came from indentation.
pub const INDENT_OPEN: &str = "\u{1}indent";
/// Closing counterpart of [`INDENT_OPEN`].
pub const INDENT_CLOSE: &str = "\u{1}unindent";

// Constructors.
impl Tree {
    fn build(form: Form, pos: SourcePos) -> Self {
        Self(Arc::new(Node::new(form, pos)))
    }

    /// A natural number written in base 10.
    pub fn natural(value: impl Into<BigUint>, pos: SourcePos) -> Self {
        Self::based_natural(value, 10, pos)
    }

    /// A natural number with an explicit literal base (2, 8, 10 or 16).
    pub fn based_natural(value: impl Into<BigUint>, base: u8, pos: SourcePos) -> Self {
        Self::build(
            Form::Natural {
                value: value.into(),
                base,
            },
            pos,
        )
    }

    /// A floating-point number.
    pub fn real(value: f64, pos: SourcePos) -> Self {
        Self::build(Form::Real(value), pos)
    }

    /// A text literal with the default `"` delimiters.
    pub fn text(value: impl Into<EcoString>, pos: SourcePos) -> Self {
        Self::delimited_text(value, "\"", "\"", pos)
    }

    /// A text literal with explicit delimiters.
    pub fn delimited_text(
        value: impl Into<EcoString>,
        open: impl Into<EcoString>,
        close: impl Into<EcoString>,
        pos: SourcePos,
    ) -> Self {
        Self::build(
            Form::Text {
                value: value.into(),
                open: open.into(),
                close: close.into(),
            },
            pos,
        )
    }

    /// A symbol.
    pub fn name(value: impl Into<EcoString>, pos: SourcePos) -> Self {
        Self::build(Form::Name(value.into()), pos)
    }

    /// The empty name, used as "nothing here" marker in scopes and blocks.
    #[must_use]
    pub fn empty(pos: SourcePos) -> Self {
        Self::name("", pos)
    }

    /// A block with explicit delimiters.
    pub fn block(
        child: Tree,
        open: impl Into<EcoString>,
        close: impl Into<EcoString>,
        pos: SourcePos,
    ) -> Self {
        Self::build(
            Form::Block {
                child: TreeCell::new(child),
                open: open.into(),
                close: close.into(),
            },
            pos,
        )
    }

    /// A parenthesized block.
    #[must_use]
    pub fn paren(child: Tree, pos: SourcePos) -> Self {
        Self::block(child, "(", ")", pos)
    }

    /// A brace block.
    #[must_use]
    pub fn braces(child: Tree, pos: SourcePos) -> Self {
        Self::block(child, "{", "}", pos)
    }

    /// A block produced by indentation.
    #[must_use]
    pub fn indented(child: Tree, pos: SourcePos) -> Self {
        Self::block(child, INDENT_OPEN, INDENT_CLOSE, pos)
    }

    /// A prefix node: `left right` with the operator on the left.
    #[must_use]
    pub fn prefix(left: Tree, right: Tree, pos: SourcePos) -> Self {
        Self::build(
            Form::Prefix {
                left: TreeCell::new(left),
                right: TreeCell::new(right),
            },
            pos,
        )
    }

    /// A postfix node: `left right` with the operator on the right.
    #[must_use]
    pub fn postfix(left: Tree, right: Tree, pos: SourcePos) -> Self {
        Self::build(
            Form::Postfix {
                left: TreeCell::new(left),
                right: TreeCell::new(right),
            },
            pos,
        )
    }

    /// An infix node with its operator name.
    pub fn infix(name: impl Into<EcoString>, left: Tree, right: Tree, pos: SourcePos) -> Self {
        Self::build(
            Form::Infix {
                name: name.into(),
                left: TreeCell::new(left),
                right: TreeCell::new(right),
            },
            pos,
        )
    }
}

// Accessors.
impl Tree {
    /// The kind tag of this node.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match &self.0.form {
            Form::Natural { .. } => Kind::Natural,
            Form::Real(_) => Kind::Real,
            Form::Text { .. } => Kind::Text,
            Form::Name(_) => Kind::Name,
            Form::Block { .. } => Kind::Block,
            Form::Prefix { .. } => Kind::Prefix,
            Form::Postfix { .. } => Kind::Postfix,
            Form::Infix { .. } => Kind::Infix,
        }
    }

    /// The source position the node was created with.
    #[must_use]
    pub fn pos(&self) -> SourcePos {
        self.0.pos
    }

    /// Natural payload: the value and its literal base.
    #[must_use]
    pub fn as_natural(&self) -> Option<(&BigUint, u8)> {
        match &self.0.form {
            Form::Natural { value, base } => Some((value, *base)),
            _ => None,
        }
    }

    /// Real payload.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match &self.0.form {
            Form::Real(value) => Some(*value),
            _ => None,
        }
    }

    /// Text payload, without delimiters.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.0.form {
            Form::Text { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Text delimiters.
    #[must_use]
    pub fn text_delimiters(&self) -> Option<(&str, &str)> {
        match &self.0.form {
            Form::Text { open, close, .. } => Some((open, close)),
            _ => None,
        }
    }

    /// Name payload.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match &self.0.form {
            Form::Name(value) => Some(value),
            _ => None,
        }
    }

    /// Check for a specific name.
    #[must_use]
    pub fn is_name(&self, name: &str) -> bool {
        self.as_name() == Some(name)
    }

    /// Check for the empty name.
    #[must_use]
    pub fn is_empty_name(&self) -> bool {
        self.is_name("")
    }

    /// The child of a block.
    #[must_use]
    pub fn block_child(&self) -> Option<Tree> {
        match &self.0.form {
            Form::Block { child, .. } => Some(child.get()),
            _ => None,
        }
    }

    /// Block delimiters.
    #[must_use]
    pub fn block_delimiters(&self) -> Option<(&str, &str)> {
        match &self.0.form {
            Form::Block { open, close, .. } => Some((open, close)),
            _ => None,
        }
    }

    /// Both children of a prefix, operator first.
    #[must_use]
    pub fn prefix_parts(&self) -> Option<(Tree, Tree)> {
        match &self.0.form {
            Form::Prefix { left, right } => Some((left.get(), right.get())),
            _ => None,
        }
    }

    /// Both children of a postfix, operand first.
    #[must_use]
    pub fn postfix_parts(&self) -> Option<(Tree, Tree)> {
        match &self.0.form {
            Form::Postfix { left, right } => Some((left.get(), right.get())),
            _ => None,
        }
    }

    /// Operator name and children of an infix.
    #[must_use]
    pub fn infix_parts(&self) -> Option<(&str, Tree, Tree)> {
        match &self.0.form {
            Form::Infix { name, left, right } => Some((name, left.get(), right.get())),
            _ => None,
        }
    }

    /// Operator name of an infix.
    #[must_use]
    pub fn infix_name(&self) -> Option<&str> {
        match &self.0.form {
            Form::Infix { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Identity comparison: do both handles point at the same node?
    #[must_use]
    pub fn same(&self, other: &Tree) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A stable key for identity-based side tables.
    #[must_use]
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Obtain a non-owning handle to this node.
    #[must_use]
    pub fn downgrade(&self) -> TreeRef {
        TreeRef(Arc::downgrade(&self.0))
    }

    pub(crate) fn child_cell(&self) -> Option<&TreeCell> {
        match &self.0.form {
            Form::Block { child, .. } => Some(child),
            _ => None,
        }
    }

    pub(crate) fn left_cell(&self) -> Option<&TreeCell> {
        match &self.0.form {
            Form::Prefix { left, .. } | Form::Postfix { left, .. } | Form::Infix { left, .. } => {
                Some(left)
            }
            _ => None,
        }
    }

    pub(crate) fn right_cell(&self) -> Option<&TreeCell> {
        match &self.0.form {
            Form::Prefix { right, .. }
            | Form::Postfix { right, .. }
            | Form::Infix { right, .. } => Some(right),
            _ => None,
        }
    }
}

// Info attachments, delegated to the node's list.
impl Tree {
    /// Attach an auxiliary record, in front of existing ones.
    pub fn attach<T: std::any::Any + Send + Sync>(&self, info: T) {
        self.0.infos.attach(info);
    }

    /// The first attachment of concrete type `T`, if any.
    #[must_use]
    pub fn info<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.infos.get::<T>()
    }

    /// Remove the first attachment of concrete type `T`.
    pub fn drop_info<T: std::any::Any + Send + Sync>(&self) -> bool {
        self.0.infos.remove::<T>()
    }
}

// Structure-level operations.
impl Tree {
    /// Structural equality: equal payloads and equal children, ignoring
    /// positions and attachments.
    #[must_use]
    pub fn structural_eq(&self, other: &Tree) -> bool {
        if self.same(other) {
            return true;
        }
        match (&self.0.form, &other.0.form) {
            (
                Form::Natural { value: a, base: _ },
                Form::Natural { value: b, base: _ },
            ) => a == b,
            (Form::Real(a), Form::Real(b)) => a == b,
            (Form::Text { value: a, .. }, Form::Text { value: b, .. }) => a == b,
            (Form::Name(a), Form::Name(b)) => a == b,
            (
                Form::Block {
                    child: a,
                    open: ao,
                    close: ac,
                },
                Form::Block {
                    child: b,
                    open: bo,
                    close: bc,
                },
            ) => ao == bo && ac == bc && a.get().structural_eq(&b.get()),
            (
                Form::Prefix {
                    left: al,
                    right: ar,
                },
                Form::Prefix {
                    left: bl,
                    right: br,
                },
            )
            | (
                Form::Postfix {
                    left: al,
                    right: ar,
                },
                Form::Postfix {
                    left: bl,
                    right: br,
                },
            ) => al.get().structural_eq(&bl.get()) && ar.get().structural_eq(&br.get()),
            (
                Form::Infix {
                    name: an,
                    left: al,
                    right: ar,
                },
                Form::Infix {
                    name: bn,
                    left: bl,
                    right: br,
                },
            ) => {
                an == bn
                    && al.get().structural_eq(&bl.get())
                    && ar.get().structural_eq(&br.get())
            }
            _ => false,
        }
    }

    /// A fresh copy of this node only: same payload, same children, no
    /// attachments. Interior handles still point at the shared children.
    #[must_use]
    pub fn shallow_clone(&self) -> Tree {
        let form = match &self.0.form {
            Form::Natural { value, base } => Form::Natural {
                value: value.clone(),
                base: *base,
            },
            Form::Real(value) => Form::Real(*value),
            Form::Text { value, open, close } => Form::Text {
                value: value.clone(),
                open: open.clone(),
                close: close.clone(),
            },
            Form::Name(value) => Form::Name(value.clone()),
            Form::Block { child, open, close } => Form::Block {
                child: TreeCell::new(child.get()),
                open: open.clone(),
                close: close.clone(),
            },
            Form::Prefix { left, right } => Form::Prefix {
                left: TreeCell::new(left.get()),
                right: TreeCell::new(right.get()),
            },
            Form::Postfix { left, right } => Form::Postfix {
                left: TreeCell::new(left.get()),
                right: TreeCell::new(right.get()),
            },
            Form::Infix { name, left, right } => Form::Infix {
                name: name.clone(),
                left: TreeCell::new(left.get()),
                right: TreeCell::new(right.get()),
            },
        };
        Self::build(form, self.0.pos)
    }

    /// A fresh copy of the whole structure, sharing nothing with the
    /// original and carrying no attachments.
    #[must_use]
    pub fn deep_clone(&self) -> Tree {
        match &self.0.form {
            Form::Block { child, open, close } => Tree::block(
                child.get().deep_clone(),
                open.clone(),
                close.clone(),
                self.0.pos,
            ),
            Form::Prefix { left, right } => {
                Tree::prefix(left.get().deep_clone(), right.get().deep_clone(), self.0.pos)
            }
            Form::Postfix { left, right } => {
                Tree::postfix(left.get().deep_clone(), right.get().deep_clone(), self.0.pos)
            }
            Form::Infix { name, left, right } => Tree::infix(
                name.clone(),
                left.get().deep_clone(),
                right.get().deep_clone(),
                self.0.pos,
            ),
            _ => self.shallow_clone(),
        }
    }

    /// Post-order traversal: block child first, prefix and infix left then
    /// right, postfix right then left, the node itself last.
    pub fn walk(&self, action: &mut impl FnMut(&Tree)) {
        match &self.0.form {
            Form::Block { child, .. } => child.get().walk(action),
            Form::Prefix { left, right } | Form::Infix { left, right, .. } => {
                left.get().walk(action);
                right.get().walk(action);
            }
            Form::Postfix { left, right } => {
                right.get().walk(action);
                left.get().walk(action);
            }
            _ => {}
        }
        action(self);
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::renderer::render(self))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_infix() -> Tree {
        let pos = SourcePos::NOWHERE;
        Tree::infix(
            "+",
            Tree::natural(3u32, pos),
            Tree::natural(4u32, pos),
            pos,
        )
    }

    #[test]
    fn test_kind_tags_match_constructors() {
        let pos = SourcePos::NOWHERE;
        assert_eq!(Tree::natural(1u32, pos).kind(), Kind::Natural);
        assert_eq!(Tree::real(1.5, pos).kind(), Kind::Real);
        assert_eq!(Tree::text("t", pos).kind(), Kind::Text);
        assert_eq!(Tree::name("n", pos).kind(), Kind::Name);
        let child = Tree::empty(pos);
        assert_eq!(Tree::paren(child.clone(), pos).kind(), Kind::Block);
        assert_eq!(
            Tree::prefix(Tree::name("f", pos), child.clone(), pos).kind(),
            Kind::Prefix
        );
        assert_eq!(
            Tree::postfix(child.clone(), Tree::name("!", pos), pos).kind(),
            Kind::Postfix
        );
        assert_eq!(sample_infix().kind(), Kind::Infix);
    }

    #[test]
    fn test_structural_equality_ignores_identity() {
        let a = sample_infix();
        let b = sample_infix();
        assert!(!a.same(&b));
        assert!(a.structural_eq(&b));
    }

    #[test]
    fn test_structural_equality_detects_differences() {
        let a = sample_infix();
        let pos = SourcePos::NOWHERE;
        let b = Tree::infix(
            "-",
            Tree::natural(3u32, pos),
            Tree::natural(4u32, pos),
            pos,
        );
        assert!(!a.structural_eq(&b));
    }

    #[test]
    fn test_deep_clone_shares_nothing() {
        let a = sample_infix();
        let b = a.deep_clone();
        assert!(a.structural_eq(&b));
        let (_, al, _) = a.infix_parts().unwrap();
        let (_, bl, _) = b.infix_parts().unwrap();
        assert!(!al.same(&bl));
    }

    #[test]
    fn test_shallow_clone_shares_children() {
        let a = sample_infix();
        let b = a.shallow_clone();
        let (_, al, _) = a.infix_parts().unwrap();
        let (_, bl, _) = b.infix_parts().unwrap();
        assert!(al.same(&bl));
    }

    #[test]
    fn test_walk_order_is_postfix_aware() {
        let pos = SourcePos::NOWHERE;
        let tree = Tree::postfix(Tree::name("x", pos), Tree::name("!", pos), pos);
        let mut seen = Vec::new();
        tree.walk(&mut |node| {
            if let Some(name) = node.as_name() {
                seen.push(name.to_string());
            } else {
                seen.push("<op>".into());
            }
        });
        assert_eq!(seen, ["!", "x", "<op>"]);
    }

    #[test]
    fn test_weak_handles_do_not_keep_nodes_alive() {
        let weak = sample_infix().downgrade();
        assert!(weak.upgrade().is_none());
        let strong = sample_infix();
        let weak = strong.downgrade();
        assert!(weak.upgrade().is_some());
    }
}
