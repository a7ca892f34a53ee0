//! Atomic tree-valued slots.
//!
//! A [`TreeCell`] holds one child handle of an interior node. Readers get
//! a clone of the current handle; writers replace it wholesale. Readers
//! racing a writer observe either the old or the new tree, never a
//! half-written one.

use std::sync::{PoisonError, RwLock};

use crate::tree::Tree;

/// A tree-valued slot with atomic replacement.
pub struct TreeCell(RwLock<Tree>);

impl TreeCell {
    /// Wrap an initial tree.
    #[must_use]
    pub fn new(tree: Tree) -> Self {
        Self(RwLock::new(tree))
    }

    /// The current tree, as an owning handle.
    #[must_use]
    pub fn get(&self) -> Tree {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current tree unconditionally.
    pub fn set(&self, tree: Tree) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = tree;
    }

    /// Replace the current tree only if it is still `expected` (by node
    /// identity). Returns whether the swap happened.
    pub fn compare_and_swap(&self, expected: &Tree, tree: Tree) -> bool {
        let mut slot = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if slot.same(expected) {
            *slot = tree;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for TreeCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TreeCell({:?})", self.get())
    }
}
