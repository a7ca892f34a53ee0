//! Auxiliary records attached to tree nodes.
//!
//! An info is any `'static` value identified by its concrete type: type
//! annotations, cached rewrite calls, comments, whatever a consumer needs
//! to remember about a node. The list is owned by the host node and dies
//! with it. Lookups return shared handles so that readers never hold the
//! host's lock across their own work.

use std::{
    any::Any,
    sync::{Arc, Mutex, PoisonError},
};

/// The singly-ordered list of attachments of one node.
#[derive(Debug, Default)]
pub(crate) struct InfoList(Mutex<Vec<Arc<dyn Any + Send + Sync>>>);

impl InfoList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Prepend an attachment, so the most recent one of a type wins.
    pub(crate) fn attach<T: Any + Send + Sync>(&self, info: T) {
        let mut list = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        list.insert(0, Arc::new(info));
    }

    /// The first attachment of concrete type `T`.
    pub(crate) fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let list = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        list.iter()
            .find_map(|info| Arc::clone(info).downcast::<T>().ok())
    }

    /// Remove the first attachment of concrete type `T`.
    pub(crate) fn remove<T: Any + Send + Sync>(&self) -> bool {
        let mut list = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let position = list.iter().position(|info| info.as_ref().is::<T>());
        match position {
            Some(index) => {
                let _ = list.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{position::SourcePos, tree::Tree};

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[derive(Debug, PartialEq)]
    struct Other(&'static str);

    #[test]
    fn test_first_of_type_wins() {
        let tree = Tree::empty(SourcePos::NOWHERE);
        tree.attach(Marker(1));
        tree.attach(Other("aux"));
        tree.attach(Marker(2));

        let marker = tree.info::<Marker>();
        assert_eq!(marker.as_deref(), Some(&Marker(2)));
        assert_eq!(tree.info::<Other>().as_deref(), Some(&Other("aux")));
    }

    #[test]
    fn test_remove_only_drops_one() {
        let tree = Tree::empty(SourcePos::NOWHERE);
        tree.attach(Marker(1));
        tree.attach(Marker(2));

        assert!(tree.drop_info::<Marker>());
        assert_eq!(tree.info::<Marker>().as_deref(), Some(&Marker(1)));
        assert!(tree.drop_info::<Marker>());
        assert!(!tree.drop_info::<Marker>());
        assert!(tree.info::<Marker>().is_none());
    }
}
