//! The per-call-site candidate cache.
//!
//! The first evaluation of a call site walks the scope chain and analyzes
//! every rewrite whose defining name is compatible; the surviving
//! candidates are cached on the call-site tree itself, as an info record,
//! keyed by the identity of the evaluation scope. The cache is monotonic:
//! entries are added, never invalidated. A call from a different scope
//! simply gets its own entry.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::{
    bind::{BindingStrength, Candidate},
    scope::{defining_key, Scope},
    tree::{Tree, TreeRef},
    types::TypeContext,
};

/// The ordered candidate set for one call site in one scope.
#[derive(Debug)]
pub struct RewriteCalls {
    /// Applicable candidates, innermost scope first, declaration order
    /// within a scope; `Failed` candidates are dropped at build time.
    pub candidates: Vec<Candidate>,
    /// How many rewrites were considered, including failed ones. A call
    /// form with `seen > 0` but no runtime match deserves a diagnostic;
    /// plain data does not.
    pub seen: usize,
}

/// Cache of [`RewriteCalls`] per evaluation scope, attached to the
/// call-site tree. Scope handles are weak: a dead scope's entry is
/// unreachable anyway, and its identity is revalidated on every hit so a
/// recycled address cannot alias a dead scope.
#[derive(Debug, Default)]
struct CallCache {
    entries: Mutex<Vec<(TreeRef, Arc<RewriteCalls>)>>,
}

impl CallCache {
    fn find(&self, scope: &Scope) -> Option<Arc<RewriteCalls>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().find_map(|(tree, calls)| {
            let alive = tree.upgrade()?;
            if alive.same(scope.tree()) {
                Some(Arc::clone(calls))
            } else {
                None
            }
        })
    }

    fn insert(&self, scope: &Scope, calls: &Arc<RewriteCalls>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push((scope.tree().downgrade(), Arc::clone(calls)));
    }
}

/// The candidate set for evaluating `value` in `scope`, cached on `value`.
#[must_use]
pub fn rewrite_calls(scope: &Scope, value: &Tree) -> Arc<RewriteCalls> {
    if let Some(cache) = value.info::<CallCache>() {
        if let Some(calls) = cache.find(scope) {
            return calls;
        }
    } else {
        value.attach(CallCache::default());
    }

    let mut candidates = Vec::new();
    let mut seen = 0;
    if let Some(key) = defining_key(value) {
        let _: Option<()> = scope.lookup(&key, |rewrite, declaration_scope| {
            seen += 1;
            let mut types = TypeContext::new();
            let candidate = Candidate::build(rewrite, declaration_scope, value, &mut types);
            if candidate.strength == BindingStrength::Failed {
                debug!("discarding failed candidate {} for {}", candidate.pattern, value);
            } else {
                candidates.push(candidate);
            }
            None
        });
    }

    let calls = Arc::new(RewriteCalls { candidates, seen });
    if let Some(cache) = value.info::<CallCache>() {
        cache.insert(scope, &calls);
    }
    calls
}
