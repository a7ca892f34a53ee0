//! Live-node accounting for the tree arena.
//!
//! Allocation itself is the global allocator's business; what the arena
//! tracks is the number of nodes currently alive, so that tests and
//! embedders can verify that evaluations release everything they acquire.

use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_NODES: AtomicUsize = AtomicUsize::new(0);
static TOTAL_NODES: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn node_created() {
    let _ = LIVE_NODES.fetch_add(1, Ordering::Relaxed);
    let _ = TOTAL_NODES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn node_dropped() {
    let _ = LIVE_NODES.fetch_sub(1, Ordering::Relaxed);
}

/// Number of tree nodes currently alive in the process.
#[must_use]
pub fn live_nodes() -> usize {
    LIVE_NODES.load(Ordering::Relaxed)
}

/// Number of tree nodes ever created in the process.
#[must_use]
pub fn total_nodes() -> usize {
    TOTAL_NODES.load(Ordering::Relaxed)
}
