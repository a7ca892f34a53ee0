//! Reference-count balance: a full evaluation whose inputs and results
//! are dropped leaves the arena's live-node count where it started.
//!
//! This file intentionally holds a single test: the assertion is over a
//! process-global counter, so no other test may allocate trees
//! concurrently.

use tilia_core::arena;
use tilia_testing::{eval_program, TestResult};

#[test]
fn test_live_node_count_balances_after_evaluation() -> TestResult<()> {
    // Force the builtin scope (a process-wide constant) into existence
    // before taking the baseline.
    let warmup = eval_program("1 + 1")?;
    drop(warmup);

    let baseline = arena::live_nodes();
    {
        let outcome = eval_program(
            "factorial 0 is 1\nfactorial N is N * factorial (N-1)\nfactorial 6",
        )?;
        assert_eq!(outcome.result.to_string(), "720");
        assert!(arena::live_nodes() > baseline);
        drop(outcome);
    }
    assert_eq!(arena::live_nodes(), baseline);
    Ok(())
}
