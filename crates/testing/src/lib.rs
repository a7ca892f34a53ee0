//! Testing utilities for the `tilia` workspace.

use std::error::Error;
use std::sync::Once;

use log::LevelFilter;
use simplelog::{Config, SimpleLogger};
use tilia_core::{builtins, Errors, Interpreter, Positions, Tree};

/// A test result.
pub type TestResult<T> = Result<T, Box<dyn Error>>;

/// Everything a test usually wants to look at after running a program.
#[derive(Debug)]
pub struct EvalOutcome {
    /// The value of the program.
    pub result: Tree,
    /// Diagnostics accumulated while evaluating.
    pub errors: Errors,
    /// The position table, for rendering diagnostics.
    pub positions: Positions,
}

/// Enable debug logging for a test run. Safe to call repeatedly.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = SimpleLogger::init(LevelFilter::Debug, Config::default());
    });
}

/// Parse a program with the default syntax.
///
/// # Errors
///
/// If the source does not scan or parse, or contains no tokens at all.
pub fn parse_program(source: &str) -> TestResult<Tree> {
    let mut positions = Positions::new();
    let tree = tilia_core::parse_source(source, "test.tl", &mut positions)?;
    tree.ok_or_else(|| "program has no content".into())
}

/// Parse and evaluate a program in a fresh root scope over the builtins.
///
/// # Errors
///
/// If parsing fails or evaluation aborts fatally.
pub fn eval_program(source: &str) -> TestResult<EvalOutcome> {
    eval_program_with(source, &Interpreter::new())
}

/// Parse and evaluate a program with a caller-provided interpreter.
///
/// # Errors
///
/// If parsing fails or evaluation aborts fatally.
pub fn eval_program_with(source: &str, interpreter: &Interpreter) -> TestResult<EvalOutcome> {
    let mut positions = Positions::new();
    let tree = tilia_core::parse_source(source, "test.tl", &mut positions)?
        .ok_or("program has no content")?;
    let scope = builtins::standard_scope();
    let mut errors = Errors::new();
    let result = interpreter.evaluate(&scope, &tree, &mut errors)?;
    Ok(EvalOutcome {
        result,
        errors,
        positions,
    })
}
