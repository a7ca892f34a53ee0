//! End-to-end evaluation tests: programs parsed with the default syntax,
//! evaluated in a fresh root scope over the builtins.

use pretty_assertions::assert_eq;
use rstest::rstest;
use tilia_core::Interpreter;
use tilia_testing::{eval_program, eval_program_with, TestResult};

#[rstest]
#[case::factorial(
    "factorial 0 is 1\nfactorial N is N * factorial (N-1)\nfactorial 5",
    "120"
)]
#[case::fibonacci(
    "fib 0 is 0\nfib 1 is 1\nfib N is fib (N-1) + fib (N-2)\nfib 10",
    "55"
)]
#[case::builtin_addition("X:integer + Y:integer is builtin add X Y\n3 + 4", "7")]
#[case::guarded_maximum("max X, Y when X > Y is X\nmax X, Y is Y\nmax 3, 7", "7")]
#[case::guarded_maximum_other_side(
    "max X, Y when X > Y is X\nmax X, Y is Y\nmax 9, 2",
    "9"
)]
#[case::text_greeting("greet N:text is \"Hello, \" & N\ngreet \"world\"", "\"Hello, world\"")]
#[case::comparison_chain("7 > 3", "true")]
#[case::real_arithmetic("1.5 + 2.25", "3.75")]
#[case::based_numbers("16#10 + 2#1", "17")]
fn test_language_scenarios(#[case] source: &str, #[case] expected: &str) -> TestResult<()> {
    let outcome = eval_program(source)?;
    assert_eq!(
        outcome.result.to_string(),
        expected,
        "diagnostics: {}",
        outcome.errors.display_with(&outcome.positions)
    );
    assert!(!outcome.errors.had_errors());
    Ok(())
}

#[test]
fn test_unbound_call_self_evaluates() -> TestResult<()> {
    let outcome = eval_program("foo 42")?;
    assert_eq!(outcome.result.to_string(), "foo 42");
    assert!(!outcome.errors.had_errors());
    Ok(())
}

#[test]
fn test_arguments_evaluate_left_to_right_exactly_once() -> TestResult<()> {
    let source = "\
order := 0
f X, Y is order
f (order := order * 10 + 1), (order := order * 10 + 2)";
    let outcome = eval_program(source)?;
    assert_eq!(outcome.result.to_string(), "12");
    Ok(())
}

#[test]
fn test_innermost_declaration_wins() -> TestResult<()> {
    let source = "\
p X is \"outer\"
{ p X is \"inner\"; p 1 }";
    let outcome = eval_program(source)?;
    assert_eq!(outcome.result.to_string(), "\"inner\"");
    Ok(())
}

#[test]
fn test_tree_typed_argument_is_not_evaluated() -> TestResult<()> {
    let source = "\
counter := 0
tick is counter := counter + 1
lazy F:tree is 0
lazy (tick)
counter";
    let outcome = eval_program(source)?;
    assert_eq!(outcome.result.to_string(), "0");
    Ok(())
}

#[test]
fn test_untyped_argument_is_evaluated_eagerly() -> TestResult<()> {
    let source = "\
counter := 0
tick is counter := counter + 1
eager F is 0
eager (tick)
counter";
    let outcome = eval_program(source)?;
    assert_eq!(outcome.result.to_string(), "1");
    Ok(())
}

#[test]
fn test_deferred_argument_captures_callers_scope() -> TestResult<()> {
    let source = "\
x is 10
force F:tree is F
force (x + 1)";
    let outcome = eval_program(source)?;
    assert_eq!(outcome.result.to_string(), "11");
    Ok(())
}

#[test]
fn test_assignment_mutates_across_statements() -> TestResult<()> {
    let source = "\
total := 0
total := total + 4
total := total * 10
total";
    let outcome = eval_program(source)?;
    assert_eq!(outcome.result.to_string(), "40");
    Ok(())
}

#[test]
fn test_repeated_parameter_requires_equal_arguments() -> TestResult<()> {
    let source = "\
same X, X is \"yes\"
same 3, 3";
    let outcome = eval_program(source)?;
    assert_eq!(outcome.result.to_string(), "\"yes\"");

    let outcome = eval_program("same X, X is \"yes\"\nsame 3, 4")?;
    assert_eq!(outcome.result.to_string(), "same 3, 4");
    assert!(outcome.errors.had_errors());
    Ok(())
}

#[test]
fn test_indented_block_as_body() -> TestResult<()> {
    let source = "\
compute is
    a is 6
    a * 7
compute";
    let outcome = eval_program(source)?;
    assert_eq!(
        outcome.result.to_string(),
        "42",
        "diagnostics: {}",
        outcome.errors.display_with(&outcome.positions)
    );
    Ok(())
}

#[test]
fn test_recursion_limit_unwinds_fatally() {
    let source = "spin X is spin (X)\nspin 1";
    let result = eval_program_with(source, &Interpreter::with_max_depth(30));
    assert!(result.is_err());
}

#[test]
fn test_booleans_and_logic() -> TestResult<()> {
    let outcome = eval_program("3 < 4 and 4 < 3")?;
    assert_eq!(outcome.result.to_string(), "false");
    let outcome = eval_program("not (3 > 4)")?;
    assert_eq!(outcome.result.to_string(), "true");
    Ok(())
}
