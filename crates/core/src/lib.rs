/*!
A library implementing the evaluation core of tilia, a homoiconic language
whose entire semantics are the rewriting of parse trees by user-declarable
rewrite rules.

# Overview

This section gives a brief overview of the primary types in this crate:

Everything is a [`Tree`]: programs, patterns, types and scopes are all
made of the same eight node kinds, shared by reference counting. A
[`Scope`] holds rewrite declarations (`pattern is body`) in a
hash-ordered frame and chains to its parent. The [`Interpreter`]
evaluates a tree in a scope: it caches the applicable rewrite candidates
per call site, binds arguments strictly left to right, runs the runtime
checks the pattern matcher recorded, and evaluates the first winning
body; an expression nothing matches evaluates to itself.

Sources are turned into trees by [`parse_source`] with the operator table
in [`Syntax`]; diagnostics accumulate in [`Errors`] and render through
the bounded [`render_short`]; the [`serializer`] module persists trees in
a self-describing binary format.

# Example - declare rewrites and evaluate a call

```rust
use tilia_core::{builtins, Errors, Interpreter, Positions};

let program = "\
factorial 0 is 1
factorial N is N * factorial (N-1)
factorial 5";

let mut positions = Positions::new();
let tree = tilia_core::parse_source(program, "demo.tl", &mut positions)
    .unwrap()
    .unwrap();

let scope = builtins::standard_scope();
let mut errors = Errors::new();
let result = Interpreter::new().evaluate(&scope, &tree, &mut errors).unwrap();

assert_eq!(result.to_string(), "120");
assert!(!errors.had_errors());
```
*/

pub(crate) mod bind;
pub(crate) mod calls;
pub(crate) mod error;
pub(crate) mod eval;
pub(crate) mod parser;
pub(crate) mod position;
pub(crate) mod renderer;
pub(crate) mod scanner;
pub(crate) mod scope;
/// Binary serialization of trees, with a magic number and per-kind tags
pub mod serializer;
pub(crate) mod syntax;
pub(crate) mod tree;
pub(crate) mod types;

// tilia_core Public API
pub use crate::{
    bind::{Binding, BindingStrength, Candidate, Condition, KindCheck, TypeCheck},
    calls::{rewrite_calls, RewriteCalls},
    error::{collector::Errors, Diagnostic, Severity, TiliaError, TiliaResult},
    eval::{builtins, Interpreter},
    parser::parse_source,
    position::{Location, Positions, SourcePos},
    renderer::{render, render_short, DEFAULT_RENDER_BUDGET},
    scanner::{scan, Lexeme, Token},
    scope::{defining_key, pattern_base, Scope, ScopeErrorKind, ScopeId},
    syntax::{Associativity, InfixEntry, Syntax},
    tree::{arena, Kind, Tree, TreeRef},
    types::{TypeContext, TypeErrorKind},
};
