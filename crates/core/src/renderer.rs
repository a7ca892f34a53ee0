//! Bounded tree rendering for diagnostics.
//!
//! Errors embed trees in their message; the renderer turns a tree into a
//! single line, parenthesized just enough to be unambiguous, and cut off
//! at a column budget so a deeply nested argument cannot flood a message.

use std::fmt::Write as _;

use crate::{
    syntax::{Syntax, APPLICATION_PRIORITY, SEQUENCE_NEWLINE},
    tree::{Kind, Tree, INDENT_OPEN},
};

/// Column budget used when a diagnostic renders its arguments.
pub const DEFAULT_RENDER_BUDGET: usize = 60;

/// Render a tree on a single unbounded line.
#[must_use]
pub fn render(tree: &Tree) -> String {
    let mut out = String::new();
    render_into(&mut out, tree);
    out
}

/// Render a tree on a single line of at most `budget` characters,
/// truncating with an ellipsis when it does not fit.
#[must_use]
pub fn render_short(tree: &Tree, budget: usize) -> String {
    let full = render(tree);
    if full.chars().count() <= budget {
        return full;
    }
    let mut cut: String = full.chars().take(budget.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn priority_of(tree: &Tree) -> u32 {
    match tree.kind() {
        Kind::Infix => tree
            .infix_name()
            .and_then(|name| Syntax::standard().infix(name))
            .map_or(APPLICATION_PRIORITY, |entry| entry.priority),
        Kind::Prefix | Kind::Postfix => APPLICATION_PRIORITY,
        _ => u32::MAX,
    }
}

fn render_child(out: &mut String, child: &Tree, parent_priority: u32) {
    if priority_of(child) < parent_priority {
        out.push('(');
        render_into(out, child);
        out.push(')');
    } else {
        render_into(out, child);
    }
}

fn render_into(out: &mut String, tree: &Tree) {
    match tree.kind() {
        Kind::Natural => {
            if let Some((value, base)) = tree.as_natural() {
                match base {
                    2 => {
                        let _ = write!(out, "2#{}", value.to_str_radix(2));
                    }
                    8 => {
                        let _ = write!(out, "8#{}", value.to_str_radix(8));
                    }
                    16 => {
                        let _ = write!(out, "16#{}", value.to_str_radix(16).to_uppercase());
                    }
                    _ => {
                        let _ = write!(out, "{value}");
                    }
                }
            }
        }
        Kind::Real => {
            if let Some(value) = tree.as_real() {
                let text = format!("{value}");
                out.push_str(&text);
                if !text.contains(['.', 'e', 'E', 'n', 'i']) {
                    out.push_str(".0");
                }
            }
        }
        Kind::Text => {
            if let (Some(value), Some((open, close))) = (tree.as_text(), tree.text_delimiters()) {
                out.push_str(open);
                out.push_str(&value.replace('"', "\"\""));
                out.push_str(close);
            }
        }
        Kind::Name => {
            if let Some(value) = tree.as_name() {
                out.push_str(value);
            }
        }
        Kind::Block => {
            if let (Some(child), Some((open, close))) =
                (tree.block_child(), tree.block_delimiters())
            {
                if open == INDENT_OPEN {
                    out.push_str("{ ");
                    render_into(out, &child);
                    out.push_str(" }");
                } else {
                    out.push_str(open);
                    render_into(out, &child);
                    out.push_str(close);
                }
            }
        }
        Kind::Prefix => {
            if let Some((left, right)) = tree.prefix_parts() {
                render_child(out, &left, APPLICATION_PRIORITY);
                out.push(' ');
                render_child(out, &right, APPLICATION_PRIORITY + 1);
            }
        }
        Kind::Postfix => {
            if let Some((left, right)) = tree.postfix_parts() {
                render_child(out, &left, APPLICATION_PRIORITY + 1);
                render_child(out, &right, APPLICATION_PRIORITY);
            }
        }
        Kind::Infix => {
            if let Some((name, left, right)) = tree.infix_parts() {
                let priority = priority_of(tree);
                render_child(out, &left, priority);
                if name == SEQUENCE_NEWLINE {
                    out.push_str("; ");
                } else if name == ":" {
                    out.push(':');
                } else {
                    out.push(' ');
                    out.push_str(name);
                    out.push(' ');
                }
                render_child(out, &right, priority + 1);
            }
        }
    }
}

impl std::fmt::Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render(self))
    }
}
