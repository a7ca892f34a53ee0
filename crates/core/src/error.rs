//! Error types and diagnostics.
//!
//! Diagnostics are values: a message template with `$1 $2 …` placeholders,
//! a source position, and the argument trees to interpolate. They are
//! accumulated in the [`collector::Errors`] stack during evaluation; only
//! genuinely unrecoverable conditions surface as [`TiliaError`] and unwind
//! through `Result`.

pub(crate) mod collector;

use std::fmt::{self, Display};

use crate::{
    position::{Positions, SourcePos},
    renderer::{render_short, DEFAULT_RENDER_BUDGET},
    tree::Tree,
};

/// Result type that is being returned from methods that can fail with a
/// [`TiliaError`].
pub type TiliaResult<T, E = Box<TiliaError>> = Result<T, E>;

/// Errors that abort the current operation.
#[derive(thiserror::Error, Debug, displaydoc::Display)]
#[non_exhaustive]
pub enum TiliaError {
    /// syntax error: {0}
    Syntax(Diagnostic),
    /// evaluation aborted: {0}
    Fatal(Diagnostic),
    /// evaluation exceeded the recursion limit: {0}
    StackOverflow(Diagnostic),
    /// malformed tree data: {0}
    Format(#[from] binrw::Error),
}

impl From<binrw::Error> for Box<TiliaError> {
    fn from(err: binrw::Error) -> Self {
        Box::new(TiliaError::Format(err))
    }
}

/// Severity of a diagnostic, ranging from informational to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Additional information attached to another diagnostic
    Note,
    /// Something might be wrong
    Warning,
    /// Something is wrong, evaluation continues
    Error,
    /// Something is wrong and evaluation cannot continue
    Fatal,
}

/// One diagnostic: a message template, a position and argument trees.
///
/// `$1`, `$2`, … in the template stand for the rendered arguments, cut to
/// a 60-column budget each.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: Severity,
    message: &'static str,
    pos: SourcePos,
    args: Vec<Tree>,
    notes: Vec<Diagnostic>,
}

impl Diagnostic {
    /// A diagnostic with an explicit severity.
    #[must_use]
    pub fn new(severity: Severity, message: &'static str, pos: SourcePos) -> Self {
        Self {
            severity,
            message,
            pos,
            args: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// An error-severity diagnostic.
    #[must_use]
    pub fn error(message: &'static str, pos: SourcePos) -> Self {
        Self::new(Severity::Error, message, pos)
    }

    /// A warning-severity diagnostic.
    #[must_use]
    pub fn warning(message: &'static str, pos: SourcePos) -> Self {
        Self::new(Severity::Warning, message, pos)
    }

    /// A note, meant to hang off a primary diagnostic.
    #[must_use]
    pub fn note(message: &'static str, pos: SourcePos) -> Self {
        Self::new(Severity::Note, message, pos)
    }

    /// Append an argument tree, becoming the next `$n` placeholder.
    #[must_use]
    pub fn with_arg(mut self, arg: Tree) -> Self {
        self.args.push(arg);
        self
    }

    /// Attach a context note.
    #[must_use]
    pub fn with_note(mut self, note: Diagnostic) -> Self {
        self.notes.push(note);
        self
    }

    /// The severity this diagnostic was created with.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub(crate) fn escalate(mut self) -> Self {
        self.severity = Severity::Fatal;
        self
    }

    /// The position the diagnostic points at.
    #[must_use]
    pub fn pos(&self) -> SourcePos {
        self.pos
    }

    /// The raw message template.
    #[must_use]
    pub fn message(&self) -> &'static str {
        self.message
    }

    /// The argument trees, in placeholder order.
    #[must_use]
    pub fn args(&self) -> &[Tree] {
        &self.args
    }

    /// Context notes attached to this diagnostic.
    #[must_use]
    pub fn notes(&self) -> &[Diagnostic] {
        &self.notes
    }

    /// The message with `$n` placeholders substituted.
    #[must_use]
    pub fn substituted(&self) -> String {
        let mut out = String::with_capacity(self.message.len());
        let mut rest = self.message;
        while let Some(index) = rest.find('$') {
            out.push_str(&rest[..index]);
            rest = &rest[index + 1..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                out.push('$');
                continue;
            }
            rest = &rest[digits.len()..];
            match digits.parse::<usize>() {
                Ok(n) if n >= 1 && n <= self.args.len() => {
                    out.push_str(&render_short(&self.args[n - 1], DEFAULT_RENDER_BUDGET));
                }
                _ => {
                    out.push('$');
                    out.push_str(&digits);
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Format as `file:line:column: message`, resolving the position
    /// against the given table; notes are indented below.
    #[must_use]
    pub fn display_with(&self, positions: &Positions) -> String {
        let mut out = String::new();
        self.format_with(positions, 0, &mut out);
        out
    }

    fn format_with(&self, positions: &Positions, indent: usize, out: &mut String) {
        for _ in 0..indent {
            out.push_str("    ");
        }
        if let Some(location) = positions.resolve(self.pos) {
            out.push_str(&location.to_string());
            out.push_str(": ");
        }
        out.push_str(&self.substituted());
        for note in &self.notes {
            out.push('\n');
            note.format_with(positions, indent + 1, out);
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.substituted())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_placeholders_substitute_in_order() {
        let pos = SourcePos::NOWHERE;
        let diag = Diagnostic::error("no pattern matches $1 (seen $2)", pos)
            .with_arg(Tree::name("foo", pos))
            .with_arg(Tree::natural(42u32, pos));
        assert_eq!(diag.to_string(), "no pattern matches foo (seen 42)");
    }

    #[test]
    fn test_unknown_placeholders_stay_verbatim() {
        let diag = Diagnostic::error("kept $2 and $x", SourcePos::NOWHERE)
            .with_arg(Tree::name("a", SourcePos::NOWHERE));
        assert_eq!(diag.to_string(), "kept $2 and $x");
    }

    #[test]
    fn test_display_with_positions_and_notes() {
        let mut positions = Positions::new();
        let base = positions.add_source("demo.tl", "foo 42\n");
        let diag = Diagnostic::error("no pattern matches $1", base)
            .with_arg(Tree::name("foo", base))
            .with_note(Diagnostic::note("declared here", SourcePos::NOWHERE));
        let rendered = diag.display_with(&positions);
        assert_eq!(
            rendered,
            "demo.tl:1:1: no pattern matches foo\n    declared here"
        );
    }
}
