//! Accumulation of diagnostics during evaluation.
//!
//! Evaluation does not stop at the first problem: non-fatal diagnostics
//! pile up in the innermost frame of an [`Errors`] stack while evaluation
//! carries on, and a fatal one marks the stack so callers unwind. Frames
//! let speculative work (trying a rewrite candidate, loading a module)
//! collect its own diagnostics and decide afterwards whether to keep them.

use log::{debug, error, warn};

use crate::{
    error::{Diagnostic, Severity, TiliaError},
    position::Positions,
};

/// One level of the diagnostic stack.
#[derive(Debug, Default)]
struct Frame {
    diagnostics: Vec<Diagnostic>,
    fatal: bool,
}

/// The per-evaluation diagnostic stack.
#[derive(Debug)]
pub struct Errors {
    frames: Vec<Frame>,
}

impl Default for Errors {
    fn default() -> Self {
        Self::new()
    }
}

impl Errors {
    /// A stack with a single empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    fn top(&mut self) -> &mut Frame {
        // The root frame is never popped, so the stack is never empty.
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Open a nested frame for speculative work.
    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Close the innermost frame, returning what it accumulated.
    ///
    /// A fatal marker set inside the frame propagates to the parent; the
    /// diagnostics themselves are handed back so the caller can re-report
    /// or discard them.
    pub fn pop_frame(&mut self) -> Vec<Diagnostic> {
        if self.frames.len() <= 1 {
            return std::mem::take(&mut self.top().diagnostics);
        }
        let frame = self.frames.pop().unwrap_or_default();
        if frame.fatal {
            self.top().fatal = true;
        }
        frame.diagnostics
    }

    /// Record a non-fatal diagnostic.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Error | Severity::Fatal => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
            Severity::Note => debug!("{diagnostic}"),
        }
        self.top().diagnostics.push(diagnostic);
    }

    /// Record a diagnostic and mark the stack fatal (first fatal wins).
    ///
    /// Returns the error value to unwind with; later diagnostics are still
    /// recorded but can no longer change the outcome.
    pub fn fatal(&mut self, diagnostic: Diagnostic) -> Box<TiliaError> {
        error!("{diagnostic}");
        let diagnostic = diagnostic.escalate();
        self.top().fatal = true;
        self.top().diagnostics.push(diagnostic.clone());
        Box::new(TiliaError::Fatal(diagnostic))
    }

    /// Whether any error-or-worse diagnostic was recorded.
    #[must_use]
    pub fn had_errors(&self) -> bool {
        self.frames.iter().any(|frame| {
            frame
                .diagnostics
                .iter()
                .any(|d| d.severity() >= Severity::Error)
        })
    }

    /// Whether a fatal diagnostic was recorded in the current frame chain.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.frames.iter().any(|frame| frame.fatal)
    }

    /// All diagnostics currently held, outermost frame first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.frames.iter().flat_map(|frame| frame.diagnostics.iter())
    }

    /// Render every diagnostic, one line each (notes indented), resolving
    /// positions against the given table.
    #[must_use]
    pub fn display_with(&self, positions: &Positions) -> String {
        use itertools::Itertools as _;
        self.diagnostics()
            .map(|diagnostic| diagnostic.display_with(positions))
            .join("\n")
    }
}
