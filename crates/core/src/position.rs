//! Source positions and their resolution to file/line/column.
//!
//! Every tree node carries a [`SourcePos`], an opaque token that is only
//! meaningful together with the [`Positions`] table that issued it. The
//! table owns the scanned source texts; resolving a position is a binary
//! search over them, so positions stay a single `u32` on every node.

use std::fmt::{self, Display};

/// An opaque position token, interpretable by the [`Positions`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePos(u32);

impl SourcePos {
    /// The position used for synthesized trees that have no source.
    pub const NOWHERE: Self = Self(u32::MAX);

    /// Create a position from a global offset.
    #[must_use]
    pub(crate) const fn new(offset: u32) -> Self {
        Self(offset)
    }

    /// Check whether this position refers to actual source text.
    #[must_use]
    pub fn is_known(&self) -> bool {
        *self != Self::NOWHERE
    }

    pub(crate) const fn offset(self) -> u32 {
        self.0
    }
}

impl Default for SourcePos {
    fn default() -> Self {
        Self::NOWHERE
    }
}

/// A resolved position, ready for display in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location<'a> {
    /// Name of the source the position belongs to.
    pub source: &'a str,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number, counted in bytes.
    pub column: usize,
}

impl Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// One scanned source text with its global offset range.
#[derive(Debug)]
struct SourceEntry {
    name: String,
    base: u32,
    /// Byte offsets (relative to `base`) at which each line starts.
    line_starts: Vec<u32>,
    len: u32,
}

/// The position table: owns one entry per scanned source.
///
/// The scanner allocates a contiguous range of global offsets per source;
/// trees produced from that source carry offsets inside the range.
#[derive(Debug, Default)]
pub struct Positions {
    sources: Vec<SourceEntry>,
    next_base: u32,
}

impl Positions {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source text and return the global offset of its first byte.
    pub fn add_source(&mut self, name: impl Into<String>, text: &str) -> SourcePos {
        let base = self.next_base;
        let mut line_starts = vec![0];
        for (index, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(index as u32 + 1);
            }
        }
        let len = text.len() as u32;
        self.sources.push(SourceEntry {
            name: name.into(),
            base,
            line_starts,
            len,
        });
        self.next_base = base.saturating_add(len).saturating_add(1);
        SourcePos::new(base)
    }

    /// Resolve a position to its source name, line and column.
    ///
    /// Returns `None` for [`SourcePos::NOWHERE`] and for offsets outside
    /// every registered source.
    #[must_use]
    pub fn resolve(&self, pos: SourcePos) -> Option<Location<'_>> {
        if !pos.is_known() {
            return None;
        }
        let offset = pos.offset();
        let entry = self
            .sources
            .iter()
            .rev()
            .find(|entry| offset >= entry.base && offset <= entry.base + entry.len)?;
        let local = offset - entry.base;
        let line = match entry.line_starts.binary_search(&local) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        let column = (local - entry.line_starts[line]) as usize + 1;
        Some(Location {
            source: &entry.name,
            line: line + 1,
            column,
        })
    }
}
