//! Source span and location tracking.
//!
//! Expression nodes arrive from the parser with byte-offset spans. Every IR
//! node produced by the lowerer carries the span of the expression it came
//! from so that later stages can point diagnostics back at the source.

use serde::{Deserialize, Serialize};

/// A precomputed index of line start positions for O(log n) line/column lookup.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offsets where each line starts. line_starts[0] = 0 (line 1 starts at byte 0).
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Build a line index from source code. O(n) one-time cost.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { line_starts }
    }

    /// Look up line and column for a byte offset. O(log n) via binary search.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line = (line_idx + 1) as u32;
        let col = (offset - self.line_starts[line_idx] + 1) as u32;
        (line, col)
    }
}

/// A span representing a contiguous region in source code.
///
/// Spans are byte offsets into the source text, along with cached
/// line/column information for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the start (inclusive).
    pub start: usize,
    /// Byte offset of the end (exclusive).
    pub end: usize,
    /// 1-indexed line number of the start.
    #[serde(default)]
    pub start_line: u32,
    /// 1-indexed column number of the start.
    #[serde(default)]
    pub start_col: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, start_line: u32, start_col: u32) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
        }
    }

    /// Create a dummy span for synthesized nodes.
    pub fn dummy() -> Self {
        Self {
            start: 0,
            end: 0,
            start_line: 0,
            start_col: 0,
        }
    }

    /// Create a span from byte offsets, resolving line/column through `index`.
    pub fn locate(start: usize, end: usize, index: &LineIndex) -> Self {
        let (start_line, start_col) = index.line_col(start);
        Self {
            start,
            end,
            start_line,
            start_col,
        }
    }

    /// The length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}
