use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous byte region of a source buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn from_range(start: usize, end: usize) -> Self {
        Self {
            offset: start,
            len: end.saturating_sub(start),
        }
    }

    pub fn empty_at(offset: usize) -> Self {
        Self { offset, len: 0 }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, other: &Span) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.offset && offset < self.end()
    }

    /// Two spans intersect when they share a byte. An empty span intersects a
    /// non-empty one only when it sits strictly inside it.
    pub fn intersects(&self, other: &Span) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => false,
            (true, false) => self.offset > other.offset && self.offset < other.end(),
            (false, true) => other.offset > self.offset && other.offset < self.end(),
            (false, false) => self.offset < other.end() && other.offset < self.end(),
        }
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span::from_range(self.offset.min(other.offset), self.end().max(other.end()))
    }

    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.offset..self.end()]
    }

    pub fn shift_back(&self, by: usize) -> Span {
        Span::new(self.offset - by, self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.offset, self.end())
    }
}

/// Maps byte offsets to 1-based line/column pairs.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn location(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}
