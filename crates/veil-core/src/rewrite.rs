/*! Span replacement over a source buffer.
 *
 * Passes never touch text directly. They describe what should change as a set of `(span, text)`
 * edits against the buffer they parsed, and this module applies the whole set at once. Edits are
 * applied from the highest offset down so every span still addresses the original text when its
 * turn comes.
 */

use crate::error::RewriteError;
use crate::span::Span;
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub replacement: String,
}

impl Edit {
    pub fn new(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }
}

/// Applies `edits` to `source`.
///
/// Fails with [`RewriteError::Overlap`] when two spans intersect. Several insertions at the same
/// offset are kept in the order they were given, and land before a replacement starting there.
pub fn apply_edits(source: &str, edits: &[Edit]) -> Result<String, RewriteError> {
    for edit in edits {
        if edit.span.end() > source.len() {
            return Err(RewriteError::OutOfBounds {
                span: edit.span,
                len: source.len(),
            });
        }
        if !source.is_char_boundary(edit.span.offset) || !source.is_char_boundary(edit.span.end())
        {
            return Err(RewriteError::CharBoundary { span: edit.span });
        }
    }

    let mut order: Vec<usize> = (0..edits.len()).collect();
    order.sort_by_key(|&i| (edits[i].span.offset, edits[i].span.is_empty(), i));
    for pair in order.windows(2) {
        let (a, b) = (&edits[pair[0]].span, &edits[pair[1]].span);
        if a.intersects(b) || (!a.is_empty() && !b.is_empty() && a.offset == b.offset) {
            return Err(RewriteError::Overlap {
                first: *a,
                second: *b,
            });
        }
    }
    // Non-adjacent pairs can still collide when a long span swallows several short ones.
    let mut reach = 0usize;
    let mut reach_span = Span::default();
    for &i in &order {
        let span = edits[i].span;
        if !span.is_empty() && span.offset < reach {
            return Err(RewriteError::Overlap {
                first: reach_span,
                second: span,
            });
        }
        if span.is_empty() && span.offset < reach && span.offset > reach_span.offset {
            return Err(RewriteError::Overlap {
                first: reach_span,
                second: span,
            });
        }
        if span.end() > reach {
            reach = span.end();
            reach_span = span;
        }
    }

    order.sort_by_key(|&i| {
        (
            Reverse(edits[i].span.offset),
            edits[i].span.is_empty(),
            Reverse(i),
        )
    });

    let mut out = source.to_string();
    for i in order {
        let edit = &edits[i];
        out.replace_range(edit.span.offset..edit.span.end(), &edit.replacement);
    }
    Ok(out)
}

/// Whether `inner` lies strictly within `outer`. Insertions at either edge belong to the
/// surrounding text.
fn within(outer: Span, inner: Span) -> bool {
    let at_edge = inner.offset == outer.offset || inner.offset == outer.end();
    outer.contains(&inner) && !(inner.is_empty() && at_edge)
}

/// An accumulating set of edits for one pass.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    edits: Vec<Edit>,
}

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::new(span, text));
    }

    pub fn insert(&mut self, offset: usize, text: impl Into<String>) {
        self.edits.push(Edit::new(Span::empty_at(offset), text));
    }

    pub fn delete(&mut self, span: Span) {
        self.edits.push(Edit::new(span, ""));
    }

    pub fn extend(&mut self, other: EditSet) {
        self.edits.extend(other.edits);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn touches(&self, span: Span) -> bool {
        self.edits.iter().any(|e| e.span.intersects(&span) || span.contains(&e.span))
    }

    /// Text of `span` in `source` with every edit lying inside it applied.
    pub fn render_span(&self, source: &str, span: Span) -> Result<String, RewriteError> {
        let inner: Vec<Edit> = self
            .edits
            .iter()
            .filter(|e| within(span, e.span))
            .map(|e| Edit::new(e.span.shift_back(span.offset), e.replacement.clone()))
            .collect();
        apply_edits(span.slice(source), &inner)
    }

    /// Removes and returns the number of edits lying strictly within `span`.
    pub fn absorb(&mut self, span: Span) -> usize {
        let before = self.edits.len();
        self.edits.retain(|e| !within(span, e.span));
        before - self.edits.len()
    }

    /// Renders `span` with its inner edits applied, then replaces the whole span with `wrap`
    /// applied to that text.
    pub fn wrap(
        &mut self,
        source: &str,
        span: Span,
        wrap: impl FnOnce(String) -> String,
    ) -> Result<(), RewriteError> {
        let inner = self.render_span(source, span)?;
        self.absorb(span);
        self.replace(span, wrap(inner));
        Ok(())
    }

    pub fn apply(&self, source: &str) -> Result<String, RewriteError> {
        apply_edits(source, &self.edits)
    }
}
