use crate::lower::span_of;
use tree_sitter::Node as TsNode;
use veil_core::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Code,
    LineComment,
    BlockComment,
    /// A whole `pragma ...;` directive.
    Pragma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub span: Span,
    pub kind: TokenKind,
}

/// Nodes emitted whole rather than descended into.
const ATOMIC: &[&str] = &[
    "string_literal",
    "hex_string_literal",
    "unicode_string_literal",
    "pragma_directive",
    "comment",
];

/// Leaf tokens of the tree in source order. Text the grammar leaves between leaves (other than
/// whitespace) comes back as extra `Code` tokens, so concatenating every token reproduces the
/// source with whitespace removed.
pub(crate) fn collect(root: TsNode, source: &str) -> Vec<Token> {
    let mut leaves = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.child_count() == 0 || ATOMIC.contains(&node.kind()) {
            leaves.push(node);
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    let mut tokens = Vec::with_capacity(leaves.len());
    let mut cursor = 0;
    for leaf in leaves {
        let span = span_of(leaf);
        if span.is_empty() {
            continue;
        }
        if span.offset > cursor {
            push_gap(&mut tokens, source, cursor, span.offset);
        }
        let kind = match leaf.kind() {
            "pragma_directive" => TokenKind::Pragma,
            "comment" if span.slice(source).starts_with("//") => TokenKind::LineComment,
            "comment" => TokenKind::BlockComment,
            _ => TokenKind::Code,
        };
        tokens.push(Token { span, kind });
        cursor = cursor.max(span.end());
    }
    if cursor < source.len() {
        push_gap(&mut tokens, source, cursor, source.len());
    }
    tokens
}

fn push_gap(tokens: &mut Vec<Token>, source: &str, start: usize, end: usize) {
    let gap = &source[start..end];
    let mut offset = start;
    for piece in gap.split(char::is_whitespace) {
        if !piece.is_empty() {
            let at = offset + gap[offset - start..].find(piece).unwrap_or(0);
            tokens.push(Token {
                span: Span::new(at, piece.len()),
                kind: TokenKind::Code,
            });
            offset = at + piece.len();
        }
    }
}
