use veil_core::syntax::{Expr, Stmt};
use veil_core::{EditSet, NodeId, RewriteError, Span, SyntaxTree};

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Leading whitespace of the line holding `offset`.
pub(crate) fn indent_at(source: &str, offset: usize) -> &str {
    let start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &source[start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// Replaces `outer` with text built from the current rendering of `inner`. Edits already queued
/// inside `inner` survive in the new text, those elsewhere in `outer` are dropped.
pub(crate) fn rewrite_around(
    edits: &mut EditSet,
    source: &str,
    outer: Span,
    inner: Option<Span>,
    build: impl FnOnce(Option<String>) -> String,
) -> Result<(), RewriteError> {
    let rendered = match inner {
        Some(span) => Some(edits.render_span(source, span)?),
        None => None,
    };
    edits.absorb(outer);
    edits.replace(outer, build(rendered));
    Ok(())
}

/// True when `id` sits in a loop body (or header) below `stop`.
pub(crate) fn inside_loop(tree: &SyntaxTree, id: NodeId, stop: NodeId) -> bool {
    tree.ancestors(id)
        .take_while(|&a| a != stop)
        .any(|a| {
            matches!(
                tree.stmt(a),
                Some(Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. })
            )
        })
}

/// True for calls that only convert a value, like `uint8(x)` or `address(this)`.
pub(crate) fn is_conversion(tree: &SyntaxTree, call: NodeId) -> bool {
    match tree.expr(call) {
        Some(Expr::Call { callee, .. }) => matches!(tree.expr(*callee), Some(Expr::TypeName(_))),
        _ => false,
    }
}

/// True when evaluating the expression at `id` may have an effect beyond producing its value.
pub(crate) fn has_side_effects(tree: &SyntaxTree, id: NodeId) -> bool {
    tree.descendants(id).into_iter().any(|d| match tree.expr(d) {
        Some(Expr::Call { .. }) => !is_conversion(tree, d),
        Some(Expr::Assign { .. }) | Some(Expr::Update { .. }) | Some(Expr::New(_)) => true,
        Some(Expr::Unary { op, .. }) => op == "delete",
        _ => false,
    })
}
