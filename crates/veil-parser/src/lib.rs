/*! Solidity front end for Veil.
 *
 * tree-sitter-solidity does the parsing. This crate checks the result for syntax errors, reporting
 * the first one with a line and column, and lowers the concrete tree into the span-addressed
 * [`SyntaxTree`] every pass works on. The minifier gets a flat token stream from the same parse.
 */

mod lower;
mod tokens;

use tree_sitter::{Node as TsNode, Parser, Tree};
use veil_core::{LineIndex, ParseError, SyntaxTree};

pub use tokens::{Token, TokenKind};

fn parse_error(source: &str, offset: usize, message: String) -> ParseError {
    let (line, column) = LineIndex::new(source).location(offset);
    ParseError {
        line,
        column,
        offset,
        message,
    }
}

fn first_error(root: TsNode) -> Option<TsNode> {
    let mut stack = vec![root];
    let mut found: Option<TsNode> = None;
    while let Some(node) = stack.pop() {
        if !node.has_error() && !node.is_missing() {
            continue;
        }
        if node.is_error() || node.is_missing() {
            if found.map_or(true, |f| node.start_byte() < f.start_byte()) {
                found = Some(node);
            }
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    found
}

const STATEMENT_KEYWORDS: [&str; 8] =
    ["else", "if", "while", "for", "do", "return", "break", "continue"];

/// An `else` that does not close an `if` with two branches, or a statement keyword the grammar
/// accepted as an identifier (`else x = 0;` parses as a declaration of type `else`).
fn stray_keyword<'t>(root: TsNode<'t>, source: &str) -> Option<TsNode<'t>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "identifier"
            && STATEMENT_KEYWORDS.contains(&&source[node.start_byte()..node.end_byte()])
        {
            return Some(node);
        }
        if node.kind() == "else" && !node.is_named() {
            let closes_if = node.parent().is_some_and(|parent| {
                let mut cursor = parent.walk();
                parent.kind() == "if_statement"
                    && parent.children_by_field_name("body", &mut cursor).count() == 2
            });
            if !closes_if {
                return Some(node);
            }
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    None
}

fn parse_cst(source: &str) -> Result<Tree, ParseError> {
    let mut parser = Parser::new();
    let language = tree_sitter_solidity::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| parse_error(source, 0, format!("Failed to set language: {}", e)))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| parse_error(source, 0, "Failed to parse source".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let node = first_error(root).unwrap_or(root);
        let message = if node.is_missing() {
            format!("missing `{}`", node.kind())
        } else {
            let text: String = source[node.start_byte()..node.end_byte()]
                .chars()
                .take(24)
                .collect();
            format!("unexpected `{}`", text.trim())
        };
        tracing::debug!(offset = node.start_byte(), "{}", message);
        return Err(parse_error(source, node.start_byte(), message));
    }
    if let Some(node) = stray_keyword(root, source) {
        let keyword = &source[node.start_byte()..node.end_byte()];
        tracing::debug!(offset = node.start_byte(), "stray `{}`", keyword);
        return Err(parse_error(
            source,
            node.start_byte(),
            format!("unexpected `{}`", keyword),
        ));
    }
    Ok(tree)
}

/// Parses `source` into a syntax tree, failing on the first syntax error.
pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
    let tree = parse_cst(source)?;
    let mut lowerer = lower::Lowerer::new(source);
    lowerer.lower_source(tree.root_node());
    Ok(lowerer.finish())
}

/// Checks that `source` is syntactically valid Solidity.
pub fn validate(source: &str) -> Result<(), ParseError> {
    parse_cst(source).map(|_| ())
}

/// Lexical tokens of `source` in order, comments and pragmas included.
pub fn tokens(source: &str) -> Result<Vec<Token>, ParseError> {
    let tree = parse_cst(source)?;
    Ok(tokens::collect(tree.root_node(), source))
}
