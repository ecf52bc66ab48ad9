/*! Shallow type recovery for literal sites.
 *
 * Solidity literals take whatever type their context asks for, so a pass that swaps a literal for
 * something typed (an accessor returning `uint256`, a `string memory` value) has to know that type.
 * Only what can be read off declarations and signatures is recovered. Anything less certain is
 * `None`, and callers leave those sites untouched.
 */

use crate::scope::{functions_named, Binding, SymbolTable};
use crate::syntax::{ElementaryType, Expr, NodeId, NodeKind, Stmt, SyntaxTree};

const ARITHMETIC: &[&str] = &["+", "-", "*", "/", "%", "&", "|", "^"];
const COMPARISON: &[&str] = &["==", "!=", "<", "<=", ">", ">="];
const LOGICAL: &[&str] = &["&&", "||"];

/// Element type of an array or mapping type, as text.
pub fn element_type(type_text: &str) -> Option<&str> {
    let text = type_text.trim();
    if text.starts_with("mapping") {
        let (_, value) = text.rsplit_once("=>")?;
        return Some(value.trim().trim_end_matches(')').trim());
    }
    if text.ends_with(']') {
        let open = text.rfind('[')?;
        return Some(text[..open].trim());
    }
    None
}

/// The unique function `name` callable from the site `at`, if it is not overloaded.
fn unique_function(tree: &SyntaxTree, at: NodeId, name: &str) -> Option<NodeId> {
    let contract = tree.enclosing_contract(at)?;
    let candidates = functions_named(tree, contract, name);
    let first = *candidates.first()?;
    let arity = tree.function(first)?.params.len();
    // Overrides of one signature are fine, different arities are an overload set.
    candidates
        .iter()
        .all(|&f| tree.function(f).map(|f| f.params.len()) == Some(arity))
        .then_some(first)
}

fn decl_type(tree: &SyntaxTree, decl: NodeId) -> Option<ElementaryType> {
    tree.decl(decl)?.elementary()
}

pub fn type_of(tree: &SyntaxTree, symbols: &SymbolTable, id: NodeId) -> Option<ElementaryType> {
    match tree.expr(id)? {
        Expr::Ident(_) => decl_type(tree, symbols.variable(id)?),
        Expr::Paren(inner) => type_of(tree, symbols, *inner),
        Expr::Literal(lit) => match lit.kind {
            crate::syntax::LiteralKind::Bool => Some(ElementaryType::Bool),
            _ => None,
        },
        Expr::Binary { op, left, right } => {
            let op = op.as_str();
            if COMPARISON.contains(&op) || LOGICAL.contains(&op) {
                Some(ElementaryType::Bool)
            } else if op == "<<" || op == ">>" || op == "**" {
                type_of(tree, symbols, *left)
            } else {
                type_of(tree, symbols, *left).or_else(|| type_of(tree, symbols, *right))
            }
        }
        Expr::Unary { op, operand } => match op.as_str() {
            "!" => Some(ElementaryType::Bool),
            "delete" => None,
            _ => type_of(tree, symbols, *operand),
        },
        Expr::Update { operand, .. } => type_of(tree, symbols, *operand),
        Expr::Assign { target, .. } => type_of(tree, symbols, *target),
        Expr::Ternary {
            then, otherwise, ..
        } => type_of(tree, symbols, *then).or_else(|| type_of(tree, symbols, *otherwise)),
        Expr::Call { callee, .. } => match tree.expr(*callee)? {
            Expr::TypeName(name) => ElementaryType::parse(name),
            Expr::Ident(name) => match symbols.resolve(*callee)? {
                Binding::Function(_) => {
                    let function = tree.function(unique_function(tree, id, name)?)?;
                    match function.returns.as_slice() {
                        [single] => decl_type(tree, *single),
                        _ => None,
                    }
                }
                _ => None,
            },
            _ => None,
        },
        Expr::Index { base, .. } => {
            let decl = tree.decl(symbols.variable(tree.strip_parens(*base))?)?;
            ElementaryType::parse(element_type(&decl.type_text)?)
        }
        Expr::Member { property, .. } if property == "length" => Some(ElementaryType::Uint(256)),
        _ => None,
    }
}

/// The type the surrounding code requires of the expression at `id`.
pub fn expected_type(
    tree: &SyntaxTree,
    symbols: &SymbolTable,
    id: NodeId,
) -> Option<ElementaryType> {
    let parent = tree.parent(id)?;
    match &tree.node(parent).kind {
        NodeKind::Declaration(d) if d.value == Some(id) => d.elementary(),
        NodeKind::Statement(stmt) => match stmt {
            Stmt::VarDecl {
                decls,
                value: Some(value),
                tuple: false,
            } if *value == id => decl_type(tree, (*decls.first()?)?),
            Stmt::If { cond, .. } | Stmt::While { cond, .. } | Stmt::DoWhile { cond, .. }
                if *cond == id =>
            {
                Some(ElementaryType::Bool)
            }
            Stmt::For { cond: Some(cond), .. } if *cond == id => Some(ElementaryType::Bool),
            Stmt::Return(Some(value)) if *value == id => {
                let function = tree.function(tree.enclosing_callable(parent)?)?;
                match function.returns.as_slice() {
                    [single] => decl_type(tree, *single),
                    _ => None,
                }
            }
            Stmt::Revert { error: None, args } if args.first() == Some(&id) => {
                Some(ElementaryType::String)
            }
            _ => None,
        },
        NodeKind::Expression(expr) => match expr {
            Expr::Paren(_) => expected_type(tree, symbols, parent),
            Expr::Assign { target, value, op } if *value == id => {
                if op == "<<=" || op == ">>=" {
                    None
                } else {
                    type_of(tree, symbols, *target)
                }
            }
            Expr::Binary { op, left, right } => {
                let op = op.as_str();
                let other = if *left == id { *right } else { *left };
                if op == "<<" || op == ">>" || op == "**" {
                    if *left == id {
                        expected_type(tree, symbols, parent)
                    } else {
                        None
                    }
                } else if LOGICAL.contains(&op) {
                    Some(ElementaryType::Bool)
                } else if COMPARISON.contains(&op) {
                    type_of(tree, symbols, other)
                } else if ARITHMETIC.contains(&op) {
                    type_of(tree, symbols, other)
                        .or_else(|| expected_type(tree, symbols, parent))
                } else {
                    None
                }
            }
            Expr::Unary { op, .. } if op == "!" => Some(ElementaryType::Bool),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if *cond == id {
                    Some(ElementaryType::Bool)
                } else {
                    let other = if *then == id { *otherwise } else { *then };
                    type_of(tree, symbols, other).or_else(|| expected_type(tree, symbols, parent))
                }
            }
            Expr::Index { base, index } if *index == Some(id) => {
                let decl = tree.decl(symbols.variable(tree.strip_parens(*base))?)?;
                let text = decl.type_text.trim();
                if text.starts_with("mapping") {
                    let key = text.trim_start_matches("mapping").trim_start().trim_start_matches('(');
                    let (key, _) = key.split_once("=>")?;
                    ElementaryType::parse(key)
                } else if text.ends_with(']') {
                    Some(ElementaryType::Uint(256))
                } else {
                    None
                }
            }
            Expr::Call { callee, args } => {
                let position = args.iter().position(|&a| a == id)?;
                match tree.expr(*callee)? {
                    Expr::Ident(name) => match (name.as_str(), position) {
                        ("require", 0) | ("assert", 0) => Some(ElementaryType::Bool),
                        ("require", 1) | ("revert", 0) if symbols.resolve(*callee).is_none() => {
                            Some(ElementaryType::String)
                        }
                        _ => match symbols.resolve(*callee)? {
                            Binding::Function(_) => {
                                let function = tree.function(unique_function(tree, parent, name)?)?;
                                decl_type(tree, *function.params.get(position)?)
                            }
                            _ => None,
                        },
                    },
                    _ => None,
                }
            }
            _ => None,
        },
        _ => None,
    }
}
