/*! Scope and symbol resolution.
 *
 * Resolution walks outward from the identifier: enclosing blocks (declarations earlier in the
 * block only), `for` headers, the parameters and returns of the enclosing function or modifier,
 * the members of the enclosing contract and its in-file bases, and finally the contracts of the
 * file. Identifiers that fall off the end (globals, imports, builtins) stay unresolved and no pass
 * touches them.
 */

use crate::syntax::{Expr, NodeId, NodeKind, Stmt, SyntaxTree};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A state variable, local, parameter or named return.
    Variable(NodeId),
    /// Every function of that name visible from the site, overloads included.
    Function(String),
    Modifier(String),
    Contract(NodeId),
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    resolved: HashMap<NodeId, Binding>,
    references: HashMap<Binding, Vec<NodeId>>,
}

impl SymbolTable {
    pub fn build(tree: &SyntaxTree) -> Self {
        let mut table = SymbolTable::default();
        for id in tree.ids() {
            if let Some(Expr::Ident(name)) = tree.expr(id) {
                if let Some(binding) = lookup_at(tree, id, name) {
                    table.references.entry(binding.clone()).or_default().push(id);
                    table.resolved.insert(id, binding);
                }
            }
        }
        for refs in table.references.values_mut() {
            refs.sort_by_key(|id| tree.span(*id).offset);
        }
        table
    }

    pub fn resolve(&self, ident: NodeId) -> Option<&Binding> {
        self.resolved.get(&ident)
    }

    /// The declaration an identifier expression refers to, if it is a variable.
    pub fn variable(&self, ident: NodeId) -> Option<NodeId> {
        match self.resolved.get(&ident) {
            Some(Binding::Variable(decl)) => Some(*decl),
            _ => None,
        }
    }

    pub fn references(&self, binding: &Binding) -> &[NodeId] {
        self.references
            .get(binding)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.references.keys()
    }
}

/// Resolves `name` as seen from `at`.
pub fn lookup_at(tree: &SyntaxTree, at: NodeId, name: &str) -> Option<Binding> {
    let mut child = at;
    for ancestor in tree.ancestors(at) {
        match &tree.node(ancestor).kind {
            NodeKind::Statement(Stmt::Block(items)) | NodeKind::Statement(Stmt::Unchecked(items)) => {
                for &item in items {
                    if item == child {
                        break;
                    }
                    if let Some(decl) = declared_in(tree, item, name) {
                        return Some(Binding::Variable(decl));
                    }
                }
            }
            NodeKind::Statement(Stmt::For { init: Some(init), .. }) if *init != child => {
                if let Some(decl) = declared_in(tree, *init, name) {
                    return Some(Binding::Variable(decl));
                }
            }
            NodeKind::Function(f) => {
                for &p in f.params.iter().chain(&f.returns) {
                    if tree.decl(p).and_then(|d| d.name.as_deref()) == Some(name) {
                        return Some(Binding::Variable(p));
                    }
                }
            }
            NodeKind::Modifier(m) => {
                for &p in &m.params {
                    if tree.decl(p).and_then(|d| d.name.as_deref()) == Some(name) {
                        return Some(Binding::Variable(p));
                    }
                }
            }
            NodeKind::Contract(_) => {
                if let Some(binding) = lookup_member(tree, ancestor, name) {
                    return Some(binding);
                }
            }
            _ => {}
        }
        child = ancestor;
    }
    tree.contract_named(name)
        .map(|(id, _)| Binding::Contract(id))
}

/// Declarations introduced by a `VarDecl` statement with the given name.
fn declared_in(tree: &SyntaxTree, stmt: NodeId, name: &str) -> Option<NodeId> {
    match tree.stmt(stmt) {
        Some(Stmt::VarDecl { decls, .. }) => decls
            .iter()
            .flatten()
            .copied()
            .find(|&d| tree.decl(d).and_then(|d| d.name.as_deref()) == Some(name)),
        _ => None,
    }
}

/// Contract followed by its bases, most derived first.
pub fn linearize(tree: &SyntaxTree, contract: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![contract];
    while let Some(next) = stack.pop() {
        if out.contains(&next) {
            continue;
        }
        out.push(next);
        if let Some(c) = tree.contract(next) {
            for base in &c.bases {
                if let Some((id, _)) = tree.contract_named(base) {
                    stack.push(id);
                }
            }
        }
    }
    out
}

pub fn lookup_member(tree: &SyntaxTree, contract: NodeId, name: &str) -> Option<Binding> {
    for id in linearize(tree, contract) {
        let Some(c) = tree.contract(id) else {
            continue;
        };
        for &member in &c.members {
            match &tree.node(member).kind {
                NodeKind::Declaration(d) if d.name.as_deref() == Some(name) => {
                    return Some(Binding::Variable(member));
                }
                NodeKind::Function(f) if f.name.as_deref() == Some(name) => {
                    return Some(Binding::Function(name.to_string()));
                }
                NodeKind::Modifier(m) if m.name == name => {
                    return Some(Binding::Modifier(name.to_string()));
                }
                _ => {}
            }
        }
    }
    None
}

/// Functions named `name` visible from `contract`, most derived first.
pub fn functions_named(tree: &SyntaxTree, contract: NodeId, name: &str) -> Vec<NodeId> {
    linearize(tree, contract)
        .into_iter()
        .filter_map(|id| tree.contract(id))
        .flat_map(|c| c.members.iter().copied())
        .filter(|&m| tree.function(m).and_then(|f| f.name.as_deref()) == Some(name))
        .collect()
}

pub fn modifier_named(tree: &SyntaxTree, contract: NodeId, name: &str) -> Option<NodeId> {
    linearize(tree, contract)
        .into_iter()
        .filter_map(|id| tree.contract(id))
        .flat_map(|c| c.members.iter().copied())
        .find(|&m| tree.modifier(m).map(|md| md.name.as_str()) == Some(name))
}

/// Every variable declaration in a function or modifier, parameters first.
pub fn callable_variables(tree: &SyntaxTree, callable: NodeId) -> Vec<NodeId> {
    tree.descendants(callable)
        .into_iter()
        .filter(|&id| tree.decl(id).is_some())
        .collect()
}
