//! Local-to-state promotion.
//!
//! Value-typed locals of state-changing functions move into fresh private state variables. The
//! declaration becomes an assignment (or `delete` when it had no initializer) so every entry to
//! the declaring scope still starts from the declared value. Functions on a call cycle are left
//! alone since recursion would share one slot between frames.

use crate::analysis::CallGraph;
use crate::util::rewrite_around;
use crate::{PassContext, Transform};
use veil_core::scope::Binding;
use veil_core::syntax::{ContractKind, Mutability, Stmt};
use veil_core::{EditSet, NodeId, Result, SyntaxTree};

pub struct StatePromotion;

impl Transform for StatePromotion {
    fn name(&self) -> &'static str {
        "promote"
    }

    fn description(&self) -> &'static str {
        "Moves value-typed locals into private state variables"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let source = tree.source();
        let graph = CallGraph::build(tree, &cx.symbols);
        let mut edits = EditSet::new();
        let mut promoted: Vec<(NodeId, NodeId, String)> = Vec::new();

        for function_id in tree.functions() {
            let Some(function) = tree.function(function_id) else {
                continue;
            };
            let Some(body) = function.body else {
                continue;
            };
            if !matches!(function.mutability, Mutability::NonPayable | Mutability::Payable) {
                continue;
            }
            let Some(contract_id) = tree.enclosing_contract(function_id) else {
                continue;
            };
            let Some(contract) = tree.contract(contract_id) else {
                continue;
            };
            if !matches!(contract.kind, ContractKind::Contract | ContractKind::Abstract) {
                continue;
            }
            let inner = tree.descendants(body);
            if graph.on_cycle(function_id)
                || inner.iter().any(|&d| matches!(tree.stmt(d), Some(Stmt::Assembly)))
            {
                continue;
            }

            let mut declarations = String::new();
            for &stmt in &inner {
                let Some(decl_id) = promotable(tree, stmt) else {
                    continue;
                };
                let Some(decl) = tree.decl(decl_id) else {
                    continue;
                };
                let Some(name) = decl.name.as_deref() else {
                    continue;
                };
                let global = cx.names.fresh(&format!("__state_{}", name));
                declarations.push_str(&format!("\n    {} private {};", decl.type_text, global));
                for &reference in cx.symbols.references(&Binding::Variable(decl_id)) {
                    edits.replace(tree.span(reference), global.clone());
                }
                promoted.push((stmt, decl_id, global));
            }
            if !declarations.is_empty() {
                edits.insert(contract.member_insert_offset(), declarations);
            }
        }

        for (stmt, _, global) in &promoted {
            let value = match tree.stmt(*stmt) {
                Some(Stmt::VarDecl { value, .. }) => value.as_ref().map(|v| tree.span(*v)),
                _ => None,
            };
            rewrite_around(&mut edits, source, tree.span(*stmt), value, |value| match value {
                Some(value) => format!("{} = {};", global, value),
                None => format!("delete {};", global),
            })?;
        }

        tracing::debug!(locals = promoted.len(), "promoted locals");
        Ok(edits)
    }
}

/// The declaration of a single-variable statement eligible for promotion.
fn promotable(tree: &SyntaxTree, stmt: NodeId) -> Option<NodeId> {
    let Some(Stmt::VarDecl {
        decls,
        tuple: false,
        ..
    }) = tree.stmt(stmt)
    else {
        return None;
    };
    let [Some(decl_id)] = decls.as_slice() else {
        return None;
    };
    let parent = tree.parent(stmt)?;
    if matches!(tree.stmt(parent), Some(Stmt::For { init: Some(i), .. }) if *i == stmt) {
        return None;
    }
    let decl = tree.decl(*decl_id)?;
    let value_type = decl.location.is_none() && decl.elementary().is_some_and(|t| t.is_value_type());
    value_type.then_some(*decl_id)
}
