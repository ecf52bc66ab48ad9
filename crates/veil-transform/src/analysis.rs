/*! Whole-file facts several passes consult: who calls whom, and which modifiers end up inside
 * pure functions.
 */

use std::collections::{HashMap, HashSet};
use veil_core::scope::{functions_named, Binding};
use veil_core::syntax::{Expr, Mutability};
use veil_core::{NodeId, SymbolTable, SyntaxTree};

/// Internal call edges between functions of the file, resolved by name and inheritance.
#[derive(Debug, Default)]
pub struct CallGraph {
    edges: HashMap<NodeId, Vec<NodeId>>,
}

impl CallGraph {
    pub fn build(tree: &SyntaxTree, symbols: &SymbolTable) -> Self {
        let mut graph = CallGraph::default();
        for function in tree.functions() {
            let Some(contract) = tree.enclosing_contract(function) else {
                continue;
            };
            let mut callees = Vec::new();
            for id in tree.descendants(function) {
                let Some(Expr::Call { callee, .. }) = tree.expr(id) else {
                    continue;
                };
                if let Some(Binding::Function(name)) = symbols.resolve(*callee) {
                    callees.extend(functions_named(tree, contract, name));
                }
            }
            callees.sort();
            callees.dedup();
            graph.edges.insert(function, callees);
        }
        graph
    }

    pub fn callees(&self, function: NodeId) -> &[NodeId] {
        self.edges.get(&function).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// True when `function` can reach itself through internal calls.
    pub fn on_cycle(&self, function: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = self.callees(function).to_vec();
        while let Some(next) = stack.pop() {
            if next == function {
                return true;
            }
            if seen.insert(next) {
                stack.extend_from_slice(self.callees(next));
            }
        }
        false
    }
}

/// Names of modifiers invoked by at least one `pure` function.
pub fn modifiers_used_by_pure(tree: &SyntaxTree) -> HashSet<String> {
    tree.functions()
        .into_iter()
        .filter_map(|f| tree.function(f))
        .filter(|f| f.mutability == Mutability::Pure)
        .flat_map(|f| f.modifiers.iter().map(|m| m.name.clone()))
        .collect()
}
