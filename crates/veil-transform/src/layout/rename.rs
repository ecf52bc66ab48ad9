/*! Identifier renaming.
 *
 * Every name the outside world cannot observe is replaced: internal and private functions,
 * modifiers, non-public state variables, and all locals, parameters and named returns. Anything
 * that shows up in the ABI, in a library or interface, or that overrides a base this file does not
 * contain keeps its name. The generated-to-original map travels out with the pass output.
 */

use crate::{PassContext, Transform};
use std::collections::{BTreeMap, HashMap, HashSet};
use veil_core::scope::{modifier_named, Binding};
use veil_core::syntax::{ContractKind, Expr, FunctionKind, NodeKind, Stmt, Visibility};
use veil_core::{EditSet, NodeId, Result, Span, SyntaxTree};

pub struct Renamer;

impl Transform for Renamer {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn description(&self) -> &'static str {
        "Replaces internal identifiers with generated names"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let mut spans: BTreeMap<Span, String> = BTreeMap::new();
        rename_functions(tree, cx, &mut spans);
        rename_modifiers(tree, cx, &mut spans);
        rename_state(tree, cx, &mut spans);
        rename_locals(tree, cx, &mut spans);

        let mut edits = EditSet::new();
        for (span, name) in spans {
            edits.replace(span, name);
        }
        Ok(edits)
    }
}

fn container_kind(tree: &SyntaxTree, id: NodeId) -> Option<ContractKind> {
    tree.enclosing_contract(id)
        .and_then(|c| tree.contract(c))
        .map(|c| c.kind)
}

/// Function names that must survive: externally visible, in a library or interface, or overriding
/// something outside the file.
fn protected_functions(tree: &SyntaxTree) -> HashSet<String> {
    let mut by_name: HashMap<&str, Vec<NodeId>> = HashMap::new();
    for id in tree.functions() {
        if let Some(name) = tree.function(id).and_then(|f| f.name.as_deref()) {
            by_name.entry(name).or_default().push(id);
        }
    }
    let mut protected = HashSet::new();
    for (name, ids) in by_name {
        let exposed = ids.iter().any(|&id| {
            let Some(f) = tree.function(id) else {
                return true;
            };
            let in_contract = tree.enclosing_contract(id).is_some();
            f.kind != FunctionKind::Function
                || matches!(f.visibility, Some(Visibility::Public | Visibility::External))
                || (f.visibility.is_none() && in_contract)
                || matches!(
                    container_kind(tree, id),
                    Some(ContractKind::Library | ContractKind::Interface)
                )
        });
        let dangling_override = ids
            .iter()
            .filter_map(|&id| tree.function(id))
            .all(|f| f.is_override);
        if exposed || dangling_override {
            protected.insert(name.to_string());
        }
    }
    protected
}

/// Names of functions that some call site addresses with `{name: value}` arguments.
fn named_argument_targets(tree: &SyntaxTree, cx: &PassContext) -> HashSet<String> {
    tree.ids()
        .filter_map(|id| match tree.expr(id) {
            Some(Expr::Call { callee, args }) => {
                let named = args.iter().any(|&a| {
                    matches!(tree.expr(a), Some(Expr::Other(_))) && tree.text(a).starts_with('{')
                });
                match (named, cx.symbols.resolve(*callee)) {
                    (true, Some(Binding::Function(name))) => Some(name.clone()),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect()
}

fn rename_functions(tree: &SyntaxTree, cx: &mut PassContext, spans: &mut BTreeMap<Span, String>) {
    let protected = protected_functions(tree);
    let mut renamed: HashMap<String, String> = HashMap::new();
    for id in tree.functions() {
        let Some(f) = tree.function(id) else {
            continue;
        };
        let (Some(name), Some(name_span)) = (f.name.as_deref(), f.name_span) else {
            continue;
        };
        if protected.contains(name) {
            continue;
        }
        let fresh = renamed
            .entry(name.to_string())
            .or_insert_with(|| cx.names.rename(name, "f"))
            .clone();
        spans.insert(name_span, fresh);
    }

    for id in tree.ids() {
        match tree.expr(id) {
            Some(Expr::Ident(_)) => {
                if let Some(Binding::Function(name)) = cx.symbols.resolve(id) {
                    if let Some(fresh) = renamed.get(name) {
                        spans.insert(tree.span(id), fresh.clone());
                    }
                }
            }
            Some(Expr::Member {
                object,
                property,
                property_span,
            }) => {
                let qualified = tree.text(*object) == "super"
                    || matches!(cx.symbols.resolve(*object), Some(Binding::Contract(_)));
                if qualified {
                    if let Some(fresh) = renamed.get(property) {
                        spans.insert(*property_span, fresh.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

fn rename_modifiers(tree: &SyntaxTree, cx: &mut PassContext, spans: &mut BTreeMap<Span, String>) {
    let mut renamed: HashMap<String, String> = HashMap::new();
    for id in tree.ids() {
        let Some(m) = tree.modifier(id) else {
            continue;
        };
        if matches!(container_kind(tree, id), Some(ContractKind::Interface)) {
            continue;
        }
        let fresh = renamed
            .entry(m.name.clone())
            .or_insert_with(|| cx.names.rename(&m.name, "m"))
            .clone();
        spans.insert(m.name_span, fresh);
    }
    for id in tree.functions() {
        let (Some(f), Some(contract)) = (tree.function(id), tree.enclosing_contract(id)) else {
            continue;
        };
        for invocation in &f.modifiers {
            if modifier_named(tree, contract, &invocation.name).is_none() {
                continue;
            }
            if let Some(fresh) = renamed.get(&invocation.name) {
                spans.insert(invocation.name_span, fresh.clone());
            }
        }
    }
}

fn rename_state(tree: &SyntaxTree, cx: &mut PassContext, spans: &mut BTreeMap<Span, String>) {
    if tree.contracts().any(|(_, c)| c.has_assembly) {
        return;
    }
    let qualified: HashSet<&str> = tree
        .ids()
        .filter_map(|id| match tree.expr(id) {
            Some(Expr::Member {
                object, property, ..
            }) if matches!(cx.symbols.resolve(*object), Some(Binding::Contract(_))) => {
                Some(property.as_str())
            }
            _ => None,
        })
        .collect();
    for (_, contract) in tree.contracts() {
        if !matches!(contract.kind, ContractKind::Contract | ContractKind::Abstract) {
            continue;
        }
        for &member in &contract.members {
            let Some(decl) = tree.decl(member) else {
                continue;
            };
            let (Some(name), Some(name_span)) = (decl.name.as_deref(), decl.name_span) else {
                continue;
            };
            if decl.visibility == Some(Visibility::Public) || qualified.contains(name) {
                continue;
            }
            let fresh = cx.names.rename(name, "s");
            spans.insert(name_span, fresh.clone());
            for &reference in cx.symbols.references(&Binding::Variable(member)) {
                spans.insert(tree.span(reference), fresh.clone());
            }
        }
    }
}

fn rename_locals(tree: &SyntaxTree, cx: &mut PassContext, spans: &mut BTreeMap<Span, String>) {
    let keep_params = named_argument_targets(tree, cx);
    for id in tree.ids() {
        let (params, body, name) = match &tree.node(id).kind {
            NodeKind::Function(f) => (
                f.params.iter().chain(&f.returns).copied().collect::<Vec<_>>(),
                f.body,
                f.name.clone(),
            ),
            NodeKind::Modifier(m) => (m.params.clone(), m.body, None),
            _ => continue,
        };
        let Some(body) = body else {
            continue;
        };
        let inner = tree.descendants(body);
        if inner
            .iter()
            .any(|&d| matches!(tree.stmt(d), Some(Stmt::Assembly)))
        {
            continue;
        }
        let params = if name.as_ref().is_some_and(|n| keep_params.contains(n)) {
            Vec::new()
        } else {
            params
        };
        let locals = inner.into_iter().filter(|&d| tree.decl(d).is_some());
        for decl_id in params.into_iter().chain(locals) {
            let Some(decl) = tree.decl(decl_id) else {
                continue;
            };
            let (Some(name), Some(name_span)) = (decl.name.as_deref(), decl.name_span) else {
                continue;
            };
            let fresh = cx.names.rename(name, "v");
            spans.insert(name_span, fresh.clone());
            for &reference in cx.symbols.references(&Binding::Variable(decl_id)) {
                spans.insert(tree.span(reference), fresh.clone());
            }
        }
    }
}
