/*! Modifier and internal-call inlining.
 *
 * Modifiers are spliced around the function body at their `_;` placeholder, last modifier first,
 * with their parameters bound to fresh locals. Small `pure`/`view` helpers made of declarations and
 * a final `return e;` are expanded at their call sites: the arguments and helper locals become
 * fresh declarations just before the calling statement, and the call becomes `(e)`.
 */

use crate::analysis::CallGraph;
use crate::util::{has_side_effects, indent_at, inside_loop, is_conversion};
use crate::{PassContext, Transform};
use std::collections::HashMap;
use veil_core::scope::{functions_named, linearize, lookup_at, modifier_named, Binding};
use veil_core::syntax::{Expr, Stmt, Visibility};
use veil_core::{EditSet, NodeId, Result, Span, SyntaxTree, TransformError};

pub struct Inliner;

impl Transform for Inliner {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn description(&self) -> &'static str {
        "Expands modifiers and small internal helpers at their use sites"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let mut edits = EditSet::new();

        if cx.config.inline.internal_calls {
            let graph = CallGraph::build(tree, &cx.symbols);
            let mut sites = 0;
            for id in tree.ids() {
                if inline_call(tree, cx, &graph, id, &mut edits)? {
                    sites += 1;
                }
            }
            tracing::debug!(sites, "internal calls inlined");
        }

        if cx.config.inline.modifiers {
            for function in tree.functions() {
                match expand_modifiers(tree, cx, function, &edits) {
                    Ok(Some(expansion)) => {
                        edits.absorb(expansion.body);
                        edits.replace(expansion.body, expansion.text);
                        for span in expansion.invocations {
                            edits.delete(span);
                        }
                    }
                    Ok(None) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => cx.warn(e),
                }
            }
        }

        Ok(edits)
    }
}

/// The helper a call refers to, when it qualifies for expansion.
fn inlinable_target(tree: &SyntaxTree, call: NodeId, name: &str, arity: usize) -> Option<NodeId> {
    let contract = tree.enclosing_contract(call)?;
    let candidates = functions_named(tree, contract, name);
    let [target] = candidates.as_slice() else {
        return None;
    };
    let function = tree.function(*target)?;
    let eligible = matches!(
        function.visibility,
        Some(Visibility::Internal) | Some(Visibility::Private)
    ) && function.is_read_only()
        && function.modifiers.is_empty()
        && !function.is_virtual
        && function.params.len() == arity;
    if !eligible {
        return None;
    }
    let items = tree.block_items(function.body?);
    let (last, init) = items.split_last()?;
    if !matches!(tree.stmt(*last), Some(Stmt::Return(Some(_)))) {
        return None;
    }
    let straight = init.iter().all(|&s| match tree.stmt(s) {
        Some(Stmt::VarDecl {
            decls,
            tuple: false,
            ..
        }) => decls.len() == 1 && decls[0].is_some(),
        Some(Stmt::Expr(_)) => true,
        _ => false,
    });
    straight.then_some(*target)
}

/// True when evaluating `call` ahead of its statement could change what the statement does.
fn reorders_effects(tree: &SyntaxTree, stmt: NodeId, call: NodeId) -> bool {
    let scope = match tree.stmt(stmt) {
        Some(Stmt::If { cond, .. }) => *cond,
        _ => stmt,
    };
    let allowed_assign = match tree.stmt(stmt) {
        Some(Stmt::Expr(e)) => match tree.expr(*e) {
            Some(Expr::Assign { target, .. }) if !has_side_effects(tree, *target) => Some(*e),
            _ => None,
        },
        _ => None,
    };
    tree.descendants(scope).into_iter().any(|d| {
        if tree.is_within(d, call) || Some(d) == allowed_assign {
            return false;
        }
        match tree.expr(d) {
            Some(Expr::Call { .. }) => !is_conversion(tree, d),
            Some(Expr::Assign { .. }) | Some(Expr::Update { .. }) => true,
            Some(Expr::Unary { op, .. }) => op == "delete",
            _ => false,
        }
    })
}

/// True when `call` only runs under a condition inside `stmt` (short-circuit or ternary arm).
fn conditionally_evaluated(tree: &SyntaxTree, stmt: NodeId, call: NodeId) -> bool {
    let mut child = call;
    for ancestor in tree.ancestors(call) {
        if ancestor == stmt {
            break;
        }
        match tree.expr(ancestor) {
            Some(Expr::Binary { op, right, .. }) if (op == "&&" || op == "||") && *right == child => {
                return true
            }
            Some(Expr::Ternary { cond, .. }) if *cond != child => return true,
            _ => {}
        }
        child = ancestor;
    }
    false
}

fn inline_call(
    tree: &SyntaxTree,
    cx: &mut PassContext,
    graph: &CallGraph,
    call: NodeId,
    edits: &mut EditSet,
) -> Result<bool> {
    let source = tree.source();
    let Some(Expr::Call { callee, args }) = tree.expr(call) else {
        return Ok(false);
    };
    let Some(Expr::Ident(name)) = tree.expr(*callee) else {
        return Ok(false);
    };
    if !matches!(cx.symbols.resolve(*callee), Some(Binding::Function(_))) {
        return Ok(false);
    }
    let Some(caller) = tree.enclosing_callable(call) else {
        return Ok(false);
    };
    let Some(caller_body) = tree.function(caller).and_then(|f| f.body) else {
        return Ok(false);
    };
    if !tree.is_within(call, caller_body) {
        return Ok(false);
    }
    let Some(target) = inlinable_target(tree, call, name, args.len()) else {
        return Ok(false);
    };
    if graph.on_cycle(target) {
        cx.warn(TransformError::InlineCycle {
            function: name.clone(),
            span: tree.span(call),
        });
        return Ok(false);
    }

    let Some(stmt) = tree.enclosing_statement(call) else {
        return Ok(false);
    };
    let in_block = tree
        .parent(stmt)
        .and_then(|p| tree.stmt(p))
        .is_some_and(|p| matches!(p, Stmt::Block(_) | Stmt::Unchecked(_)));
    let shape_ok = match tree.stmt(stmt) {
        Some(Stmt::Expr(_) | Stmt::VarDecl { .. } | Stmt::Return(_) | Stmt::Emit { .. }) => true,
        Some(Stmt::If { cond, .. }) => tree.is_within(call, *cond),
        _ => false,
    };
    if !in_block
        || !shape_ok
        || conditionally_evaluated(tree, stmt, call)
        || reorders_effects(tree, stmt, call)
        || args.iter().any(|&a| has_side_effects(tree, a))
    {
        return Ok(false);
    }

    let Some(function) = tree.function(target) else {
        return Ok(false);
    };
    let Some(body) = function.body else {
        return Ok(false);
    };
    let locals: Vec<NodeId> = function
        .params
        .iter()
        .copied()
        .chain(tree.descendants(body).into_iter().filter(|&d| tree.decl(d).is_some()))
        .collect();

    for id in tree.descendants(body) {
        let Some(Expr::Ident(ident)) = tree.expr(id) else {
            continue;
        };
        let binding = cx.symbols.resolve(id).cloned();
        match &binding {
            Some(Binding::Variable(d)) if locals.contains(d) => continue,
            Some(Binding::Variable(d)) if function.returns.contains(d) => return Ok(false),
            _ => {}
        }
        // The helper's free names must mean the same thing at the call site.
        if lookup_at(tree, call, ident) != binding {
            return Ok(false);
        }
    }

    let mut renames: HashMap<NodeId, String> = HashMap::new();
    for &decl in &locals {
        if let Some(original) = tree.decl(decl).and_then(|d| d.name.as_deref()) {
            renames.insert(decl, cx.names.fresh(original));
        }
    }
    let mut local = EditSet::new();
    for id in tree.descendants(body) {
        if let Some(d) = cx.symbols.variable(id) {
            if let Some(fresh) = renames.get(&d) {
                local.replace(tree.span(id), fresh.clone());
            }
        }
    }

    let mut bindings = Vec::new();
    for (&param, &arg) in function.params.iter().zip(args.iter()) {
        let (Some(decl), Some(fresh)) = (tree.decl(param), renames.get(&param)) else {
            continue;
        };
        let value = edits.render_span(source, tree.span(arg))?;
        bindings.push(format!("{} {} = {};", decl.declared_type(), fresh, value));
    }
    let items = tree.block_items(body);
    let Some((last, init)) = items.split_last() else {
        return Ok(false);
    };
    for &item in init {
        match tree.stmt(item) {
            Some(Stmt::VarDecl { decls, value, .. }) => {
                let Some(decl_id) = decls.first().copied().flatten() else {
                    continue;
                };
                let (Some(decl), Some(fresh)) = (tree.decl(decl_id), renames.get(&decl_id)) else {
                    continue;
                };
                match value {
                    Some(v) => bindings.push(format!(
                        "{} {} = {};",
                        decl.declared_type(),
                        fresh,
                        local.render_span(source, tree.span(*v))?
                    )),
                    None => bindings.push(format!("{} {};", decl.declared_type(), fresh)),
                }
            }
            _ => bindings.push(local.render_span(source, tree.span(item))?),
        }
    }
    let Some(Stmt::Return(Some(result))) = tree.stmt(*last) else {
        return Ok(false);
    };
    let result = local.render_span(source, tree.span(*result))?;

    let at = tree.span(stmt).offset;
    let indent = indent_at(source, at).to_string();
    for binding in bindings {
        edits.insert(at, format!("{}\n{}", binding, indent));
    }
    edits.replace(tree.span(call), format!("({})", result));
    tracing::debug!(function = %name, "inlined call");
    Ok(true)
}

struct Expansion {
    body: Span,
    text: String,
    invocations: Vec<Span>,
}

fn unsupported(construct: &str, span: Span) -> TransformError {
    TransformError::UnsupportedConstruct {
        construct: construct.to_string(),
        span,
    }
}

fn expand_modifiers(
    tree: &SyntaxTree,
    cx: &mut PassContext,
    function_id: NodeId,
    edits: &EditSet,
) -> Result<Option<Expansion>> {
    let source = tree.source();
    let Some(function) = tree.function(function_id) else {
        return Ok(None);
    };
    let Some(body) = function.body else {
        return Ok(None);
    };
    let Some(contract) = tree.enclosing_contract(function_id) else {
        return Ok(None);
    };
    let function_returns = tree
        .descendants(body)
        .into_iter()
        .any(|d| matches!(tree.stmt(d), Some(Stmt::Return(_))));

    let mut text = edits.render_span(source, tree.span(body))?;
    let mut invocations = Vec::new();

    for invocation in function.modifiers.iter().rev() {
        let Some(modifier_id) = modifier_named(tree, contract, &invocation.name) else {
            continue;
        };
        if is_overridden(tree, contract, &invocation.name) {
            return Err(unsupported("overridden modifier", invocation.span));
        }
        let Some(modifier) = tree.modifier(modifier_id) else {
            continue;
        };
        let Some(modifier_body) = modifier.body else {
            return Err(unsupported("modifier without body", invocation.span));
        };
        if modifier.params.len() != invocation.args.len() {
            return Err(unsupported("modifier arguments", invocation.span));
        }

        let inner = tree.descendants(modifier_body);
        let placeholders: Vec<NodeId> = inner
            .iter()
            .copied()
            .filter(|&d| matches!(tree.stmt(d), Some(Stmt::Placeholder)))
            .collect();
        let [placeholder] = placeholders.as_slice() else {
            return Err(unsupported("modifier placeholder count", tree.span(modifier_id)));
        };
        if inside_loop(tree, *placeholder, modifier_body) {
            return Err(unsupported("placeholder inside loop", tree.span(*placeholder)));
        }
        if let Some(ret) = inner
            .iter()
            .find(|&&d| matches!(tree.stmt(d), Some(Stmt::Return(_))))
        {
            return Err(unsupported("return inside modifier", tree.span(*ret)));
        }
        if function_returns && !placeholder_is_last(tree, *placeholder, modifier_body) {
            return Err(unsupported(
                "return under modifier with trailing statements",
                invocation.span,
            ));
        }

        let modifier_locals: Vec<NodeId> = modifier
            .params
            .iter()
            .copied()
            .chain(inner.iter().copied().filter(|&d| tree.decl(d).is_some()))
            .collect();
        for &id in &inner {
            let Some(Expr::Ident(name)) = tree.expr(id) else {
                continue;
            };
            let binding = cx.symbols.resolve(id).cloned();
            if matches!(&binding, Some(Binding::Variable(d)) if modifier_locals.contains(d)) {
                continue;
            }
            if lookup_at(tree, body, name) != binding {
                return Err(unsupported("name captured by function parameter", tree.span(id)));
            }
        }

        let mut local = EditSet::new();
        let mut renames: HashMap<NodeId, String> = HashMap::new();
        for &decl in &modifier_locals {
            if let Some(d) = tree.decl(decl) {
                if let (Some(name), Some(name_span)) = (d.name.as_deref(), d.name_span) {
                    let fresh = cx.names.fresh(name);
                    if !modifier.params.contains(&decl) {
                        local.replace(name_span, fresh.clone());
                    }
                    renames.insert(decl, fresh);
                }
            }
        }
        for &id in &inner {
            if let Some(fresh) = cx.symbols.variable(id).and_then(|d| renames.get(&d)) {
                local.replace(tree.span(id), fresh.clone());
            }
        }
        local.replace(tree.span(*placeholder), text);
        let spliced = local.render_span(source, tree.span(modifier_body))?;

        let mut bindings = String::new();
        for (&param, &arg) in modifier.params.iter().zip(invocation.args.iter()) {
            let (Some(decl), Some(fresh)) = (tree.decl(param), renames.get(&param)) else {
                continue;
            };
            let value = edits.render_span(source, tree.span(arg))?;
            bindings.push_str(&format!("{} {} = {}; ", decl.declared_type(), fresh, value));
        }
        text = if bindings.is_empty() {
            spliced
        } else {
            format!("{{ {}{} }}", bindings, spliced)
        };
        invocations.push(invocation.span);
        tracing::debug!(modifier = %invocation.name, "spliced modifier");
    }

    if invocations.is_empty() {
        return Ok(None);
    }
    Ok(Some(Expansion {
        body: tree.span(body),
        text,
        invocations,
    }))
}

/// True when more than one modifier named `name` is in play for `contract`, either along its bases
/// or in a contract deriving from it.
fn is_overridden(tree: &SyntaxTree, contract: NodeId, name: &str) -> bool {
    let related: Vec<NodeId> = tree
        .contracts()
        .map(|(id, _)| id)
        .filter(|&id| {
            linearize(tree, contract).contains(&id) || linearize(tree, id).contains(&contract)
        })
        .collect();
    related
        .iter()
        .filter_map(|&id| tree.contract(id))
        .flat_map(|c| c.members.iter().copied())
        .filter(|&m| tree.modifier(m).is_some_and(|md| md.name == name))
        .count()
        > 1
}

/// True when nothing in the modifier runs after the placeholder.
fn placeholder_is_last(tree: &SyntaxTree, placeholder: NodeId, modifier_body: NodeId) -> bool {
    let mut child = placeholder;
    for ancestor in tree.ancestors(placeholder) {
        match tree.stmt(ancestor) {
            Some(Stmt::Block(items)) | Some(Stmt::Unchecked(items)) => {
                if items.last() != Some(&child) {
                    return false;
                }
            }
            Some(Stmt::If { .. }) => {}
            _ => return false,
        }
        if ancestor == modifier_body {
            return true;
        }
        child = ancestor;
    }
    false
}
