//! Opaque predicate insertion.
//!
//! Statements get wrapped in an `if` whose condition is an always-true (or always-false)
//! predicate, with a dead arm holding a copy of the statement or a bare `revert()`. Loop and
//! branch conditions are strengthened with `&& P_true` or `|| P_false`. Predicates read two free
//! variables: private state slots seeded with random words inside contracts, or hashes of random
//! constants where state is out of reach. Inside contracts some predicates instead come from a
//! chaotic map: a seeded slot fed through a generated hash-and-fold helper with a known range.

use crate::synth::{keccak_source, seed_literal, ChaoticMap, Predicate};
use crate::util::indent_at;
use crate::{PassContext, Transform};
use rand::Rng;
use std::collections::HashMap;
use veil_core::syntax::{ContractKind, Mutability, Stmt};
use veil_core::{EditSet, NodeId, Result, SyntaxTree};

/// Share of in-contract predicates drawn from the chaotic map.
const CHAOTIC_SHARE: f64 = 0.25;

pub struct OpaquePredicates;

impl Transform for OpaquePredicates {
    fn name(&self) -> &'static str {
        "opaque"
    }

    fn description(&self) -> &'static str {
        "Wraps statements and conditions in predicates with a known outcome"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let mut edits = EditSet::new();
        let mut slots: HashMap<NodeId, [String; 2]> = HashMap::new();
        let mut maps: HashMap<NodeId, (String, ChaoticMap)> = HashMap::new();
        let ratio = match cx.config.opaque.ratio {
            r if r.is_nan() => 0.0,
            r => r.clamp(0.0, 1.0),
        };
        let mut sites = 0usize;

        for function_id in tree.functions() {
            let Some(function) = tree.function(function_id) else {
                continue;
            };
            let Some(body) = function.body else {
                continue;
            };
            let contract = tree
                .enclosing_contract(function_id)
                .filter(|&c| {
                    tree.contract(c).is_some_and(|c| {
                        matches!(c.kind, ContractKind::Contract | ContractKind::Abstract)
                    })
                })
                .filter(|_| function.mutability != Mutability::Pure);

            for stmt in tree.descendants(body) {
                let Some(kind) = tree.stmt(stmt) else {
                    continue;
                };
                let target = match kind {
                    Stmt::Expr(_) | Stmt::Emit { .. } | Stmt::Return(_) => Site::Statement,
                    Stmt::If { cond, .. } | Stmt::While { cond, .. } => Site::Condition(*cond),
                    _ => continue,
                };
                let Some(parent) = tree.parent(stmt) else {
                    continue;
                };
                if matches!(tree.stmt(parent), Some(Stmt::For { init: Some(i), .. }) if *i == stmt) {
                    continue;
                }
                if !cx.rng.random_bool(ratio) {
                    continue;
                }

                let label = cx.rng.random_bool(0.5);
                let predicate = match contract {
                    Some(c) if cx.rng.random_bool(CHAOTIC_SHARE) => {
                        let (call, map) = chaotic_map(tree, cx, c, &mut maps, &mut edits);
                        map.condition(call, label)
                    }
                    Some(c) => {
                        let vars = slot_names(tree, cx, c, &mut slots, &mut edits).to_vec();
                        Predicate::random(&mut cx.rng, label).render(&vars)
                    }
                    None => {
                        let vars = [keccak_source(&mut cx.rng).1, keccak_source(&mut cx.rng).1];
                        Predicate::random(&mut cx.rng, label).render(&vars)
                    }
                };

                match target {
                    Site::Condition(cond) => {
                        let text = tree.text(cond);
                        let strengthened = if label {
                            format!("({}) && {}", text, predicate)
                        } else {
                            format!("({}) || {}", text, predicate)
                        };
                        edits.replace(tree.span(cond), strengthened);
                    }
                    Site::Statement => {
                        let text = tree.text(stmt);
                        let dead = if cx.rng.random_bool(0.5) {
                            text.to_string()
                        } else {
                            "revert();".to_string()
                        };
                        let indent = indent_at(tree.source(), tree.span(stmt).offset);
                        let (then, otherwise) = if label {
                            (text, dead.as_str())
                        } else {
                            (dead.as_str(), text)
                        };
                        let mut wrapped = format!(
                            "if ({}) {{\n{indent}    {}\n{indent}}} else {{\n{indent}    {}\n{indent}}}",
                            predicate,
                            then,
                            otherwise,
                            indent = indent
                        );
                        let in_block = matches!(
                            tree.stmt(parent),
                            Some(Stmt::Block(_) | Stmt::Unchecked(_))
                        );
                        if !in_block {
                            wrapped = format!("{{ {} }}", wrapped);
                        }
                        edits.replace(tree.span(stmt), wrapped);
                    }
                }
                sites += 1;
            }
        }

        tracing::debug!(
            sites,
            slots = slots.len() * 2 + maps.len(),
            maps = maps.len(),
            "opaque predicates placed"
        );
        Ok(edits)
    }
}

enum Site {
    Statement,
    Condition(NodeId),
}

/// The two seeded state slots of `contract`, declared on first use.
fn slot_names<'s>(
    tree: &SyntaxTree,
    cx: &mut PassContext,
    contract: NodeId,
    slots: &'s mut HashMap<NodeId, [String; 2]>,
    edits: &mut EditSet,
) -> &'s [String; 2] {
    slots.entry(contract).or_insert_with(|| {
        let names = [cx.names.fresh("entropy"), cx.names.fresh("entropy")];
        if let Some(c) = tree.contract(contract) {
            let mut declarations = String::new();
            for name in &names {
                declarations.push_str(&format!(
                    "\n    uint256 private {} = {};",
                    name,
                    seed_literal(&mut cx.rng)
                ));
            }
            edits.insert(c.member_insert_offset(), declarations);
        }
        names
    })
}

/// The helper call of `contract`'s chaotic map, declaring its seed slot and helper on first use.
fn chaotic_map<'s>(
    tree: &SyntaxTree,
    cx: &mut PassContext,
    contract: NodeId,
    maps: &'s mut HashMap<NodeId, (String, ChaoticMap)>,
    edits: &mut EditSet,
) -> (&'s str, ChaoticMap) {
    let (call, map) = maps.entry(contract).or_insert_with(|| {
        let seed = cx.names.fresh("cpm_seed");
        let helper = cx.names.fresh("cpm");
        let map = ChaoticMap::random(&mut cx.rng);
        if let Some(c) = tree.contract(contract) {
            edits.insert(
                c.member_insert_offset(),
                format!(
                    "\n    uint256 private {} = {};{}",
                    seed,
                    seed_literal(&mut cx.rng),
                    map.helper(&helper)
                ),
            );
        }
        (format!("{}({})", helper, seed), map)
    });
    (call.as_str(), *map)
}
