//! Literal substitution: boolean literals become opaque predicates and integer literals become
//! literal-only arithmetic that folds back to the same value.

use super::blind::{inside_byte_conversion, is_address_literal};
use crate::synth::{encode_literal, keccak_source, Predicate};
use crate::{PassContext, Transform};
use veil_core::syntax::{parse_int_literal, ElementaryType, Expr, LiteralKind};
use veil_core::typing::expected_type;
use veil_core::{EditSet, NodeId, Result, SyntaxTree};

/// True inside the initializer of a `constant` or `immutable` state variable.
fn in_constant_initializer(tree: &SyntaxTree, id: NodeId) -> bool {
    tree.ancestors(id)
        .filter_map(|a| tree.decl(a))
        .any(|d| d.constant || d.immutable)
}

pub struct BooleanSubstitution;

impl Transform for BooleanSubstitution {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn description(&self) -> &'static str {
        "Replaces true and false with predicates of the same value"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let mut edits = EditSet::new();
        for id in tree.ids() {
            let Some(Expr::Literal(literal)) = tree.expr(id) else {
                continue;
            };
            if literal.kind != LiteralKind::Bool || in_constant_initializer(tree, id) {
                continue;
            }
            let label = tree.text(id) == "true";
            let vars = [keccak_source(&mut cx.rng).1, keccak_source(&mut cx.rng).1];
            let predicate = Predicate::random(&mut cx.rng, label);
            edits.replace(tree.span(id), format!("({})", predicate.render(&vars)));
        }
        Ok(edits)
    }
}

pub struct IntegerSubstitution;

impl Transform for IntegerSubstitution {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn description(&self) -> &'static str {
        "Replaces integer literals with arithmetic that evaluates to them"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let mut edits = EditSet::new();
        let depth = cx.config.integer.depth;
        if depth == 0 {
            return Ok(edits);
        }
        for id in tree.ids() {
            let Some(Expr::Literal(literal)) = tree.expr(id) else {
                continue;
            };
            if literal.kind != LiteralKind::Number || literal.has_unit {
                continue;
            }
            let text = tree.text(id);
            let Some(value) = parse_int_literal(text) else {
                continue;
            };
            if value.bits() > cx.config.integer.max_bits
                || is_address_literal(text)
                || inside_byte_conversion(tree, id)
            {
                continue;
            }
            let expected = expected_type(tree, &cx.symbols, id);
            let hex = text.starts_with("0x") || text.starts_with("0X");
            let keep = match expected {
                Some(ElementaryType::FixedBytes(_) | ElementaryType::Address) => true,
                // Hex literals double as bytes values, so they need a known numeric context.
                None => hex,
                _ => false,
            };
            if keep {
                continue;
            }
            let encoded = encode_literal(&mut cx.rng, &value, depth);
            edits.replace(tree.span(id), encoded.render());
        }
        Ok(edits)
    }
}
