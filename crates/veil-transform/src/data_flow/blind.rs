//! Constant blinding.
//!
//! Literals move out of function bodies into private state tables, one table per literal kind and
//! contract, read back through private `view` accessors. Only literals whose required type is known
//! are moved, so the accessor's return type always fits where the literal stood.

use crate::analysis::modifiers_used_by_pure;
use crate::{PassContext, Transform};
use indexmap::IndexMap;
use veil_core::syntax::{
    parse_int_literal, ContractKind, ElementaryType, Expr, LiteralKind, Mutability, NodeKind,
};
use veil_core::typing::expected_type;
use veil_core::{EditSet, NodeId, Result, SyntaxTree};

pub struct ConstantBlinding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TableKind {
    Int,
    Bool,
    Str,
}

impl TableKind {
    fn element(self) -> &'static str {
        match self {
            TableKind::Int => "uint256",
            TableKind::Bool => "bool",
            TableKind::Str => "string",
        }
    }

    fn returns(self) -> &'static str {
        match self {
            TableKind::Str => "string memory",
            other => other.element(),
        }
    }

    fn accessor(self) -> &'static str {
        match self {
            TableKind::Int => "lookupInt",
            TableKind::Bool => "lookupBool",
            TableKind::Str => "lookupString",
        }
    }

    fn table(self) -> &'static str {
        match self {
            TableKind::Int => "intPool",
            TableKind::Bool => "boolPool",
            TableKind::Str => "stringPool",
        }
    }
}

/// Literal texts of one contract, in first-seen order.
#[derive(Default)]
struct Tables {
    entries: IndexMap<TableKind, Vec<String>>,
    slots: IndexMap<(TableKind, String), usize>,
}

impl Tables {
    fn slot(&mut self, kind: TableKind, text: &str, dedupe: bool) -> usize {
        if dedupe {
            if let Some(&slot) = self.slots.get(&(kind, text.to_string())) {
                return slot;
            }
        }
        let entries = self.entries.entry(kind).or_default();
        entries.push(text.to_string());
        let slot = entries.len() - 1;
        self.slots.entry((kind, text.to_string())).or_insert(slot);
        slot
    }
}

impl Transform for ConstantBlinding {
    fn name(&self) -> &'static str {
        "blind"
    }

    fn description(&self) -> &'static str {
        "Moves literals into private state tables behind accessor functions"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let mut edits = EditSet::new();
        let pure_modifiers = modifiers_used_by_pure(tree);

        for (_, contract) in tree.contracts() {
            if !matches!(contract.kind, ContractKind::Contract | ContractKind::Abstract) {
                continue;
            }
            let mut regions: Vec<NodeId> = Vec::new();
            for &member in &contract.members {
                match &tree.node(member).kind {
                    NodeKind::Function(f) if f.mutability != Mutability::Pure => {
                        regions.extend(f.body);
                    }
                    NodeKind::Modifier(m) if !pure_modifiers.contains(&m.name) => {
                        regions.extend(m.body);
                    }
                    NodeKind::Declaration(d) if !d.constant && !d.immutable => {
                        regions.extend(d.value);
                    }
                    _ => {}
                }
            }

            let mut tables = Tables::default();
            let mut names: IndexMap<TableKind, (String, String)> = IndexMap::new();
            for region in regions {
                for id in tree.descendants(region) {
                    let Some((kind, text)) = blindable(tree, cx, id) else {
                        continue;
                    };
                    let slot = tables.slot(kind, &text, cx.config.dedupe_literals);
                    let (_, accessor) = names.entry(kind).or_insert_with(|| {
                        (cx.names.fresh(kind.table()), cx.names.fresh(kind.accessor()))
                    });
                    let call = format!("{}({})", accessor, slot);
                    let replacement = match (kind, expected_type(tree, &cx.symbols, id)) {
                        (TableKind::Int, Some(ElementaryType::Uint(bits))) if bits < 256 => {
                            format!("uint{}({})", bits, call)
                        }
                        _ => call,
                    };
                    edits.replace(tree.span(id), replacement);
                }
            }

            if tables.entries.is_empty() {
                continue;
            }
            let mut members = String::new();
            for (kind, entries) in &tables.entries {
                let Some((table, accessor)) = names.get(kind) else {
                    continue;
                };
                let mut elements = entries.clone();
                if let Some(first) = elements.first_mut() {
                    if *kind != TableKind::Bool {
                        *first = format!("{}({})", kind.element(), first);
                    }
                }
                members.push_str(&format!(
                    "\n    {}[{}] private {} = [{}];",
                    kind.element(),
                    entries.len(),
                    table,
                    elements.join(", ")
                ));
                members.push_str(&format!(
                    "\n    function {}(uint256 i) private view returns ({}) {{\n        return {}[i];\n    }}",
                    accessor,
                    kind.returns(),
                    table
                ));
            }
            edits.insert(contract.member_insert_offset(), members);
            tracing::debug!(
                contract = %contract.name,
                literals = tables.slots.len(),
                "blinded literals"
            );
        }

        Ok(edits)
    }
}

/// True when the literal spells a 20-byte address.
pub(crate) fn is_address_literal(text: &str) -> bool {
    text.strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// True when `id` sits inside a conversion to bytes or address types.
pub(crate) fn inside_byte_conversion(tree: &SyntaxTree, id: NodeId) -> bool {
    tree.ancestors(id).any(|a| match tree.expr(a) {
        Some(Expr::Call { callee, .. }) => match tree.expr(*callee) {
            Some(Expr::TypeName(name)) => {
                name.starts_with("bytes") || name.starts_with("address") || name == "payable"
            }
            _ => false,
        },
        _ => false,
    })
}

fn blindable(tree: &SyntaxTree, cx: &PassContext, id: NodeId) -> Option<(TableKind, String)> {
    let Some(Expr::Literal(literal)) = tree.expr(id) else {
        return None;
    };
    let text = tree.text(id);
    match literal.kind {
        LiteralKind::Bool => Some((TableKind::Bool, text.to_string())),
        LiteralKind::String if text.starts_with('"') || text.starts_with('\'') => {
            matches!(
                expected_type(tree, &cx.symbols, id),
                Some(ElementaryType::String)
            )
            .then(|| (TableKind::Str, text.to_string()))
        }
        LiteralKind::Number => {
            if literal.has_unit || is_address_literal(text) || parse_int_literal(text).is_none() {
                return None;
            }
            let negated = tree
                .parent(id)
                .and_then(|p| tree.expr(p))
                .is_some_and(|p| matches!(p, Expr::Unary { op, .. } if op == "-"));
            if negated || inside_byte_conversion(tree, id) {
                return None;
            }
            matches!(
                expected_type(tree, &cx.symbols, id),
                Some(ElementaryType::Uint(_))
            )
            .then(|| (TableKind::Int, text.to_string()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use veil_core::ObfuscationConfig;

    fn run(source: &str, dedupe: bool) -> crate::PassOutput {
        let mut config = ObfuscationConfig::default().with_seed(2);
        config.dedupe_literals = dedupe;
        ConstantBlinding.apply(source, &config).unwrap()
    }

    const SOURCE: &str = r#"contract Vault {
    uint256 limit;
    uint8 small;
    bool open;
    function configure() public {
        limit = 1000;
        small = 7;
        open = true;
        require(limit > 1000, "limit too low");
    }
    function square(uint256 v) public pure returns (uint256) {
        return v * 1000;
    }
}"#;

    #[test]
    fn test_tables_and_accessors() {
        let output = run(SOURCE, true);
        let text = &output.source;
        assert!(text.contains("uint256[2] private intPool = [uint256(1000), 7];"));
        assert!(text.contains("bool[1] private boolPool = [true];"));
        assert!(text.contains("string[1] private stringPool = [string(\"limit too low\")];"));
        assert!(text.contains("function lookupInt(uint256 i) private view returns (uint256)"));
        assert!(text.contains("function lookupString(uint256 i) private view returns (string memory)"));
        assert!(text.contains("limit = lookupInt(0);"));
        assert!(text.contains("small = uint8(lookupInt(1));"));
        assert!(text.contains("open = lookupBool(0);"));
        assert!(text.contains("require(limit > lookupInt(0), lookupString(0));"));
        assert!(text.contains("return v * 1000;"));
        veil_parser::parse(text).unwrap();
    }

    #[test]
    fn test_without_dedupe_every_site_has_a_slot() {
        let output = run(SOURCE, false);
        assert!(output
            .source
            .contains("uint256[3] private intPool = [uint256(1000), 7, 1000];"));
        assert!(output.source.contains("require(limit > lookupInt(2)"));
    }

    #[test]
    fn test_addresses_and_casts_stay() {
        let source = r#"contract C {
    address owner;
    bytes32 tag;
    function f() public {
        owner = address(0x1234567890123456789012345678901234567890);
        tag = bytes32(uint256(5));
    }
}"#;
        let output = run(source, true);
        assert!(!output.changed);
        assert_eq!(output.source, source);
    }

    #[test]
    fn test_libraries_skipped() {
        let source = "library L { function f() internal view returns (bool) { return true; } }";
        assert!(!run(source, true).changed);
    }
}
