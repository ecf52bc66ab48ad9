//! Scalar splitting.
//!
//! An unsigned state variable `x` becomes a two-slot array holding a random share and the value
//! xored with it. Reads turn into `(x[0] ^ x[1])`; every write goes through a generated setter that
//! draws a fresh share, stores both halves and returns the written value so assignments keep their
//! value as expressions.

use crate::{PassContext, Transform};
use rand::Rng;
use veil_core::scope::{linearize, Binding};
use veil_core::syntax::{ContractKind, ElementaryType, Expr, StorageClass, Stmt, Visibility};
use veil_core::{EditSet, NodeId, Result, Span, SyntaxTree, TransformError};

pub struct ScalarSplit;

/// How one reference to a split variable gets rewritten.
#[derive(Debug, Clone)]
enum Access {
    Read(NodeId),
    /// `x = e` or `x op= e`; the operator without `=` for compound forms.
    Assign {
        expr: NodeId,
        op: Option<String>,
        value: NodeId,
    },
    Update {
        expr: NodeId,
        increment: bool,
        prefix: bool,
    },
    Delete(NodeId),
}

impl Access {
    fn expr(&self) -> NodeId {
        match self {
            Access::Read(id) | Access::Delete(id) => *id,
            Access::Assign { expr, .. } | Access::Update { expr, .. } => *expr,
        }
    }
}

/// Outermost parenthesized form of `id`.
fn unparen(tree: &SyntaxTree, mut id: NodeId) -> NodeId {
    while let Some(parent) = tree.parent(id) {
        if matches!(tree.expr(parent), Some(Expr::Paren(_))) {
            id = parent;
        } else {
            break;
        }
    }
    id
}

fn classify(tree: &SyntaxTree, reference: NodeId) -> std::result::Result<Access, Span> {
    let top = unparen(tree, reference);
    let Some(parent) = tree.parent(top) else {
        return Ok(Access::Read(reference));
    };
    match tree.expr(parent) {
        Some(Expr::Assign { op, target, value }) if *target == top => Ok(Access::Assign {
            expr: parent,
            op: op.strip_suffix('=').filter(|o| !o.is_empty()).map(str::to_string),
            value: *value,
        }),
        Some(Expr::Update {
            op,
            prefix,
            operand,
        }) if *operand == top => Ok(Access::Update {
            expr: parent,
            increment: op == "++",
            prefix: *prefix,
        }),
        Some(Expr::Unary { op, operand }) if op == "delete" && *operand == top => {
            Ok(Access::Delete(parent))
        }
        Some(Expr::Tuple(_)) => {
            let assigned = tree
                .ancestors(parent)
                .find_map(|a| match tree.expr(a) {
                    Some(Expr::Assign { target, .. }) => Some(tree.is_within(top, *target)),
                    _ => None,
                })
                .unwrap_or(false);
            if assigned {
                Err(tree.span(reference))
            } else {
                Ok(Access::Read(reference))
            }
        }
        _ => Ok(Access::Read(reference)),
    }
}

impl Transform for ScalarSplit {
    fn name(&self) -> &'static str {
        "split"
    }

    fn description(&self) -> &'static str {
        "Stores unsigned state variables as two xor shares"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let source = tree.source();
        let mut edits = EditSet::new();
        let assembly = assembly_sites(tree);

        // Every variable is chosen before any edit is made so reads of one variable can nest
        // inside writes of another.
        let mut splits: Vec<Split> = Vec::new();
        for (contract_id, contract) in tree.contracts() {
            if !matches!(contract.kind, ContractKind::Contract | ContractKind::Abstract) {
                continue;
            }
            let blocked_by = assembly
                .iter()
                .find(|(holder, _)| linearize(tree, *holder).contains(&contract_id))
                .map(|(_, span)| *span);
            for &member in &contract.members {
                let Some(decl) = tree.decl(member) else {
                    continue;
                };
                let Some(ElementaryType::Uint(bits)) = decl.elementary() else {
                    continue;
                };
                let Some(name) = decl.name.as_deref() else {
                    continue;
                };
                if decl.class != StorageClass::State
                    || decl.value.is_some()
                    || decl.constant
                    || decl.immutable
                    || decl.visibility == Some(Visibility::Public)
                    || qualified_elsewhere(tree, cx, name)
                {
                    continue;
                }
                if let Some(span) = blocked_by {
                    cx.warn(TransformError::UnsupportedConstruct {
                        construct: format!("inline assembly reaching {}", name),
                        span,
                    });
                    continue;
                }

                let references = cx.symbols.references(&Binding::Variable(member));
                let mut accesses = Vec::with_capacity(references.len());
                let mut rejected = None;
                for &reference in references {
                    match classify(tree, reference) {
                        Ok(access) => accesses.push(access),
                        Err(span) => {
                            rejected = Some(span);
                            break;
                        }
                    }
                }
                if let Some(span) = rejected {
                    cx.warn(TransformError::UnsupportedConstruct {
                        construct: format!("tuple assignment to {}", name),
                        span,
                    });
                    continue;
                }

                splits.push(Split {
                    contract: contract_id,
                    member,
                    name: name.to_string(),
                    ty: format!("uint{}", bits),
                    setter: cx.names.fresh(&format!("set_{}", name)),
                    read: format!("({}[0] ^ {}[1])", name, name),
                    accesses,
                });
            }
        }

        for split in &splits {
            for access in &split.accesses {
                if let Access::Read(id) = access {
                    edits.replace(tree.span(*id), split.read.clone());
                }
            }
        }

        // Innermost writes first, across all variables, so each wrapper absorbs what it contains.
        let mut writes: Vec<(&Split, &Access)> = splits
            .iter()
            .flat_map(|split| split.accesses.iter().map(move |a| (split, a)))
            .filter(|(_, a)| !matches!(a, Access::Read(_)))
            .collect();
        writes.sort_by_key(|(_, a)| tree.span(a.expr()).len);
        for (split, access) in writes {
            let span = tree.span(access.expr());
            let (setter, read) = (&split.setter, &split.read);
            match access {
                Access::Assign { op, value, .. } => {
                    let value_span = tree.span(*value);
                    crate::util::rewrite_around(&mut edits, source, span, Some(value_span), |v| {
                        let v = v.unwrap_or_default();
                        match op {
                            None => format!("{}({})", setter, v),
                            Some(op) => format!("{}({} {} ({}))", setter, read, op, v),
                        }
                    })?;
                }
                Access::Update {
                    increment, prefix, ..
                } => {
                    let (step, undo) = if *increment { ("+", "-") } else { ("-", "+") };
                    let set = format!("{}({} {} 1)", setter, read, step);
                    let text = if *prefix {
                        set
                    } else {
                        format!("({} {} 1)", set, undo)
                    };
                    edits.absorb(span);
                    edits.replace(span, text);
                }
                Access::Delete(_) => {
                    edits.absorb(span);
                    edits.replace(span, format!("{}(0)", setter));
                }
                Access::Read(_) => {}
            }
        }

        for (contract_id, contract) in tree.contracts() {
            let mut setters = String::new();
            for split in splits.iter().filter(|s| s.contract == contract_id) {
                let Some(decl) = tree.decl(split.member) else {
                    continue;
                };
                edits.replace(decl.type_span, format!("{}[2]", decl.type_text));
                let (value, share) = (cx.names.fresh("value"), cx.names.fresh("share"));
                let salt: u64 = cx.rng.random();
                setters.push_str(&format!(
                    "\n    function {setter}({ty} {value}) internal returns ({ty}) {{\
                     \n        {ty} {share} = {ty}(uint256(keccak256(abi.encodePacked({name}[0], {name}[1], gasleft(), block.timestamp, uint256({salt})))));\
                     \n        {name}[0] = {share};\
                     \n        {name}[1] = {share} ^ {value};\
                     \n        return {value};\
                     \n    }}",
                    setter = split.setter,
                    ty = split.ty,
                    value = value,
                    share = share,
                    name = split.name,
                    salt = salt,
                ));
                tracing::debug!(
                    variable = split.name.as_str(),
                    references = split.accesses.len(),
                    "split scalar"
                );
            }
            if !setters.is_empty() {
                edits.insert(contract.member_insert_offset(), setters);
            }
        }
        Ok(edits)
    }
}

struct Split {
    contract: NodeId,
    member: NodeId,
    name: String,
    ty: String,
    setter: String,
    read: String,
    accesses: Vec<Access>,
}

/// Contracts holding inline assembly, with the first assembly block of each. Assembly can reach
/// any state variable in the contract's linearization.
fn assembly_sites(tree: &SyntaxTree) -> Vec<(NodeId, Span)> {
    tree.contracts()
        .filter(|(_, c)| c.has_assembly)
        .filter_map(|(id, _)| {
            tree.descendants(id)
                .into_iter()
                .find(|&d| matches!(tree.stmt(d), Some(Stmt::Assembly)))
                .map(|d| (id, tree.span(d)))
        })
        .collect()
}

/// True when `name` is reached through a contract qualifier such as `Base.name`, which the
/// rewrite does not follow.
fn qualified_elsewhere(tree: &SyntaxTree, cx: &PassContext, name: &str) -> bool {
    tree.ids().any(|id| match tree.expr(id) {
        Some(Expr::Member {
            object, property, ..
        }) if property == name => matches!(
            cx.symbols.resolve(*object),
            Some(Binding::Contract(_))
        ),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::ObfuscationConfig;

    fn run(source: &str) -> crate::PassOutput {
        ScalarSplit
            .apply(source, &ObfuscationConfig::default().with_seed(6))
            .unwrap()
    }

    #[test]
    fn test_reads_and_writes_rewritten() {
        let source = r#"contract Counter {
    uint256 private count;
    uint64 stamp;
    uint256 public visible;
    function bump(uint256 by) public returns (uint256) {
        count += by;
        stamp = uint64(block.timestamp);
        count++;
        delete stamp;
        return count;
    }
}"#;
        let output = run(source);
        let text = &output.source;
        assert!(text.contains("uint256[2] private count;"));
        assert!(text.contains("uint64[2] stamp;"));
        assert!(text.contains("uint256 public visible;"));
        assert!(text.contains("set_count((count[0] ^ count[1]) + (by));"));
        assert!(text.contains("set_stamp(uint64(block.timestamp));"));
        assert!(text.contains("(set_count((count[0] ^ count[1]) + 1) - 1);"));
        assert!(text.contains("set_stamp(0);"));
        assert!(text.contains("return (count[0] ^ count[1]);"));
        assert!(text.contains("function set_count(uint256 value) internal returns (uint256)"));
        assert!(text.contains("count[1] = share ^ value;"));
        veil_parser::parse(text).unwrap();
    }

    #[test]
    fn test_nested_assignment() {
        let source = r#"contract C {
    uint256 a;
    function f() public {
        a = (a = 3) + a;
    }
}"#;
        let output = run(source);
        assert!(output
            .source
            .contains("set_a((set_a(3)) + (a[0] ^ a[1]));"));
    }

    #[test]
    fn test_tuple_target_skipped() {
        let source = r#"contract C {
    uint256 a;
    uint256 b;
    function f() public {
        (a, b) = (1, 2);
    }
}"#;
        let output = run(source);
        assert!(!output.changed);
        assert_eq!(
            output
                .diagnostics
                .iter()
                .filter(|d| d.message.contains("tuple assignment"))
                .count(),
            2
        );
    }

    #[test]
    fn test_assembly_skips_only_its_contract() {
        let source = r#"contract Raw {
    uint256 a;
    function f() public view returns (uint256 r) {
        assembly { r := sload(0) }
        r += a;
    }
}
contract Clean {
    uint256 b;
    function g(uint256 x) public {
        b = x;
    }
}"#;
        let output = run(source);
        let text = &output.source;
        assert!(text.contains("uint256 a;"));
        assert!(text.contains("r += a;"));
        assert!(text.contains("uint256[2] b;"));
        assert!(text.contains("set_b(x);"));
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.message.contains("inline assembly reaching a")));
        veil_parser::parse(text).unwrap();
    }

    #[test]
    fn test_assembly_in_derived_contract_protects_base() {
        let source = r#"contract Base {
    uint256 internal a;
}
contract Derived is Base {
    function f() public view returns (uint256 r) {
        assembly { r := sload(0) }
        r += a;
    }
}"#;
        let output = run(source);
        assert!(!output.changed);
        assert_eq!(output.diagnostics.iter().filter(|d| d.message.contains("assembly")).count(), 1);
    }

    #[test]
    fn test_reads_nested_in_writes_of_other_variables() {
        let source = r#"contract C {
    uint256 private a;
    uint256 private b;
    function f(uint256 x) public {
        b = x;
        a = b;
        b += a++;
    }
}"#;
        let output = run(source);
        let text = &output.source;
        assert!(text.contains("set_b(x);"));
        assert!(text.contains("set_a((b[0] ^ b[1]));"));
        assert!(text.contains(
            "set_b((b[0] ^ b[1]) + ((set_a((a[0] ^ a[1]) + 1) - 1)));"
        ));
        veil_parser::parse(text).unwrap();
    }

    #[test]
    fn test_else_branch_accesses_rewritten() {
        let source = r#"contract C {
    uint256 private v;
    function f(bool c, uint256 a) public returns (uint256) {
        if (c) {
            v = 1;
        } else {
            v = a;
            a = v;
        }
        return a;
    }
}"#;
        let output = run(source);
        let text = &output.source;
        assert!(text.contains("set_v(1);"));
        assert!(text.contains("set_v(a);"));
        assert!(text.contains("a = (v[0] ^ v[1]);"));
        assert!(!text.contains("v = a;"));
        veil_parser::parse(text).unwrap();
    }
}
