use veil_core::syntax::{ContractKind, Expr, FunctionKind, Mutability, Stmt, Visibility};
use veil_core::{ElementaryType, SymbolTable};
use veil_parser::{parse, validate};

const STORAGE: &str = r#"
// SPDX-License-Identifier: MIT
pragma solidity ^0.8.0;

contract Storage {
    uint256 private storedValue;
    address public owner;

    modifier onlyOwner() {
        require(msg.sender == owner, "not owner");
        _;
    }

    function compute(uint256 a, uint256 b) internal pure returns (uint256) {
        uint256 sum = a + b;
        return sum * 2;
    }

    function store(uint256 v) public onlyOwner {
        for (uint256 i = 0; i < 3; i++) {
            storedValue += compute(v, i);
        }
    }

    function getStoredValue() public view returns (uint256) {
        return storedValue;
    }
}
"#;

#[test]
fn test_contract_shape() {
    let tree = parse(STORAGE).unwrap();
    let (id, contract) = tree.contract_named("Storage").unwrap();
    assert_eq!(contract.kind, ContractKind::Contract);
    assert_eq!(tree.span_text(contract.name_span), "Storage");
    assert_eq!(contract.members.len(), 6);
    assert!(!contract.has_assembly);
    assert_eq!(tree.pragmas().len(), 1);
    assert_eq!(tree.comments().len(), 1);
    assert!(tree.enclosing_contract(contract.members[0]) == Some(id));
}

#[test]
fn test_function_signature() {
    let tree = parse(STORAGE).unwrap();
    let compute = tree
        .functions()
        .into_iter()
        .find(|&f| tree.function(f).unwrap().name.as_deref() == Some("compute"))
        .unwrap();
    let function = tree.function(compute).unwrap();
    assert_eq!(function.kind, FunctionKind::Function);
    assert_eq!(function.visibility, Some(Visibility::Internal));
    assert_eq!(function.mutability, Mutability::Pure);
    assert_eq!(function.params.len(), 2);
    assert_eq!(function.returns.len(), 1);
    let a = tree.decl(function.params[0]).unwrap();
    assert_eq!(a.name.as_deref(), Some("a"));
    assert_eq!(a.elementary(), Some(ElementaryType::Uint(256)));

    let body = tree.block_items(function.body.unwrap());
    assert_eq!(body.len(), 2);
    assert!(matches!(tree.stmt(body[0]), Some(Stmt::VarDecl { tuple: false, .. })));
    assert!(matches!(tree.stmt(body[1]), Some(Stmt::Return(Some(_)))));
}

#[test]
fn test_modifier_placeholder_and_invocation() {
    let tree = parse(STORAGE).unwrap();
    let modifier = tree.ids().find(|&id| tree.modifier(id).is_some()).unwrap();
    let body = tree.modifier(modifier).unwrap().body.unwrap();
    let items = tree.block_items(body);
    assert!(matches!(tree.stmt(items[1]), Some(Stmt::Placeholder)));

    let store = tree
        .functions()
        .into_iter()
        .find(|&f| tree.function(f).unwrap().name.as_deref() == Some("store"))
        .unwrap();
    let invocation = &tree.function(store).unwrap().modifiers[0];
    assert_eq!(invocation.name, "onlyOwner");
    assert!(invocation.args.is_empty());
}

#[test]
fn test_for_header_and_compound_assignment() {
    let tree = parse(STORAGE).unwrap();
    let for_stmt = tree
        .ids()
        .find(|&id| matches!(tree.stmt(id), Some(Stmt::For { .. })))
        .unwrap();
    let Some(Stmt::For {
        init,
        cond,
        update,
        body,
    }) = tree.stmt(for_stmt)
    else {
        unreachable!()
    };
    assert_eq!(tree.text(init.unwrap()), "uint256 i = 0;");
    assert_eq!(tree.text(cond.unwrap()), "i < 3");
    assert_eq!(tree.text(update.unwrap()), "i++");

    let inner = tree.block_items(*body)[0];
    let Some(Stmt::Expr(assign)) = tree.stmt(inner) else {
        panic!("expected expression statement");
    };
    assert!(matches!(tree.expr(*assign), Some(Expr::Assign { op, .. }) if op == "+="));
}

#[test]
fn test_identifiers_resolve_through_scopes() {
    let tree = parse(STORAGE).unwrap();
    let symbols = SymbolTable::build(&tree);
    let reads: Vec<_> = tree
        .ids()
        .filter(|&id| matches!(tree.expr(id), Some(Expr::Ident(name)) if name == "storedValue"))
        .collect();
    assert_eq!(reads.len(), 2);
    let decls: Vec<_> = reads.iter().map(|&r| symbols.variable(r)).collect();
    assert!(decls[0].is_some());
    assert_eq!(decls[0], decls[1]);

    let loop_var = tree
        .ids()
        .find(|&id| matches!(tree.expr(id), Some(Expr::Ident(name)) if name == "i"))
        .unwrap();
    let decl = symbols.variable(loop_var).unwrap();
    assert_eq!(tree.decl(decl).unwrap().name.as_deref(), Some("i"));
}

#[test]
fn test_tuple_declaration_gaps() {
    let source = r#"
        contract T {
            function pair() internal pure returns (uint256, bool, uint256) {
                return (1, true, 2);
            }
            function f() public pure returns (uint256) {
                (uint256 a, , uint256 b) = pair();
                return a + b;
            }
        }
    "#;
    let tree = parse(source).unwrap();
    let decl = tree
        .ids()
        .find(|&id| matches!(tree.stmt(id), Some(Stmt::VarDecl { tuple: true, .. })))
        .unwrap();
    let Some(Stmt::VarDecl { decls, .. }) = tree.stmt(decl) else {
        unreachable!()
    };
    assert_eq!(decls.len(), 3);
    assert!(decls[0].is_some() && decls[1].is_none() && decls[2].is_some());
}

#[test]
fn test_kinds_of_units() {
    let source = r#"
        interface IToken { function totalSupply() external view returns (uint256); }
        library Math { function max(uint256 a, uint256 b) internal pure returns (uint256) { return a > b ? a : b; } }
        abstract contract Base { function hook() internal virtual; }
        contract Impl is Base {
            receive() external payable {}
            function hook() internal override {}
        }
    "#;
    let tree = parse(source).unwrap();
    let kinds: Vec<_> = tree.contracts().map(|(_, c)| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ContractKind::Interface,
            ContractKind::Library,
            ContractKind::Abstract,
            ContractKind::Contract
        ]
    );
    let (_, implementation) = tree.contract_named("Impl").unwrap();
    assert_eq!(implementation.bases, vec!["Base".to_string()]);
    let receive = tree.function(implementation.members[0]).unwrap();
    assert_eq!(receive.kind, FunctionKind::Receive);
    assert!(tree.function(implementation.members[1]).unwrap().is_override);
}

#[test]
fn test_syntax_error_location() {
    let source = "contract C {\n    function f() public {\n        uint x = ;\n    }\n}\n";
    let error = parse(source).unwrap_err();
    assert_eq!(error.line, 3);
    assert!(validate(source).is_err());
    assert!(validate("contract Ok {}").is_ok());
}

#[test]
fn test_if_else_branches() {
    let source = r#"
        contract Branches {
            function f(bool c, uint256 x) public pure returns (uint256 a) {
                if (c) {
                    a = 1;
                } else {
                    a = 2;
                    a += x;
                }
                if (x > 3) a = 4;
                else if (x > 2) a = 5;
                else a = 6;
            }
        }
    "#;
    let tree = parse(source).unwrap();
    let mut ifs: Vec<_> = tree
        .ids()
        .filter(|&id| matches!(tree.stmt(id), Some(Stmt::If { .. })))
        .collect();
    ifs.sort_by_key(|&id| tree.node(id).span.offset);
    assert_eq!(ifs.len(), 3);

    let Some(Stmt::If { then, otherwise, .. }) = tree.stmt(ifs[0]) else {
        unreachable!()
    };
    assert_eq!(tree.block_items(*then).len(), 1);
    let otherwise = otherwise.unwrap();
    assert!(matches!(tree.stmt(otherwise), Some(Stmt::Block(_))));
    let items = tree.block_items(otherwise);
    assert_eq!(items.len(), 2);
    assert_eq!(tree.text(items[0]), "a = 2;");
    assert_eq!(tree.text(items[1]), "a += x;");

    let Some(Stmt::If { otherwise, .. }) = tree.stmt(ifs[1]) else {
        unreachable!()
    };
    let chained = otherwise.unwrap();
    assert!(matches!(tree.stmt(chained), Some(Stmt::If { otherwise: Some(_), .. })));
    let Some(Stmt::If { otherwise, .. }) = tree.stmt(chained) else {
        unreachable!()
    };
    assert_eq!(tree.text(otherwise.unwrap()), "a = 6;");

    assert!(!tree
        .ids()
        .any(|id| matches!(tree.stmt(id), Some(Stmt::Other(_)))));
}

#[test]
fn test_stray_else_rejected() {
    let source = "contract C {\n    function f(uint256 s) public {\n        if (s == 1) { else s = 0; }\n    }\n}\n";
    let error = validate(source).unwrap_err();
    assert_eq!(error.line, 3);
    assert!(error.message.contains("else"));
    assert!(validate("contract C { function f(uint256 s) public { if (s == 1) { s = 2; } else { s = 0; } } }").is_ok());
}
