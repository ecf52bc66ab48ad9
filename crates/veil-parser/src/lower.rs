/*! Lowering from the tree-sitter CST into [`SyntaxTree`].
 *
 * The grammar wraps most expressions and statements in single-child `expression` / `statement`
 * nodes and has shifted field names between releases, so every accessor here unwraps those
 * wrappers first and falls back to positional children when a field is absent.
 */

use tree_sitter::Node as TsNode;
use veil_core::syntax::{
    Contract, ContractKind, DataLocation, Decl, Expr, Function, FunctionKind, Literal,
    LiteralKind, Modifier, ModifierInvocation, Mutability, Node, NodeId, NodeKind, StorageClass,
    Stmt, SyntaxTree, Visibility,
};
use veil_core::Span;

pub(crate) fn span_of(node: TsNode) -> Span {
    Span::from_range(node.start_byte(), node.end_byte())
}

fn named_children<'t>(node: TsNode<'t>) -> Vec<TsNode<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

fn all_children<'t>(node: TsNode<'t>) -> Vec<TsNode<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

/// Strips the grammar's transparent single-child wrappers.
fn unwrap(mut node: TsNode) -> TsNode {
    while matches!(node.kind(), "expression" | "statement" | "_expression" | "call_argument") {
        match named_children(node).as_slice() {
            [only] => node = *only,
            _ => break,
        }
    }
    node
}

fn visibility_of(text: &str) -> Option<Visibility> {
    match text.trim() {
        "public" => Some(Visibility::Public),
        "external" => Some(Visibility::External),
        "internal" => Some(Visibility::Internal),
        "private" => Some(Visibility::Private),
        _ => None,
    }
}

fn location_of(text: &str) -> Option<DataLocation> {
    match text.trim() {
        "memory" => Some(DataLocation::Memory),
        "storage" => Some(DataLocation::Storage),
        "calldata" => Some(DataLocation::Calldata),
        _ => None,
    }
}

pub(crate) struct Lowerer<'s> {
    source: &'s str,
    nodes: Vec<Node>,
    units: Vec<NodeId>,
    comments: Vec<Span>,
    pragmas: Vec<Span>,
    saw_assembly: bool,
}

impl<'s> Lowerer<'s> {
    pub(crate) fn new(source: &'s str) -> Self {
        Self {
            source,
            nodes: Vec::new(),
            units: Vec::new(),
            comments: Vec::new(),
            pragmas: Vec::new(),
            saw_assembly: false,
        }
    }

    pub(crate) fn finish(self) -> SyntaxTree {
        SyntaxTree::new(
            self.source.to_string(),
            self.nodes,
            self.units,
            self.comments,
            self.pragmas,
        )
    }

    fn text(&self, node: TsNode) -> &'s str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn push(&mut self, span: Span, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            span,
            parent: None,
            kind,
        });
        id
    }

    fn push_expr(&mut self, node: TsNode, expr: Expr) -> NodeId {
        self.push(span_of(node), NodeKind::Expression(expr))
    }

    fn push_stmt(&mut self, node: TsNode, stmt: Stmt) -> NodeId {
        self.push(span_of(node), NodeKind::Statement(stmt))
    }

    pub(crate) fn lower_source(&mut self, root: TsNode) {
        self.collect_comments(root);
        for child in named_children(root) {
            match child.kind() {
                "pragma_directive" => self.pragmas.push(span_of(child)),
                "contract_declaration" | "interface_declaration" | "library_declaration" => {
                    let id = self.lower_contract(child);
                    self.units.push(id);
                }
                "function_definition" => {
                    let id = self.lower_function(child, FunctionKind::Function);
                    self.units.push(id);
                }
                "constant_variable_declaration" => {
                    let id = self.lower_state_variable(child);
                    self.units.push(id);
                }
                _ => {}
            }
        }
    }

    fn collect_comments(&mut self, root: TsNode) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "comment" {
                self.comments.push(span_of(node));
                continue;
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
        self.comments.sort();
    }

    fn lower_contract(&mut self, node: TsNode) -> NodeId {
        let kind = match node.kind() {
            "interface_declaration" => ContractKind::Interface,
            "library_declaration" => ContractKind::Library,
            _ if self.text(node).trim_start().starts_with("abstract") => ContractKind::Abstract,
            _ => ContractKind::Contract,
        };
        let name_node = node.child_by_field_name("name");
        let name = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
        let name_span = name_node.map(span_of).unwrap_or_default();

        let bases = named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "inheritance_specifier")
            .map(|spec| {
                let ancestor = spec
                    .child_by_field_name("ancestor")
                    .or_else(|| named_children(spec).first().copied())
                    .unwrap_or(spec);
                self.text(ancestor).trim().to_string()
            })
            .collect();

        let body = node
            .child_by_field_name("body")
            .or_else(|| named_children(node).into_iter().find(|c| c.kind() == "contract_body"));
        let body_span = body.map(span_of).unwrap_or_else(|| span_of(node));

        self.saw_assembly = false;
        let mut members = Vec::new();
        if let Some(body) = body {
            for member in named_children(body) {
                let id = match member.kind() {
                    "function_definition" => self.lower_function(member, FunctionKind::Function),
                    "constructor_definition" => {
                        self.lower_function(member, FunctionKind::Constructor)
                    }
                    "fallback_receive_definition" => {
                        let kind = if all_children(member)
                            .iter()
                            .any(|c| self.text(*c) == "receive")
                        {
                            FunctionKind::Receive
                        } else {
                            FunctionKind::Fallback
                        };
                        self.lower_function(member, kind)
                    }
                    "modifier_definition" => self.lower_modifier(member),
                    "state_variable_declaration" => self.lower_state_variable(member),
                    _ => continue,
                };
                members.push(id);
            }
        }
        let has_assembly = self.saw_assembly;

        self.push(
            span_of(node),
            NodeKind::Contract(Contract {
                name,
                name_span,
                kind,
                bases,
                body_span,
                members,
                has_assembly,
            }),
        )
    }

    /// `parameter` nodes directly under `node`, or under a parameter list wrapper.
    fn parameters_of<'t>(&self, node: TsNode<'t>) -> Vec<TsNode<'t>> {
        let mut out = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "parameter" => out.push(child),
                "parameter_list" | "parameters" => out.extend(
                    named_children(child)
                        .into_iter()
                        .filter(|c| c.kind() == "parameter"),
                ),
                _ => {}
            }
        }
        out
    }

    fn lower_function(&mut self, node: TsNode, kind: FunctionKind) -> NodeId {
        let (name, name_span) = match (kind, node.child_by_field_name("name")) {
            (FunctionKind::Function, Some(n)) => {
                (Some(self.text(n).to_string()), Some(span_of(n)))
            }
            _ => (None, None),
        };

        let params = self
            .parameters_of(node)
            .into_iter()
            .map(|p| self.lower_parameter(p, StorageClass::Parameter))
            .collect();

        let mut function = Function {
            kind,
            name,
            name_span,
            params,
            returns: Vec::new(),
            visibility: None,
            mutability: Mutability::NonPayable,
            mutability_span: None,
            modifiers: Vec::new(),
            is_virtual: false,
            is_override: false,
            body: None,
        };

        for child in all_children(node) {
            match child.kind() {
                "modifier_invocation" => {
                    let invocation = self.lower_modifier_invocation(child);
                    function.modifiers.push(invocation);
                }
                "visibility" | "public" | "external" | "internal" | "private" => {
                    function.visibility = visibility_of(self.text(child));
                }
                "state_mutability" | "pure" | "view" | "payable" => {
                    function.mutability = match self.text(child).trim() {
                        "pure" => Mutability::Pure,
                        "view" => Mutability::View,
                        "payable" => Mutability::Payable,
                        _ => Mutability::NonPayable,
                    };
                    function.mutability_span = Some(span_of(child));
                }
                "virtual" => function.is_virtual = true,
                "override_specifier" | "override" => function.is_override = true,
                "return_type_definition" => {
                    function.returns = self
                        .parameters_of(child)
                        .into_iter()
                        .map(|p| self.lower_parameter(p, StorageClass::Return))
                        .collect();
                }
                "function_body" | "block_statement" => {
                    function.body = Some(self.lower_statement(child));
                }
                _ => {}
            }
        }

        self.push(span_of(node), NodeKind::Function(function))
    }

    fn lower_modifier(&mut self, node: TsNode) -> NodeId {
        let name_node = node.child_by_field_name("name");
        let name = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
        let name_span = name_node.map(span_of).unwrap_or_default();
        let params = self
            .parameters_of(node)
            .into_iter()
            .map(|p| self.lower_parameter(p, StorageClass::Parameter))
            .collect();
        let body = node
            .child_by_field_name("body")
            .or_else(|| named_children(node).into_iter().find(|c| c.kind() == "function_body"))
            .map(|b| self.lower_statement(b));
        self.push(
            span_of(node),
            NodeKind::Modifier(Modifier {
                name,
                name_span,
                params,
                body,
            }),
        )
    }

    fn lower_modifier_invocation(&mut self, node: TsNode) -> ModifierInvocation {
        let path: Vec<TsNode> = named_children(node)
            .into_iter()
            .take_while(|c| c.kind() == "identifier" || c.kind() == "user_defined_type")
            .collect();
        let name_span = match (path.first(), path.last()) {
            (Some(first), Some(last)) => Span::from_range(first.start_byte(), last.end_byte()),
            _ => span_of(node),
        };
        let name = name_span.slice(self.source).to_string();
        let args = self.call_arguments(node);
        ModifierInvocation {
            name,
            name_span,
            span: span_of(node),
            args,
        }
    }

    fn lower_parameter(&mut self, node: TsNode, class: StorageClass) -> NodeId {
        let decl = self.declaration(node, class);
        self.push(span_of(node), NodeKind::Declaration(decl))
    }

    /// Shared shape of parameters and local declarations: `type [location] [name]`.
    fn declaration(&self, node: TsNode, class: StorageClass) -> Decl {
        let children = named_children(node);
        let type_node = node
            .child_by_field_name("type")
            .or_else(|| children.first().copied())
            .unwrap_or(node);
        let name_node = node.child_by_field_name("name").or_else(|| {
            children
                .iter()
                .rev()
                .find(|c| c.kind() == "identifier" && c.id() != type_node.id())
                .copied()
        });
        let location = all_children(node)
            .into_iter()
            .find_map(|c| location_of(self.text(c)));
        Decl {
            name: name_node.map(|n| self.text(n).to_string()),
            name_span: name_node.map(span_of),
            type_text: self.text(type_node).to_string(),
            type_span: span_of(type_node),
            class,
            location,
            visibility: None,
            constant: false,
            immutable: false,
            value: None,
        }
    }

    fn lower_state_variable(&mut self, node: TsNode) -> NodeId {
        let mut decl = self.declaration(node, StorageClass::State);
        decl.location = None;
        for child in all_children(node) {
            match child.kind() {
                "visibility" | "public" | "external" | "internal" | "private" => {
                    decl.visibility = visibility_of(self.text(child));
                }
                _ => match self.text(child) {
                    "constant" => decl.constant = true,
                    "immutable" => decl.immutable = true,
                    _ => {}
                },
            }
        }
        if node.kind() == "constant_variable_declaration" {
            decl.constant = true;
        }
        decl.value = node
            .child_by_field_name("value")
            .map(|v| self.lower_expression(v));
        self.push(span_of(node), NodeKind::Declaration(decl))
    }

    fn call_arguments(&mut self, node: TsNode) -> Vec<NodeId> {
        let mut args = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "call_argument" => args.push(self.lower_call_argument(child)),
                "call_arguments" | "revert_arguments" | "_call_arguments" => {
                    for arg in named_children(child) {
                        if arg.kind() == "call_argument" {
                            args.push(self.lower_call_argument(arg));
                        }
                    }
                }
                _ => {}
            }
        }
        args
    }

    fn lower_call_argument(&mut self, node: TsNode) -> NodeId {
        let children = named_children(node);
        match children.as_slice() {
            [only] => self.lower_expression(*only),
            // `{name: value, ...}` named arguments
            _ => {
                let values = self.struct_values(node);
                self.push_expr(node, Expr::Other(values))
            }
        }
    }

    /// Values of `name: value` pairs, leaving the field names alone.
    fn struct_values(&mut self, node: TsNode) -> Vec<NodeId> {
        let mut values = Vec::new();
        for child in named_children(node) {
            if let Some(value) = child.child_by_field_name("value") {
                values.push(self.lower_expression(value));
            } else if child.kind() != "identifier" {
                values.extend(self.struct_values(child));
            }
        }
        values
    }

    fn lower_block(&mut self, node: TsNode) -> Vec<NodeId> {
        named_children(node)
            .into_iter()
            .map(|s| self.lower_statement(s))
            .collect()
    }

    fn lower_statement(&mut self, node: TsNode) -> NodeId {
        let node = unwrap(node);
        let stmt = match node.kind() {
            "block_statement" | "function_body" | "block" => {
                let items = self.lower_block(node);
                let unchecked = all_children(node)
                    .first()
                    .is_some_and(|c| self.text(*c) == "unchecked");
                if unchecked {
                    Stmt::Unchecked(items)
                } else {
                    Stmt::Block(items)
                }
            }
            "expression_statement" => match named_children(node).first() {
                Some(inner) if self.text(unwrap(*inner)) == "_" => Stmt::Placeholder,
                Some(inner) => Stmt::Expr(self.lower_expression(*inner)),
                None => Stmt::Other(Vec::new()),
            },
            "variable_declaration_statement" => self.lower_variable_statement(node),
            "if_statement" => {
                let children = named_children(node);
                let cond = node
                    .child_by_field_name("condition")
                    .or_else(|| children.first().copied());
                // Both branches sit under `body`; the `else` field is only the keyword.
                let bodies: Vec<TsNode> = {
                    let mut cursor = node.walk();
                    node.children_by_field_name("body", &mut cursor).collect()
                };
                let then = bodies
                    .first()
                    .copied()
                    .or_else(|| node.child_by_field_name("consequence"))
                    .or_else(|| children.get(1).copied());
                let otherwise = match bodies.as_slice() {
                    [_, otherwise, ..] => Some(*otherwise),
                    [_] => None,
                    [] => node
                        .child_by_field_name("alternative")
                        .filter(|n| n.is_named())
                        .or_else(|| children.get(2).copied()),
                };
                match (cond, then) {
                    (Some(cond), Some(then)) => Stmt::If {
                        cond: self.lower_expression(cond),
                        then: self.lower_statement(then),
                        otherwise: otherwise.map(|o| self.lower_statement(o)),
                    },
                    _ => Stmt::Other(Vec::new()),
                }
            }
            "while_statement" => {
                let children = named_children(node);
                let cond = node
                    .child_by_field_name("condition")
                    .or_else(|| children.first().copied());
                let body = node
                    .child_by_field_name("body")
                    .or_else(|| children.get(1).copied());
                match (cond, body) {
                    (Some(cond), Some(body)) => Stmt::While {
                        cond: self.lower_expression(cond),
                        body: self.lower_statement(body),
                    },
                    _ => Stmt::Other(Vec::new()),
                }
            }
            "do_while_statement" => {
                let children = named_children(node);
                let body = node
                    .child_by_field_name("body")
                    .or_else(|| children.first().copied());
                let cond = node
                    .child_by_field_name("condition")
                    .or_else(|| children.get(1).copied());
                match (body, cond) {
                    (Some(body), Some(cond)) => Stmt::DoWhile {
                        body: self.lower_statement(body),
                        cond: self.lower_expression(cond),
                    },
                    _ => Stmt::Other(Vec::new()),
                }
            }
            "for_statement" => self.lower_for(node),
            "return_statement" => {
                let value = named_children(node)
                    .first()
                    .map(|v| self.lower_expression(*v));
                Stmt::Return(value)
            }
            "emit_statement" => {
                let event_node = node
                    .child_by_field_name("name")
                    .or_else(|| named_children(node).first().copied());
                match event_node {
                    Some(event_node) => {
                        let event = self.lower_expression(event_node);
                        let args = self.call_arguments(node);
                        Stmt::Emit { event, args }
                    }
                    None => Stmt::Other(Vec::new()),
                }
            }
            "revert_statement" => {
                let error = node
                    .child_by_field_name("error")
                    .map(|e| self.lower_expression(e));
                let args = self.call_arguments(node);
                Stmt::Revert { error, args }
            }
            "break_statement" => Stmt::Break,
            "continue_statement" => Stmt::Continue,
            "assembly_statement" => {
                self.saw_assembly = true;
                Stmt::Assembly
            }
            "try_statement" => {
                let mut items = Vec::new();
                for child in named_children(node) {
                    match child.kind() {
                        "block_statement" => items.push(self.lower_statement(child)),
                        "catch_clause" => {
                            if let Some(body) = child.child_by_field_name("body").or_else(|| {
                                named_children(child)
                                    .into_iter()
                                    .find(|c| c.kind() == "block_statement")
                            }) {
                                items.push(self.lower_statement(body));
                            }
                        }
                        "return_type_definition" | "parameter" => {}
                        _ if items.is_empty() => {
                            let attempt = self.lower_expression(child);
                            items.push(self.push_stmt(child, Stmt::Expr(attempt)));
                        }
                        _ => {}
                    }
                }
                Stmt::Try(items)
            }
            _ => Stmt::Other(Vec::new()),
        };
        self.push_stmt(node, stmt)
    }

    fn lower_local(&mut self, node: TsNode) -> NodeId {
        let decl = self.declaration(node, StorageClass::Local);
        self.push(span_of(node), NodeKind::Declaration(decl))
    }

    fn lower_variable_statement(&mut self, node: TsNode) -> Stmt {
        let mut decls = Vec::new();
        let mut tuple = false;
        for child in named_children(node) {
            match child.kind() {
                "variable_declaration" => decls.push(Some(self.lower_local(child))),
                "variable_declaration_tuple" => {
                    tuple = true;
                    let mut slots: Vec<Option<NodeId>> = vec![None];
                    for part in all_children(child) {
                        match part.kind() {
                            "," => slots.push(None),
                            "variable_declaration" => {
                                let id = self.lower_local(part);
                                if let Some(slot) = slots.last_mut() {
                                    *slot = Some(id);
                                }
                            }
                            _ => {}
                        }
                    }
                    decls = slots;
                }
                _ => {}
            }
        }
        let value = node
            .child_by_field_name("value")
            .map(|v| self.lower_expression(v));
        Stmt::VarDecl {
            decls,
            value,
            tuple,
        }
    }

    fn lower_for(&mut self, node: TsNode) -> Stmt {
        let init = node
            .child_by_field_name("initial")
            .filter(|n| n.is_named())
            .map(|n| self.lower_statement(n));
        let cond = node
            .child_by_field_name("condition")
            .filter(|n| n.is_named())
            .and_then(|n| {
                let n = unwrap(n);
                if n.kind() == "expression_statement" {
                    named_children(n).first().copied()
                } else {
                    Some(n)
                }
            })
            .map(|n| self.lower_expression(n));
        let update = node
            .child_by_field_name("update")
            .map(|n| self.lower_expression(n));
        match node.child_by_field_name("body") {
            Some(body) => Stmt::For {
                init,
                cond,
                update,
                body: self.lower_statement(body),
            },
            None => Stmt::Other(Vec::new()),
        }
    }

    fn lower_expression(&mut self, node: TsNode) -> NodeId {
        let node = unwrap(node);
        let expr = match node.kind() {
            "identifier" => Expr::Ident(self.text(node).to_string()),
            "number_literal" => Expr::Literal(Literal {
                kind: LiteralKind::Number,
                has_unit: named_children(node)
                    .iter()
                    .any(|c| c.kind() == "number_unit")
                    || self.text(node).contains(char::is_whitespace),
            }),
            "boolean_literal" => Expr::Literal(Literal {
                kind: LiteralKind::Bool,
                has_unit: false,
            }),
            "string_literal" | "unicode_string_literal" => Expr::Literal(Literal {
                kind: LiteralKind::String,
                has_unit: false,
            }),
            "hex_string_literal" => Expr::Literal(Literal {
                kind: LiteralKind::HexString,
                has_unit: false,
            }),
            "primitive_type" => Expr::TypeName(self.text(node).to_string()),
            "binary_expression" => {
                let children = all_children(node);
                let left = node.child_by_field_name("left").or_else(|| children.first().copied());
                let op = node.child_by_field_name("operator").or_else(|| children.get(1).copied());
                let right = node.child_by_field_name("right").or_else(|| children.last().copied());
                match (left, op, right) {
                    (Some(left), Some(op), Some(right)) => Expr::Binary {
                        op: self.text(op).to_string(),
                        left: self.lower_expression(left),
                        right: self.lower_expression(right),
                    },
                    _ => self.opaque(node),
                }
            }
            "unary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .or_else(|| all_children(node).first().copied());
                let operand = node
                    .child_by_field_name("argument")
                    .or_else(|| named_children(node).last().copied());
                match (op, operand) {
                    (Some(op), Some(operand)) => Expr::Unary {
                        op: self.text(op).to_string(),
                        operand: self.lower_expression(operand),
                    },
                    _ => self.opaque(node),
                }
            }
            "update_expression" => {
                let children = all_children(node);
                let operand = node
                    .child_by_field_name("argument")
                    .or_else(|| named_children(node).first().copied());
                let op = node.child_by_field_name("operator").or_else(|| {
                    children
                        .iter()
                        .find(|c| matches!(self.text(**c), "++" | "--"))
                        .copied()
                });
                match (op, operand) {
                    (Some(op), Some(operand)) => Expr::Update {
                        op: self.text(op).to_string(),
                        prefix: op.start_byte() < operand.start_byte(),
                        operand: self.lower_expression(operand),
                    },
                    _ => self.opaque(node),
                }
            }
            "assignment_expression" | "augmented_assignment_expression" => {
                let children = all_children(node);
                let left = node.child_by_field_name("left").or_else(|| children.first().copied());
                let right = node.child_by_field_name("right").or_else(|| children.last().copied());
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .or_else(|| children.get(1).map(|o| self.text(*o).to_string()))
                    .unwrap_or_else(|| "=".to_string());
                match (left, right) {
                    (Some(left), Some(right)) => Expr::Assign {
                        op,
                        target: self.lower_expression(left),
                        value: self.lower_expression(right),
                    },
                    _ => self.opaque(node),
                }
            }
            "ternary_expression" => {
                let children = named_children(node);
                let cond = node.child_by_field_name("condition").or_else(|| children.first().copied());
                let then = node.child_by_field_name("consequence").or_else(|| children.get(1).copied());
                let otherwise = node.child_by_field_name("alternative").or_else(|| children.get(2).copied());
                match (cond, then, otherwise) {
                    (Some(cond), Some(then), Some(otherwise)) => Expr::Ternary {
                        cond: self.lower_expression(cond),
                        then: self.lower_expression(then),
                        otherwise: self.lower_expression(otherwise),
                    },
                    _ => self.opaque(node),
                }
            }
            "call_expression" => {
                let callee = node
                    .child_by_field_name("function")
                    .or_else(|| named_children(node).first().copied());
                match callee {
                    Some(callee) => Expr::Call {
                        callee: self.lower_expression(callee),
                        args: self.call_arguments(node),
                    },
                    None => self.opaque(node),
                }
            }
            "type_cast_expression" | "payable_conversion_expression" => {
                let children = named_children(node);
                let callee = match children.first() {
                    Some(ty) if ty.kind() == "primitive_type" => {
                        self.push_expr(*ty, Expr::TypeName(self.text(*ty).to_string()))
                    }
                    _ => {
                        let keyword = Span::new(node.start_byte(), "payable".len());
                        self.push(keyword, NodeKind::Expression(Expr::TypeName("payable".to_string())))
                    }
                };
                let args = children
                    .into_iter()
                    .filter(|c| c.kind() != "primitive_type")
                    .map(|c| {
                        if c.kind() == "call_argument" {
                            self.lower_call_argument(c)
                        } else {
                            self.lower_expression(c)
                        }
                    })
                    .collect();
                Expr::Call { callee, args }
            }
            "member_expression" => {
                let object = node
                    .child_by_field_name("object")
                    .or_else(|| named_children(node).first().copied());
                let property = node
                    .child_by_field_name("property")
                    .or_else(|| named_children(node).last().copied());
                match (object, property) {
                    (Some(object), Some(property)) => Expr::Member {
                        object: self.lower_expression(object),
                        property: self.text(property).to_string(),
                        property_span: span_of(property),
                    },
                    _ => self.opaque(node),
                }
            }
            "array_access" => {
                let base = node
                    .child_by_field_name("base")
                    .or_else(|| named_children(node).first().copied());
                match base {
                    Some(base) => Expr::Index {
                        base: self.lower_expression(base),
                        index: node
                            .child_by_field_name("index")
                            .map(|i| self.lower_expression(i)),
                    },
                    None => self.opaque(node),
                }
            }
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => Expr::Paren(self.lower_expression(*inner)),
                None => self.opaque(node),
            },
            "tuple_expression" => {
                let mut slots: Vec<Option<NodeId>> = vec![None];
                for part in all_children(node) {
                    match part.kind() {
                        "," => slots.push(None),
                        "(" | ")" => {}
                        _ if part.is_named() => {
                            let id = self.lower_expression(part);
                            if let Some(slot) = slots.last_mut() {
                                *slot = Some(id);
                            }
                        }
                        _ => {}
                    }
                }
                match slots.as_slice() {
                    [Some(only)] => Expr::Paren(*only),
                    [None] => Expr::Tuple(Vec::new()),
                    _ => Expr::Tuple(slots),
                }
            }
            "inline_array_expression" => Expr::ArrayLiteral(
                named_children(node)
                    .into_iter()
                    .map(|c| self.lower_expression(c))
                    .collect(),
            ),
            "new_expression" => {
                let ty = node
                    .child_by_field_name("name")
                    .or_else(|| named_children(node).first().copied())
                    .map(|t| self.text(t).to_string())
                    .unwrap_or_default();
                Expr::New(ty)
            }
            "user_defined_type" if !self.text(node).contains('.') => {
                Expr::Ident(self.text(node).trim().to_string())
            }
            "struct_expression" => {
                let mut items = Vec::new();
                if let Some(ty) = node.child_by_field_name("type") {
                    items.push(self.lower_expression(ty));
                }
                items.extend(self.struct_values(node));
                Expr::Other(items)
            }
            "meta_type_expression" => Expr::Other(Vec::new()),
            _ => self.opaque(node),
        };
        self.push_expr(node, expr)
    }

    /// An expression the model does not break down. Its expression children are still lowered so
    /// identifier references inside it stay visible.
    fn opaque(&mut self, node: TsNode) -> Expr {
        let items = named_children(node)
            .into_iter()
            .filter(|c| !matches!(c.kind(), "primitive_type" | "type_name" | "user_defined_type"))
            .map(|c| self.lower_expression(c))
            .collect();
        Expr::Other(items)
    }
}
