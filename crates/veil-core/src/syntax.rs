/*! Span-addressed syntax model.
 *
 * A typed arena over the parts of a Solidity source unit the passes reason about: contracts,
 * modifiers, functions, declarations, statements and expressions. Every node keeps the byte span it
 * was lowered from and a back-reference to its parent, so a pass can walk outward from any site and
 * still address the exact text it wants to replace. Constructs no pass models are kept as `Other`
 * nodes holding whatever expressions they contain.
 */

use crate::span::{LineIndex, Span};
use num_bigint::BigUint;
use num_traits::{Num, One, Zero};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub span: Span,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Contract(Contract),
    Modifier(Modifier),
    Function(Function),
    Statement(Stmt),
    Expression(Expr),
    Declaration(Decl),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Contract,
    Abstract,
    Interface,
    Library,
}

#[derive(Debug, Clone)]
pub struct Contract {
    pub name: String,
    pub name_span: Span,
    pub kind: ContractKind,
    pub bases: Vec<String>,
    /// Span of the `{ ... }` body, braces included.
    pub body_span: Span,
    pub members: Vec<NodeId>,
    pub has_assembly: bool,
}

impl Contract {
    /// Offset just after the opening brace, where generated members go.
    pub fn member_insert_offset(&self) -> usize {
        self.body_span.offset + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::External => "external",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Pure,
    View,
    Payable,
    NonPayable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Constructor,
    Fallback,
    Receive,
}

#[derive(Debug, Clone)]
pub struct ModifierInvocation {
    pub name: String,
    pub name_span: Span,
    pub span: Span,
    pub args: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub kind: FunctionKind,
    pub name: Option<String>,
    pub name_span: Option<Span>,
    pub params: Vec<NodeId>,
    pub returns: Vec<NodeId>,
    pub visibility: Option<Visibility>,
    pub mutability: Mutability,
    pub mutability_span: Option<Span>,
    pub modifiers: Vec<ModifierInvocation>,
    pub is_virtual: bool,
    pub is_override: bool,
    pub body: Option<NodeId>,
}

impl Function {
    pub fn is_externally_visible(&self) -> bool {
        matches!(
            self.visibility,
            Some(Visibility::Public) | Some(Visibility::External)
        ) || self.kind != FunctionKind::Function
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.mutability, Mutability::Pure | Mutability::View)
    }
}

#[derive(Debug, Clone)]
pub struct Modifier {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<NodeId>,
    pub body: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    State,
    Local,
    Parameter,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLocation {
    Memory,
    Storage,
    Calldata,
}

impl DataLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            DataLocation::Memory => "memory",
            DataLocation::Storage => "storage",
            DataLocation::Calldata => "calldata",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: Option<String>,
    pub name_span: Option<Span>,
    pub type_text: String,
    pub type_span: Span,
    pub class: StorageClass,
    pub location: Option<DataLocation>,
    pub visibility: Option<Visibility>,
    pub constant: bool,
    pub immutable: bool,
    /// Initializer of a state variable. Locals carry theirs on the declaring statement.
    pub value: Option<NodeId>,
}

impl Decl {
    /// Type and location as they would be written in a fresh declaration.
    pub fn declared_type(&self) -> String {
        match self.location {
            Some(loc) => format!("{} {}", self.type_text, loc.as_str()),
            None => self.type_text.clone(),
        }
    }

    pub fn elementary(&self) -> Option<ElementaryType> {
        ElementaryType::parse(&self.type_text)
    }
}

/// Value types the passes know how to store, reset and convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementaryType {
    Uint(u16),
    Int(u16),
    Bool,
    Address,
    FixedBytes(u8),
    String,
}

impl ElementaryType {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text {
            "uint" => return Some(ElementaryType::Uint(256)),
            "int" => return Some(ElementaryType::Int(256)),
            "bool" => return Some(ElementaryType::Bool),
            "address" | "address payable" => return Some(ElementaryType::Address),
            "string" => return Some(ElementaryType::String),
            _ => {}
        }
        if let Some(bits) = text.strip_prefix("uint") {
            return bits
                .parse::<u16>()
                .ok()
                .filter(|b| *b > 0 && *b <= 256 && b % 8 == 0)
                .map(ElementaryType::Uint);
        }
        if let Some(bits) = text.strip_prefix("int") {
            return bits
                .parse::<u16>()
                .ok()
                .filter(|b| *b > 0 && *b <= 256 && b % 8 == 0)
                .map(ElementaryType::Int);
        }
        if let Some(n) = text.strip_prefix("bytes") {
            return n
                .parse::<u8>()
                .ok()
                .filter(|n| *n > 0 && *n <= 32)
                .map(ElementaryType::FixedBytes);
        }
        None
    }

    pub fn is_value_type(self) -> bool {
        !matches!(self, ElementaryType::String)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, ElementaryType::Uint(_))
    }

    pub fn name(self) -> String {
        match self {
            ElementaryType::Uint(bits) => format!("uint{}", bits),
            ElementaryType::Int(bits) => format!("int{}", bits),
            ElementaryType::Bool => "bool".to_string(),
            ElementaryType::Address => "address".to_string(),
            ElementaryType::FixedBytes(n) => format!("bytes{}", n),
            ElementaryType::String => "string".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Block(Vec<NodeId>),
    Unchecked(Vec<NodeId>),
    Expr(NodeId),
    /// `T a = v;` or `(T a, , T b) = v;`. Gaps in a tuple are `None`.
    VarDecl {
        decls: Vec<Option<NodeId>>,
        value: Option<NodeId>,
        tuple: bool,
    },
    If {
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        cond: NodeId,
    },
    /// `init` is a statement, `cond` and `update` are expressions.
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    Return(Option<NodeId>),
    Break,
    Continue,
    Emit {
        event: NodeId,
        args: Vec<NodeId>,
    },
    Revert {
        error: Option<NodeId>,
        args: Vec<NodeId>,
    },
    /// The `_;` continuation marker of a modifier body.
    Placeholder,
    Assembly,
    Try(Vec<NodeId>),
    Other(Vec<NodeId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Number,
    Bool,
    String,
    HexString,
}

#[derive(Debug, Clone)]
pub struct Literal {
    pub kind: LiteralKind,
    pub has_unit: bool,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident(String),
    Literal(Literal),
    Binary {
        op: String,
        left: NodeId,
        right: NodeId,
    },
    /// Prefix operators `!`, `~`, `-`, `+` and `delete`.
    Unary {
        op: String,
        operand: NodeId,
    },
    Update {
        op: String,
        prefix: bool,
        operand: NodeId,
    },
    Assign {
        op: String,
        target: NodeId,
        value: NodeId,
    },
    Ternary {
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Member {
        object: NodeId,
        property: String,
        property_span: Span,
    },
    Index {
        base: NodeId,
        index: Option<NodeId>,
    },
    Paren(NodeId),
    Tuple(Vec<Option<NodeId>>),
    ArrayLiteral(Vec<NodeId>),
    /// An elementary type in expression position, as in `uint8(x)`.
    TypeName(String),
    New(String),
    Other(Vec<NodeId>),
}

impl NodeKind {
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Contract(c) => c.members.clone(),
            NodeKind::Modifier(m) => m.params.iter().copied().chain(m.body).collect(),
            NodeKind::Function(f) => {
                let mut out = f.params.clone();
                for inv in &f.modifiers {
                    out.extend(inv.args.iter().copied());
                }
                out.extend(f.returns.iter().copied());
                out.extend(f.body);
                out
            }
            NodeKind::Declaration(d) => d.value.into_iter().collect(),
            NodeKind::Statement(s) => match s {
                Stmt::Block(items) | Stmt::Unchecked(items) | Stmt::Try(items) => items.clone(),
                Stmt::Other(items) => items.clone(),
                Stmt::Expr(e) => vec![*e],
                Stmt::VarDecl { decls, value, .. } => {
                    decls.iter().flatten().copied().chain(*value).collect()
                }
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => [*cond, *then].into_iter().chain(*otherwise).collect(),
                Stmt::While { cond, body } => vec![*cond, *body],
                Stmt::DoWhile { body, cond } => vec![*body, *cond],
                Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                } => init
                    .iter()
                    .chain(cond)
                    .chain(update)
                    .copied()
                    .chain(Some(*body))
                    .collect(),
                Stmt::Return(value) => value.iter().copied().collect(),
                Stmt::Emit { event, args } => Some(*event).into_iter().chain(args.iter().copied()).collect(),
                Stmt::Revert { error, args } => error.iter().chain(args.iter()).copied().collect(),
                Stmt::Break | Stmt::Continue | Stmt::Placeholder | Stmt::Assembly => Vec::new(),
            },
            NodeKind::Expression(e) => match e {
                Expr::Ident(_)
                | Expr::Literal(_)
                | Expr::TypeName(_)
                | Expr::New(_) => Vec::new(),
                Expr::Binary { left, right, .. } => vec![*left, *right],
                Expr::Unary { operand, .. } | Expr::Update { operand, .. } => vec![*operand],
                Expr::Assign { target, value, .. } => vec![*target, *value],
                Expr::Ternary {
                    cond,
                    then,
                    otherwise,
                } => vec![*cond, *then, *otherwise],
                Expr::Call { callee, args } => {
                    Some(*callee).into_iter().chain(args.iter().copied()).collect()
                }
                Expr::Member { object, .. } => vec![*object],
                Expr::Index { base, index } => Some(*base).into_iter().chain(*index).collect(),
                Expr::Paren(inner) => vec![*inner],
                Expr::Tuple(items) => items.iter().flatten().copied().collect(),
                Expr::ArrayLiteral(items) | Expr::Other(items) => items.clone(),
            },
        }
    }
}

/// Immutable snapshot of one source buffer.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<Node>,
    units: Vec<NodeId>,
    comments: Vec<Span>,
    pragmas: Vec<Span>,
    lines: LineIndex,
}

impl SyntaxTree {
    /// Builds the tree and links parents from each node's children.
    pub fn new(
        source: String,
        mut nodes: Vec<Node>,
        units: Vec<NodeId>,
        comments: Vec<Span>,
        pragmas: Vec<Span>,
    ) -> Self {
        for i in 0..nodes.len() {
            for child in nodes[i].kind.children() {
                nodes[child.index()].parent = Some(NodeId(i as u32));
            }
        }
        let lines = LineIndex::new(&source);
        Self {
            source,
            nodes,
            units,
            comments,
            pragmas,
            lines,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn units(&self) -> &[NodeId] {
        &self.units
    }

    pub fn comments(&self) -> &[Span] {
        &self.comments
    }

    pub fn pragmas(&self) -> &[Span] {
        &self.pragmas
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn text(&self, id: NodeId) -> &str {
        self.node(id).span.slice(&self.source)
    }

    pub fn span_text(&self, span: Span) -> &str {
        span.slice(&self.source)
    }

    pub fn location(&self, offset: usize) -> (usize, usize) {
        self.lines.location(offset)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).kind.children()
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Pre-order walk of `id` and everything beneath it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut children = self.children(next);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    pub fn contract(&self, id: NodeId) -> Option<&Contract> {
        match &self.node(id).kind {
            NodeKind::Contract(c) => Some(c),
            _ => None,
        }
    }

    pub fn function(&self, id: NodeId) -> Option<&Function> {
        match &self.node(id).kind {
            NodeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn modifier(&self, id: NodeId) -> Option<&Modifier> {
        match &self.node(id).kind {
            NodeKind::Modifier(m) => Some(m),
            _ => None,
        }
    }

    pub fn decl(&self, id: NodeId) -> Option<&Decl> {
        match &self.node(id).kind {
            NodeKind::Declaration(d) => Some(d),
            _ => None,
        }
    }

    pub fn stmt(&self, id: NodeId) -> Option<&Stmt> {
        match &self.node(id).kind {
            NodeKind::Statement(s) => Some(s),
            _ => None,
        }
    }

    pub fn expr(&self, id: NodeId) -> Option<&Expr> {
        match &self.node(id).kind {
            NodeKind::Expression(e) => Some(e),
            _ => None,
        }
    }

    pub fn contracts(&self) -> impl Iterator<Item = (NodeId, &Contract)> + '_ {
        self.units
            .iter()
            .filter_map(move |&id| self.contract(id).map(|c| (id, c)))
    }

    pub fn contract_named(&self, name: &str) -> Option<(NodeId, &Contract)> {
        self.contracts().find(|(_, c)| c.name == name)
    }

    /// Every function in the file, free functions included.
    pub fn functions(&self) -> Vec<NodeId> {
        self.ids().filter(|&id| self.function(id).is_some()).collect()
    }

    pub fn enclosing_contract(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|&a| self.contract(a).is_some())
    }

    /// Nearest enclosing function or modifier.
    pub fn enclosing_callable(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&a| self.function(a).is_some() || self.modifier(a).is_some())
    }

    /// Nearest ancestor (or self) that is a statement.
    pub fn enclosing_statement(&self, id: NodeId) -> Option<NodeId> {
        if self.stmt(id).is_some() {
            return Some(id);
        }
        self.ancestors(id).find(|&a| self.stmt(a).is_some())
    }

    /// Skips any parentheses around an expression.
    pub fn strip_parens(&self, mut id: NodeId) -> NodeId {
        while let Some(Expr::Paren(inner)) = self.expr(id) {
            id = *inner;
        }
        id
    }

    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        id == ancestor || self.ancestors(id).any(|a| a == ancestor)
    }

    /// Statements of a block-like body, or the statement itself for an unbraced body.
    pub fn block_items(&self, id: NodeId) -> Vec<NodeId> {
        match self.stmt(id) {
            Some(Stmt::Block(items)) => items.clone(),
            _ => vec![id],
        }
    }
}

pub struct Ancestors<'a> {
    tree: &'a SyntaxTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

/// Integer value of a number literal without units. Decimal, hex, `_` separators and integral
/// scientific notation are accepted.
pub fn parse_int_literal(text: &str) -> Option<BigUint> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        return BigUint::from_str_radix(hex, 16).ok();
    }
    let lower = cleaned.to_ascii_lowercase();
    let (mantissa, exponent) = match lower.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i64>().ok()?),
        None => (lower, 0),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (mantissa, String::new()),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let digits = format!("{}{}", int_part, frac_part);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut value = BigUint::from_str_radix(if digits.is_empty() { "0" } else { &digits }, 10).ok()?;
    let scale = exponent - frac_part.len() as i64;
    let ten = BigUint::from(10u8);
    if scale >= 0 {
        for _ in 0..scale {
            value *= &ten;
        }
        Some(value)
    } else {
        let mut divisor = BigUint::one();
        for _ in 0..(-scale) {
            divisor *= &ten;
        }
        if (&value % &divisor).is_zero() {
            Some(value / divisor)
        } else {
            None
        }
    }
}
