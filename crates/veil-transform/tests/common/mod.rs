//! Reference evaluator for the Solidity subset the pipeline tests exercise.
//!
//! It walks the syntax tree of one deployed contract directly, with checked 0.8 arithmetic,
//! modifiers, internal calls, fixed arrays and `keccak256(abi.encodePacked(..))`. Anything outside
//! that subset panics, which fails the test rather than hiding a difference.

#![allow(dead_code)]

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use std::collections::HashMap;
use std::rc::Rc;
use tiny_keccak::{Hasher, Keccak};
use veil_core::scope::{functions_named, linearize, modifier_named};
use veil_core::syntax::{parse_int_literal, ElementaryType, Expr, FunctionKind, LiteralKind, Stmt};
use veil_core::{NodeId, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `bits == 0` marks an untyped number literal.
    Uint { bits: u16, value: BigUint },
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
}

pub fn uint(n: u64) -> Value {
    Value::Uint {
        bits: 256,
        value: BigUint::from(n),
    }
}

pub fn word(value: BigUint) -> Value {
    Value::Uint { bits: 256, value }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert(pub String);

type Exec<T> = Result<T, Revert>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Break,
    Continue,
    Return,
}

#[derive(Default)]
struct Frame {
    scopes: Vec<HashMap<String, Value>>,
    /// Contract whose code is running, for `super`.
    home: Option<NodeId>,
    unchecked: usize,
    ret: Option<Value>,
    /// The function frame a modifier's `_` continues into.
    inner: Option<Inner>,
}

struct Inner {
    frame: Box<Frame>,
    function: NodeId,
    stage: usize,
}

impl Frame {
    fn new(home: Option<NodeId>) -> Self {
        Frame {
            scopes: vec![HashMap::new()],
            home,
            ..Frame::default()
        }
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }
}

fn modulus(bits: u16) -> BigUint {
    BigUint::one() << bits as usize
}

fn be_bytes(value: &BigUint, len: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    let raw = if value.is_zero() { Vec::new() } else { raw };
    let mut out = vec![0u8; len.saturating_sub(raw.len())];
    out.extend_from_slice(&raw[raw.len().saturating_sub(len)..]);
    out
}

pub fn keccak(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => panic!("expected bool, got {:?}", other),
    }
}

fn as_index(value: &Value) -> usize {
    match value {
        Value::Uint { value, .. } => value.to_usize().unwrap_or(usize::MAX),
        other => panic!("expected index, got {:?}", other),
    }
}

/// Zero value of a declared type.
pub fn default_value(type_text: &str) -> Value {
    let text = type_text.trim();
    if let Some(open) = text.rfind('[') {
        if text.ends_with(']') {
            let element = &text[..open];
            let len = text[open + 1..text.len() - 1].trim();
            return match len.parse::<usize>() {
                Ok(n) => Value::Array(vec![default_value(element); n]),
                Err(_) => Value::Array(Vec::new()),
            };
        }
    }
    if text == "bytes" {
        return Value::Bytes(Vec::new());
    }
    match ElementaryType::parse(text) {
        Some(ElementaryType::Uint(bits)) => Value::Uint {
            bits,
            value: BigUint::zero(),
        },
        Some(ElementaryType::Address) => Value::Uint {
            bits: 160,
            value: BigUint::zero(),
        },
        Some(ElementaryType::Bool) => Value::Bool(false),
        Some(ElementaryType::String) => Value::Str(String::new()),
        Some(ElementaryType::FixedBytes(n)) => Value::Bytes(vec![0; n as usize]),
        _ => panic!("unsupported type {}", text),
    }
}

/// Gives untyped literals inside `value` the widths `type_text` asks for.
fn coerce(value: Value, type_text: &str) -> Value {
    fit(&default_value(type_text), value)
}

fn fit(slot: &Value, value: Value) -> Value {
    match (slot, value) {
        (Value::Uint { bits, .. }, Value::Uint { bits: 0, value }) => Value::Uint {
            bits: *bits,
            value: value % modulus(*bits),
        },
        (Value::Array(slots), Value::Array(values)) => {
            let template = slots.first().cloned();
            Value::Array(
                values
                    .into_iter()
                    .map(|v| match &template {
                        Some(t) => fit(t, v),
                        None => v,
                    })
                    .collect(),
            )
        }
        (_, value) => value,
    }
}

fn zero_like(value: &Value) -> Value {
    match value {
        Value::Uint { bits, .. } => Value::Uint {
            bits: *bits,
            value: BigUint::zero(),
        },
        Value::Bool(_) => Value::Bool(false),
        Value::Str(_) => Value::Str(String::new()),
        Value::Bytes(b) => Value::Bytes(vec![0; b.len()]),
        Value::Array(items) => Value::Array(items.iter().map(zero_like).collect()),
        Value::Tuple(items) => Value::Tuple(items.iter().map(zero_like).collect()),
    }
}

fn convert(value: Value, ty: &str) -> Value {
    if ty == "bytes" {
        return match value {
            Value::Str(s) => Value::Bytes(s.into_bytes()),
            other => other,
        };
    }
    match (ElementaryType::parse(ty), value) {
        (Some(ElementaryType::Uint(bits)), Value::Uint { value, .. }) => Value::Uint {
            bits,
            value: value % modulus(bits),
        },
        (Some(ElementaryType::Uint(bits)), Value::Bytes(raw)) => Value::Uint {
            bits,
            value: BigUint::from_bytes_be(&raw) % modulus(bits),
        },
        (Some(ElementaryType::Address), Value::Uint { value, .. }) => Value::Uint {
            bits: 160,
            value: value % modulus(160),
        },
        (Some(ElementaryType::FixedBytes(n)), Value::Uint { value, .. }) => {
            Value::Bytes(be_bytes(&value, n as usize))
        }
        (Some(ElementaryType::FixedBytes(n)), Value::Bytes(mut raw)) => {
            raw.resize(n as usize, 0);
            Value::Bytes(raw)
        }
        (Some(ElementaryType::String), Value::Bytes(raw)) => {
            Value::Str(String::from_utf8_lossy(&raw).into_owned())
        }
        (Some(ElementaryType::Bool), Value::Bool(b)) => Value::Bool(b),
        (_, Value::Str(s)) if ty == "string" => Value::Str(s),
        (_, other) => panic!("unsupported conversion of {:?} to {}", other, ty),
    }
}

fn pack(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Uint { bits: 0, value } => out.extend(be_bytes(value, 32)),
        Value::Uint { bits, value } => out.extend(be_bytes(value, *bits as usize / 8)),
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::Str(s) => out.extend_from_slice(s.as_bytes()),
        Value::Bytes(b) => out.extend_from_slice(b),
        Value::Array(items) => {
            for item in items {
                encode(item, out);
            }
        }
        Value::Tuple(_) => panic!("cannot pack a tuple"),
    }
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Uint { value, .. } => out.extend(be_bytes(value, 32)),
        Value::Bool(b) => out.extend(be_bytes(&BigUint::from(u8::from(*b)), 32)),
        Value::Bytes(b) if b.len() <= 32 => {
            let mut word = b.clone();
            word.resize(32, 0);
            out.extend(word);
        }
        other => panic!("unsupported abi.encode argument {:?}", other),
    }
}

fn literal_value(text: &str, kind: LiteralKind, has_unit: bool) -> Value {
    match kind {
        LiteralKind::Bool => Value::Bool(text == "true"),
        LiteralKind::String => Value::Str(text[1..text.len() - 1].to_string()),
        LiteralKind::HexString => {
            let digits = &text[4..text.len() - 1];
            let raw = (0..digits.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).unwrap_or(0))
                .collect();
            Value::Bytes(raw)
        }
        LiteralKind::Number => {
            let (number, unit) = if has_unit {
                let mut parts = text.split_whitespace();
                (parts.next().unwrap_or("0"), parts.next().unwrap_or(""))
            } else {
                (text, "")
            };
            let scale: u64 = match unit {
                "" | "wei" | "seconds" => 1,
                "gwei" => 1_000_000_000,
                "ether" => 1_000_000_000_000_000_000,
                "minutes" => 60,
                "hours" => 3_600,
                "days" => 86_400,
                "weeks" => 604_800,
                other => panic!("unsupported unit {}", other),
            };
            let value = parse_int_literal(number)
                .unwrap_or_else(|| panic!("unsupported number {}", number));
            Value::Uint {
                bits: 0,
                value: value * scale,
            }
        }
    }
}

/// One deployed contract plus its storage.
pub struct Machine {
    tree: Rc<SyntaxTree>,
    contract: NodeId,
    state: HashMap<String, Value>,
    gas: u64,
    pub timestamp: u64,
    pub events: Vec<(String, Vec<Value>)>,
}

impl Machine {
    /// Parses `source`, runs the state initializers of `contract` and its bases and then their
    /// constructors, bases first.
    pub fn deploy(source: &str, contract: &str) -> Machine {
        let tree = Rc::new(veil_parser::parse(source).expect("source parses"));
        let (id, _) = tree
            .contract_named(contract)
            .unwrap_or_else(|| panic!("no contract {}", contract));
        let mut machine = Machine {
            tree: Rc::clone(&tree),
            contract: id,
            state: HashMap::new(),
            gas: 10_000_000,
            timestamp: 1_700_000_000,
            events: Vec::new(),
        };

        let chain: Vec<NodeId> = linearize(&tree, id).into_iter().rev().collect();
        // Storage starts zeroed, so an initializer may read a slot declared after it.
        for &c in &chain {
            let Some(contract) = tree.contract(c) else {
                continue;
            };
            for decl in contract.members.iter().filter_map(|&m| tree.decl(m)) {
                if let Some(name) = decl.name.as_deref() {
                    machine
                        .state
                        .insert(name.to_string(), default_value(&decl.type_text));
                }
            }
        }
        for &c in &chain {
            let Some(contract) = tree.contract(c) else {
                continue;
            };
            for &member in &contract.members {
                let Some(decl) = tree.decl(member) else {
                    continue;
                };
                let Some(name) = decl.name.as_deref() else {
                    continue;
                };
                let mut frame = Frame::new(Some(c));
                let value = match decl.value {
                    Some(v) => machine.eval(&mut frame, v).expect("initializer"),
                    None => default_value(&decl.type_text),
                };
                machine
                    .state
                    .insert(name.to_string(), coerce(value, &decl.type_text));
            }
        }
        for &c in &chain {
            let constructor = tree.contract(c).and_then(|contract| {
                contract.members.iter().copied().find(|&m| {
                    tree.function(m)
                        .is_some_and(|f| f.kind == FunctionKind::Constructor)
                })
            });
            if let Some(constructor) = constructor {
                machine.invoke(constructor, Vec::new()).expect("constructor");
            }
        }
        machine
    }

    /// Calls `name` as an external transaction. A revert rolls storage and events back.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Revert> {
        let tree = Rc::clone(&self.tree);
        let function = functions_named(&tree, self.contract, name)
            .into_iter()
            .find(|&f| tree.function(f).is_some_and(|f| f.params.len() == args.len()))
            .unwrap_or_else(|| panic!("no function {}/{}", name, args.len()));
        let saved = (self.state.clone(), self.events.len());
        self.timestamp += 12;
        let result = self.invoke(function, args.to_vec());
        if result.is_err() {
            self.state = saved.0;
            self.events.truncate(saved.1);
        }
        result
    }

    pub fn state(&self, name: &str) -> Option<&Value> {
        self.state.get(name)
    }

    pub fn state_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.keys().cloned().collect();
        names.sort();
        names
    }

    fn invoke(&mut self, function: NodeId, args: Vec<Value>) -> Exec<Value> {
        let tree = Rc::clone(&self.tree);
        let f = tree.function(function).expect("function");
        let mut frame = Frame::new(tree.enclosing_contract(function));
        for (&param, arg) in f.params.iter().zip(args) {
            let decl = tree.decl(param).expect("parameter");
            if let Some(name) = decl.name.as_deref() {
                frame.declare(name, coerce(arg, &decl.type_text));
            }
        }
        for &ret in &f.returns {
            let decl = tree.decl(ret).expect("return");
            if let Some(name) = decl.name.as_deref() {
                frame.declare(name, default_value(&decl.type_text));
            }
        }

        self.run_stage(&mut frame, function, 0)?;

        let values = match frame.ret.take() {
            Some(Value::Tuple(values)) if f.returns.len() > 1 => values,
            Some(value) => vec![value],
            None => f
                .returns
                .iter()
                .map(|&r| {
                    let decl = tree.decl(r).expect("return");
                    decl.name
                        .as_deref()
                        .and_then(|n| frame.lookup(n).cloned())
                        .unwrap_or_else(|| default_value(&decl.type_text))
                })
                .collect(),
        };
        let mut values: Vec<Value> = values
            .into_iter()
            .zip(&f.returns)
            .map(|(v, &r)| coerce(v, &tree.decl(r).expect("return").type_text))
            .collect();
        Ok(if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Tuple(values)
        })
    }

    /// Runs modifier `stage` of `function`, or the body once every modifier has been entered.
    fn run_stage(&mut self, frame: &mut Frame, function: NodeId, stage: usize) -> Exec<()> {
        let tree = Rc::clone(&self.tree);
        let f = tree.function(function).expect("function");
        let modifiers: Vec<(NodeId, &[NodeId])> = f
            .modifiers
            .iter()
            .filter_map(|m| {
                modifier_named(&tree, self.contract, &m.name).map(|id| (id, m.args.as_slice()))
            })
            .collect();

        if let Some(&(modifier, args)) = modifiers.get(stage) {
            let m = tree.modifier(modifier).expect("modifier");
            let mut values = Vec::with_capacity(args.len());
            for &arg in args {
                values.push(self.eval(frame, arg)?);
            }
            let mut own = Frame::new(tree.enclosing_contract(modifier));
            for (&param, value) in m.params.iter().zip(values) {
                let decl = tree.decl(param).expect("parameter");
                if let Some(name) = decl.name.as_deref() {
                    own.declare(name, coerce(value, &decl.type_text));
                }
            }
            own.inner = Some(Inner {
                frame: Box::new(std::mem::take(frame)),
                function,
                stage,
            });
            let result = match m.body {
                Some(body) => self.exec(&mut own, body).map(|_| ()),
                None => Ok(()),
            };
            if let Some(inner) = own.inner.take() {
                *frame = *inner.frame;
            }
            result
        } else if let Some(body) = f.body {
            self.exec(frame, body).map(|_| ())
        } else {
            Ok(())
        }
    }

    fn block(&mut self, frame: &mut Frame, items: &[NodeId]) -> Exec<Flow> {
        frame.scopes.push(HashMap::new());
        let mut flow = Flow::Next;
        for &item in items {
            flow = self.exec(frame, item)?;
            if flow != Flow::Next {
                break;
            }
        }
        frame.scopes.pop();
        Ok(flow)
    }

    fn exec(&mut self, frame: &mut Frame, id: NodeId) -> Exec<Flow> {
        let tree = Rc::clone(&self.tree);
        let stmt = tree
            .stmt(id)
            .unwrap_or_else(|| panic!("not a statement: {}", tree.text(id)));
        match stmt {
            Stmt::Block(items) => self.block(frame, items),
            Stmt::Unchecked(items) => {
                frame.unchecked += 1;
                let flow = self.block(frame, items);
                frame.unchecked -= 1;
                flow
            }
            Stmt::Expr(e) => {
                self.eval(frame, *e)?;
                Ok(Flow::Next)
            }
            Stmt::VarDecl {
                decls,
                value,
                tuple,
            } => {
                let values: Vec<Option<Value>> = match value {
                    None => decls.iter().map(|_| None).collect(),
                    Some(v) => match (self.eval(frame, *v)?, *tuple) {
                        (Value::Tuple(values), true) => values.into_iter().map(Some).collect(),
                        (value, false) => vec![Some(value)],
                        (other, true) => panic!("tuple declaration from {:?}", other),
                    },
                };
                for (decl, value) in decls.iter().zip(values) {
                    let Some(decl) = decl.and_then(|d| tree.decl(d)) else {
                        continue;
                    };
                    let value = match value {
                        Some(v) => coerce(v, &decl.type_text),
                        None => default_value(&decl.type_text),
                    };
                    if let Some(name) = decl.name.as_deref() {
                        frame.declare(name, value);
                    }
                }
                Ok(Flow::Next)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let taken = as_bool(&self.eval(frame, *cond)?);
                match (taken, otherwise) {
                    (true, _) => self.exec(frame, *then),
                    (false, Some(otherwise)) => self.exec(frame, *otherwise),
                    (false, None) => Ok(Flow::Next),
                }
            }
            Stmt::While { cond, body } => {
                while as_bool(&self.eval(frame, *cond)?) {
                    match self.exec(frame, *body)? {
                        Flow::Break => break,
                        Flow::Return => return Ok(Flow::Return),
                        Flow::Next | Flow::Continue => {}
                    }
                }
                Ok(Flow::Next)
            }
            Stmt::DoWhile { body, cond } => {
                loop {
                    match self.exec(frame, *body)? {
                        Flow::Break => break,
                        Flow::Return => return Ok(Flow::Return),
                        Flow::Next | Flow::Continue => {}
                    }
                    if !as_bool(&self.eval(frame, *cond)?) {
                        break;
                    }
                }
                Ok(Flow::Next)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                frame.scopes.push(HashMap::new());
                if let Some(init) = init {
                    self.exec(frame, *init)?;
                }
                let mut flow = Flow::Next;
                loop {
                    if let Some(cond) = cond {
                        if !as_bool(&self.eval(frame, *cond)?) {
                            break;
                        }
                    }
                    match self.exec(frame, *body)? {
                        Flow::Break => break,
                        Flow::Return => {
                            flow = Flow::Return;
                            break;
                        }
                        Flow::Next | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(frame, *update)?;
                    }
                }
                frame.scopes.pop();
                Ok(flow)
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    frame.ret = Some(self.eval(frame, *value)?);
                }
                Ok(Flow::Return)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Emit { event, args } => {
                let mut values = Vec::with_capacity(args.len());
                for &arg in args {
                    values.push(self.eval(frame, arg)?);
                }
                self.events.push((tree.text(*event).to_string(), values));
                Ok(Flow::Next)
            }
            Stmt::Revert { error, .. } => Err(Revert(
                error.map(|e| tree.text(e).to_string()).unwrap_or_default(),
            )),
            Stmt::Placeholder => {
                let mut inner = frame.inner.take().expect("placeholder outside a modifier");
                let result = self.run_stage(&mut inner.frame, inner.function, inner.stage + 1);
                frame.inner = Some(inner);
                result?;
                Ok(Flow::Next)
            }
            _ => panic!("unsupported statement: {}", tree.text(id)),
        }
    }

    fn read(&self, frame: &Frame, name: &str) -> Value {
        frame
            .lookup(name)
            .or_else(|| self.state.get(name))
            .cloned()
            .unwrap_or_else(|| panic!("unknown identifier {}", name))
    }

    fn eval(&mut self, frame: &mut Frame, id: NodeId) -> Exec<Value> {
        let tree = Rc::clone(&self.tree);
        let expr = tree
            .expr(id)
            .unwrap_or_else(|| panic!("not an expression: {}", tree.text(id)));
        match expr {
            Expr::Ident(name) => Ok(self.read(frame, name)),
            Expr::Literal(lit) => Ok(literal_value(tree.text(id), lit.kind, lit.has_unit)),
            Expr::Paren(inner) => self.eval(frame, *inner),
            Expr::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let item = item.unwrap_or_else(|| panic!("tuple gap in rvalue"));
                    values.push(self.eval(frame, item)?);
                }
                Ok(Value::Tuple(values))
            }
            Expr::ArrayLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for &item in items {
                    values.push(self.eval(frame, item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Binary { op, left, right } => match op.as_str() {
                "&&" => Ok(Value::Bool(
                    as_bool(&self.eval(frame, *left)?) && as_bool(&self.eval(frame, *right)?),
                )),
                "||" => Ok(Value::Bool(
                    as_bool(&self.eval(frame, *left)?) || as_bool(&self.eval(frame, *right)?),
                )),
                _ => {
                    let l = self.eval(frame, *left)?;
                    let r = self.eval(frame, *right)?;
                    binary(frame.unchecked > 0, op, l, r)
                }
            },
            Expr::Unary { op, operand } => match op.as_str() {
                "!" => Ok(Value::Bool(!as_bool(&self.eval(frame, *operand)?))),
                "delete" => {
                    let current = self.eval(frame, *operand)?;
                    self.assign(frame, *operand, zero_like(&current))?;
                    Ok(Value::Tuple(Vec::new()))
                }
                "~" => match self.eval(frame, *operand)? {
                    Value::Uint { bits, value } => {
                        let bits = if bits == 0 { 256 } else { bits };
                        Ok(Value::Uint {
                            bits,
                            value: (modulus(bits) - 1u8) ^ value,
                        })
                    }
                    other => panic!("~ on {:?}", other),
                },
                _ => panic!("unsupported unary {}", op),
            },
            Expr::Update {
                op,
                prefix,
                operand,
            } => {
                let old = self.eval(frame, *operand)?;
                let one = Value::Uint {
                    bits: 0,
                    value: BigUint::one(),
                };
                let step = if op == "++" { "+" } else { "-" };
                let new = binary(frame.unchecked > 0, step, old.clone(), one)?;
                self.assign(frame, *operand, new.clone())?;
                Ok(if *prefix { new } else { old })
            }
            Expr::Assign { op, target, value } => {
                let value = self.eval(frame, *value)?;
                let new = if op == "=" {
                    value
                } else {
                    let current = self.eval(frame, *target)?;
                    binary(frame.unchecked > 0, op.trim_end_matches('='), current, value)?
                };
                self.assign(frame, *target, new.clone())?;
                Ok(new)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if as_bool(&self.eval(frame, *cond)?) {
                    self.eval(frame, *then)
                } else {
                    self.eval(frame, *otherwise)
                }
            }
            Expr::Call { callee, args } => self.call_expr(frame, *callee, args),
            Expr::Member {
                object, property, ..
            } => match (tree.text(*object), property.as_str()) {
                ("block", "timestamp") => Ok(uint(self.timestamp)),
                ("block", "number") => Ok(uint(self.timestamp / 12)),
                (_, "length") => match self.eval(frame, *object)? {
                    Value::Array(items) => Ok(uint(items.len() as u64)),
                    Value::Bytes(raw) => Ok(uint(raw.len() as u64)),
                    other => panic!("length of {:?}", other),
                },
                _ => panic!("unsupported member {}", tree.text(id)),
            },
            Expr::Index { base, index } => {
                let container = self.eval(frame, *base)?;
                let index = index.expect("index expression");
                let i = as_index(&self.eval(frame, index)?);
                match container {
                    Value::Array(items) => items
                        .get(i)
                        .cloned()
                        .ok_or_else(|| Revert("index out of bounds".to_string())),
                    Value::Bytes(raw) => raw
                        .get(i)
                        .map(|b| Value::Bytes(vec![*b]))
                        .ok_or_else(|| Revert("index out of bounds".to_string())),
                    other => panic!("indexing {:?}", other),
                }
            }
            _ => panic!("unsupported expression: {}", tree.text(id)),
        }
    }

    fn assign(&mut self, frame: &mut Frame, target: NodeId, value: Value) -> Exec<()> {
        let tree = Rc::clone(&self.tree);
        match tree.expr(target) {
            Some(Expr::Ident(name)) => {
                let slot = match frame.lookup_mut(name) {
                    Some(slot) => slot,
                    None => self
                        .state
                        .get_mut(name)
                        .unwrap_or_else(|| panic!("unknown identifier {}", name)),
                };
                *slot = fit(slot, value);
                Ok(())
            }
            Some(Expr::Paren(inner)) => self.assign(frame, *inner, value),
            Some(Expr::Tuple(items)) => {
                let Value::Tuple(values) = value else {
                    panic!("tuple assignment from {:?}", value);
                };
                for (item, value) in items.iter().zip(values) {
                    if let Some(item) = item {
                        self.assign(frame, *item, value)?;
                    }
                }
                Ok(())
            }
            Some(Expr::Index { base, index }) => {
                let index = index.expect("index expression");
                let i = as_index(&self.eval(frame, index)?);
                let mut container = self.eval(frame, *base)?;
                match &mut container {
                    Value::Array(items) => {
                        let slot = items
                            .get_mut(i)
                            .ok_or_else(|| Revert("index out of bounds".to_string()))?;
                        *slot = fit(slot, value);
                    }
                    other => panic!("index assignment into {:?}", other),
                }
                self.assign(frame, *base, container)
            }
            _ => panic!("unsupported assignment target: {}", tree.text(target)),
        }
    }

    fn call_expr(&mut self, frame: &mut Frame, callee: NodeId, args: &[NodeId]) -> Exec<Value> {
        let tree = Rc::clone(&self.tree);
        let mut values = Vec::with_capacity(args.len());
        for &arg in args {
            values.push(self.eval(frame, arg)?);
        }
        match tree.expr(callee) {
            Some(Expr::TypeName(ty)) => {
                let value = values.into_iter().next().expect("conversion argument");
                Ok(convert(value, ty))
            }
            Some(Expr::Ident(name)) => match name.as_str() {
                "require" | "assert" => {
                    if as_bool(&values[0]) {
                        return Ok(Value::Tuple(Vec::new()));
                    }
                    let reason = match values.get(1) {
                        Some(Value::Str(s)) => s.clone(),
                        _ => name.clone(),
                    };
                    Err(Revert(reason))
                }
                "revert" => Err(Revert(match values.first() {
                    Some(Value::Str(s)) => s.clone(),
                    _ => String::new(),
                })),
                "keccak256" => match values.first() {
                    Some(Value::Bytes(raw)) => Ok(Value::Bytes(keccak(raw).to_vec())),
                    other => panic!("keccak256 of {:?}", other),
                },
                "gasleft" => {
                    self.gas = self.gas.saturating_sub(1_337);
                    Ok(uint(self.gas))
                }
                "string" | "bytes" => {
                    let value = values.into_iter().next().expect("conversion argument");
                    Ok(convert(value, name))
                }
                _ => {
                    let function = functions_named(&tree, self.contract, name)
                        .into_iter()
                        .find(|&f| {
                            tree.function(f)
                                .is_some_and(|f| f.params.len() == values.len())
                        })
                        .unwrap_or_else(|| panic!("no function {}", name));
                    self.invoke(function, values)
                }
            },
            Some(Expr::Member {
                object, property, ..
            }) => {
                let object = tree.text(*object);
                match (object, property.as_str()) {
                    ("abi", "encodePacked") => {
                        let mut out = Vec::new();
                        for value in &values {
                            pack(value, &mut out);
                        }
                        Ok(Value::Bytes(out))
                    }
                    ("abi", "encode") => {
                        let mut out = Vec::new();
                        for value in &values {
                            encode(value, &mut out);
                        }
                        Ok(Value::Bytes(out))
                    }
                    ("super", name) => {
                        let chain = linearize(&tree, self.contract);
                        let start = frame
                            .home
                            .and_then(|h| chain.iter().position(|&c| c == h))
                            .map(|p| p + 1)
                            .unwrap_or(chain.len());
                        let function = self
                            .declared_in(&chain[start..], name, values.len())
                            .unwrap_or_else(|| panic!("no super.{}", name));
                        self.invoke(function, values)
                    }
                    (contract, name) => {
                        let (base, _) = tree
                            .contract_named(contract)
                            .unwrap_or_else(|| panic!("unsupported call {}.{}", contract, name));
                        let chain = linearize(&tree, base);
                        let function = self
                            .declared_in(&chain, name, values.len())
                            .unwrap_or_else(|| panic!("no {}.{}", contract, name));
                        self.invoke(function, values)
                    }
                }
            }
            _ => panic!("unsupported callee: {}", tree.text(callee)),
        }
    }

    fn declared_in(&self, contracts: &[NodeId], name: &str, arity: usize) -> Option<NodeId> {
        contracts
            .iter()
            .filter_map(|&c| self.tree.contract(c))
            .flat_map(|c| c.members.iter().copied())
            .find(|&m| {
                self.tree.function(m).is_some_and(|f| {
                    f.name.as_deref() == Some(name) && f.params.len() == arity && f.body.is_some()
                })
            })
    }
}

fn binary(unchecked: bool, op: &str, left: Value, right: Value) -> Exec<Value> {
    let overflow = || Revert("arithmetic overflow".to_string());
    match (left, right) {
        (Value::Uint { bits: a, value: x }, Value::Uint { bits: b, value: y }) => {
            let bits = a.max(b);
            let limit = (bits != 0).then(|| modulus(bits));
            let wrap = |v: BigUint| -> Exec<Value> {
                match &limit {
                    Some(m) if &v >= m => {
                        if unchecked {
                            Ok(Value::Uint {
                                bits,
                                value: v % m,
                            })
                        } else {
                            Err(overflow())
                        }
                    }
                    _ => Ok(Value::Uint { bits, value: v }),
                }
            };
            let flag = |b: bool| Ok(Value::Bool(b));
            match op {
                "+" => wrap(x + y),
                "-" => {
                    if x >= y {
                        Ok(Value::Uint { bits, value: x - y })
                    } else {
                        match (&limit, unchecked) {
                            (Some(m), true) => Ok(Value::Uint {
                                bits,
                                value: m + x - y,
                            }),
                            _ => Err(overflow()),
                        }
                    }
                }
                "*" => wrap(x * y),
                "/" | "%" if y.is_zero() => Err(Revert("division by zero".to_string())),
                "/" => Ok(Value::Uint { bits, value: x / y }),
                "%" => Ok(Value::Uint { bits, value: x % y }),
                "**" => wrap(x.pow(y.to_u32().ok_or_else(overflow)?)),
                "&" => Ok(Value::Uint { bits, value: x & y }),
                "|" => Ok(Value::Uint { bits, value: x | y }),
                "^" => Ok(Value::Uint { bits, value: x ^ y }),
                "<<" | ">>" => {
                    let bits = if a != 0 { a } else if b != 0 { 256 } else { 0 };
                    let shift = y.to_usize().unwrap_or(usize::MAX).min(512);
                    let value = if op == "<<" { x << shift } else { x >> shift };
                    let value = if bits == 0 { value } else { value % modulus(bits) };
                    Ok(Value::Uint { bits, value })
                }
                "==" => flag(x == y),
                "!=" => flag(x != y),
                "<" => flag(x < y),
                "<=" => flag(x <= y),
                ">" => flag(x > y),
                ">=" => flag(x >= y),
                _ => panic!("unsupported operator {}", op),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => match op {
            "==" => Ok(Value::Bool(x == y)),
            "!=" => Ok(Value::Bool(x != y)),
            _ => panic!("unsupported bool operator {}", op),
        },
        (Value::Bytes(x), Value::Bytes(y)) => match op {
            "==" => Ok(Value::Bool(x == y)),
            "!=" => Ok(Value::Bool(x != y)),
            _ => panic!("unsupported bytes operator {}", op),
        },
        (l, r) => panic!("unsupported operands {:?} {} {:?}", l, op, r),
    }
}
