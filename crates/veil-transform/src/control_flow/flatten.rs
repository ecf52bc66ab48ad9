/*! Control-flow flattening.
 *
 * A function body is cut into basic blocks, each ending in a jump, a two-way branch or an exit.
 * The blocks are then laid out as arms of one dispatch loop:
 *
 * ```text
 * uint256 s = 1;
 * while (s != 0) {
 *     if (s == 1) { ...; s = 7; }
 *     else if (s == 7) { ...; s = (c) ? 3 : 0; }
 *     ...
 * }
 * ```
 *
 * Every local is hoisted to the top of the body first so each arm sees it. Declarations turn into
 * assignments, or into `delete x;` when they had no initializer, which keeps the reset-to-zero
 * behaviour of a declaration inside a loop. `return` becomes an assignment to the return
 * variables followed by a jump to state 0.
 *
 * State ids are handed out in block creation order, the entry block being 1; only the order of the
 * arms is shuffled. An `unchecked` block holding control flow is cut into blocks like any other,
 * with each statement and branch condition it contributes wrapped in its own `unchecked { }`.
 */

use crate::util::indent_at;
use crate::{PassContext, Transform};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use veil_core::scope::Binding;
use veil_core::syntax::{DataLocation, Expr, StorageClass, Stmt};
use veil_core::{EditSet, NodeId, Result, Span, SyntaxTree, TransformError};

/// Live variables a flattened body may hold before the EVM stack runs out.
const MAX_STACK_SLOTS: usize = 14;

pub struct Flattener;

impl Transform for Flattener {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn description(&self) -> &'static str {
        "Rewrites function bodies as a state machine inside one dispatch loop"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let mut edits = EditSet::new();
        for function in tree.functions() {
            match flatten_function(tree, cx, function) {
                Ok(Some((span, text))) => edits.replace(span, text),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => cx.warn(e),
            }
        }
        Ok(edits)
    }
}

#[derive(Debug, Clone)]
enum Next {
    Goto(usize),
    Branch {
        cond: String,
        then: usize,
        otherwise: usize,
        /// The condition came from inside an `unchecked` block.
        unchecked: bool,
    },
    Exit,
}

#[derive(Debug, Clone)]
struct Block {
    stmts: Vec<String>,
    next: Next,
}

struct Builder<'t> {
    tree: &'t SyntaxTree,
    rewrites: &'t EditSet,
    blocks: Vec<Block>,
    /// `(continue target, break target)` of each enclosing loop.
    loops: Vec<(usize, usize)>,
    return_targets: Vec<String>,
    /// Depth of `unchecked` blocks being lowered.
    unchecked: usize,
}

impl<'t> Builder<'t> {
    fn block(&mut self) -> usize {
        self.blocks.push(Block {
            stmts: Vec::new(),
            next: Next::Exit,
        });
        self.blocks.len() - 1
    }

    fn render(&self, id: NodeId) -> Result<String> {
        Ok(self
            .rewrites
            .render_span(self.tree.source(), self.tree.span(id))?)
    }

    fn jump(&mut self, from: usize, next: Next) {
        self.blocks[from].next = next;
    }

    fn push(&mut self, block: usize, text: String) {
        let text = if self.unchecked > 0 {
            format!("unchecked {{ {} }}", text)
        } else {
            text
        };
        self.blocks[block].stmts.push(text);
    }

    fn branch(&self, cond: String, then: usize, otherwise: usize) -> Next {
        Next::Branch {
            cond,
            then,
            otherwise,
            unchecked: self.unchecked > 0,
        }
    }

    /// Whether an `unchecked` block holds statements that need states of their own.
    fn splits(&self, id: NodeId) -> bool {
        self.tree.descendants(id).into_iter().any(|d| {
            d != id
                && matches!(
                    self.tree.stmt(d),
                    Some(
                        Stmt::If { .. }
                            | Stmt::While { .. }
                            | Stmt::DoWhile { .. }
                            | Stmt::For { .. }
                            | Stmt::Return(_)
                            | Stmt::Break
                            | Stmt::Continue
                    )
                )
        })
    }

    /// Lowers a statement list starting in `current`. Returns the block control falls through to,
    /// or `None` when every path left through a jump.
    fn sequence(&mut self, items: &[NodeId], mut current: usize) -> Result<Option<usize>> {
        for &item in items {
            match self.statement(item, current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn statement(&mut self, id: NodeId, current: usize) -> Result<Option<usize>> {
        let tree = self.tree;
        let span = tree.span(id);
        let Some(stmt) = tree.stmt(id) else {
            return Err(unsupported("statement", span));
        };
        match stmt {
            Stmt::Block(items) => self.sequence(items, current),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.render(*cond)?;
                let then_block = self.block();
                let join = self.block();
                let else_block = match otherwise {
                    Some(_) => self.block(),
                    None => join,
                };
                let next = self.branch(cond, then_block, else_block);
                self.jump(current, next);
                if let Some(end) = self.statement(*then, then_block)? {
                    self.jump(end, Next::Goto(join));
                }
                if let Some(otherwise) = otherwise {
                    if let Some(end) = self.statement(*otherwise, else_block)? {
                        self.jump(end, Next::Goto(join));
                    }
                }
                Ok(Some(join))
            }
            Stmt::While { cond, body } => {
                let head = self.block();
                let entry = self.block();
                let exit = self.block();
                self.jump(current, Next::Goto(head));
                let cond = self.render(*cond)?;
                let next = self.branch(cond, entry, exit);
                self.jump(head, next);
                self.loops.push((head, exit));
                let end = self.statement(*body, entry)?;
                self.loops.pop();
                if let Some(end) = end {
                    self.jump(end, Next::Goto(head));
                }
                Ok(Some(exit))
            }
            Stmt::DoWhile { body, cond } => {
                let entry = self.block();
                let test = self.block();
                let exit = self.block();
                self.jump(current, Next::Goto(entry));
                self.loops.push((test, exit));
                let end = self.statement(*body, entry)?;
                self.loops.pop();
                if let Some(end) = end {
                    self.jump(end, Next::Goto(test));
                }
                let cond = self.render(*cond)?;
                let next = self.branch(cond, entry, exit);
                self.jump(test, next);
                Ok(Some(exit))
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                let mut current = current;
                if let Some(init) = init {
                    match self.statement(*init, current)? {
                        Some(next) => current = next,
                        None => return Ok(None),
                    }
                }
                let head = self.block();
                let entry = self.block();
                let step = self.block();
                let exit = self.block();
                self.jump(current, Next::Goto(head));
                let next = match cond {
                    Some(cond) => {
                        let cond = self.render(*cond)?;
                        self.branch(cond, entry, exit)
                    }
                    None => Next::Goto(entry),
                };
                self.jump(head, next);
                self.loops.push((step, exit));
                let end = self.statement(*body, entry)?;
                self.loops.pop();
                if let Some(end) = end {
                    self.jump(end, Next::Goto(step));
                }
                if let Some(update) = update {
                    let text = format!("{};", self.render(*update)?);
                    self.push(step, text);
                }
                self.jump(step, Next::Goto(head));
                Ok(Some(exit))
            }
            Stmt::Break | Stmt::Continue => {
                let Some(&(resume, exit)) = self.loops.last() else {
                    return Err(unsupported("jump outside loop", span));
                };
                let target = if matches!(stmt, Stmt::Break) { exit } else { resume };
                self.jump(current, Next::Goto(target));
                Ok(None)
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    let value = self.render(*value)?;
                    let text = match self.return_targets.as_slice() {
                        [single] => format!("{} = {};", single, value),
                        targets => format!("({}) = {};", targets.join(", "), value),
                    };
                    self.push(current, text);
                }
                self.jump(current, Next::Exit);
                Ok(None)
            }
            Stmt::Assembly => Err(unsupported("inline assembly", span)),
            Stmt::Try(_) => Err(unsupported("try statement", span)),
            Stmt::Placeholder => Err(unsupported("modifier placeholder", span)),
            Stmt::Unchecked(items) if self.splits(id) => {
                self.unchecked += 1;
                let end = self.sequence(items, current);
                self.unchecked -= 1;
                end
            }
            Stmt::Unchecked(_)
            | Stmt::Expr(_)
            | Stmt::VarDecl { .. }
            | Stmt::Emit { .. }
            | Stmt::Revert { .. }
            | Stmt::Other(_) => {
                let text = self.render(id)?;
                self.push(current, text);
                Ok(Some(current))
            }
        }
    }
}

fn unsupported(construct: &str, span: Span) -> TransformError {
    TransformError::UnsupportedConstruct {
        construct: construct.to_string(),
        span,
    }
}

fn reachable(blocks: &[Block]) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut stack = vec![0usize];
    while let Some(b) = stack.pop() {
        if !seen.insert(b) {
            continue;
        }
        match &blocks[b].next {
            Next::Goto(t) => stack.push(*t),
            Next::Branch {
                then, otherwise, ..
            } => {
                stack.push(*then);
                stack.push(*otherwise);
            }
            Next::Exit => {}
        }
    }
    seen
}

/// Checks the body for constructs the state machine cannot express.
fn check_supported(tree: &SyntaxTree, body: NodeId, returns: &[NodeId]) -> Result<()> {
    for id in tree.descendants(body) {
        let span = tree.span(id);
        match tree.stmt(id) {
            Some(Stmt::Assembly) => return Err(unsupported("inline assembly", span)),
            Some(Stmt::Try(_)) => return Err(unsupported("try statement", span)),
            _ => {}
        }
        if let Some(decl) = tree.decl(id) {
            if matches!(
                decl.location,
                Some(DataLocation::Storage | DataLocation::Calldata)
            ) {
                return Err(unsupported("storage or calldata reference", span));
            }
        }
    }
    for &r in returns {
        if let Some(decl) = tree.decl(r) {
            if matches!(
                decl.location,
                Some(DataLocation::Storage | DataLocation::Calldata)
            ) {
                return Err(unsupported("storage or calldata return", tree.span(r)));
            }
        }
    }
    Ok(())
}

fn flatten_function(
    tree: &SyntaxTree,
    cx: &mut PassContext,
    function_id: NodeId,
) -> Result<Option<(Span, String)>> {
    let source = tree.source();
    let Some(function) = tree.function(function_id) else {
        return Ok(None);
    };
    let Some(body) = function.body else {
        return Ok(None);
    };
    let items = tree.block_items(body);
    let branches = tree.descendants(body).into_iter().any(|d| {
        matches!(
            tree.stmt(d),
            Some(Stmt::If { .. } | Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. })
        )
    });
    if items.len() < 2 && !branches {
        return Ok(None);
    }
    check_supported(tree, body, &function.returns)?;

    let locals: Vec<NodeId> = tree
        .descendants(body)
        .into_iter()
        .filter(|&d| tree.decl(d).is_some_and(|decl| decl.class == StorageClass::Local))
        .collect();
    let unnamed_returns = function
        .returns
        .iter()
        .filter(|&&r| tree.decl(r).is_some_and(|d| d.name.is_none()))
        .count();
    let slots = function.params.len() + function.returns.len() + locals.len() + 1;
    if slots > MAX_STACK_SLOTS {
        return Err(unsupported("stack depth", tree.span(function_id)));
    }

    // Hoisted names: a local keeps its name unless something else in the function already
    // answers to it.
    let mut taken: HashSet<String> = function
        .params
        .iter()
        .chain(&function.returns)
        .filter_map(|&p| tree.decl(p).and_then(|d| d.name.clone()))
        .collect();
    let foreign: HashSet<&str> = tree
        .descendants(body)
        .into_iter()
        .filter_map(|d| match tree.expr(d) {
            Some(Expr::Ident(name)) => match cx.symbols.resolve(d) {
                Some(Binding::Variable(v)) if locals.contains(v) => None,
                _ => Some(name.as_str()),
            },
            _ => None,
        })
        .collect();
    let mut hoisted: HashMap<NodeId, String> = HashMap::new();
    for &local in &locals {
        let Some(name) = tree.decl(local).and_then(|d| d.name.as_deref()) else {
            continue;
        };
        let chosen = if taken.contains(name) || foreign.contains(name) {
            cx.names.fresh(name)
        } else {
            name.to_string()
        };
        taken.insert(chosen.clone());
        hoisted.insert(local, chosen);
    }

    let mut rewrites = EditSet::new();
    for id in tree.descendants(body) {
        let Some(decl) = cx.symbols.variable(id) else {
            continue;
        };
        if let (Some(name), Some(Expr::Ident(original))) = (hoisted.get(&decl), tree.expr(id)) {
            if name != original {
                rewrites.replace(tree.span(id), name.clone());
            }
        }
    }
    for id in tree.descendants(body) {
        let Some(Stmt::VarDecl {
            decls,
            value,
            tuple,
        }) = tree.stmt(id)
        else {
            continue;
        };
        let names: Vec<String> = decls
            .iter()
            .map(|d| d.and_then(|d| hoisted.get(&d).cloned()).unwrap_or_default())
            .collect();
        let inner = value.as_ref().map(|v| tree.span(*v));
        let tuple = *tuple;
        crate::util::rewrite_around(&mut rewrites, source, tree.span(id), inner, |value| {
            match value {
                Some(value) if tuple || names.len() > 1 => {
                    format!("({}) = {};", names.join(", "), value)
                }
                Some(value) => format!("{} = {};", names.join(""), value),
                None => names
                    .iter()
                    .filter(|n| !n.is_empty())
                    .map(|n| format!("delete {};", n))
                    .collect::<Vec<_>>()
                    .join(" "),
            }
        })?;
    }

    let mut declarations: Vec<String> = Vec::new();
    for &local in &locals {
        if let (Some(decl), Some(name)) = (tree.decl(local), hoisted.get(&local)) {
            declarations.push(format!("{} {};", decl.declared_type(), name));
        }
    }
    let mut return_targets = Vec::new();
    for &r in &function.returns {
        let Some(decl) = tree.decl(r) else {
            continue;
        };
        match &decl.name {
            Some(name) => return_targets.push(name.clone()),
            None => {
                let temp = cx.names.fresh("result");
                declarations.push(format!("{} {};", decl.declared_type(), temp));
                return_targets.push(temp);
            }
        }
    }

    let mut builder = Builder {
        tree,
        rewrites: &rewrites,
        blocks: Vec::new(),
        loops: Vec::new(),
        return_targets: return_targets.clone(),
        unchecked: 0,
    };
    let entry = builder.block();
    if let Some(end) = builder.sequence(&items, entry)? {
        builder.jump(end, Next::Exit);
    }
    let blocks = builder.blocks;
    let live = reachable(&blocks);

    let mut order: Vec<usize> = (0..blocks.len()).filter(|b| live.contains(b)).collect();
    let states: HashMap<usize, usize> = order
        .iter()
        .enumerate()
        .map(|(n, &b)| (b, n + 1))
        .collect();
    order.shuffle(&mut cx.rng);

    let state_var = cx.names.fresh("state");
    let state_of = |b: usize| states.get(&b).copied().unwrap_or(0);
    let base = indent_at(source, tree.span(function_id).offset).to_string();
    let (i1, i2, i3) = (
        format!("{}    ", base),
        format!("{}        ", base),
        format!("{}            ", base),
    );

    let mut out = String::from("{\n");
    for declaration in &declarations {
        out.push_str(&format!("{}{}\n", i1, declaration));
    }
    out.push_str(&format!("{}uint256 {} = 1;\n", i1, state_var));
    out.push_str(&format!("{}while ({} != 0) {{\n", i1, state_var));
    for (n, &b) in order.iter().enumerate() {
        let keyword = if n == 0 { "if" } else { "} else if" };
        out.push_str(&format!(
            "{}{} ({} == {}) {{\n",
            i2,
            keyword,
            state_var,
            state_of(b)
        ));
        for stmt in &blocks[b].stmts {
            out.push_str(&format!("{}{}\n", i3, stmt));
        }
        let transition = match &blocks[b].next {
            Next::Goto(t) => format!("{} = {};", state_var, state_of(*t)),
            Next::Branch {
                cond,
                then,
                otherwise,
                unchecked,
            } => {
                let assign = format!(
                    "{} = ({}) ? {} : {};",
                    state_var,
                    cond,
                    state_of(*then),
                    state_of(*otherwise)
                );
                if *unchecked {
                    format!("unchecked {{ {} }}", assign)
                } else {
                    assign
                }
            }
            Next::Exit => format!("{} = 0;", state_var),
        };
        out.push_str(&format!("{}{}\n", i3, transition));
    }
    if !order.is_empty() {
        out.push_str(&format!("{}}}\n", i2));
    }
    out.push_str(&format!("{}}}\n", i1));
    if unnamed_returns > 0 {
        let value = match return_targets.as_slice() {
            [single] => single.clone(),
            targets => format!("({})", targets.join(", ")),
        };
        out.push_str(&format!("{}return {};\n", i1, value));
    }
    out.push_str(&format!("{}}}", base));

    tracing::debug!(
        function = function.name.as_deref().unwrap_or("<special>"),
        blocks = order.len(),
        "flattened"
    );
    Ok(Some((tree.span(body), out)))
}
