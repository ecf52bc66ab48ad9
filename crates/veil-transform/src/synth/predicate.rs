use super::arith::{render_uint, word_limit};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::rngs::StdRng;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Ge,
    And,
    Or,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    fn negated(self) -> BinOp {
        match self {
            BinOp::Eq => BinOp::Ne,
            BinOp::Ne => BinOp::Eq,
            BinOp::Lt => BinOp::Ge,
            BinOp::Ge => BinOp::Lt,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredExpr {
    /// The i-th free variable.
    Var(usize),
    Const(BigUint),
    Bin(BinOp, Box<PredExpr>, Box<PredExpr>),
}

fn bin(op: BinOp, a: PredExpr, b: PredExpr) -> PredExpr {
    PredExpr::Bin(op, Box::new(a), Box::new(b))
}

fn konst(v: impl Into<BigUint>) -> PredExpr {
    PredExpr::Const(v.into())
}

impl PredExpr {
    pub fn render(&self, vars: &[String]) -> String {
        match self {
            PredExpr::Var(i) => vars.get(*i).cloned().unwrap_or_default(),
            PredExpr::Const(v) => render_uint(v),
            PredExpr::Bin(op, a, b) => {
                format!("({} {} {})", a.render(vars), op.symbol(), b.render(vars))
            }
        }
    }

    /// Checked 256-bit evaluation; booleans are 0 and 1. `None` on underflow, overflow or a zero
    /// modulus, which a sound predicate never produces.
    pub fn eval(&self, vars: &[BigUint]) -> Option<BigUint> {
        let flag = |b: bool| Some(if b { BigUint::one() } else { BigUint::zero() });
        let word = |v: BigUint| (v < word_limit()).then_some(v);
        match self {
            PredExpr::Var(i) => vars.get(*i).cloned(),
            PredExpr::Const(v) => word(v.clone()),
            PredExpr::Bin(op, a, b) => {
                let (a, b) = (a.eval(vars)?, b.eval(vars)?);
                match op {
                    BinOp::Add => word(a + b),
                    BinOp::Sub => (a >= b).then(|| a - b),
                    BinOp::Mul => word(a * b),
                    BinOp::Mod => (!b.is_zero()).then(|| a % b),
                    BinOp::BitAnd => Some(a & b),
                    BinOp::BitOr => Some(a | b),
                    BinOp::BitXor => Some(a ^ b),
                    BinOp::Eq => flag(a == b),
                    BinOp::Ne => flag(a != b),
                    BinOp::Lt => flag(a < b),
                    BinOp::Ge => flag(a >= b),
                    BinOp::And => flag(!a.is_zero() && !b.is_zero()),
                    BinOp::Or => flag(!a.is_zero() || !b.is_zero()),
                }
            }
        }
    }
}

/// The algebraic facts predicates are built from. Each holds for every pair of 256-bit words and
/// keeps every intermediate in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// `x ^ y == (x | y) - (x & y)`
    XorSplit,
    /// `(x | y) & x == x`
    Absorption,
    /// `a * (a + 1) % 2 == 0`
    ConsecutiveProduct,
    /// `a * a % 4 < 2`
    SquareResidue,
    /// `(b * b * b - b) % 6 == 0`
    CubeDifference,
}

const IDENTITIES: [Identity; 5] = [
    Identity::XorSplit,
    Identity::Absorption,
    Identity::ConsecutiveProduct,
    Identity::SquareResidue,
    Identity::CubeDifference,
];

impl Identity {
    /// The comparison that is true for every input, over variables `x` and `y`.
    fn build(self, x: usize, y: usize) -> (BinOp, PredExpr, PredExpr) {
        let (vx, vy) = (PredExpr::Var(x), PredExpr::Var(y));
        match self {
            Identity::XorSplit => (
                BinOp::Eq,
                bin(BinOp::BitXor, vx.clone(), vy.clone()),
                bin(
                    BinOp::Sub,
                    bin(BinOp::BitOr, vx.clone(), vy.clone()),
                    bin(BinOp::BitAnd, vx, vy),
                ),
            ),
            Identity::Absorption => (
                BinOp::Eq,
                bin(BinOp::BitAnd, bin(BinOp::BitOr, vx.clone(), vy), vx.clone()),
                vx,
            ),
            Identity::ConsecutiveProduct => {
                let a = bin(BinOp::Mod, vx, konst(BigUint::one() << 127usize));
                (
                    BinOp::Eq,
                    bin(
                        BinOp::Mod,
                        bin(BinOp::Mul, a.clone(), bin(BinOp::Add, a, konst(1u8))),
                        konst(2u8),
                    ),
                    konst(0u8),
                )
            }
            Identity::SquareResidue => {
                let a = bin(BinOp::Mod, vx, konst(BigUint::one() << 127usize));
                (
                    BinOp::Lt,
                    bin(BinOp::Mod, bin(BinOp::Mul, a.clone(), a), konst(4u8)),
                    konst(2u8),
                )
            }
            Identity::CubeDifference => {
                let b = bin(BinOp::Mod, vx, konst(BigUint::one() << 80usize));
                let cube = bin(BinOp::Mul, bin(BinOp::Mul, b.clone(), b.clone()), b.clone());
                (
                    BinOp::Eq,
                    bin(BinOp::Mod, bin(BinOp::Sub, cube, b), konst(6u8)),
                    konst(0u8),
                )
            }
        }
    }
}

/// A boolean expression over free variables whose value is known in advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub expr: PredExpr,
    pub label: bool,
}

impl Predicate {
    /// One identity, negated when `label` is false.
    pub fn atom(identity: Identity, x: usize, y: usize, label: bool) -> Self {
        let (op, lhs, rhs) = identity.build(x, y);
        let op = if label { op } else { op.negated() };
        Predicate {
            expr: bin(op, lhs, rhs),
            label,
        }
    }

    fn random_atom(rng: &mut StdRng, label: bool) -> Self {
        let identity = IDENTITIES[rng.random_range(0..IDENTITIES.len())];
        let x = rng.random_range(0..2usize);
        Predicate::atom(identity, x, 1 - x, label)
    }

    /// A predicate over variables 0 and 1 that always evaluates to `label`, sometimes joining two
    /// identities with `&&` or `||`.
    pub fn random(rng: &mut StdRng, label: bool) -> Self {
        if rng.random_bool(0.5) {
            return Predicate::random_atom(rng, label);
        }
        let conjunction = rng.random_bool(0.5);
        // true = T && T | T || * ; false = F && * | F || F
        let (first, second) = match (label, conjunction) {
            (true, true) => (true, true),
            (true, false) => (true, rng.random_bool(0.5)),
            (false, true) => (false, rng.random_bool(0.5)),
            (false, false) => (false, false),
        };
        let (mut a, mut b) = (
            Predicate::random_atom(rng, first),
            Predicate::random_atom(rng, second),
        );
        if rng.random_bool(0.5) {
            std::mem::swap(&mut a, &mut b);
        }
        let op = if conjunction { BinOp::And } else { BinOp::Or };
        Predicate {
            expr: bin(op, a.expr, b.expr),
            label,
        }
    }

    pub fn render(&self, vars: &[String]) -> String {
        self.expr.render(vars)
    }

    pub fn eval(&self, vars: &[BigUint]) -> Option<bool> {
        self.expr.eval(vars).map(|v| !v.is_zero())
    }
}
