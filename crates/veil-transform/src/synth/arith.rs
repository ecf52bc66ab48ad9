use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::rngs::StdRng;
use rand::Rng;
use veil_core::random::{random_below, random_bits};

/// Attempts per literal before falling back to the plain value.
const RETRIES: usize = 8;

/// A literal-only integer expression. Solidity folds these at compile time with unbounded
/// precision, so keeping every intermediate inside `[0, 2^256)` makes that folding agree with
/// wrapping and checked evaluation alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arith {
    Lit(BigUint),
    Add(Box<Arith>, Box<Arith>),
    Sub(Box<Arith>, Box<Arith>),
    Mul(Box<Arith>, Box<Arith>),
    Shl(Box<Arith>, u32),
    Xor(Box<Arith>, Box<Arith>),
}

pub fn word_limit() -> BigUint {
    BigUint::one() << 256
}

fn in_word(value: BigUint) -> Option<BigUint> {
    (value < word_limit()).then_some(value)
}

pub fn render_uint(value: &BigUint) -> String {
    if value.bits() <= 32 {
        value.to_str_radix(10)
    } else {
        format!("0x{}", value.to_str_radix(16))
    }
}

impl Arith {
    /// Value of the tree, or `None` if any step leaves the 256-bit range.
    pub fn eval(&self) -> Option<BigUint> {
        match self {
            Arith::Lit(v) => in_word(v.clone()),
            Arith::Add(a, b) => in_word(a.eval()? + b.eval()?),
            Arith::Sub(a, b) => {
                let (a, b) = (a.eval()?, b.eval()?);
                if a < b {
                    return None;
                }
                Some(a - b)
            }
            Arith::Mul(a, b) => in_word(a.eval()? * b.eval()?),
            Arith::Shl(a, s) => in_word(a.eval()? << *s as usize),
            Arith::Xor(a, b) => in_word(a.eval()? ^ b.eval()?),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Arith::Lit(v) => render_uint(v),
            Arith::Add(a, b) => format!("({} + {})", a.render(), b.render()),
            Arith::Sub(a, b) => format!("({} - {})", a.render(), b.render()),
            Arith::Mul(a, b) => format!("({} * {})", a.render(), b.render()),
            Arith::Shl(a, s) => format!("({} << {})", a.render(), s),
            Arith::Xor(a, b) => format!("({} ^ {})", a.render(), b.render()),
        }
    }

    fn deepen(self, rng: &mut StdRng, depth: u32) -> Arith {
        match self {
            Arith::Lit(v) => expand(rng, &v, depth),
            Arith::Add(a, b) => Arith::Add(
                Box::new(a.deepen(rng, depth)),
                Box::new(b.deepen(rng, depth)),
            ),
            Arith::Sub(a, b) => Arith::Sub(
                Box::new(a.deepen(rng, depth)),
                Box::new(b.deepen(rng, depth)),
            ),
            Arith::Mul(a, b) => Arith::Mul(
                Box::new(a.deepen(rng, depth)),
                Box::new(b.deepen(rng, depth)),
            ),
            Arith::Shl(a, s) => Arith::Shl(Box::new(a.deepen(rng, depth)), s),
            Arith::Xor(a, b) => Arith::Xor(
                Box::new(a.deepen(rng, depth)),
                Box::new(b.deepen(rng, depth)),
            ),
        }
    }
}

fn lit(v: BigUint) -> Box<Arith> {
    Box::new(Arith::Lit(v))
}

/// One decomposition step of `k` with literal leaves.
fn split(rng: &mut StdRng, k: &BigUint) -> Arith {
    let max = word_limit() - 1u8;
    let mut choices = vec![4u8];
    if !k.is_zero() {
        choices.push(0);
    }
    if k < &max {
        choices.push(1);
    }
    if k >= &BigUint::from(2u8) {
        choices.push(2);
        choices.push(3);
    }
    let pick = choices[rng.random_range(0..choices.len())];
    match pick {
        // (k - r) + r
        0 => {
            let r = random_below(rng, k);
            Arith::Add(lit(k - &r), lit(r))
        }
        // (k + r) - r
        1 => {
            let room = &max - k;
            let cap = BigUint::one() << (k.bits() + 8).min(255) as usize;
            let r = random_below(rng, &room.min(cap).max(BigUint::one()));
            Arith::Sub(lit(k + &r), lit(r))
        }
        // q * r + m
        2 => {
            let cap = k.clone().min(BigUint::one() << 64usize);
            let r = random_below(rng, &(cap - 1u8)) + 1u8;
            let (q, m) = (k / &r, k % &r);
            Arith::Add(Box::new(Arith::Mul(lit(q), lit(r))), lit(m))
        }
        // (q << s) + m
        3 => {
            let s = rng.random_range(1..=(k.bits() - 1).min(64)) as u32;
            let mask = (BigUint::one() << s as usize) - 1u8;
            Arith::Add(
                Box::new(Arith::Shl(lit(k >> s as usize), s)),
                lit(k & &mask),
            )
        }
        // a ^ r
        _ => {
            let r = random_bits(rng, k.bits().max(8));
            Arith::Xor(lit(k ^ &r), lit(r))
        }
    }
}

fn expand(rng: &mut StdRng, k: &BigUint, depth: u32) -> Arith {
    if depth == 0 {
        return Arith::Lit(k.clone());
    }
    split(rng, k).deepen(rng, depth - 1)
}

/// A literal-only expression equal to `k`, `depth` decomposition levels deep. The result is
/// checked by evaluation, and after repeated failures the plain literal comes back.
pub fn encode_literal(rng: &mut StdRng, k: &BigUint, depth: u32) -> Arith {
    for _ in 0..RETRIES {
        let tree = expand(rng, k, depth);
        if tree.eval().as_ref() == Some(k) {
            return tree;
        }
    }
    Arith::Lit(k.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::random::{pass_rng, random_word};

    #[test]
    fn test_eval_rejects_out_of_range() {
        let underflow = Arith::Sub(lit(BigUint::from(1u8)), lit(BigUint::from(2u8)));
        assert_eq!(underflow.eval(), None);
        let overflow = Arith::Add(lit(word_limit() - 1u8), lit(BigUint::one()));
        assert_eq!(overflow.eval(), None);
        let shift = Arith::Shl(lit(BigUint::from(3u8)), 255);
        assert_eq!(shift.eval(), None);
    }

    #[test]
    fn test_encodings_evaluate_to_the_literal() {
        let mut rng = pass_rng(Some(11), "integer");
        let mut values = vec![
            BigUint::zero(),
            BigUint::one(),
            BigUint::from(2u8),
            BigUint::from(255u8),
            BigUint::from(1_000_000u32),
            word_limit() - 1u8,
            BigUint::one() << 255usize,
        ];
        for _ in 0..32 {
            values.push(random_word(&mut rng));
        }
        for depth in 1..=3 {
            for k in &values {
                let tree = encode_literal(&mut rng, k, depth);
                assert_eq!(tree.eval().as_ref(), Some(k), "{}", tree.render());
            }
        }
    }

    #[test]
    fn test_render_shape() {
        let tree = Arith::Add(
            Box::new(Arith::Shl(lit(BigUint::from(5u8)), 3)),
            lit(BigUint::from(2u8)),
        );
        assert_eq!(tree.render(), "((5 << 3) + 2)");
        assert_eq!(tree.eval(), Some(BigUint::from(42u8)));
        assert_eq!(render_uint(&(BigUint::one() << 40usize)), "0x10000000000");
    }
}
