/*! Generated code fragments whose value is known ahead of time: literal-only arithmetic that folds
 * back to a given integer, and predicates that always evaluate to a given boolean. Both come with a
 * checked evaluator over 256-bit words.
 */

pub mod arith;
pub mod chaotic;
pub mod predicate;

pub use arith::{encode_literal, render_uint, Arith};
pub use chaotic::ChaoticMap;
pub use predicate::{Identity, PredExpr, Predicate};

use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::Rng;

/// A free variable usable in pure code: the hash of a random constant.
pub fn keccak_source(rng: &mut StdRng) -> (u64, String) {
    let n: u64 = rng.random();
    (
        n,
        format!("uint256(keccak256(abi.encodePacked(uint256({}))))", n),
    )
}

/// A fresh 256-bit seed value for a state slot, as a literal.
pub fn seed_literal(rng: &mut StdRng) -> String {
    let value: BigUint = veil_core::random::random_word(rng);
    render_uint(&value)
}
