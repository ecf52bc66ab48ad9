//! Chaotic-map predicates. A private seed goes through a helper that hashes it and folds the hash
//! into a fixed range, so a range or parity check on the result has a known outcome while the
//! value itself looks arbitrary.

use num_bigint::BigUint;
use num_traits::Zero;
use rand::rngs::StdRng;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaoticMap {
    /// `h % 100 + 20`, always above 10.
    Raised,
    /// `150 - h % 100`, always below 160.
    Mirrored,
    /// `h % 50 * 2`, always even.
    Doubled,
}

pub const CHAOTIC_MAPS: [ChaoticMap; 3] =
    [ChaoticMap::Raised, ChaoticMap::Mirrored, ChaoticMap::Doubled];

impl ChaoticMap {
    pub fn random(rng: &mut StdRng) -> Self {
        CHAOTIC_MAPS[rng.random_range(0..CHAOTIC_MAPS.len())]
    }

    /// The helper function, named `name`.
    pub fn helper(self, name: &str) -> String {
        let hash = "uint256(keccak256(abi.encodePacked(val)))";
        let body = match self {
            ChaoticMap::Raised => format!("({} % 100) + 20", hash),
            ChaoticMap::Mirrored => format!("150 - ({} % 100)", hash),
            ChaoticMap::Doubled => format!("({} % 50) * 2", hash),
        };
        format!(
            "\n    function {}(uint256 val) internal pure returns (uint256) {{\n        return {};\n    }}",
            name, body
        )
    }

    /// A check on `call` that evaluates to `label`.
    pub fn condition(self, call: &str, label: bool) -> String {
        match (self, label) {
            (ChaoticMap::Raised, true) => format!("({} > 10)", call),
            (ChaoticMap::Raised, false) => format!("({} <= 10)", call),
            (ChaoticMap::Mirrored, true) => format!("({} < 160)", call),
            (ChaoticMap::Mirrored, false) => format!("({} >= 160)", call),
            (ChaoticMap::Doubled, true) => format!("({} % 2 == 0)", call),
            (ChaoticMap::Doubled, false) => format!("({} % 2 != 0)", call),
        }
    }

    /// The helper's result for a given hash word.
    pub fn fold(self, hash: &BigUint) -> BigUint {
        match self {
            ChaoticMap::Raised => hash % 100u8 + 20u8,
            ChaoticMap::Mirrored => BigUint::from(150u8) - hash % 100u8,
            ChaoticMap::Doubled => hash % 50u8 * 2u8,
        }
    }

    /// Whether the true-labelled condition holds for a helper result.
    pub fn holds(self, value: &BigUint) -> bool {
        match self {
            ChaoticMap::Raised => *value > BigUint::from(10u8),
            ChaoticMap::Mirrored => *value < BigUint::from(160u8),
            ChaoticMap::Doubled => (value % 2u8).is_zero(),
        }
    }
}
