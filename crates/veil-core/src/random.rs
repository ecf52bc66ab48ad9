use num_bigint::BigUint;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};

/// Deterministic stream for one pass: the same seed and pass name always give the same choices,
/// independent of which other passes ran. Without a seed the stream comes from the OS.
pub fn pass_rng(seed: Option<u64>, pass: &str) -> StdRng {
    match seed {
        Some(seed) => {
            let mut hasher = Sha256::new();
            hasher.update(b"VEIL_PASS_STREAM");
            hasher.update(seed.to_le_bytes());
            hasher.update(pass.as_bytes());
            let digest = hasher.finalize();
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&digest);
            StdRng::from_seed(bytes)
        }
        None => StdRng::from_os_rng(),
    }
}

/// A uniformly distributed 256-bit word.
pub fn random_word(rng: &mut StdRng) -> BigUint {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

/// A uniformly distributed value below `2^bits`.
pub fn random_bits(rng: &mut StdRng, bits: u64) -> BigUint {
    let word = random_word(rng);
    if bits >= 256 {
        return word;
    }
    word >> (256 - bits as usize)
}

/// A value in `1..=bound` (or 1 when `bound` is zero).
pub fn random_below(rng: &mut StdRng, bound: &BigUint) -> BigUint {
    if bound.bits() == 0 {
        return BigUint::from(1u8);
    }
    let bits = rng.random_range(1..=bound.bits());
    let candidate = random_bits(rng, bits);
    (candidate % bound) + 1u8
}
