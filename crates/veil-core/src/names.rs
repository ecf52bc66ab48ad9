use crate::config::{NamingStrategy, ObfuscationConfig};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Words that must never be produced as a generated identifier.
pub const RESERVED: &[&str] = &[
    "abstract", "address", "after", "alias", "anonymous", "apply", "as", "assembly", "assert",
    "auto", "bool", "break", "byte", "bytes", "calldata", "case", "catch", "constant",
    "constructor", "continue", "contract", "copyof", "days", "default", "define", "delete", "do",
    "else", "emit", "enum", "error", "ether", "event", "external", "fallback", "false", "final",
    "finney", "fixed", "for", "from", "function", "global", "gwei", "hex", "hours", "if",
    "immutable", "implements", "import", "in", "indexed", "inline", "interface", "internal", "is",
    "let", "library", "macro", "mapping", "match", "memory", "minutes", "modifier", "mutable",
    "new", "null", "of", "override", "partial", "payable", "pragma", "private", "promise",
    "public", "pure", "receive", "reference", "relocatable", "require", "return", "returns",
    "revert", "sealed", "seconds", "sizeof", "static", "storage", "string", "struct", "super",
    "supports", "switch", "szabo", "this", "throw", "true", "try", "type", "typedef", "typeof",
    "ufixed", "unchecked", "unicode", "using", "var", "view", "virtual", "weeks", "wei", "while",
    "years", "abi", "block", "msg", "tx", "now", "gasleft", "blockhash", "keccak256", "sha256",
    "ripemd160", "ecrecover", "addmod", "mulmod", "selfdestruct", "suicide", "int", "uint",
];

pub fn is_reserved(word: &str) -> bool {
    if RESERVED.contains(&word) {
        return true;
    }
    ["uint", "int", "bytes", "fixed", "ufixed"].iter().any(|p| {
        word.strip_prefix(p)
            .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == 'x'))
            .unwrap_or(false)
    })
}

/// Every identifier-like word in `source`, comments and strings included.
pub fn words(source: &str) -> HashSet<String> {
    source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
        .filter(|w| !w.is_empty() && !w.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Allocates identifiers that collide with nothing in a source snapshot.
///
/// Uniqueness depends only on the snapshot and the allocation counter, so two generators built
/// from the same text hand out the same names in the same order.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    strategy: NamingStrategy,
    salt: Option<String>,
    taken: HashSet<String>,
    counter: usize,
    mapping: HashMap<String, String>,
}

impl NameGenerator {
    pub fn new(strategy: NamingStrategy, salt: Option<String>, taken: HashSet<String>) -> Self {
        Self {
            strategy,
            salt,
            taken,
            counter: 0,
            mapping: HashMap::new(),
        }
    }

    pub fn for_source(source: &str, config: &ObfuscationConfig) -> Self {
        Self::new(config.naming, config.hash_salt.clone(), words(source))
    }

    fn available(&self, name: &str) -> bool {
        !self.taken.contains(name) && !is_reserved(name)
    }

    fn claim(&mut self, name: String) -> String {
        self.taken.insert(name.clone());
        name
    }

    /// `base` itself when free, otherwise `base_1`, `base_2`, ...
    pub fn fresh(&mut self, base: &str) -> String {
        if self.available(base) {
            return self.claim(base.to_string());
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.available(&candidate) {
                return self.claim(candidate);
            }
            n += 1;
        }
    }

    /// A replacement for `original`, shaped by the configured strategy. The result is recorded
    /// for [`NameGenerator::export_mapping`].
    pub fn rename(&mut self, original: &str, prefix: &str) -> String {
        let name = loop {
            let candidate = match self.strategy {
                NamingStrategy::Counter => format!("{}{}", prefix, self.counter),
                NamingStrategy::Hashed => self.hash_name(original, prefix),
            };
            self.counter += 1;
            if self.available(&candidate) {
                break self.claim(candidate);
            }
        };
        self.mapping.insert(name.clone(), original.to_string());
        name
    }

    fn hash_name(&self, name: &str, prefix: &str) -> String {
        let mut hasher = Sha256::new();
        if let Some(salt) = &self.salt {
            hasher.update(salt.as_bytes());
        }
        hasher.update(name.as_bytes());
        hasher.update(self.counter.to_le_bytes());
        let hash = hasher.finalize();

        format!("{}_{:02x}{:02x}{:02x}", prefix, hash[0], hash[1], hash[2])
    }

    /// Generated name to original name, for every call to [`NameGenerator::rename`].
    pub fn export_mapping(&self) -> HashMap<String, String> {
        self.mapping.clone()
    }
}
