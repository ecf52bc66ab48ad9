use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Generated identifier to original identifier, as produced by the renaming pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationMapping {
    pub mapping: BTreeMap<String, String>,
    pub metadata: MappingMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingMetadata {
    pub created_at: String,
    pub naming: String,
    pub hash_salt: Option<String>,
    pub seed: Option<u64>,
}

impl ObfuscationMapping {
    pub fn new(
        mapping: impl IntoIterator<Item = (String, String)>,
        naming: &str,
        hash_salt: Option<String>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            mapping: mapping.into_iter().collect(),
            metadata: MappingMetadata {
                created_at: chrono::Utc::now().to_rfc3339(),
                naming: naming.to_string(),
                hash_salt,
                seed,
            },
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mapping: ObfuscationMapping = serde_json::from_str(&json)?;
        Ok(mapping)
    }

    pub fn original(&self, generated: &str) -> Option<&str> {
        self.mapping.get(generated).map(|s| s.as_str())
    }

    /// Rewrites every whole-word occurrence of a generated name in `text` back to its original.
    pub fn deobfuscate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut word = String::new();
        let flush = |word: &mut String, out: &mut String| {
            if !word.is_empty() {
                out.push_str(self.original(word.as_str()).unwrap_or(word.as_str()));
                word.clear();
            }
        };
        for c in text.chars() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                word.push(c);
            } else {
                flush(&mut word, &mut out);
                out.push(c);
            }
        }
        flush(&mut word, &mut out);
        out
    }
}
