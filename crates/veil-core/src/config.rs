use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// `v0`, `v1`, ... in allocation order.
    #[default]
    Counter,
    /// Short salted digests of the original name.
    Hashed,
}

/// Which passes of the pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassToggles {
    pub inline: bool,
    pub opaque_predicates: bool,
    pub flatten: bool,
    pub promote_locals: bool,
    pub blind_constants: bool,
    pub substitute_booleans: bool,
    pub substitute_integers: bool,
    pub split_scalars: bool,
    pub strip_comments: bool,
    pub scramble_format: bool,
    pub rename: bool,
}

impl Default for PassToggles {
    fn default() -> Self {
        Self::all(true)
    }
}

impl PassToggles {
    pub fn all(enabled: bool) -> Self {
        Self {
            inline: enabled,
            opaque_predicates: enabled,
            flatten: enabled,
            promote_locals: enabled,
            blind_constants: enabled,
            substitute_booleans: enabled,
            substitute_integers: enabled,
            split_scalars: enabled,
            strip_comments: enabled,
            scramble_format: enabled,
            rename: enabled,
        }
    }

    /// Looks a toggle up by its pass name.
    pub fn get_mut(&mut self, pass: &str) -> Option<&mut bool> {
        Some(match pass {
            "inline" => &mut self.inline,
            "opaque" => &mut self.opaque_predicates,
            "flatten" => &mut self.flatten,
            "promote" => &mut self.promote_locals,
            "blind" => &mut self.blind_constants,
            "boolean" => &mut self.substitute_booleans,
            "integer" => &mut self.substitute_integers,
            "split" => &mut self.split_scalars,
            "comments" => &mut self.strip_comments,
            "minify" => &mut self.scramble_format,
            "rename" => &mut self.rename,
            _ => return None,
        })
    }

    pub fn is_enabled(&self, pass: &str) -> bool {
        match pass {
            "inline" => self.inline,
            "opaque" => self.opaque_predicates,
            "flatten" => self.flatten,
            "promote" => self.promote_locals,
            "blind" => self.blind_constants,
            "boolean" => self.substitute_booleans,
            "integer" => self.substitute_integers,
            "split" => self.split_scalars,
            "comments" => self.strip_comments,
            "minify" => self.scramble_format,
            "rename" => self.rename,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineConfig {
    pub modifiers: bool,
    pub internal_calls: bool,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            modifiers: true,
            internal_calls: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpaqueConfig {
    /// Fraction of eligible sites that receive a predicate.
    pub ratio: f64,
}

impl Default for OpaqueConfig {
    fn default() -> Self {
        Self { ratio: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegerConfig {
    /// How many times each generated leaf may itself be rewritten.
    pub depth: u32,
    /// Literals above this many bits are left alone.
    pub max_bits: u64,
}

impl Default for IntegerConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            max_bits: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationConfig {
    /// Seed for every random choice. `None` draws from the OS.
    pub seed: Option<u64>,
    pub passes: PassToggles,
    pub inline: InlineConfig,
    pub opaque: OpaqueConfig,
    pub integer: IntegerConfig,
    /// Identical literals share one table slot.
    pub dedupe_literals: bool,
    pub naming: NamingStrategy,
    pub hash_salt: Option<String>,
    pub retain_mapping: bool,
    /// Keep the `SPDX-License-Identifier` comment when stripping comments.
    pub keep_license: bool,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            passes: PassToggles::default(),
            inline: InlineConfig::default(),
            opaque: OpaqueConfig::default(),
            integer: IntegerConfig::default(),
            dedupe_literals: true,
            naming: NamingStrategy::Counter,
            hash_salt: None,
            retain_mapping: false,
            keep_license: true,
        }
    }
}

impl ObfuscationConfig {
    /// Every pass, hashed names and a denser predicate ratio.
    pub fn standard() -> Self {
        Self {
            naming: NamingStrategy::Hashed,
            opaque: OpaqueConfig { ratio: 0.8 },
            integer: IntegerConfig {
                depth: 2,
                ..IntegerConfig::default()
            },
            retain_mapping: true,
            ..Self::default()
        }
    }

    /// Layout passes only. Control and data flow are left as written.
    pub fn minimal() -> Self {
        let mut passes = PassToggles::all(false);
        passes.strip_comments = true;
        passes.scramble_format = true;
        passes.rename = true;
        Self {
            passes,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: ObfuscationConfig = serde_json::from_str(&json)?;
        Ok(config)
    }
}
