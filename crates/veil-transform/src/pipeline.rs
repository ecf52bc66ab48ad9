//! Runs the enabled passes in their fixed order, re-parsing between steps.

use crate::{all_passes, Transform};
use std::collections::HashMap;
use thiserror::Error;
use veil_core::{
    Diagnostic, NamingStrategy, ObfuscationConfig, ObfuscationMapping, Severity, TransformError,
};

pub const PASS_ORDER: [&str; 11] = [
    "inline", "opaque", "flatten", "promote", "blind", "boolean", "integer", "split", "comments",
    "minify", "rename",
];

/// The text after one pass, numbered from 1 in the order the passes ran.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub step: usize,
    pub pass: &'static str,
    pub source: String,
    pub changed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub source: String,
    pub snapshots: Vec<Snapshot>,
    pub diagnostics: Vec<Diagnostic>,
    pub mapping: Option<ObfuscationMapping>,
}

/// A fatal failure. `last_good` is the newest text that parsed, `snapshots` what ran before it.
#[derive(Error, Debug)]
#[error("Pass `{pass}` failed: {error}")]
pub struct PipelineError {
    pub pass: String,
    #[source]
    pub error: TransformError,
    pub last_good: String,
    pub snapshots: Vec<Snapshot>,
}

pub struct Pipeline {
    config: ObfuscationConfig,
    passes: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new(config: ObfuscationConfig) -> Self {
        let passes = all_passes()
            .into_iter()
            .filter(|p| config.passes.is_enabled(p.name()))
            .collect();
        Self { config, passes }
    }

    /// Runs exactly `passes`, in the order given, ignoring the toggles.
    pub fn with_passes(config: ObfuscationConfig, passes: Vec<Box<dyn Transform>>) -> Self {
        Self { config, passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn config(&self) -> &ObfuscationConfig {
        &self.config
    }

    pub fn run(&self, source: &str) -> Result<PipelineOutput, PipelineError> {
        if let Err(e) = veil_parser::validate(source) {
            return Err(PipelineError {
                pass: "input".to_string(),
                error: e.into(),
                last_good: source.to_string(),
                snapshots: Vec::new(),
            });
        }

        let mut current = source.to_string();
        let mut snapshots = Vec::with_capacity(self.passes.len());
        let mut diagnostics = Vec::new();
        let mut renamed: HashMap<String, String> = HashMap::new();

        for (index, pass) in self.passes.iter().enumerate() {
            let step = index + 1;
            tracing::info!(step, pass = pass.name(), "running pass");

            let output = match pass.apply(&current, &self.config) {
                Ok(output) => output,
                Err(error) if error.is_fatal() => {
                    tracing::warn!(pass = pass.name(), "{}", error);
                    return Err(PipelineError {
                        pass: pass.name().to_string(),
                        error,
                        last_good: current,
                        snapshots,
                    });
                }
                Err(error) => {
                    tracing::warn!(pass = pass.name(), "{}", error);
                    let diagnostic = Diagnostic {
                        pass: pass.name().to_string(),
                        severity: Severity::Warning,
                        line: 0,
                        column: 0,
                        message: error.to_string(),
                    };
                    diagnostics.push(diagnostic.clone());
                    snapshots.push(Snapshot {
                        step,
                        pass: pass.name(),
                        source: current.clone(),
                        changed: false,
                        diagnostics: vec![diagnostic],
                    });
                    continue;
                }
            };

            if output.changed {
                if let Err(e) = veil_parser::validate(&output.source) {
                    tracing::warn!(pass = pass.name(), "output does not parse: {}", e);
                    return Err(PipelineError {
                        pass: pass.name().to_string(),
                        error: e.into(),
                        last_good: current,
                        snapshots,
                    });
                }
            }

            for diagnostic in &output.diagnostics {
                if diagnostic.severity == Severity::Warning {
                    tracing::warn!("{}", diagnostic);
                }
            }
            diagnostics.extend(output.diagnostics.iter().cloned());
            renamed.extend(output.mapping);
            current = output.source;
            snapshots.push(Snapshot {
                step,
                pass: pass.name(),
                source: current.clone(),
                changed: output.changed,
                diagnostics: output.diagnostics,
            });
        }

        let mapping = (self.config.retain_mapping && !renamed.is_empty()).then(|| {
            let naming = match self.config.naming {
                NamingStrategy::Counter => "counter",
                NamingStrategy::Hashed => "hashed",
            };
            ObfuscationMapping::new(
                renamed,
                naming,
                self.config.hash_salt.clone(),
                self.config.seed,
            )
        });

        tracing::info!(
            passes = snapshots.len(),
            changed = snapshots.iter().filter(|s| s.changed).count(),
            "pipeline finished"
        );
        Ok(PipelineOutput {
            source: current,
            snapshots,
            diagnostics,
            mapping,
        })
    }
}
