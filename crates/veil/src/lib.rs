/*! Unified interface for Solidity obfuscation.
 *
 * One import for the whole toolchain: parsing and validating source, configuring and running the
 * pass pipeline, and writing snapshots and run reports.
 */

pub use veil_core as core;
pub use veil_emit as emit;
pub use veil_parser as parser;
pub use veil_transform as transform;

pub use veil_core::{
    Diagnostic, NamingStrategy, ObfuscationConfig, ObfuscationMapping, PassToggles, Severity,
    TransformError,
};

pub use veil_emit::{OutputFormat, RunReport, SnapshotWriter};

pub use veil_parser::{parse, validate};

pub use veil_transform::{Pipeline, PipelineError, PipelineOutput, Snapshot, Transform, PASS_ORDER};

/// Runs every pass `config` enables over `source`.
pub fn obfuscate(source: &str, config: ObfuscationConfig) -> Result<PipelineOutput, PipelineError> {
    Pipeline::new(config).run(source)
}
