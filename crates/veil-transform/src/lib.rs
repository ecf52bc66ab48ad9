/*! Source-to-source obfuscation passes for Solidity.
 *
 * Each pass reads one parsed snapshot, decides what to rewrite and returns that decision as span
 * edits. Nothing here mutates a tree: the rewrite engine turns the edits into new text and the
 * pipeline parses that text again before the next pass sees it. Passes fall into three groups:
 * control flow (inlining, opaque predicates, flattening), data flow (promotion, constant blinding,
 * literal substitution, scalar splitting) and layout (comments, formatting, names).
 */

pub mod analysis;
pub mod context;
pub mod control_flow;
pub mod data_flow;
pub mod layout;
pub mod pipeline;
pub mod synth;
mod util;

use std::collections::HashMap;
use veil_core::{
    Diagnostic, EditSet, ObfuscationConfig, Result, Severity, SyntaxTree, TransformError,
};

pub use context::PassContext;
pub use pipeline::{Pipeline, PipelineError, PipelineOutput, Snapshot, PASS_ORDER};

/// Result of running one pass over one snapshot.
#[derive(Debug, Clone)]
pub struct PassOutput {
    pub source: String,
    pub changed: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Generated name to original name, for passes that rename.
    pub mapping: HashMap<String, String>,
}

pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        "No description provided"
    }

    /// Decides the rewrite for `tree`. Recoverable problems go to `cx` and the affected construct
    /// is left out of the returned edits.
    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet>;

    fn apply(&self, source: &str, config: &ObfuscationConfig) -> Result<PassOutput> {
        let tree = veil_parser::parse(source)?;
        let mut cx = PassContext::new(self.name(), &tree, config);
        tracing::debug!(pass = self.name(), "planning");

        let edits = self.plan(&tree, &mut cx)?;
        if edits.is_empty() {
            let skipped = TransformError::IneligibleTarget { pass: self.name() };
            tracing::info!(pass = self.name(), "{}", skipped);
            cx.record(Severity::Info, 0, skipped.to_string());
            return Ok(cx.finish(source.to_string(), false));
        }

        tracing::info!(pass = self.name(), edits = edits.len(), "rewriting");
        let output = edits.apply(source)?;
        let changed = output != source;
        Ok(cx.finish(output, changed))
    }
}

/// Every pass in pipeline order.
pub fn all_passes() -> Vec<Box<dyn Transform>> {
    vec![
        Box::new(control_flow::inline::Inliner),
        Box::new(control_flow::opaque::OpaquePredicates),
        Box::new(control_flow::flatten::Flattener),
        Box::new(data_flow::promote::StatePromotion),
        Box::new(data_flow::blind::ConstantBlinding),
        Box::new(data_flow::substitute::BooleanSubstitution),
        Box::new(data_flow::substitute::IntegerSubstitution),
        Box::new(data_flow::split::ScalarSplit),
        Box::new(layout::comments::CommentRemoval),
        Box::new(layout::minify::Minifier),
        Box::new(layout::rename::Renamer),
    ]
}

/// Looks a pass up by its toggle name.
pub fn pass_named(name: &str) -> Option<Box<dyn Transform>> {
    all_passes().into_iter().find(|p| p.name() == name)
}
