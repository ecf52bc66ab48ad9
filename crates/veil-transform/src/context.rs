use crate::PassOutput;
use rand::rngs::StdRng;
use veil_core::random::pass_rng;
use veil_core::{
    Diagnostic, LineIndex, NameGenerator, ObfuscationConfig, Severity, SymbolTable, SyntaxTree,
    TransformError,
};

/// Everything one pass needs besides the tree: resolved symbols, a name allocator seeded from the
/// snapshot, its random stream and a place to put diagnostics.
pub struct PassContext<'a> {
    pub pass: &'static str,
    pub config: &'a ObfuscationConfig,
    pub symbols: SymbolTable,
    pub names: NameGenerator,
    pub rng: StdRng,
    lines: LineIndex,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> PassContext<'a> {
    pub fn new(pass: &'static str, tree: &SyntaxTree, config: &'a ObfuscationConfig) -> Self {
        Self {
            pass,
            config,
            symbols: SymbolTable::build(tree),
            names: NameGenerator::for_source(tree.source(), config),
            rng: pass_rng(config.seed, pass),
            lines: LineIndex::new(tree.source()),
            diagnostics: Vec::new(),
        }
    }

    pub fn record(&mut self, severity: Severity, offset: usize, message: String) {
        let (line, column) = self.lines.location(offset);
        self.diagnostics.push(Diagnostic {
            pass: self.pass.to_string(),
            severity,
            line,
            column,
            message,
        });
    }

    /// Records a recoverable error. The caller has already dropped the construct it concerns.
    pub fn warn(&mut self, error: TransformError) {
        let offset = error.span().map(|s| s.offset).unwrap_or(0);
        let (line, column) = self.lines.location(offset);
        tracing::warn!(pass = self.pass, line, column, "{}", error);
        self.record(Severity::Warning, offset, error.to_string());
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn finish(self, source: String, changed: bool) -> PassOutput {
        PassOutput {
            source,
            changed,
            diagnostics: self.diagnostics,
            mapping: self.names.export_mapping(),
        }
    }
}
