use crate::output::{OutputFormat, OutputFormatter, TextFormatter};
use anyhow::Result;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use veil_core::{Diagnostic, Severity};
use veil_transform::{PipelineError, PipelineOutput, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub step: usize,
    pub pass: String,
    pub changed: bool,
    pub bytes: usize,
    pub warnings: usize,
}

impl PassSummary {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            step: snapshot.step,
            pass: snapshot.pass.to_string(),
            changed: snapshot.changed,
            bytes: snapshot.source.len(),
            warnings: snapshot
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .count(),
        }
    }
}

/// What one pipeline run did, pass by pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub input: Option<String>,
    pub seed: Option<u64>,
    pub input_bytes: usize,
    pub output_bytes: usize,
    pub passes: Vec<PassSummary>,
    pub diagnostics: Vec<Diagnostic>,
    pub renamed: usize,
    /// Set when a fatal error stopped the run.
    pub failure: Option<String>,
}

impl RunReport {
    pub fn from_output(input: &str, output: &PipelineOutput, seed: Option<u64>) -> Self {
        Self {
            input: None,
            seed,
            input_bytes: input.len(),
            output_bytes: output.source.len(),
            passes: output.snapshots.iter().map(PassSummary::from_snapshot).collect(),
            diagnostics: output.diagnostics.clone(),
            renamed: output.mapping.as_ref().map_or(0, |m| m.mapping.len()),
            failure: None,
        }
    }

    pub fn from_error(input: &str, error: &PipelineError, seed: Option<u64>) -> Self {
        Self {
            input: None,
            seed,
            input_bytes: input.len(),
            output_bytes: error.last_good.len(),
            passes: error.snapshots.iter().map(PassSummary::from_snapshot).collect(),
            diagnostics: error
                .snapshots
                .iter()
                .flat_map(|s| s.diagnostics.iter().cloned())
                .collect(),
            renamed: 0,
            failure: Some(error.to_string()),
        }
    }

    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input = Some(name.into());
        self
    }

    pub fn warnings(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn render(&self, format: OutputFormat, use_colors: bool) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Text => Ok(self.render_text(&TextFormatter::new(use_colors), use_colors)),
        }
    }

    fn render_text(&self, formatter: &dyn OutputFormatter, use_colors: bool) -> String {
        let mut out = formatter.format_section("Veil run");
        if let Some(input) = &self.input {
            out.push_str(&formatter.format_pair("input", input));
            out.push('\n');
        }
        let seed = self
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "random".to_string());
        out.push_str(&formatter.format_pair("seed", &seed));
        out.push('\n');
        out.push_str(&formatter.format_pair(
            "size",
            &format!("{} -> {} bytes", self.input_bytes, self.output_bytes),
        ));
        out.push('\n');
        if self.renamed > 0 {
            out.push_str(&formatter.format_pair("renamed", &self.renamed.to_string()));
            out.push('\n');
        }

        out.push_str(&formatter.format_section("Passes"));
        let width = self.passes.iter().map(|p| p.pass.len()).max().unwrap_or(0);
        let rows: Vec<String> = self
            .passes
            .iter()
            .map(|p| {
                let status = match (p.changed, use_colors) {
                    (true, true) => "rewritten".green().to_string(),
                    (true, false) => "rewritten".to_string(),
                    (false, true) => "unchanged".dimmed().to_string(),
                    (false, false) => "unchanged".to_string(),
                };
                let mut row = format!(
                    "{:>2} {:<width$}  {}  ({} bytes)",
                    p.step,
                    p.pass,
                    status,
                    p.bytes,
                    width = width
                );
                if p.warnings > 0 {
                    let note = format!(", {} warning(s)", p.warnings);
                    row.push_str(&if use_colors {
                        note.yellow().to_string()
                    } else {
                        note
                    });
                }
                row
            })
            .collect();
        out.push_str(&formatter.format_list(&rows));
        out.push('\n');

        let warnings: Vec<String> = self
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| d.to_string())
            .collect();
        if !warnings.is_empty() {
            out.push_str(&formatter.format_section("Warnings"));
            out.push_str(&formatter.format_list(&warnings));
            out.push('\n');
        }

        if let Some(failure) = &self.failure {
            out.push_str(&formatter.format_section("Failed"));
            out.push_str(&if use_colors {
                failure.bright_red().to_string()
            } else {
                failure.clone()
            });
            out.push('\n');
        }
        out
    }
}
