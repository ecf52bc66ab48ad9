use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow::anyhow!("Unknown output format `{}`", other)),
        }
    }
}

pub trait OutputFormatter {
    fn format_pair(&self, key: &str, value: &str) -> String;

    fn format_list(&self, items: &[String]) -> String;

    fn format_section(&self, title: &str) -> String;
}

/// Plain or colored terminal text.
pub struct TextFormatter {
    pub use_colors: bool,
}

impl TextFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }
}

impl OutputFormatter for TextFormatter {
    fn format_pair(&self, key: &str, value: &str) -> String {
        if self.use_colors {
            format!("{}: {}", key.bold(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    fn format_list(&self, items: &[String]) -> String {
        items
            .iter()
            .map(|item| format!("  - {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_section(&self, title: &str) -> String {
        if self.use_colors {
            format!("\n{}\n", format!("=== {} ===", title).bright_blue().bold())
        } else {
            format!("\n=== {} ===\n", title)
        }
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format_object<W: Write>(writer: &mut W, obj: &serde_json::Value) -> Result<()> {
        serde_json::to_writer_pretty(writer, obj)?;
        Ok(())
    }
}
