//! Output formatting for `list-tools`

use crate::plugins::{Plugin, Stability};
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

/// What `list-tools` reports about one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub stability: Stability,
    pub description: &'static str,
}

impl ToolInfo {
    pub fn from_plugin(plugin: &dyn Plugin) -> Self {
        Self {
            name: plugin.name(),
            stability: plugin.stability(),
            description: plugin.description(),
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_tools(&self, tools: &[ToolInfo]) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(tools).context("Failed to serialize tools to JSON")
            }
            OutputFormat::Human => Ok(self.format_tools_human(tools)),
        }
    }

    fn format_tools_human(&self, tools: &[ToolInfo]) -> String {
        let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
        let mut out = String::new();
        for tool in tools {
            let marker = match tool.stability {
                Stability::Stable => String::new(),
                other => format!(" [{}]", other),
            };
            out.push_str(&format!(
                "{:width$}  {}{}\n",
                tool.name,
                tool.description,
                marker,
                width = width
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Vec<ToolInfo> {
        vec![
            ToolInfo {
                name: "gcc",
                stability: Stability::Stable,
                description: "GCC warnings",
            },
            ToolInfo {
                name: "unicontrol",
                stability: Stability::Experimental,
                description: "Unicode control characters",
            },
        ]
    }

    #[test]
    fn test_format_human() {
        let out = OutputFormatter::new(OutputFormat::Human)
            .format_tools(&tools())
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "gcc         GCC warnings");
        assert_eq!(
            lines[1],
            "unicontrol  Unicode control characters [experimental]"
        );
    }

    #[test]
    fn test_format_json() {
        let out = OutputFormatter::new(OutputFormat::Json)
            .format_tools(&tools())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["name"], "gcc");
        assert_eq!(value[0]["stability"], "stable");
        assert_eq!(value[1]["stability"], "experimental");
    }
}
