//! Printing command results.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// YAML, for people.
    #[default]
    Yaml,
    /// JSON, for piping.
    Json,
}

pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn render<T: Serialize>(&self, value: &T) -> anyhow::Result<String> {
        Ok(match self.format {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
        })
    }

    /// Prints `value` to stdout.
    pub fn write<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let out = self.render(value)?;
        println!("{}", out.trim_end());
        Ok(())
    }

    /// Writes raw bytes to `path`, or stdout when `path` is `-`.
    pub fn write_bytes(&self, data: &[u8], path: &Path) -> anyhow::Result<()> {
        if path == Path::new("-") {
            std::io::stdout().write_all(data)?;
            return Ok(());
        }
        let mut file = File::create(path)?;
        file.write_all(data)?;
        Ok(())
    }
}
