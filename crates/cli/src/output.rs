// Output formatting for CLI

use std::io::Write;

use anyhow::Result;
use inferbench::RunReport;
use serde::Serialize;

#[derive(Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yaml::to_string(value)?);
            }
            OutputFormat::Text => {
                // Text format is rendered by the value's own printer
            }
        }
        Ok(())
    }

    pub fn print_report(&self, report: &RunReport) -> Result<()> {
        if self.is_text() {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            report.render_text(&mut out)?;
            out.flush()?;
            return Ok(());
        }
        self.print_value(report)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}
