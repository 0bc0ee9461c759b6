use crate::core::{ComplianceReport, Status};
use anyhow::{bail, Result};
use std::io::Write;

/// How a report is written out.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Plain,
    Json,
}

// === impl Format ===

impl std::str::FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            s => bail!("invalid output format: {s}"),
        }
    }
}

impl Format {
    pub fn render(&self, report: &ComplianceReport, out: &mut impl Write) -> Result<()> {
        match self {
            Self::Plain => plain(report, out),
            Self::Json => {
                serde_json::to_writer_pretty(&mut *out, report)?;
                writeln!(out)?;
                Ok(())
            }
        }
    }
}

fn plain(report: &ComplianceReport, out: &mut impl Write) -> Result<()> {
    for group in report.groups() {
        writeln!(out, "{}", group.title)?;
        for check in &group.checks {
            if check.additional {
                writeln!(out, "      {}", check.detail)?;
            } else {
                writeln!(out, "  [{}] {}", check.status, check.detail)?;
            }
        }
        writeln!(out)?;
    }

    if report.is_failed() {
        writeln!(out, "Failed checks:")?;
        for (group, check) in report.failures() {
            writeln!(
                out,
                "  [{}] {}: {}",
                group.severity, group.title, check.detail
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{}", summary(report))?;
    Ok(())
}

/// Formats the final line of a report, e.g. `Passed: 3, Warning: 1`. The
/// failed count is only included when a check failed.
pub fn summary(report: &ComplianceReport) -> String {
    let mut line = format!(
        "Passed: {}, Warning: {}",
        report.status_count(Status::Passed),
        report.status_count(Status::Warning),
    );
    if report.is_failed() {
        line.push_str(&format!(", Failed: {}", report.failed_count()));
    }
    line
}
