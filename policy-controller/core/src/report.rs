//! Records the outcome of a verification run.
//!
//! A [`ComplianceReport`] holds an ordered list of named check groups. Failed
//! checks are data: they are recorded and the run carries on. A run fails its
//! gate when at least one check failed.

use serde::Serialize;
use std::fmt;

/// The severity assigned to checks of a newly created group.
pub const DEFAULT_SEVERITY: Severity = Severity::High;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Warning,
    Info,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Check {
    pub severity: Severity,
    pub status: Status,
    pub detail: String,
    /// Supplementary detail elaborating on the preceding record.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub additional: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckGroup {
    pub title: String,
    pub severity: Severity,
    pub checks: Vec<Check>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceReport {
    groups: Vec<CheckGroup>,
}

/// Appends records to a single check group.
#[derive(Debug)]
pub struct Recorder<'a> {
    group: &'a mut CheckGroup,
}

// === impl ComplianceReport ===

impl ComplianceReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with a recorder for the group named `title`, creating the
    /// group on first use.
    ///
    /// An error returned by `f` is an execution fault and is passed back to
    /// the caller; records appended before the error are kept.
    pub fn check<F, E>(&mut self, title: &str, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Recorder<'_>) -> Result<(), E>,
    {
        let group = self.group_mut(title);
        f(&mut Recorder { group })
    }

    pub fn groups(&self) -> &[CheckGroup] {
        &self.groups
    }

    pub fn get_group(&self, title: &str) -> Option<&CheckGroup> {
        self.groups.iter().find(|g| g.title == title)
    }

    fn group_mut(&mut self, title: &str) -> &mut CheckGroup {
        let idx = match self.groups.iter().position(|g| g.title == title) {
            Some(idx) => idx,
            None => {
                self.groups.push(CheckGroup {
                    title: title.to_string(),
                    severity: DEFAULT_SEVERITY,
                    checks: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }

    pub fn checks(&self) -> impl Iterator<Item = (&CheckGroup, &Check)> {
        self.groups
            .iter()
            .flat_map(|g| g.checks.iter().map(move |c| (g, c)))
    }

    pub fn status_count(&self, status: Status) -> usize {
        self.checks().filter(|(_, c)| c.status == status).count()
    }

    pub fn passed_count(&self) -> usize {
        self.status_count(Status::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.status_count(Status::Failed)
    }

    pub fn warning_count(&self) -> usize {
        self.status_count(Status::Warning)
    }

    pub fn skipped_count(&self) -> usize {
        self.status_count(Status::Skipped)
    }

    /// The gate: a run fails if any check failed. Warnings and skips never
    /// fail a run.
    pub fn is_failed(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&CheckGroup, &Check)> {
        self.checks().filter(|(_, c)| c.status == Status::Failed)
    }
}

// === impl Recorder ===

impl Recorder<'_> {
    pub fn title(&self) -> &str {
        &self.group.title
    }

    pub fn passed(&mut self, detail: impl fmt::Display) {
        self.record(Status::Passed, detail)
    }

    pub fn failed(&mut self, detail: impl fmt::Display) {
        self.record(Status::Failed, detail)
    }

    pub fn warning(&mut self, detail: impl fmt::Display) {
        self.record(Status::Warning, detail)
    }

    pub fn skipped(&mut self, detail: impl fmt::Display) {
        self.record(Status::Skipped, detail)
    }

    pub fn info(&mut self, detail: impl fmt::Display) {
        self.record(Status::Info, detail)
    }

    /// Records supplementary detail for the preceding record. Additional
    /// records are informational and never fail a run.
    pub fn additional(&mut self, detail: impl fmt::Display) {
        self.push(Status::Info, detail, true)
    }

    fn record(&mut self, status: Status, detail: impl fmt::Display) {
        self.push(status, detail, false)
    }

    fn push(&mut self, status: Status, detail: impl fmt::Display, additional: bool) {
        self.group.checks.push(Check {
            severity: self.group.severity,
            status,
            detail: detail.to_string(),
            additional,
        });
    }
}

// === impl Severity ===

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => f.write_str("CRITICAL"),
            Self::High => f.write_str("HIGH"),
            Self::Medium => f.write_str("MEDIUM"),
            Self::Low => f.write_str("LOW"),
        }
    }
}

// === impl Status ===

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("PASSED"),
            Self::Failed => f.write_str("FAILED"),
            Self::Skipped => f.write_str("SKIPPED"),
            Self::Warning => f.write_str("WARNING"),
            Self::Info => f.write_str("INFO"),
        }
    }
}
