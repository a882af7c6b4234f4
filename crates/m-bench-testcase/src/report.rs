//! ---
//! mb_section: "05-test-case-engine"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Test case model, step polling engine, and result reporting."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::{CaseStatus, StepStatus};

/// Errors surfaced while exporting a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// CSV serialization failed.
    #[error("failed to write report: {0}")]
    Csv(#[from] csv::Error),
    /// Underlying file I/O failed.
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Recorded verdict of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Step name as defined on the case.
    pub label: String,
    /// Final verdict of the step.
    pub status: StepStatus,
    /// Detail from the deciding invocation, if any.
    pub info: Option<String>,
    /// How many times the step body was invoked.
    pub attempts: u32,
}

impl StepReport {
    pub(crate) fn pending(label: &str) -> Self {
        Self {
            label: label.to_string(),
            status: StepStatus::NotRun,
            info: None,
            attempts: 0,
        }
    }
}

/// Full record of one case run: per-step verdicts plus the aggregate.
#[derive(Debug, Clone)]
pub struct CaseReport {
    /// Name of the case that ran.
    pub case_name: String,
    /// Aggregate verdict.
    pub verdict: CaseStatus,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run ended, after hook included.
    pub finished_at: DateTime<Utc>,
    /// Per-step verdicts in definition order.
    pub steps: Vec<StepReport>,
    /// Failure reported by the after hook, if it failed.
    pub after_hook_error: Option<String>,
}

impl CaseReport {
    /// Export the per-step results as CSV, one row per step, with a trailing
    /// summary row carrying the case verdict.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), ReportError> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(["Step", "Status", "Attempts", "Info"])?;
        for step in &self.steps {
            writer.write_record([
                step.label.as_str(),
                &step.status.to_string(),
                &step.attempts.to_string(),
                step.info.as_deref().unwrap_or(""),
            ])?;
        }
        writer.write_record([
            self.case_name.as_str(),
            &self.verdict.to_string(),
            "",
            &format!(
                "started {} finished {}",
                self.started_at.to_rfc3339(),
                self.finished_at.to_rfc3339()
            ),
        ])?;
        writer.flush()?;
        info!(case = %self.case_name, path = %path.as_ref().display(), "case report exported");
        Ok(())
    }
}
