//! ---
//! mb_section: "05-test-case-engine"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Test case model, step polling engine, and result reporting."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Test case step engine for the M-BENCH workspace.
//!
//! A test case is an ordered list of named steps over case-owned state.
//! Each step is a cheap synchronous check returning a [`StepOutcome`]; the
//! engine re-invokes a step at the configured interval for as long as it
//! answers [`StepStatus::InProgress`], up to an attempt budget. Terminal
//! verdicts stick. The engine runs under a [`ScriptContext`] from the script
//! host, so cancellation and liveness work the same way for cases as for
//! scripts.

#![warn(missing_docs)]

pub mod case;
pub mod engine;
pub mod report;

use serde::{Deserialize, Serialize};

pub use case::{CaseOptions, CasePolicy, StepDef, TestCase};
pub use engine::StepEngine;
pub use m_bench_script::ScriptContext;
pub use report::{CaseReport, ReportError, StepReport};

/// Verdict of a single step invocation.
///
/// `InProgress` is the only non-terminal status: it asks the engine to poll
/// again after the step interval. Every other status is final for the step
/// and the step body is never invoked again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// The step has not been invoked yet.
    NotRun,
    /// The step performed its action; nothing to verify.
    Actioned,
    /// The condition is not yet decided; poll again.
    InProgress,
    /// The step's condition held.
    Passed,
    /// The step's condition failed, or its attempt budget ran out.
    Failed,
    /// The step was never given a chance to decide.
    Skipped,
}

impl StepStatus {
    /// True when the engine must not invoke the step again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::NotRun | StepStatus::InProgress)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StepStatus::NotRun => "NOT_RUN",
            StepStatus::Actioned => "ACTIONED",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Passed => "PASSED",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

/// One step invocation's verdict plus optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Verdict of this invocation.
    pub status: StepStatus,
    /// Optional detail shown in reports and logs.
    pub info: Option<String>,
}

impl StepOutcome {
    /// The step's condition held.
    pub fn passed() -> Self {
        Self {
            status: StepStatus::Passed,
            info: None,
        }
    }

    /// The step acted; there is nothing to verify.
    pub fn actioned() -> Self {
        Self {
            status: StepStatus::Actioned,
            info: None,
        }
    }

    /// Not decided yet; ask to be polled again.
    pub fn in_progress() -> Self {
        Self {
            status: StepStatus::InProgress,
            info: None,
        }
    }

    /// The step failed for the given reason.
    pub fn failed(info: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            info: Some(info.into()),
        }
    }

    /// Attach detail to any outcome.
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

/// Aggregate verdict of a case run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    /// No run has begun yet.
    NotStarted,
    /// A run is in flight.
    Running,
    /// Every step reached a non-failing terminal verdict.
    Passed,
    /// At least one step failed, or setup failed.
    Failed,
    /// The run was stopped before every step could reach a verdict.
    Skipped,
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CaseStatus::NotStarted => "NOT_STARTED",
            CaseStatus::Running => "RUNNING",
            CaseStatus::Passed => "PASSED",
            CaseStatus::Failed => "FAILED",
            CaseStatus::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminality_matches_the_polling_contract() {
        assert!(!StepStatus::NotRun.is_terminal());
        assert!(!StepStatus::InProgress.is_terminal());
        for status in [
            StepStatus::Actioned,
            StepStatus::Passed,
            StepStatus::Failed,
            StepStatus::Skipped,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn outcome_constructors_carry_status_and_info() {
        assert_eq!(StepOutcome::passed().status, StepStatus::Passed);
        assert_eq!(StepOutcome::in_progress().info, None);
        let failed = StepOutcome::failed("boom");
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.info.as_deref(), Some("boom"));
    }
}
