//! ---
//! mb_section: "05-test-case-engine"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Test case model, step polling engine, and result reporting."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use chrono::Utc;
use m_bench_script::ScriptContext;
use tracing::{debug, info, warn};

use crate::report::{CaseReport, StepReport};
use crate::{CaseStatus, StepStatus, TestCase};

/// Drives a [`TestCase`] to its aggregate verdict.
///
/// One step at a time, in order. A step answering `InProgress` is re-invoked
/// after the step interval until it reaches a terminal verdict or exhausts
/// its attempt budget; a terminal verdict is never revisited. Cancellation
/// via the context skips the current and remaining steps and the case.
#[derive(Debug, Default)]
pub struct StepEngine;

impl StepEngine {
    /// Run every step of the case in order and produce its report.
    pub async fn run<S>(case: &TestCase<S>, ctx: &ScriptContext) -> CaseReport {
        let started_at = Utc::now();
        info!(case = %case.name, steps = case.step_count(), "test case starting");

        let mut state = (case.state_factory)();
        let mut steps: Vec<StepReport> = case
            .steps
            .iter()
            .map(|step| StepReport::pending(&step.label))
            .collect();
        let mut after_hook_error = None;

        let verdict = 'run: {
            if let Some(before) = &case.before {
                if let Err(reason) = before(&mut state, ctx) {
                    warn!(case = %case.name, %reason, "before hook failed; aborting case");
                    break 'run CaseStatus::Failed;
                }
            }

            let mut failed = false;
            let mut skipped = false;
            for (index, step) in case.steps.iter().enumerate() {
                if skipped || (failed && case.policy.abort_on_failure) {
                    steps[index].status = StepStatus::Skipped;
                    continue;
                }

                let report = &mut steps[index];
                loop {
                    if ctx.cancelled() {
                        report.status = StepStatus::Skipped;
                        report.info = Some("run stopped".into());
                        skipped = true;
                        break;
                    }

                    ctx.touch();
                    report.attempts += 1;
                    let outcome = (step.body)(&mut state, ctx);
                    debug!(
                        case = %case.name,
                        step = %step.label,
                        attempt = report.attempts,
                        status = %outcome.status,
                        "step invoked"
                    );

                    if outcome.status.is_terminal() {
                        report.status = outcome.status;
                        report.info = outcome.info;
                        break;
                    }

                    if report.attempts >= case.options.max_attempts {
                        warn!(
                            case = %case.name,
                            step = %step.label,
                            attempts = report.attempts,
                            "step attempt budget exhausted"
                        );
                        report.status = StepStatus::Failed;
                        report.info = Some(format!(
                            "no terminal verdict after {} attempts",
                            report.attempts
                        ));
                        break;
                    }

                    if ctx.sleep(case.options.step_interval).await.is_err() {
                        report.status = StepStatus::Skipped;
                        report.info = Some("run stopped".into());
                        skipped = true;
                        break;
                    }
                }

                if steps[index].status == StepStatus::Failed {
                    failed = true;
                }
            }

            if skipped {
                CaseStatus::Skipped
            } else if failed {
                CaseStatus::Failed
            } else {
                CaseStatus::Passed
            }
        };

        if let Some(after) = &case.after {
            if let Err(reason) = after(&mut state, ctx) {
                warn!(case = %case.name, %reason, "after hook failed");
                after_hook_error = Some(reason);
            }
        }

        let report = CaseReport {
            case_name: case.name.clone(),
            verdict,
            started_at,
            finished_at: Utc::now(),
            steps,
            after_hook_error,
        };
        if verdict == CaseStatus::Failed {
            warn!(case = %case.name, verdict = %verdict, "test case finished");
        } else {
            info!(case = %case.name, verdict = %verdict, "test case finished");
        }
        report
    }
}
