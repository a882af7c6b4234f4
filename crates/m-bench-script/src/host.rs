//! ---
//! mb_section: "04-script-host"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Script hosting, liveness supervision, and cancellation."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use m_bench_messaging::Message;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{HandlerAction, MessageHandler, Script, ScriptContext, ScriptError, ScriptOutcome};

/// Options applied to a hosted run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Re-run the body until it returns `false`, errs, or is stopped.
    /// Each iteration runs under the same liveness contract.
    pub repeat: bool,
}

enum Supervised<T> {
    /// The body finished on its own; the result is its verbatim return.
    Finished(Result<T, ScriptError>),
    /// The liveness deadline passed; the task has been aborted.
    DeadlinePassed,
}

/// Runs script bodies on cancellable tasks under the liveness contract.
///
/// The host never blocks its caller beyond the script's timeout: it waits on
/// the body's completion raced against the liveness deadline, re-arming the
/// wait whenever the script touches. Exactly one outcome is produced per
/// run; whichever of completion and deadline is observed first wins and the
/// loser is discarded.
#[derive(Debug, Default)]
pub struct ScriptHost;

impl ScriptHost {
    /// Execute a producer script to its terminal outcome.
    pub async fn run(
        script: Arc<dyn Script>,
        ctx: Arc<ScriptContext>,
        options: RunOptions,
    ) -> ScriptOutcome {
        ctx.touch();
        debug!(script = %ctx.name(), run = %ctx.id(), repeat = options.repeat, "script run starting");

        let body_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let mut first = true;
            let mut result = Ok(true);
            while first || (options.repeat && !body_ctx.cancelled()) {
                first = false;
                result = script.run(body_ctx.clone()).await;
                if !matches!(result, Ok(true)) {
                    break;
                }
            }
            result
        });

        let outcome = match supervise(&ctx, handle).await {
            Supervised::Finished(Ok(success)) => {
                // A repeat loop that exits because of a stop request is a
                // cancellation, not a completion.
                if options.repeat && ctx.cancelled() {
                    ScriptOutcome::Cancelled
                } else {
                    ScriptOutcome::Completed { success }
                }
            }
            Supervised::Finished(Err(ScriptError::Interrupted)) => ScriptOutcome::Cancelled,
            Supervised::Finished(Err(err)) => ScriptOutcome::Failed(err.to_string()),
            Supervised::DeadlinePassed => {
                if ctx.cancelled() {
                    ScriptOutcome::Cancelled
                } else {
                    ScriptOutcome::TimedOut
                }
            }
        };

        report(&ctx, &outcome);
        outcome
    }

    /// Invoke a message handler for one inbound message under the same
    /// timeout/liveness contract as a producer script. The action is only
    /// available for a successful completion.
    pub async fn run_handler(
        handler: Arc<dyn MessageHandler>,
        ctx: Arc<ScriptContext>,
        message: Arc<Message>,
    ) -> (ScriptOutcome, Option<HandlerAction>) {
        ctx.touch();
        let body_ctx = ctx.clone();
        let handle =
            tokio::spawn(async move { handler.on_message(body_ctx, message.as_ref()).await });

        let (outcome, action) = match supervise(&ctx, handle).await {
            Supervised::Finished(Ok(action)) => {
                (ScriptOutcome::Completed { success: true }, Some(action))
            }
            Supervised::Finished(Err(ScriptError::Interrupted)) => (ScriptOutcome::Cancelled, None),
            Supervised::Finished(Err(err)) => (ScriptOutcome::Failed(err.to_string()), None),
            Supervised::DeadlinePassed => {
                if ctx.cancelled() {
                    (ScriptOutcome::Cancelled, None)
                } else {
                    (ScriptOutcome::TimedOut, None)
                }
            }
        };

        report(&ctx, &outcome);
        (outcome, action)
    }
}

/// Wait for the body task, re-arming on every touch, enforcing the hard
/// deadline by aborting the task when it passes unanswered.
async fn supervise<T>(
    ctx: &ScriptContext,
    mut handle: JoinHandle<Result<T, ScriptError>>,
) -> Supervised<T> {
    loop {
        let deadline = ctx.liveness_deadline();
        let now = Instant::now();
        if now >= deadline {
            warn!(script = %ctx.name(), run = %ctx.id(), "liveness deadline passed; ending script task");
            handle.abort();
            // Drain the join so the task is fully retired before reporting.
            let _ = (&mut handle).await;
            return Supervised::DeadlinePassed;
        }
        tokio::select! {
            result = &mut handle => {
                return Supervised::Finished(match result {
                    Ok(body) => body,
                    Err(err) if err.is_panic() => {
                        Err(ScriptError::Fault(format!("script panicked: {err}")))
                    }
                    Err(_) => Err(ScriptError::Interrupted),
                });
            }
            _ = tokio::time::sleep(deadline - now) => {
                // Deadline may have been pushed forward by a touch; loop and
                // re-evaluate.
            }
        }
    }
}

fn report(ctx: &ScriptContext, outcome: &ScriptOutcome) {
    if outcome.is_alarming() {
        warn!(script = %ctx.name(), run = %ctx.id(), ?outcome, published = ctx.published_count(), "script run ended");
    } else {
        info!(script = %ctx.name(), run = %ctx.id(), ?outcome, published = ctx.published_count(), "script run ended");
    }
}
