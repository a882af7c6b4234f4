//! ---
//! mb_section: "04-script-host"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Script hosting, liveness supervision, and cancellation."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Script host for the M-BENCH workspace.
//!
//! A script is any type implementing [`Script`] (producer) or
//! [`MessageHandler`] (per-message callback); the host is agnostic to how
//! the body is expressed. Every run executes on its own cancellable tokio
//! task under a liveness contract: the script must either finish or call
//! [`ScriptContext::touch`] within its timeout window, otherwise the host
//! forcibly ends the task and reports [`ScriptOutcome::TimedOut`]. Scripts
//! that legitimately run forever (an infinite publish loop, say) stay alive
//! by touching; scripts that merely hang do not.

#![warn(missing_docs)]

pub mod context;
pub mod host;

use std::sync::Arc;

use async_trait::async_trait;
use m_bench_messaging::{Message, TransportError};
use thiserror::Error;

pub use context::ScriptContext;
pub use host::{RunOptions, ScriptHost};

/// Errors a script body can surface to the host.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Uncaught fault inside the script body.
    #[error("script fault: {0}")]
    Fault(String),
    /// The script observed the cancellation flag at a blocking point.
    #[error("script interrupted by cancellation")]
    Interrupted,
    /// A transport call failed; folded into the script's outcome.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ScriptError {
    /// Convenience constructor for ad-hoc faults.
    pub fn fault(reason: impl Into<String>) -> Self {
        ScriptError::Fault(reason.into())
    }
}

/// Terminal result of a single hosted run. Exactly one outcome is produced
/// per run; timeout and natural completion race, the first observed wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// The body returned; `success` is its boolean result.
    Completed { success: bool },
    /// The liveness deadline passed without a touch or completion.
    TimedOut,
    /// An externally requested stop was honoured. Not an error.
    Cancelled,
    /// The body faulted; the fault is reported, never re-thrown.
    Failed(String),
}

impl ScriptOutcome {
    /// True only for a successful completion.
    pub fn is_success(&self) -> bool {
        matches!(self, ScriptOutcome::Completed { success: true })
    }

    /// True for any terminal state other than `Cancelled`/`Completed`.
    pub fn is_alarming(&self) -> bool {
        matches!(self, ScriptOutcome::TimedOut | ScriptOutcome::Failed(_))
    }
}

/// A user-supplied producer/consumer script body.
///
/// Returning `Ok(false)` maps to `Completed { success: false }`; an `Err`
/// maps to `Failed` (or `Cancelled` for [`ScriptError::Interrupted`]).
#[async_trait]
pub trait Script: Send + Sync {
    /// Execute the script body to its boolean result.
    async fn run(&self, ctx: Arc<ScriptContext>) -> Result<bool, ScriptError>;
}

/// A script attached to a topic filter, invoked once per matched inbound
/// message under the same liveness contract as a producer script.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// React to one inbound message and describe the resulting action.
    async fn on_message(
        &self,
        ctx: Arc<ScriptContext>,
        message: &Message,
    ) -> Result<HandlerAction, ScriptError>;
}

/// Explicit transform returned by a handler: messages to publish, plus an
/// optional replacement for the inbound message. Handlers never mutate the
/// received message in place.
#[derive(Debug, Default)]
pub struct HandlerAction {
    /// Outbound messages the orchestrator publishes on the handler's behalf.
    pub publishes: Vec<Message>,
    /// Substitute recorded into the buffer instead of the original.
    pub replacement: Option<Message>,
}

impl HandlerAction {
    /// Pass the message through untouched.
    pub fn pass() -> Self {
        Self::default()
    }

    /// Queue an outbound message.
    pub fn with_publish(mut self, message: Message) -> Self {
        self.publishes.push(message);
        self
    }

    /// Substitute the inbound message before it is recorded.
    pub fn with_replacement(mut self, message: Message) -> Self {
        self.replacement = Some(message);
        self
    }
}

/// Blanket adapter so plain async closures can act as scripts in tests and
/// embeddings without a named type.
pub struct FnScript<F>(
    /// Closure invoked as the script body.
    pub F,
);

#[async_trait]
impl<F, Fut> Script for FnScript<F>
where
    F: Fn(Arc<ScriptContext>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<bool, ScriptError>> + Send,
{
    async fn run(&self, ctx: Arc<ScriptContext>) -> Result<bool, ScriptError> {
        (self.0)(ctx).await
    }
}
