//! ---
//! mb_section: "06-orchestrator"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Run registry, inbound routing, and lifecycle supervision."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Composition layer tying the M-BENCH pieces together.
//!
//! The [`Orchestrator`] owns the shared [`MessageBuffer`], the transport
//! boundary, and a registry of every run it has started. Scripts, message
//! handlers, and test cases each execute on their own cancellable unit with
//! their own [`ScriptContext`]; the registry answers status queries and lets
//! callers cancel individual runs or shut everything down.
//!
//! A run's fault, timeout, or cancellation becomes its recorded outcome and
//! is reported through tracing; it never propagates out of the orchestrator.

#![warn(missing_docs)]

pub mod loopback;
pub mod orchestrator;

use thiserror::Error;
use uuid::Uuid;

pub use loopback::LoopbackTransport;
pub use orchestrator::{Orchestrator, RunStatus};

use m_bench_messaging::TransportError;

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No run with this id exists in the registry.
    #[error("unknown run {0}")]
    UnknownRun(Uuid),
    /// Another caller already took the run's join handle.
    #[error("run {0} is already being waited on")]
    AlreadyWaited(Uuid),
    /// The topic filter failed validation.
    #[error("invalid topic filter: {0}")]
    InvalidPattern(String),
    /// The transport rejected a subscription change.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
