//! ---
//! mb_section: "02-messaging-data-model"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message records, pattern matching, and buffering."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Transport boundary.
//!
//! The actual wire client (broker connection, session handling, reconnects)
//! lives outside this workspace. The engine only needs the three operations
//! below; failures surface as [`TransportError`] and are folded into the
//! calling script's outcome rather than retried here.

use thiserror::Error;

use crate::message::{Message, QosLevel};

/// Errors surfaced by the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Publish was rejected or the connection is down.
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },
    /// Subscription change was rejected.
    #[error("subscription change for {pattern} failed: {reason}")]
    SubscriptionFailed { pattern: String, reason: String },
}

/// Boundary trait for the pub/sub client used by scripts and the orchestrator.
pub trait Transport: Send + Sync {
    /// Fire-and-forget publish.
    fn publish(&self, message: &Message) -> Result<(), TransportError>;

    /// Register interest in a topic filter.
    fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), TransportError>;

    /// Withdraw interest in a topic filter.
    fn unsubscribe(&self, filter: &str) -> Result<(), TransportError>;
}

/// No-op transport used where outbound traffic is irrelevant (pure replay
/// parsing tests, dry runs).
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn publish(&self, message: &Message) -> Result<(), TransportError> {
        tracing::debug!(topic = %message.topic, "null transport dropped publish");
        Ok(())
    }

    fn subscribe(&self, _filter: &str, _qos: QosLevel) -> Result<(), TransportError> {
        Ok(())
    }

    fn unsubscribe(&self, _filter: &str) -> Result<(), TransportError> {
        Ok(())
    }
}
