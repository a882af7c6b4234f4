//! ---
//! mb_section: "02-messaging-data-model"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message records, pattern matching, and buffering."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Messaging primitives for the M-BENCH workspace.
//!
//! This crate provides the immutable [`Message`] record shared between
//! scripts and buffers, topic filter matching, the per-pattern bounded
//! [`MessageBuffer`], and the [`Transport`] boundary trait behind which the
//! actual wire client lives.

#![warn(missing_docs)]

pub mod buffer;
pub mod message;
pub mod pattern;
pub mod transport;

pub use buffer::MessageBuffer;
pub use message::{Message, QosLevel};
pub use transport::{NullTransport, Transport, TransportError};
