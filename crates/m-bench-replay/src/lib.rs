//! ---
//! mb_section: "03-replay-log"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message log persistence and timed replay scheduling."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Replay subsystem for the M-BENCH workspace.
//!
//! [`log`] reads and writes the recorded message log; [`session`] replays a
//! loaded log against a virtual clock so original inter-message timing is
//! preserved at any positive speed factor.

#![warn(missing_docs)]

pub mod log;
pub mod session;

use std::time::Duration;

use bytes::Bytes;
use m_bench_messaging::QosLevel;
use thiserror::Error;

pub use log::{read_log, LogWriter};
pub use session::ReplaySession;

/// One recorded message with its timing offset from the start of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    /// Offset relative to the first record in the log.
    pub offset: Duration,
    /// Topic the message was observed on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Bytes,
    /// QoS level recorded on the wire.
    pub qos: QosLevel,
    /// Retained flag recorded on the wire.
    pub retained: bool,
}

/// Errors produced by the replay subsystem.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A record could not be parsed; the load is aborted so a partial log
    /// never silently corrupts replay timing.
    #[error("malformed replay log record at line {line}: {reason}")]
    LogFormat { line: usize, reason: String },
    /// Record timestamps went backwards in file order.
    #[error("non-monotonic timestamp at line {line}")]
    NonMonotonic { line: usize },
    /// The single-cursor API walked past the loaded record count.
    #[error("replay cursor out of range: index {index}, loaded {loaded}")]
    OutOfRange { index: usize, loaded: usize },
    /// Speed factors must be positive.
    #[error("invalid replay speed {0}; factor must be > 0")]
    InvalidSpeed(f64),
    /// Underlying file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
