//! ---
//! mb_section: "03-replay-log"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message log persistence and timed replay scheduling."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Recorded message log, one JSON object per line.
//!
//! Each line carries the four fields the engine needs (topic, payload, QoS,
//! retained) plus an absolute millisecond timestamp. Binary payloads are
//! base64-encoded and flagged; text payloads are stored as-is. On read the
//! absolute timestamps become offsets relative to the first record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use m_bench_messaging::Message;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ReplayError, ReplayRecord};

fn default_qos() -> u8 {
    0
}

/// On-disk shape of a single logged message.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggedMessage {
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
    topic: String,
    payload: String,
    /// True when `payload` is base64-encoded binary.
    #[serde(default)]
    encoded: bool,
    #[serde(default = "default_qos")]
    qos: u8,
    #[serde(default)]
    retained: bool,
}

/// Append-only writer producing logs that [`read_log`] accepts.
pub struct LogWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl LogWriter {
    /// Open a log for appending, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self, ReplayError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Append one message, stamped with its own timestamp.
    pub fn append(&mut self, message: &Message) -> Result<(), ReplayError> {
        let (payload, encoded) = match std::str::from_utf8(&message.payload) {
            Ok(text) => (text.to_owned(), false),
            Err(_) => (BASE64.encode(&message.payload), true),
        };
        let logged = LoggedMessage {
            timestamp: message.timestamp.timestamp_millis(),
            topic: message.topic.clone(),
            payload,
            encoded,
            qos: message.qos.as_u8(),
            retained: message.retained,
        };
        let line = serde_json::to_string(&logged).map_err(|err| ReplayError::LogFormat {
            line: self.written + 1,
            reason: err.to_string(),
        })?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Number of records appended through this writer.
    pub fn written(&self) -> usize {
        self.written
    }
}

/// Read a recorded log into replay records ordered as written.
///
/// The first record anchors the timeline: every offset is relative to it.
/// Any malformed line aborts the whole load with its line number; timestamps
/// must be non-decreasing in file order.
pub fn read_log(path: &Path) -> Result<Vec<ReplayRecord>, ReplayError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut first_timestamp: Option<i64> = None;
    let mut previous_timestamp = i64::MIN;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let logged: LoggedMessage =
            serde_json::from_str(&line).map_err(|err| ReplayError::LogFormat {
                line: line_number,
                reason: err.to_string(),
            })?;

        if logged.timestamp < previous_timestamp {
            return Err(ReplayError::NonMonotonic { line: line_number });
        }
        previous_timestamp = logged.timestamp;
        let first = *first_timestamp.get_or_insert(logged.timestamp);

        let payload = if logged.encoded {
            Bytes::from(BASE64.decode(logged.payload.as_bytes()).map_err(|err| {
                ReplayError::LogFormat {
                    line: line_number,
                    reason: format!("invalid base64 payload: {err}"),
                }
            })?)
        } else {
            Bytes::from(logged.payload)
        };

        let qos = logged
            .qos
            .try_into()
            .map_err(|reason: String| ReplayError::LogFormat {
                line: line_number,
                reason,
            })?;

        records.push(ReplayRecord {
            offset: Duration::from_millis((logged.timestamp - first) as u64),
            topic: logged.topic,
            payload,
            qos,
            retained: logged.retained,
        });
    }

    info!(path = %path.display(), count = records.len(), "message log loaded");
    Ok(records)
}

/// Convenience for tests and log production: write messages with explicit
/// millisecond spacing starting from now.
pub fn write_spaced_log(
    path: &Path,
    messages: &[(u64, Message)],
) -> Result<usize, ReplayError> {
    let mut writer = LogWriter::open(path)?;
    let base = Utc::now();
    for (offset_ms, message) in messages {
        let mut stamped = message.clone();
        stamped.timestamp = base + chrono::Duration::milliseconds(*offset_ms as i64);
        writer.append(&stamped)?;
    }
    Ok(writer.written())
}
