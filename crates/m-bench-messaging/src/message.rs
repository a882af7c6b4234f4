//! ---
//! mb_section: "02-messaging-data-model"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message records, pattern matching, and buffering."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality-of-service level carried alongside every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery.
    AtLeastOnce,
    /// Assured, exactly-once delivery.
    ExactlyOnce,
}

impl QosLevel {
    /// Numeric wire representation (0..=2).
    pub fn as_u8(self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            2 => Ok(QosLevel::ExactlyOnce),
            other => Err(format!("invalid QoS level {other}, expected 0..=2")),
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(value: QosLevel) -> Self {
        value.as_u8()
    }
}

/// Immutable message record shared between the transport, buffers, and scripts.
///
/// Once buffered a message is handed out behind an `Arc`; nothing mutates it
/// in place. Handlers that want to alter a message produce a replacement
/// instead (see the handler contract in `m-bench-script`).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Destination or origin topic.
    pub topic: String,
    /// Raw payload; may be UTF-8 text or binary.
    pub payload: Bytes,
    /// Delivery guarantee requested or observed.
    pub qos: QosLevel,
    /// Retained flag as seen on the wire.
    pub retained: bool,
    /// Receipt or send timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Construct a message with a UTF-8 text payload, stamped now.
    pub fn text(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: Bytes::from(payload.into()),
            qos: QosLevel::AtMostOnce,
            retained: false,
            timestamp: Utc::now(),
        }
    }

    /// Construct a message with a binary payload, stamped now.
    pub fn binary(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QosLevel::AtMostOnce,
            retained: false,
            timestamp: Utc::now(),
        }
    }

    /// Builder-style QoS override.
    pub fn with_qos(mut self, qos: QosLevel) -> Self {
        self.qos = qos;
        self
    }

    /// Builder-style retained override.
    pub fn with_retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    /// Lossy view of the payload as text, for diagnostics and text protocols.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_roundtrips_through_u8() {
        for level in [
            QosLevel::AtMostOnce,
            QosLevel::AtLeastOnce,
            QosLevel::ExactlyOnce,
        ] {
            assert_eq!(QosLevel::try_from(level.as_u8()).unwrap(), level);
        }
        assert!(QosLevel::try_from(3).is_err());
    }

    #[test]
    fn text_constructor_populates_defaults() {
        let message = Message::text("bench/topic", "hello");
        assert_eq!(message.topic, "bench/topic");
        assert_eq!(message.payload_text(), "hello");
        assert_eq!(message.qos, QosLevel::AtMostOnce);
        assert!(!message.retained);
    }

    #[test]
    fn binary_payloads_survive_lossy_text_view() {
        let message = Message::binary("bench/raw", vec![0xff, 0x00, 0x41]);
        assert_eq!(message.payload.len(), 3);
        assert!(message.payload_text().contains('A'));
    }
}
