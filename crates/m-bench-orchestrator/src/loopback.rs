//! ---
//! mb_section: "06-orchestrator"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Run registry, inbound routing, and lifecycle supervision."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use m_bench_messaging::{Message, QosLevel, Transport, TransportError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// In-memory transport that feeds every published message back as inbound
/// traffic.
///
/// Stands in for a wire client in tests and embeddings: publishes are pushed
/// onto an unbounded channel whose receiver the orchestrator pumps through
/// its inbound routing. Subscriptions are recorded but not enforced; the
/// buffer's pattern registration decides what is retained.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<Message>,
    subscriptions: Mutex<Vec<String>>,
}

impl LoopbackTransport {
    /// Build the transport plus the inbound end of the loop.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                subscriptions: Mutex::new(Vec::new()),
            },
            rx,
        )
    }

    /// Topic filters subscribed so far, in subscription order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

impl Transport for LoopbackTransport {
    fn publish(&self, message: &Message) -> Result<(), TransportError> {
        trace!(topic = %message.topic, "loopback publish");
        self.tx
            .send(message.clone())
            .map_err(|_| TransportError::PublishFailed {
                topic: message.topic.clone(),
                reason: "loopback receiver dropped".into(),
            })
    }

    fn subscribe(&self, filter: &str, _qos: QosLevel) -> Result<(), TransportError> {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.iter().any(|s| s == filter) {
            subscriptions.push(filter.to_string());
        }
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.subscriptions.lock().retain(|s| s != filter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_messages_come_back_on_the_inbound_channel() {
        let (transport, mut rx) = LoopbackTransport::new();
        transport.publish(&Message::text("a/b", "x")).unwrap();
        let inbound = rx.try_recv().unwrap();
        assert_eq!(inbound.topic, "a/b");
    }

    #[test]
    fn publish_fails_once_the_receiver_is_gone() {
        let (transport, rx) = LoopbackTransport::new();
        drop(rx);
        assert!(transport.publish(&Message::text("a/b", "x")).is_err());
    }

    #[test]
    fn subscriptions_are_recorded_without_duplicates() {
        let (transport, _rx) = LoopbackTransport::new();
        transport.subscribe("a/#", QosLevel::AtMostOnce).unwrap();
        transport.subscribe("a/#", QosLevel::AtMostOnce).unwrap();
        transport.subscribe("b/+", QosLevel::AtLeastOnce).unwrap();
        assert_eq!(transport.subscriptions(), vec!["a/#", "b/+"]);
        transport.unsubscribe("a/#").unwrap();
        assert_eq!(transport.subscriptions(), vec!["b/+"]);
    }
}
