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
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use m_bench_messaging::{Message, MessageBuffer, QosLevel, Transport};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ScriptError;

#[derive(Debug, Default)]
struct PublishStats {
    count: u64,
    last: Option<DateTime<Utc>>,
}

/// Per-invocation execution context handed to a running script.
///
/// Carries the script's identity, its liveness state (touch + timeout), the
/// cooperative cancellation flag, and the collaborators a script may use:
/// the shared [`MessageBuffer`] and the transport. Created when a run is
/// scheduled, dropped when the run reaches its outcome.
pub struct ScriptContext {
    id: Uuid,
    name: String,
    timeout: Mutex<Duration>,
    last_touch: Mutex<Instant>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    buffer: Arc<MessageBuffer>,
    transport: Arc<dyn Transport>,
    stats: Mutex<PublishStats>,
    args: serde_json::Value,
}

impl ScriptContext {
    /// Create a context for one run.
    pub fn new(
        name: impl Into<String>,
        timeout: Duration,
        buffer: Arc<MessageBuffer>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timeout: Mutex::new(timeout),
            last_touch: Mutex::new(Instant::now()),
            cancel_tx,
            cancel_rx,
            buffer,
            transport,
            stats: Mutex::new(PublishStats::default()),
            args: serde_json::Value::Null,
        })
    }

    /// Create a context carrying caller-supplied arguments, exposed to the
    /// script via [`Self::args`].
    pub fn with_args(
        name: impl Into<String>,
        timeout: Duration,
        buffer: Arc<MessageBuffer>,
        transport: Arc<dyn Transport>,
        args: serde_json::Value,
    ) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timeout: Mutex::new(timeout),
            last_touch: Mutex::new(Instant::now()),
            cancel_tx,
            cancel_rx,
            buffer,
            transport,
            stats: Mutex::new(PublishStats::default()),
            args,
        })
    }

    /// Unique identity of this run.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human-readable script name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments supplied by the caller, `Null` when absent.
    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }

    /// Reset the liveness deadline to now + timeout.
    ///
    /// Long-running scripts call this at least once per timeout interval to
    /// signal they are alive; a script that neither touches nor completes is
    /// judged unresponsive and forcibly ended.
    pub fn touch(&self) {
        *self.last_touch.lock() = Instant::now();
        trace!(script = %self.name, "touch");
    }

    /// Adjust the liveness timeout for the remainder of the run.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
        debug!(script = %self.name, ?timeout, "script timeout changed");
    }

    /// Current liveness timeout.
    pub fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    /// Instant after which the script is judged unresponsive absent a touch.
    pub fn liveness_deadline(&self) -> Instant {
        *self.last_touch.lock() + self.timeout()
    }

    /// Request a cooperative stop. The running script observes the flag at
    /// its blocking points; the host enforces the hard deadline regardless.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
        debug!(script = %self.name, "cancellation requested");
    }

    /// Whether a stop has been requested.
    pub fn cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Cancellable suspension point. Returns [`ScriptError::Interrupted`]
    /// as soon as cancellation is observed, otherwise sleeps the full
    /// duration.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ScriptError> {
        if self.cancelled() {
            return Err(ScriptError::Interrupted);
        }
        let mut rx = self.cancel_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = rx.wait_for(|cancelled| *cancelled) => Err(ScriptError::Interrupted),
        }
    }

    /// Publish through the transport. Counts as liveness activity.
    pub fn publish(&self, message: Message) -> Result<(), ScriptError> {
        self.transport.publish(&message)?;
        {
            let mut stats = self.stats.lock();
            stats.count += 1;
            stats.last = Some(Utc::now());
        }
        self.touch();
        trace!(script = %self.name, topic = %message.topic, "published");
        Ok(())
    }

    /// Subscribe to a topic filter and start buffering its messages.
    pub fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), ScriptError> {
        m_bench_messaging::pattern::validate(filter).map_err(ScriptError::Fault)?;
        self.buffer.register(filter);
        self.transport.subscribe(filter, qos)?;
        Ok(())
    }

    /// Unsubscribe from a topic filter and drop its buffered messages.
    pub fn unsubscribe(&self, filter: &str) -> Result<(), ScriptError> {
        self.transport.unsubscribe(filter)?;
        self.buffer.deregister(filter);
        Ok(())
    }

    /// Snapshot of buffered messages for a pattern, newest first.
    pub fn messages(&self, filter: &str) -> Vec<Arc<Message>> {
        self.buffer.query(filter)
    }

    /// Number of buffered messages for a pattern.
    pub fn message_count(&self, filter: &str) -> usize {
        self.buffer.count(filter)
    }

    /// Messages published by this run so far.
    pub fn published_count(&self) -> u64 {
        self.stats.lock().count
    }

    /// Timestamp of the last publication by this run, if any.
    pub fn last_published(&self) -> Option<DateTime<Utc>> {
        self.stats.lock().last
    }

    /// Shared message buffer backing this context.
    pub fn buffer(&self) -> &Arc<MessageBuffer> {
        &self.buffer
    }
}

impl std::fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("timeout", &self.timeout())
            .field("cancelled", &self.cancelled())
            .finish()
    }
}
