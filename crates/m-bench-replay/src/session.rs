//! ---
//! mb_section: "03-replay-log"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message log persistence and timed replay scheduling."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::path::Path;
use std::time::{Duration, Instant};

use m_bench_common::time::monotonic_now;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{log, ReplayError, ReplayRecord};

#[derive(Debug)]
struct SessionState {
    records: Vec<ReplayRecord>,
    speed: f64,
    /// Wall-clock instant the session was started; None until `start`.
    epoch: Option<Instant>,
    /// Virtual time elapsed since the epoch, accumulated segment by segment
    /// so speed changes never rewrite already-elapsed waits.
    virtual_elapsed: Duration,
    /// Wall-clock instant of the last accrual; None while the clock is frozen.
    last_accrual: Option<Instant>,
    cursor: usize,
}

impl SessionState {
    fn accrue(&mut self, now: Instant) {
        if self.epoch.is_none() {
            return;
        }
        if let Some(last) = self.last_accrual {
            let wall = now.saturating_duration_since(last);
            self.virtual_elapsed += Duration::from_secs_f64(wall.as_secs_f64() * self.speed);
        }
        self.last_accrual = Some(now);
    }
}

/// Replays a loaded message log against a virtual clock.
///
/// Readiness is a pure time predicate ([`Self::is_ready_to_publish`])
/// decoupled from the stateful cursor ([`Self::next_message`]): callers poll
/// cheaply in a sleep loop and only advance when they act. The virtual clock
/// accrues wall time multiplied by the current speed factor, so a factor of
/// 2.0 turns a recorded 10s gap into a 5s wait, and once a record is ready
/// it stays ready until the session is reset by a new load.
#[derive(Debug)]
pub struct ReplaySession {
    state: Mutex<SessionState>,
}

impl Default for ReplaySession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaySession {
    /// Create an empty session at speed 1.0 with a frozen clock.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                records: Vec::new(),
                speed: 1.0,
                epoch: None,
                virtual_elapsed: Duration::ZERO,
                last_accrual: None,
                cursor: 0,
            }),
        }
    }

    /// Load a recorded log, replacing any previously loaded set entirely.
    ///
    /// Returns the number of loaded records. Malformed logs abort with
    /// [`ReplayError::LogFormat`] and leave the previous set untouched.
    pub fn load(&self, path: &Path) -> Result<usize, ReplayError> {
        let records = log::read_log(path)?;
        let count = records.len();
        let mut state = self.state.lock();
        state.records = records;
        state.epoch = None;
        state.last_accrual = None;
        state.virtual_elapsed = Duration::ZERO;
        state.cursor = 0;
        info!(path = %path.display(), count, "replay session loaded");
        Ok(count)
    }

    /// Change the replay speed; affects only time still to elapse.
    pub fn set_speed(&self, factor: f64) -> Result<(), ReplayError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ReplayError::InvalidSpeed(factor));
        }
        let mut state = self.state.lock();
        // Bank virtual time at the old speed before switching.
        state.accrue(monotonic_now());
        debug!(old = state.speed, new = factor, "replay speed changed");
        state.speed = factor;
        Ok(())
    }

    /// Fix the session epoch. Idempotent for the currently loaded set; after
    /// a [`Self::stop`] it resumes the frozen clock.
    pub fn start(&self) {
        let now = monotonic_now();
        let mut state = self.state.lock();
        if state.epoch.is_none() {
            state.epoch = Some(now);
            state.last_accrual = Some(now);
            info!(count = state.records.len(), speed = state.speed, "replay session started");
        } else if state.last_accrual.is_none() {
            state.last_accrual = Some(now);
            debug!("replay session resumed");
        }
    }

    /// Freeze the virtual clock. Readiness already reached is retained.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        let now = monotonic_now();
        state.accrue(now);
        state.last_accrual = None;
    }

    /// True iff the record at `index` is due under the virtual clock.
    ///
    /// Never blocks; false for indexes beyond the loaded set or before
    /// `start`. Monotone: once true for an index it stays true until reset.
    pub fn is_ready_to_publish(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        state.accrue(monotonic_now());
        match state.records.get(index) {
            Some(record) => state.epoch.is_some() && state.virtual_elapsed >= record.offset,
            None => false,
        }
    }

    /// Return the record at the cursor and advance it.
    pub fn next_message(&self) -> Result<ReplayRecord, ReplayError> {
        let mut state = self.state.lock();
        let loaded = state.records.len();
        let index = state.cursor;
        match state.records.get(index) {
            Some(record) => {
                let record = record.clone();
                state.cursor += 1;
                Ok(record)
            }
            None => Err(ReplayError::OutOfRange { index, loaded }),
        }
    }

    /// Random access into the loaded set without touching the cursor.
    pub fn message(&self, index: usize) -> Option<ReplayRecord> {
        self.state.lock().records.get(index).cloned()
    }

    /// Number of currently loaded records.
    pub fn message_count(&self) -> usize {
        self.state.lock().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::write_spaced_log;
    use m_bench_messaging::Message;
    use tempfile::tempdir;

    fn session_with_offsets(offsets_ms: &[u64]) -> ReplaySession {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.messages");
        let messages: Vec<(u64, Message)> = offsets_ms
            .iter()
            .map(|ms| (*ms, Message::text("replay/t", format!("{ms}"))))
            .collect();
        write_spaced_log(&path, &messages).unwrap();
        let session = ReplaySession::new();
        assert_eq!(session.load(&path).unwrap(), offsets_ms.len());
        session
    }

    #[tokio::test]
    async fn records_become_ready_at_scaled_offsets() {
        let session = session_with_offsets(&[0, 200, 500]);
        session.set_speed(2.0).unwrap();
        session.start();

        // Offset zero is due immediately.
        assert!(session.is_ready_to_publish(0));
        assert!(!session.is_ready_to_publish(1));

        // 200ms at double speed is due after ~100ms.
        tokio::time::sleep(Duration::from_millis(140)).await;
        assert!(session.is_ready_to_publish(1));
        assert!(!session.is_ready_to_publish(2));

        // 500ms at double speed is due after ~250ms.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(session.is_ready_to_publish(2));
    }

    #[tokio::test]
    async fn readiness_is_monotone() {
        let session = session_with_offsets(&[0, 50]);
        session.start();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(session.is_ready_to_publish(1));
        session.stop();
        // Frozen clock keeps readiness already reached.
        assert!(session.is_ready_to_publish(1));
        assert!(session.is_ready_to_publish(0));
    }

    #[tokio::test]
    async fn records_are_not_ready_before_start() {
        let session = session_with_offsets(&[0, 10]);
        assert!(!session.is_ready_to_publish(0));
        session.start();
        assert!(session.is_ready_to_publish(0));
    }

    #[test]
    fn cursor_walks_in_recorded_order_then_errors() {
        let session = session_with_offsets(&[0, 100, 200]);
        let payloads: Vec<String> = (0..3)
            .map(|_| session.next_message().unwrap())
            .map(|record| String::from_utf8_lossy(&record.payload).into_owned())
            .collect();
        assert_eq!(payloads, vec!["0", "100", "200"]);
        assert!(matches!(
            session.next_message(),
            Err(ReplayError::OutOfRange {
                index: 3,
                loaded: 3
            })
        ));
    }

    #[test]
    fn load_replaces_the_previous_set() {
        let session = session_with_offsets(&[0, 100]);
        session.start();
        let _ = session.next_message().unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("other.messages");
        write_spaced_log(&path, &[(0, Message::text("t", "fresh"))]).unwrap();
        assert_eq!(session.load(&path).unwrap(), 1);

        // Cursor and clock were reset with the new set.
        assert_eq!(session.message_count(), 1);
        assert!(!session.is_ready_to_publish(0));
        let record = session.next_message().unwrap();
        assert_eq!(String::from_utf8_lossy(&record.payload), "fresh");
    }

    #[test]
    fn non_positive_speed_is_rejected() {
        let session = ReplaySession::new();
        assert!(matches!(
            session.set_speed(0.0),
            Err(ReplayError::InvalidSpeed(_))
        ));
        assert!(matches!(
            session.set_speed(-1.5),
            Err(ReplayError::InvalidSpeed(_))
        ));
        assert!(session.set_speed(0.25).is_ok());
    }

    #[tokio::test]
    async fn out_of_range_index_is_never_ready() {
        let session = session_with_offsets(&[0]);
        session.start();
        assert!(!session.is_ready_to_publish(5));
    }
}
