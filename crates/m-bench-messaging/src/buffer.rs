//! ---
//! mb_section: "02-messaging-data-model"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message records, pattern matching, and buffering."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use m_bench_common::config::BufferConfig;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::message::Message;
use crate::pattern;

#[derive(Debug, Default)]
struct PatternStore {
    // Newest first: push_front on record, pop_back on eviction.
    messages: VecDeque<Arc<Message>>,
}

/// Per-pattern bounded store of received messages.
///
/// A message recorded by the transport-receive path is appended to every
/// registered pattern its topic matches. Queries return newest-first
/// snapshots so concurrent recording never corrupts an iterating caller.
/// Eviction of the oldest entry happens under the same lock as insertion,
/// so `count` and `query` can never disagree about a pattern's content.
#[derive(Debug)]
pub struct MessageBuffer {
    capacity: usize,
    patterns: RwLock<HashMap<String, Arc<Mutex<PatternStore>>>>,
}

impl MessageBuffer {
    /// Create a buffer with an explicit per-pattern capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            patterns: RwLock::new(HashMap::new()),
        }
    }

    /// Create a buffer from the engine configuration.
    pub fn with_config(config: &BufferConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Start retaining messages for the given pattern. Idempotent.
    pub fn register(&self, filter: impl Into<String>) {
        let filter = filter.into();
        let mut patterns = self.patterns.write();
        patterns
            .entry(filter.clone())
            .or_insert_with(|| Arc::new(Mutex::new(PatternStore::default())));
        debug!(pattern = %filter, "buffer pattern registered");
    }

    /// Stop retaining messages for the pattern and drop what was stored.
    pub fn deregister(&self, filter: &str) {
        if self.patterns.write().remove(filter).is_some() {
            debug!(pattern = %filter, "buffer pattern deregistered");
        }
    }

    /// Record a message into every registered pattern its topic matches.
    pub fn record(&self, message: &Arc<Message>) {
        let stores: Vec<(String, Arc<Mutex<PatternStore>>)> = {
            let patterns = self.patterns.read();
            patterns
                .iter()
                .filter(|(filter, _)| pattern::matches(filter, &message.topic))
                .map(|(filter, store)| (filter.clone(), store.clone()))
                .collect()
        };

        for (filter, store) in stores {
            let mut store = store.lock();
            store.messages.push_front(message.clone());
            if store.messages.len() > self.capacity {
                store.messages.pop_back();
            }
            trace!(pattern = %filter, topic = %message.topic, len = store.messages.len(), "message recorded");
        }
    }

    /// Snapshot of the messages stored for a pattern, newest first.
    ///
    /// Unknown patterns yield an empty vector, never an error.
    pub fn query(&self, filter: &str) -> Vec<Arc<Message>> {
        let store = {
            let patterns = self.patterns.read();
            patterns.get(filter).cloned()
        };
        match store {
            Some(store) => store.lock().messages.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Number of messages currently stored for a pattern.
    pub fn count(&self, filter: &str) -> usize {
        let store = {
            let patterns = self.patterns.read();
            patterns.get(filter).cloned()
        };
        match store {
            Some(store) => store.lock().messages.len(),
            None => 0,
        }
    }

    /// Registered patterns, for diagnostics.
    pub fn registered_patterns(&self) -> Vec<String> {
        self.patterns.read().keys().cloned().collect()
    }

    /// Per-pattern capacity this buffer was built with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
