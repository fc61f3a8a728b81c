use std::collections::VecDeque;

use conductor_protocol::EventEnvelope;

pub const DEFAULT_RETENTION: usize = 5000;

/// Append-only event window with a retention ceiling.
///
/// Once the ceiling is exceeded the oldest entries are evicted. Historical
/// entries are never mutated in place.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<EventEnvelope>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETENTION)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an event, returning the entry evicted to make room, if any.
    pub fn push(&mut self, event: EventEnvelope) -> Option<EventEnvelope> {
        self.entries.push_back(event);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventEnvelope> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<EventEnvelope> {
        self.entries.iter().cloned().collect()
    }

    /// The newest `limit` events, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<EventEnvelope> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }
}
