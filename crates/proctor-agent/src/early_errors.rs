//! Buffer for errors raised before the suite wiring exists.
//!
//! A runtime can fault while its assets are still loading, before anything
//! is listening. Those errors land here and are handed over once with
//! [`EarlyErrorSink::drain_into`]; afterwards errors flow directly through
//! the wiring. The sink is passed explicitly at startup, there is no
//! ambient global.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPACITY: usize = 64;

/// An error the remote side failed to catch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UncaughtError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ScriptLocation>,
}

/// Where in a loaded script the error originated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptLocation {
    pub url: String,
    pub line: u32,
}

impl UncaughtError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, url: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            location: Some(ScriptLocation {
                url: url.into(),
                line,
            }),
        }
    }
}

/// Bounded queue of pre-wiring errors. Errors past capacity are dropped and
/// counted rather than growing without limit while the host never finishes
/// loading.
pub struct EarlyErrorSink {
    queue: VecDeque<UncaughtError>,
    capacity: usize,
    dropped: usize,
}

impl EarlyErrorSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, error: UncaughtError) {
        if self.queue.len() >= self.capacity {
            self.dropped += 1;
            tracing::warn!(
                dropped = self.dropped,
                "Early error queue full, dropping error"
            );
            return;
        }
        self.queue.push_back(error);
    }

    /// Hand every buffered error to `deliver`, oldest first, emptying the
    /// queue. Invoked once the real sink exists.
    pub fn drain_into<F: FnMut(UncaughtError)>(&mut self, mut deliver: F) {
        while let Some(error) = self.queue.pop_front() {
            deliver(error);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// How many errors were discarded because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for EarlyErrorSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order_and_empties() {
        let mut sink = EarlyErrorSink::default();
        sink.push(UncaughtError::new("first"));
        sink.push(UncaughtError::new("second"));

        let mut seen = Vec::new();
        sink.drain_into(|e| seen.push(e.message));

        assert_eq!(seen, vec!["first", "second"]);
        assert!(sink.is_empty());
    }

    #[test]
    fn full_queue_drops_newest() {
        let mut sink = EarlyErrorSink::new(2);
        sink.push(UncaughtError::new("a"));
        sink.push(UncaughtError::new("b"));
        sink.push(UncaughtError::new("c"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.dropped(), 1);

        let mut seen = Vec::new();
        sink.drain_into(|e| seen.push(e.message));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn drain_on_empty_is_a_no_op() {
        let mut sink = EarlyErrorSink::default();
        let mut called = false;
        sink.drain_into(|_| called = true);
        assert!(!called);
    }
}
