//! Single-resolution signal observable by any number of consumers.
//!
//! Lifecycle stages (pool readiness, suite end) resolve once; consumers may
//! attach before or after resolution with identical observable effect.
//! Waiters register with the [`Notify`] before checking state, so a
//! resolution racing with registration cannot be missed.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

pub struct Signal<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
}

impl<T: Clone> Signal<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Resolve the signal. The first call wins; later calls are no-ops and
    /// return `false`.
    pub fn resolve(&self, value: T) -> bool {
        {
            let mut slot = self.inner.value.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// The resolution value, if any, without waiting.
    pub fn peek(&self) -> Option<T> {
        self.inner.value.lock().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.value.lock().is_some()
    }

    /// Wait for the resolution value. Returns immediately if already
    /// resolved.
    pub async fn wait(&self) -> T {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(value) = self.peek() {
                return value;
            }
            notified.await;
        }
    }
}

impl<T: Clone> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
