//! In-memory pool for deterministic testing without a transport.
//!
//! Tests drive the pool by hand through a [`MockPoolHandle`]: inject
//! wrapped events, declare slave death, abort the session, and observe the
//! instructions the orchestrator sends back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use proctor_core::errors::SessionError;
use proctor_core::events::{RuntimeDescriptor, WrappedEvent, RUNTIME_READY, SUITE_END};
use proctor_core::ids::RuntimeId;

use crate::pool::{PoolClient, PoolInitializer, PoolSession, ResourceSet, SessionOptions};

const CHANNEL_CAPACITY: usize = 256;

struct MockPoolInner {
    slaves: DashMap<RuntimeId, RuntimeDescriptor>,
    events: broadcast::Sender<WrappedEvent>,
    deaths: broadcast::Sender<RuntimeId>,
    aborts: broadcast::Sender<()>,
    instructions: broadcast::Sender<(String, Value)>,
    instruction_log: Mutex<Vec<(String, Value)>>,
    last_options: Mutex<Option<SessionOptions>>,
    destroy_calls: AtomicUsize,
    connect_error: Option<String>,
    initialize_delay: Mutex<Option<Duration>>,
}

/// Scriptable [`PoolClient`] double.
pub struct MockPoolClient {
    inner: Arc<MockPoolInner>,
}

impl MockPoolClient {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A client whose `create_session` fails with a connection error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::build(Some(message.into()))
    }

    fn build(connect_error: Option<String>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (deaths, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (aborts, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (instructions, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MockPoolInner {
                slaves: DashMap::new(),
                events,
                deaths,
                aborts,
                instructions,
                instruction_log: Mutex::new(Vec::new()),
                last_options: Mutex::new(None),
                destroy_calls: AtomicUsize::new(0),
                connect_error,
                initialize_delay: Mutex::new(None),
            }),
        }
    }

    /// Make `initialize` take this long, leaving a window for signals that
    /// race session setup.
    pub fn with_initialize_delay(self, delay: Duration) -> Self {
        *self.inner.initialize_delay.lock() = Some(delay);
        self
    }

    /// Connect a runtime to the pool, returning its transport identity.
    pub fn add_slave(&self, user_agent: &str) -> RuntimeId {
        let id = RuntimeId::new();
        self.inner
            .slaves
            .insert(id.clone(), RuntimeDescriptor::new(id.clone(), user_agent));
        id
    }

    pub fn handle(&self) -> MockPoolHandle {
        MockPoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MockPoolClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver handle for a [`MockPoolClient`].
#[derive(Clone)]
pub struct MockPoolHandle {
    inner: Arc<MockPoolInner>,
}

impl MockPoolHandle {
    /// Deliver a wrapped event from the given slave.
    pub fn send_event(&self, name: &str, slave: &RuntimeId, data: Option<Value>) {
        let _ = self
            .inner
            .events
            .send(WrappedEvent::new(name, slave.clone(), data));
    }

    pub fn send_ready(&self, slave: &RuntimeId) {
        self.send_event(RUNTIME_READY, slave, None);
    }

    pub fn send_suite_end(&self, slave: &RuntimeId, results: Value) {
        self.send_event(SUITE_END, slave, Some(results));
    }

    /// Drop a slave's transport connection.
    pub fn kill_slave(&self, slave: &RuntimeId) {
        self.inner.slaves.remove(slave);
        let _ = self.inner.deaths.send(slave.clone());
    }

    pub fn abort(&self) {
        let _ = self.inner.aborts.send(());
    }

    /// Instructions the orchestrator emitted so far.
    pub fn instruction_log(&self) -> Vec<(String, Value)> {
        self.inner.instruction_log.lock().clone()
    }

    /// Live subscription to emitted instructions.
    pub fn instructions(&self) -> broadcast::Receiver<(String, Value)> {
        self.inner.instructions.subscribe()
    }

    pub fn destroy_calls(&self) -> usize {
        self.inner.destroy_calls.load(Ordering::SeqCst)
    }

    /// The options the last `create_session` was called with.
    pub fn last_options(&self) -> Option<SessionOptions> {
        self.inner.last_options.lock().clone()
    }
}

#[async_trait]
impl PoolClient for MockPoolClient {
    async fn create_session(
        &self,
        _resources: ResourceSet,
        options: SessionOptions,
    ) -> Result<Box<dyn PoolInitializer>, SessionError> {
        if let Some(message) = &self.inner.connect_error {
            return Err(SessionError::ConnectFailed(message.clone()));
        }
        *self.inner.last_options.lock() = Some(options);
        Ok(Box::new(MockInitializer {
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn destroy(&self) {
        self.inner.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockInitializer {
    inner: Arc<MockPoolInner>,
}

#[async_trait]
impl PoolInitializer for MockInitializer {
    fn events(&self) -> broadcast::Receiver<WrappedEvent> {
        self.inner.events.subscribe()
    }

    fn slave_deaths(&self) -> broadcast::Receiver<RuntimeId> {
        self.inner.deaths.subscribe()
    }

    fn aborts(&self) -> broadcast::Receiver<()> {
        self.inner.aborts.subscribe()
    }

    async fn initialize(self: Box<Self>) -> Result<Box<dyn PoolSession>, SessionError> {
        let delay = *self.inner.initialize_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Box::new(MockSession { inner: self.inner }))
    }
}

struct MockSession {
    inner: Arc<MockPoolInner>,
}

#[async_trait]
impl PoolSession for MockSession {
    fn initial_slaves(&self) -> Vec<RuntimeDescriptor> {
        self.inner
            .slaves
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn emit(&self, name: &str, payload: Value) -> Result<(), SessionError> {
        self.inner
            .instruction_log
            .lock()
            .push((name.to_string(), payload.clone()));
        let _ = self.inner.instructions.send((name.to_string(), payload));
        Ok(())
    }
}
