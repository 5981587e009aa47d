//! Collaborator contracts for the runtime pool.
//!
//! The pool itself — how runtimes are provisioned, how assets are served,
//! what the transport looks like — lives elsewhere. The orchestrator only
//! needs these seams: create a session, subscribe to its feeds before
//! telling it to initialize, enumerate the initially connected runtimes,
//! send instructions, and tear the connection down.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::broadcast;

use proctor_core::errors::SessionError;
use proctor_core::events::{RuntimeDescriptor, WrappedEvent};
use proctor_core::ids::RuntimeId;

/// One suite asset delivered to runtimes by the pool's resource server.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    pub path: String,
    pub content: Bytes,
    pub content_type: Option<String>,
}

impl Resource {
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            content_type: None,
        }
    }
}

/// The suite's full asset set, produced by the resource bundler.
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    /// Path prefix runtimes load the assets under.
    pub context_path: Option<String>,
    pub resources: Vec<Resource>,
}

impl ResourceSet {
    pub fn add(&mut self, resource: Resource) -> &mut Self {
        self.resources.push(resource);
        self
    }
}

/// Options for creating a pool session.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub static_resources_path: Option<String>,
}

/// Client for an already-provisioned pool of runtimes.
#[async_trait]
pub trait PoolClient: Send + Sync {
    /// Establish a session. Failure here means the pool connection could
    /// not be made; the caller decides whether to retry.
    async fn create_session(
        &self,
        resources: ResourceSet,
        options: SessionOptions,
    ) -> Result<Box<dyn PoolInitializer>, SessionError>;

    /// Tear down the connection. Must be safe to call repeatedly.
    async fn destroy(&self);
}

/// A session under construction. Subscriptions taken here are live before
/// [`PoolInitializer::initialize`] tells the pool to begin, so no signal
/// emitted during initialization can be missed.
#[async_trait]
pub trait PoolInitializer: Send + Sync {
    /// Catch-all feed of wrapped events. May be subscribed repeatedly.
    fn events(&self) -> broadcast::Receiver<WrappedEvent>;

    /// Notifications that a runtime's transport connection died.
    fn slave_deaths(&self) -> broadcast::Receiver<RuntimeId>;

    /// Notification that the pool aborted the session.
    fn aborts(&self) -> broadcast::Receiver<()>;

    async fn initialize(self: Box<Self>) -> Result<Box<dyn PoolSession>, SessionError>;
}

/// An initialized pool session.
#[async_trait]
pub trait PoolSession: Send + Sync {
    /// The runtimes that were connected when the session initialized.
    fn initial_slaves(&self) -> Vec<RuntimeDescriptor>;

    /// Send an instruction to every runtime in the session.
    async fn emit(&self, name: &str, payload: Value) -> Result<(), SessionError>;
}
