//! Session lifecycle management.
//!
//! A [`SuiteRunner`] drives one orchestration run: it opens a session
//! against the pool, installs the correlator and the inactivity monitor,
//! gates the `commence` instruction on pool readiness plus an explicit
//! start request, and tears the connection down once the suite ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use proctor_core::config::CommenceConfig;
use proctor_core::errors::SessionError;
use proctor_core::events::{
    empty_payload, RuntimeDescriptor, SuiteEvent, COMMENCE, RUNTIME_READY, SUITE_END,
};
use proctor_core::gate::ExecutionGate;
use proctor_core::signal::Signal;

use crate::correlate::spawn_correlator;
use crate::monitor::{spawn_monitor, DEFAULT_TIMEOUT};
use crate::pool::{PoolClient, PoolSession, ResourceSet, SessionOptions};

const BUS_CAPACITY: usize = 1024;

/// Options for preparing a session against the pool.
#[derive(Clone, Debug)]
pub struct RunnerOptions {
    pub host: String,
    pub port: u16,
    pub static_resources_path: Option<String>,
    /// Silence window after which a runtime is declared dead.
    pub inactivity_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1111,
            static_resources_path: None,
            inactivity_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RunnerOptions {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            host: self.host.clone(),
            port: self.port,
            static_resources_path: self.static_resources_path.clone(),
        }
    }
}

/// Drives one suite run against a pool of runtimes.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SuiteRunner {
    client: Arc<dyn PoolClient>,
    resources: ResourceSet,
    bus: broadcast::Sender<SuiteEvent>,
    runtime_ready: Signal<Value>,
    suite_end: Signal<Result<Value, SessionError>>,
    session: Signal<Arc<dyn PoolSession>>,
    gate: Arc<Mutex<ExecutionGate>>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SuiteRunner {
    pub fn new(client: Arc<dyn PoolClient>, resources: ResourceSet) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            client,
            resources,
            bus,
            runtime_ready: Signal::new(),
            suite_end: Signal::new(),
            session: Signal::new(),
            gate: Arc::new(Mutex::new(ExecutionGate::new())),
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to the unified, liveness-filtered event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SuiteEvent> {
        self.bus.subscribe()
    }

    /// Establish a session against the pool and wire up the event pipeline.
    ///
    /// Every readiness-affecting subscription is installed before the pool
    /// is told to initialize, so a signal emitted during setup cannot be
    /// missed.
    pub async fn prepare(&self, options: RunnerOptions) -> Result<SessionHandle, SessionError> {
        let initializer = self
            .client
            .create_session(self.resources.clone(), options.session_options())
            .await?;
        self.connected.store(true, Ordering::SeqCst);

        let feed = initializer.events();
        let mut end_feed = initializer.events();
        let mut ready_feed = initializer.events();
        let mut deaths = initializer.slave_deaths();
        let mut aborts = initializer.aborts();
        let mut aborts_during_init = initializer.aborts();

        let (correlated_tx, correlated_rx) = broadcast::channel(BUS_CAPACITY);
        spawn_correlator(feed, correlated_tx.clone(), self.cancel.child_token());
        spawn_monitor(
            correlated_rx,
            self.bus.clone(),
            options.inactivity_timeout,
            self.cancel.child_token(),
        );

        // suite:end carries the final result payload
        {
            let suite_end = self.suite_end.clone();
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = end_feed.recv() => match event {
                            Ok(event) if event.name == SUITE_END => {
                                suite_end.resolve(Ok(event.data.unwrap_or_else(empty_payload)));
                                break;
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped = skipped, "Suite-end listener lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            });
        }

        // runtime:ready arms the ready side of the gate
        {
            let runner = self.clone();
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = ready_feed.recv() => match event {
                            Ok(event) if event.name == RUNTIME_READY => {
                                runner
                                    .runtime_ready
                                    .resolve(event.data.unwrap_or_else(empty_payload));
                                // The orchestrator's start signal is always
                                // explicit, never implied by readiness
                                let fired =
                                    runner.gate.lock().notify_ready(CommenceConfig::manual_start());
                                runner.commence_if_fired(fired).await;
                                break;
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped = skipped, "Readiness listener lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            });
        }

        // Transport-level death reports join the pipeline ahead of the
        // monitor, which records them in its ledger
        {
            let correlated_tx = correlated_tx.clone();
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        death = deaths.recv() => match death {
                            Ok(uuid) => {
                                tracing::info!(uuid = %uuid, "Runtime transport died");
                                let _ = correlated_tx.send(SuiteEvent::timeout(uuid));
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped = skipped, "Death listener lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            });
        }

        // A pool-side abort ends the suite with an explicit error
        {
            let suite_end = self.suite_end.clone();
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = aborts.recv() => {
                        if result.is_ok() {
                            tracing::warn!("Pool aborted the session");
                            suite_end.resolve(Err(SessionError::Aborted));
                        }
                    }
                }
            });
        }

        let session = tokio::select! {
            result = initializer.initialize() => result?,
            _ = aborts_during_init.recv() => {
                // No partial handle, and no connection left open
                self.stop().await;
                return Err(SessionError::Aborted);
            }
        };

        let session: Arc<dyn PoolSession> = Arc::from(session);
        let runtimes = session.initial_slaves();
        self.session.resolve(session);

        tracing::info!(runtimes = runtimes.len(), "Session prepared");
        Ok(SessionHandle {
            runtimes,
            runner: self.clone(),
        })
    }

    /// Destroy the pool connection if one exists. Safe to call redundantly,
    /// before any `prepare`, or after completion; always returns cleanly.
    pub async fn stop(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("Destroying pool connection");
            self.client.destroy().await;
        }
        self.cancel.cancel();
    }

    async fn request_start(&self) {
        let fired = self.gate.lock().notify_start();
        self.commence_if_fired(fired).await;
    }

    async fn commence_if_fired(&self, fired: Option<CommenceConfig>) {
        if fired.is_none() {
            return;
        }
        let session = self.session.wait().await;
        let payload = serde_json::to_value(CommenceConfig::commence_defaults())
            .unwrap_or_else(|_| empty_payload());
        tracing::info!("Pool ready, commencing suite");
        if let Err(error) = session.emit(COMMENCE, payload).await {
            tracing::warn!(error = %error, "Failed to send commence");
            self.suite_end.resolve(Err(error));
        }
    }

    async fn run_to_end(&self) -> Result<Value, SessionError> {
        self.request_start().await;
        let outcome = self.suite_end.wait().await;
        // No dangling connections survive a completed run
        self.stop().await;
        outcome
    }
}

/// Handle to a prepared session.
pub struct SessionHandle {
    runtimes: Vec<RuntimeDescriptor>,
    runner: SuiteRunner,
}

impl SessionHandle {
    /// The runtimes that were connected when the session initialized.
    pub fn runtimes(&self) -> &[RuntimeDescriptor] {
        &self.runtimes
    }

    /// Request suite start and wait for the final result payload.
    ///
    /// The `commence` instruction goes out once the pool has signalled
    /// readiness; the pool connection is destroyed before this resolves.
    pub async fn start(&self) -> Result<Value, SessionError> {
        self.runner.run_to_end().await
    }
}
