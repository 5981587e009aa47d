//! Dual-condition gate over suite execution.
//!
//! Execution begins only once the environment is ready *and* a start has
//! been requested. The two notifications may arrive in either order, with
//! duplicates, or not at all; the transition fires at most once. The same
//! state machine runs on the orchestrator (gating the `commence`
//! instruction) and inside every remote runtime (gating the local run).

use crate::config::CommenceConfig;

#[derive(Debug, Default)]
pub struct ExecutionGate {
    ready: bool,
    started: bool,
    running: bool,
    config: Option<CommenceConfig>,
}

impl ExecutionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The environment became ready with the given configuration. Unless
    /// the configuration explicitly opts out of auto-run, readiness also
    /// counts as a start request.
    ///
    /// Returns the recorded configuration the first time both conditions
    /// hold; the caller performs the one-time side effects.
    pub fn notify_ready(&mut self, config: CommenceConfig) -> Option<CommenceConfig> {
        self.started = self.started || config.should_auto_run();
        self.config = Some(config);
        self.ready = true;
        self.attempt_run()
    }

    /// An explicit start request.
    pub fn notify_start(&mut self) -> Option<CommenceConfig> {
        self.started = true;
        self.attempt_run()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn attempt_run(&mut self) -> Option<CommenceConfig> {
        if !self.ready || !self.started || self.running {
            return None;
        }
        self.running = true;
        self.config.clone()
    }
}
