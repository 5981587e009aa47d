//! Orchestrates test-suite execution across a pool of remote runtimes.
//!
//! The runner opens a session against an already-provisioned pool, streams
//! back a unified, identity-correlated event timeline, isolates runtimes
//! that stop responding, and gates suite start on pool readiness plus an
//! explicit start request.

pub use proctor_agent::early_errors;
pub use proctor_agent::wiring;
pub use proctor_core::{config, errors, events, gate, ids, signal};
pub use proctor_runner::{correlate, mock, monitor, pool, session};
pub use proctor_telemetry as telemetry;

pub use proctor_core::config::CommenceConfig;
pub use proctor_core::errors::SessionError;
pub use proctor_core::events::SuiteEvent;
pub use proctor_core::ids::RuntimeId;
pub use proctor_runner::session::{RunnerOptions, SessionHandle, SuiteRunner};
