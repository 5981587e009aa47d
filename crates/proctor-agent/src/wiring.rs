//! Runtime-side wiring of the execution gate onto the host environment.
//!
//! A runtime is told to run via the `commence` instruction, and is able to
//! run once its environment has finished loading. The two conditions arrive
//! in either order; [`RuntimeWiring`] holds the gate between them and
//! performs the one-time run side effects when it opens.

use serde_json::{json, Value};

use proctor_core::config::CommenceConfig;
use proctor_core::events::{SuiteEvent, UNCAUGHT_EXCEPTION};
use proctor_core::gate::ExecutionGate;

use crate::early_errors::{EarlyErrorSink, UncaughtError};

/// Seam to the external collaborators living inside the runtime: document
/// reset, console capture, the execution context, and the test runner
/// itself.
pub trait SuiteHost {
    /// Reset the hosting document before a run.
    fn reset_document(&mut self);
    /// Begin mirroring console output into the event stream.
    fn capture_console(&mut self);
    /// Apply a pass-through configuration option onto the execution context.
    fn apply_option(&mut self, key: &str, value: &Value);
    /// Hand control to the test runner with the compiled test contexts.
    fn run_suite(&mut self, config: &CommenceConfig);
    /// Emit an event from this runtime.
    fn emit(&mut self, event: SuiteEvent);
}

pub struct RuntimeWiring<H: SuiteHost> {
    gate: ExecutionGate,
    host: H,
    context_path: Option<String>,
}

impl<H: SuiteHost> RuntimeWiring<H> {
    pub fn new(host: H) -> Self {
        Self {
            gate: ExecutionGate::new(),
            host,
            context_path: None,
        }
    }

    /// Suite assets are addressed relative to this path; uncaught-error
    /// locations under it are reported relative to it.
    pub fn with_context_path(host: H, context_path: impl Into<String>) -> Self {
        Self {
            gate: ExecutionGate::new(),
            host,
            context_path: Some(context_path.into()),
        }
    }

    /// Install the wiring, forwarding errors buffered before it existed.
    pub fn install(host: H, early: &mut EarlyErrorSink) -> Self {
        let mut wiring = Self::new(host);
        early.drain_into(|error| wiring.report_uncaught(error));
        wiring
    }

    /// The `commence` instruction arrived with its configuration.
    pub fn ready(&mut self, config: CommenceConfig) {
        if let Some(config) = self.gate.notify_ready(config) {
            self.fire(config);
        }
    }

    /// An explicit start request (used when auto-run is disabled).
    pub fn run(&mut self) {
        if let Some(config) = self.gate.notify_start() {
            self.fire(config);
        }
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    /// Re-emit an uncaught error as a structured event instead of letting
    /// it take the runtime down.
    pub fn report_uncaught(&mut self, error: UncaughtError) {
        let message = format_message(&error, self.context_path.as_deref());
        tracing::warn!(message = %message, "Uncaught error in runtime");
        self.host.emit(SuiteEvent::global(
            UNCAUGHT_EXCEPTION,
            json!({ "name": "UncaughtError", "message": message }),
        ));
    }

    fn fire(&mut self, config: CommenceConfig) {
        if config.should_reset_document() {
            self.host.reset_document();
        }
        if config.capture_console {
            self.host.capture_console();
        }
        for (key, value) in &config.extra {
            self.host.apply_option(key, value);
        }
        self.host.run_suite(&config);
    }
}

/// Render an uncaught error as a single reportable message.
///
/// Script locations under the context path are shown relative to it, and
/// the host's bare "Error loading script" on line 1 is rewritten into
/// something that names the script.
pub fn format_message(error: &UncaughtError, context_path: Option<&str>) -> String {
    match &error.location {
        Some(location) => {
            let url = relativize(&location.url, context_path);
            if location.line == 1 && error.message == "Error loading script" {
                format!("Unable to load script {url}")
            } else {
                format!("{url}:{} {}", location.line, error.message)
            }
        }
        None => error
            .message
            .trim_start_matches("uncaught exception: ")
            .to_string(),
    }
}

fn relativize(url: &str, context_path: Option<&str>) -> String {
    match context_path.and_then(|cp| url.find(cp).map(|idx| (cp, idx))) {
        Some((cp, idx)) => format!(".{}", &url[idx + cp.len()..]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHost {
        calls: Vec<String>,
        options: Vec<(String, Value)>,
        events: Vec<SuiteEvent>,
    }

    impl SuiteHost for RecordingHost {
        fn reset_document(&mut self) {
            self.calls.push("reset_document".into());
        }
        fn capture_console(&mut self) {
            self.calls.push("capture_console".into());
        }
        fn apply_option(&mut self, key: &str, value: &Value) {
            self.options.push((key.to_string(), value.clone()));
        }
        fn run_suite(&mut self, _config: &CommenceConfig) {
            self.calls.push("run_suite".into());
        }
        fn emit(&mut self, event: SuiteEvent) {
            self.events.push(event);
        }
    }

    #[test]
    fn ready_with_auto_run_starts_the_suite() {
        let mut wiring = RuntimeWiring::new(RecordingHost::default());
        wiring.ready(CommenceConfig::default());
        assert!(wiring.is_running());
        assert_eq!(wiring.host.calls, vec!["reset_document", "run_suite"]);
    }

    #[test]
    fn manual_start_waits_for_run() {
        let mut wiring = RuntimeWiring::new(RecordingHost::default());
        wiring.ready(CommenceConfig::manual_start());
        assert!(wiring.host.calls.is_empty());
        wiring.run();
        assert_eq!(wiring.host.calls, vec!["reset_document", "run_suite"]);
    }

    #[test]
    fn run_before_ready_starts_on_ready() {
        let mut wiring = RuntimeWiring::new(RecordingHost::default());
        wiring.run();
        assert!(wiring.host.calls.is_empty());
        wiring.ready(CommenceConfig::manual_start());
        assert!(wiring.is_running());
    }

    #[test]
    fn side_effects_fire_exactly_once() {
        let mut wiring = RuntimeWiring::new(RecordingHost::default());
        wiring.ready(CommenceConfig::default());
        wiring.run();
        wiring.ready(CommenceConfig::default());
        assert_eq!(
            wiring.host.calls.iter().filter(|c| *c == "run_suite").count(),
            1
        );
    }

    #[test]
    fn reset_document_can_be_opted_out() {
        let mut wiring = RuntimeWiring::new(RecordingHost::default());
        let config: CommenceConfig =
            serde_json::from_value(json!({ "resetDocument": false })).unwrap();
        wiring.ready(config);
        assert_eq!(wiring.host.calls, vec!["run_suite"]);
    }

    #[test]
    fn console_capture_is_enabled_when_configured() {
        let mut wiring = RuntimeWiring::new(RecordingHost::default());
        let config: CommenceConfig =
            serde_json::from_value(json!({ "captureConsole": true })).unwrap();
        wiring.ready(config);
        assert_eq!(
            wiring.host.calls,
            vec!["reset_document", "capture_console", "run_suite"]
        );
    }

    #[test]
    fn pass_through_options_reach_the_context_before_the_run() {
        let mut wiring = RuntimeWiring::new(RecordingHost::default());
        let config: CommenceConfig =
            serde_json::from_value(json!({ "filters": ["unit"], "randomSeed": 3 })).unwrap();
        wiring.ready(config);
        assert_eq!(wiring.host.options.len(), 2);
        assert_eq!(wiring.host.calls.last().map(String::as_str), Some("run_suite"));
    }

    #[test]
    fn install_drains_early_errors_as_events() {
        let mut early = EarlyErrorSink::default();
        early.push(UncaughtError::new("uncaught exception: boom"));
        early.push(UncaughtError::at("TypeError: x is nil", "/suite/tests.js", 12));

        let wiring = RuntimeWiring::install(RecordingHost::default(), &mut early);

        assert!(early.is_empty());
        assert_eq!(wiring.host.events.len(), 2);
        assert_eq!(wiring.host.events[0].name(), UNCAUGHT_EXCEPTION);
        assert_eq!(wiring.host.events[0].data()["message"], json!("boom"));
        assert_eq!(
            wiring.host.events[1].data()["message"],
            json!("/suite/tests.js:12 TypeError: x is nil")
        );
    }

    #[test]
    fn script_load_failure_names_the_script() {
        let error = UncaughtError::at("Error loading script", "http://pool/suite/helper.js", 1);
        assert_eq!(
            format_message(&error, Some("http://pool/suite")),
            "Unable to load script ./helper.js"
        );
    }

    #[test]
    fn locations_under_the_context_path_are_relativized() {
        let error = UncaughtError::at("ReferenceError: y", "http://pool/suite/spec.js", 4);
        assert_eq!(
            format_message(&error, Some("http://pool/suite")),
            "./spec.js:4 ReferenceError: y"
        );
    }

    #[test]
    fn plain_messages_lose_the_uncaught_prefix() {
        let error = UncaughtError::new("uncaught exception: assertion failed");
        assert_eq!(format_message(&error, None), "assertion failed");
    }
}
