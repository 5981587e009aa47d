use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution configuration delivered with the `commence` instruction.
///
/// `auto_run` and `reset_document` are tri-state: leaving them unset means
/// enabled. Options outside the recognized set are carried through verbatim
/// and applied onto the execution context by the receiving side.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_document: Option<bool>,
    #[serde(default)]
    pub capture_console: bool,
    #[serde(default)]
    pub fail_on_no_assertions: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommenceConfig {
    /// The fixed configuration the orchestrator sends to runtimes.
    pub fn commence_defaults() -> Self {
        Self {
            auto_run: Some(true),
            capture_console: true,
            fail_on_no_assertions: true,
            ..Self::default()
        }
    }

    /// Variant for execution contexts whose start signal is explicit, never
    /// implied by readiness.
    pub fn manual_start() -> Self {
        Self {
            auto_run: Some(false),
            ..Self::default()
        }
    }

    /// Readiness implies a start request unless auto-run was explicitly
    /// disabled.
    pub fn should_auto_run(&self) -> bool {
        self.auto_run.unwrap_or(true)
    }

    /// The hosting document is reset before a run unless explicitly opted
    /// out.
    pub fn should_reset_document(&self) -> bool {
        self.reset_document.unwrap_or(true)
    }
}
