use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ids::RuntimeId;

/// Event name a runtime emits once its environment has finished loading.
pub const RUNTIME_READY: &str = "runtime:ready";
/// Synthetic event declaring a runtime dead, carrying only its identity.
pub const RUNTIME_TIMEOUT: &str = "runtime:timeout";
/// Event name carrying the suite's final result payload.
pub const SUITE_END: &str = "suite:end";
/// Instruction telling runtimes to begin suite execution.
pub const COMMENCE: &str = "commence";
/// Structured re-emission of an error the remote side failed to catch.
pub const UNCAUGHT_EXCEPTION: &str = "uncaughtException";

/// Transport-level wrapper around one event received from the pool.
///
/// The pool stamps every wrapper with the slave id of the originating
/// runtime, whether or not the runtime attached a payload. A dead-runtime
/// notification arrives with no payload at all, so the wrapper's identity is
/// the only one guaranteed to exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WrappedEvent {
    pub name: String,
    pub slave_id: RuntimeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WrappedEvent {
    pub fn new(name: impl Into<String>, slave_id: RuntimeId, data: Option<Value>) -> Self {
        Self {
            name: name.into(),
            slave_id,
            data,
        }
    }
}

/// A connected runtime as reported by the pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<RuntimeId>,
    pub user_agent: String,
}

impl RuntimeDescriptor {
    pub fn new(uuid: RuntimeId, user_agent: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid),
            user_agent: user_agent.into(),
        }
    }
}

/// A correlated event on the session bus.
///
/// `Runtime` events carry the authoritative transport identity; `Global`
/// events have no derivable identity and bypass all per-runtime bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SuiteEvent {
    Global {
        name: String,
        data: Value,
    },
    Runtime {
        name: String,
        uuid: RuntimeId,
        data: Value,
    },
}

impl SuiteEvent {
    pub fn global(name: impl Into<String>, data: Value) -> Self {
        Self::Global {
            name: name.into(),
            data,
        }
    }

    /// The `runtime:timeout` event for an identity. Its payload carries the
    /// identity and nothing else.
    pub fn timeout(uuid: RuntimeId) -> Self {
        let data = json!({ "uuid": uuid.clone() });
        Self::Runtime {
            name: RUNTIME_TIMEOUT.to_string(),
            uuid,
            data,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Global { name, .. } | Self::Runtime { name, .. } => name,
        }
    }

    pub fn uuid(&self) -> Option<&RuntimeId> {
        match self {
            Self::Global { .. } => None,
            Self::Runtime { uuid, .. } => Some(uuid),
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            Self::Global { data, .. } | Self::Runtime { data, .. } => data,
        }
    }
}

/// An empty JSON object, the payload of events that arrived without one.
pub fn empty_payload() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_event_payload_carries_only_identity() {
        let uuid = RuntimeId::from_raw("slave-3");
        let event = SuiteEvent::timeout(uuid.clone());
        assert_eq!(event.name(), RUNTIME_TIMEOUT);
        assert_eq!(event.uuid(), Some(&uuid));
        assert_eq!(event.data(), &json!({ "uuid": "slave-3" }));
    }

    #[test]
    fn global_event_has_no_identity() {
        let event = SuiteEvent::global("suite:configuration", json!({ "runtimes": 3 }));
        assert!(event.uuid().is_none());
        assert_eq!(event.name(), "suite:configuration");
    }

    #[test]
    fn suite_event_serde_roundtrip() {
        let events = vec![
            SuiteEvent::global("log", json!({ "level": "warn", "message": "hi" })),
            SuiteEvent::timeout(RuntimeId::new()),
            SuiteEvent::Runtime {
                name: "test:success".into(),
                uuid: RuntimeId::from_raw("slave-1"),
                data: json!({ "name": "adds numbers" }),
            },
        ];

        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            let parsed: SuiteEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(event, &parsed);
        }
    }

    #[test]
    fn wrapped_event_without_payload_serializes_without_data() {
        let event = WrappedEvent::new(RUNTIME_TIMEOUT, RuntimeId::from_raw("slave-9"), None);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("data"));
    }
}
