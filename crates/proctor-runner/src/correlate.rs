//! Identity correlation for pool events.
//!
//! Identities are assigned twice: the runtime's own test runner stamps a
//! uuid into its payloads at suite-compile time, and the transport stamps a
//! slave id onto every wrapper. The transport's id wins everywhere — it is
//! the only identity that exists for payload-less infrastructure events
//! such as dead-runtime notifications, so preferring it keeps connection
//! loss attributable without cooperation from the remote side.

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use proctor_core::events::{empty_payload, SuiteEvent, WrappedEvent};

/// Attach the authoritative transport identity to a wrapped event.
///
/// The payload defaults to an empty object; any payload-level `uuid` is
/// overwritten; a nested runtime descriptor is tagged with the same
/// identity so it is discoverable at both levels.
pub fn normalize(event: WrappedEvent) -> SuiteEvent {
    let WrappedEvent {
        name,
        slave_id,
        data,
    } = event;

    let mut data = data.unwrap_or_else(empty_payload);
    if let Value::Object(map) = &mut data {
        map.insert("uuid".into(), Value::String(slave_id.as_str().to_string()));
        if let Some(Value::Object(runtime)) = map.get_mut("runtime") {
            runtime.insert("uuid".into(), Value::String(slave_id.as_str().to_string()));
        }
    }

    SuiteEvent::Runtime {
        name,
        uuid: slave_id,
        data,
    }
}

/// Forward normalized pool events onto the session bus until the feed
/// closes or the session is torn down.
pub fn spawn_correlator(
    feed: broadcast::Receiver<WrappedEvent>,
    bus: broadcast::Sender<SuiteEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = BroadcastStream::new(feed);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        // No receivers just means nobody has subscribed yet
                        let _ = bus.send(normalize(event));
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(skipped = skipped, "Correlator lagged, dropped events");
                    }
                    None => break,
                },
            }
        }
    })
}
