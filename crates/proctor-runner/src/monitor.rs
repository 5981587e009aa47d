//! Per-runtime inactivity monitoring.
//!
//! The monitor wraps an event feed and keeps one deadline per runtime
//! identity, reset on every forwarded event. A runtime that stays silent
//! past the window is declared dead: exactly one synthetic
//! `runtime:timeout` event is emitted for it, and everything it sends
//! afterwards is suppressed so late arrivals cannot resurrect it in
//! downstream consumers. Events with no identity bypass the ledger
//! entirely.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use proctor_core::events::{SuiteEvent, RUNTIME_TIMEOUT};
use proctor_core::ids::RuntimeId;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

struct LedgerEntry {
    deadline: Instant,
    timed_out: bool,
}

/// Watch `feed` for inactivity, forwarding live events to `out`.
///
/// Runs until the feed closes or `cancel` fires. The ledger is owned by
/// the spawned task; nothing else mutates it.
pub fn spawn_monitor(
    mut feed: broadcast::Receiver<SuiteEvent>,
    out: broadcast::Sender<SuiteEvent>,
    timeout: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ledger: HashMap<RuntimeId, LedgerEntry> = HashMap::new();
        loop {
            let next_deadline = ledger
                .values()
                .filter(|entry| !entry.timed_out)
                .map(|entry| entry.deadline)
                .min();

            tokio::select! {
                _ = cancel.cancelled() => break,
                event = feed.recv() => match event {
                    Ok(event) => handle_event(event, &mut ledger, &out, timeout),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Monitor lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = deadline_elapsed(next_deadline) => expire(&mut ledger, &out),
            }
        }
    })
}

fn handle_event(
    event: SuiteEvent,
    ledger: &mut HashMap<RuntimeId, LedgerEntry>,
    out: &broadcast::Sender<SuiteEvent>,
    timeout: Duration,
) {
    let Some(uuid) = event.uuid().cloned() else {
        // Session-level events are not subject to per-runtime liveness
        let _ = out.send(event);
        return;
    };

    let entry = ledger.entry(uuid.clone()).or_insert_with(|| LedgerEntry {
        deadline: Instant::now() + timeout,
        timed_out: false,
    });

    if entry.timed_out {
        tracing::debug!(
            uuid = %uuid,
            event = %event.name(),
            "Suppressing event from timed-out runtime"
        );
        return;
    }

    if event.name() == RUNTIME_TIMEOUT {
        // Transport-declared death; record it so the timeout stays
        // exactly-once no matter which side declared it
        entry.timed_out = true;
        let _ = out.send(event);
        return;
    }

    let _ = out.send(event);
    entry.deadline = Instant::now() + timeout;
}

fn expire(ledger: &mut HashMap<RuntimeId, LedgerEntry>, out: &broadcast::Sender<SuiteEvent>) {
    let now = Instant::now();
    for (uuid, entry) in ledger.iter_mut() {
        if !entry.timed_out && entry.deadline <= now {
            entry.timed_out = true;
            tracing::info!(uuid = %uuid, "Runtime inactive, declaring timeout");
            let _ = out.send(SuiteEvent::timeout(uuid.clone()));
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
