//! Fallback retry buffer and background sweep.
//!
//! Publish failures are preserved in a bounded FIFO, [`FallbackBuffer`], and
//! resent by a periodic sweep. The buffer is owned by a single spawned task
//! ([`spawn_retry_task`]); publish tasks hand entries over through an mpsc
//! channel, so no lock guards the buffer.
//!
//! The sweep resends in FIFO order and stops the cycle on the first entry
//! that fails, rather than hammering a broker that is still unavailable.
//! This is an accepted trade-off: a persistently failing head entry can
//! starve later entries that would succeed. Each stopped cycle is counted
//! in `BridgeMetrics::retry_failures` so the starvation is observable.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics::BridgeMetrics;
use crate::publish::Publisher;

/// A record that failed to publish, held for retry.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedEntry {
    /// Destination topic of the failed publish.
    pub topic: String,
    /// Routing key of the failed publish.
    pub key: String,
    /// The normalized record payload.
    pub record: Map<String, Value>,
}

/// Outcome of one retry sweep cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Entries successfully resent (and removed) this cycle.
    pub resent: usize,
    /// Whether the cycle stopped early on a failed resend.
    pub stopped_on_failure: bool,
}

/// Bounded FIFO of publish failures.
///
/// Insertion at capacity evicts the oldest unretried entry; the eviction is
/// counted but otherwise silent (bounded data loss is the accepted policy).
#[derive(Debug)]
pub struct FallbackBuffer {
    entries: VecDeque<BufferedEntry>,
    capacity: usize,
    evictions: u64,
}

impl FallbackBuffer {
    /// Creates an empty buffer with the given capacity.
    ///
    /// A zero capacity is coerced to 1 so `push` always retains the newest
    /// entry.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            evictions: 0,
        }
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total entries evicted due to overflow since creation.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Appends an entry, evicting the oldest if at capacity.
    ///
    /// Returns `true` if an eviction occurred.
    pub fn push(&mut self, entry: BufferedEntry) -> bool {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evictions += 1;
            true
        } else {
            false
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Resends buffered entries in FIFO order through `publisher`.
    ///
    /// Each successfully resent entry is removed before the next is
    /// attempted, so no entry is attempted twice in one sweep. On the first
    /// resend failure the cycle stops immediately; the failed entry and all
    /// entries behind it remain for the next cycle.
    pub async fn sweep(&mut self, publisher: &dyn Publisher) -> SweepOutcome {
        let mut resent = 0;
        while let Some(entry) = self.entries.front() {
            match publisher
                .publish(&entry.topic, &entry.key, &entry.record)
                .await
            {
                Ok(()) => {
                    self.entries.pop_front();
                    resent += 1;
                }
                Err(err) => {
                    error!(
                        topic = %entry.topic,
                        key = %entry.key,
                        error = %err,
                        "retry failed, deferring remaining entries to next sweep"
                    );
                    return SweepOutcome {
                        resent,
                        stopped_on_failure: true,
                    };
                }
            }
        }
        SweepOutcome {
            resent,
            stopped_on_failure: false,
        }
    }
}

/// Spawns the retry task that owns a [`FallbackBuffer`].
///
/// The task accepts failed publishes from `entry_rx`, sweeps the buffer
/// every `interval`, and on shutdown keeps receiving until every sender is
/// dropped before making one final drain attempt. Publish tasks can still
/// be sending after the shutdown signal fires; closing the channel, not the
/// signal, is what ends intake.
pub fn spawn_retry_task(
    publisher: Arc<dyn Publisher>,
    capacity: usize,
    interval: Duration,
    mut entry_rx: mpsc::Receiver<BufferedEntry>,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<BridgeMetrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = FallbackBuffer::new(capacity);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                entry = entry_rx.recv() => {
                    match entry {
                        Some(entry) => accept(&mut buffer, entry, &metrics),
                        // All senders dropped: the bridge is gone.
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        info!(size = buffer.len(), "retrying buffered records");
                        let outcome = buffer.sweep(publisher.as_ref()).await;
                        metrics.record_retry_successes(outcome.resent as u64);
                        if outcome.stopped_on_failure {
                            metrics.record_retry_failure();
                        }
                    }
                }
            }
        }

        // In-flight publish tasks may still be sending; keep receiving
        // until the bridge drops its sender, then attempt one final sweep
        // so a healthy broker gets the remaining entries.
        while let Some(entry) = entry_rx.recv().await {
            accept(&mut buffer, entry, &metrics);
        }
        if !buffer.is_empty() {
            info!(size = buffer.len(), "final drain of fallback buffer");
            let outcome = buffer.sweep(publisher.as_ref()).await;
            metrics.record_retry_successes(outcome.resent as u64);
            if outcome.stopped_on_failure {
                metrics.record_retry_failure();
            }
            if !buffer.is_empty() {
                warn!(
                    remaining = buffer.len(),
                    "fallback buffer not fully drained at shutdown"
                );
            }
        }
    })
}

/// Pushes an entry into the buffer, recording metrics and warning on the
/// first overflow.
fn accept(buffer: &mut FallbackBuffer, entry: BufferedEntry, metrics: &BridgeMetrics) {
    metrics.record_buffered();
    if buffer.push(entry) {
        metrics.record_eviction();
        if buffer.evictions() == 1 {
            warn!(
                capacity = buffer.len(),
                "fallback buffer full, evicting oldest entries"
            );
        }
    }
}
