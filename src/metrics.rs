//! Bridge and sink metrics.
//!
//! Lock-free atomic counters for the streaming bridge and the persistence
//! consumer. All counters use `Relaxed` ordering on the hot path; snapshot
//! reads provide a consistent-enough view for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for the WebSocket-to-Kafka bridge.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// Frames received from the WebSocket connection.
    pub frames_received: AtomicU64,
    /// Raw payload bytes received.
    pub bytes_received: AtomicU64,
    /// Frames dropped because they could not be decoded or mapped.
    pub mapping_errors: AtomicU64,
    /// Records successfully published on first attempt.
    pub records_published: AtomicU64,
    /// Publish attempts that failed and were diverted to the fallback buffer.
    pub publish_failures: AtomicU64,
    /// Reconnection attempts.
    pub reconnects: AtomicU64,
    /// Entries accepted into the fallback buffer.
    pub retries_buffered: AtomicU64,
    /// Buffered entries successfully resent by the retry sweep.
    pub retry_successes: AtomicU64,
    /// Sweep cycles stopped early by a failed resend. A climbing count with
    /// flat `retry_successes` means the head of the buffer is starving the
    /// entries behind it.
    pub retry_failures: AtomicU64,
    /// Oldest entries evicted because the fallback buffer was full.
    pub buffer_evictions: AtomicU64,
}

impl BridgeMetrics {
    /// Creates a metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a received frame with its payload size.
    pub fn record_frame(&self, bytes: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a frame dropped due to a decode or mapping error.
    pub fn record_mapping_error(&self) {
        self.mapping_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful first-attempt publish.
    pub fn record_publish(&self) {
        self.records_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed publish attempt.
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reconnection attempt.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an entry accepted into the fallback buffer.
    pub fn record_buffered(&self) {
        self.retries_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records buffered entries successfully resent.
    pub fn record_retry_successes(&self, n: u64) {
        self.retry_successes.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a sweep cycle stopped by a failed resend.
    pub fn record_retry_failure(&self) {
        self.retry_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an eviction of the oldest buffered entry.
    pub fn record_eviction(&self) {
        self.buffer_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> BridgeMetricsSnapshot {
        BridgeMetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            mapping_errors: self.mapping_errors.load(Ordering::Relaxed),
            records_published: self.records_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            retries_buffered: self.retries_buffered.load(Ordering::Relaxed),
            retry_successes: self.retry_successes.load(Ordering::Relaxed),
            retry_failures: self.retry_failures.load(Ordering::Relaxed),
            buffer_evictions: self.buffer_evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`BridgeMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeMetricsSnapshot {
    /// Frames received from the WebSocket connection.
    pub frames_received: u64,
    /// Raw payload bytes received.
    pub bytes_received: u64,
    /// Frames dropped due to decode or mapping errors.
    pub mapping_errors: u64,
    /// Records successfully published on first attempt.
    pub records_published: u64,
    /// Publish attempts diverted to the fallback buffer.
    pub publish_failures: u64,
    /// Reconnection attempts.
    pub reconnects: u64,
    /// Entries accepted into the fallback buffer.
    pub retries_buffered: u64,
    /// Buffered entries successfully resent.
    pub retry_successes: u64,
    /// Sweep cycles stopped early by a failed resend.
    pub retry_failures: u64,
    /// Oldest entries evicted from a full fallback buffer.
    pub buffer_evictions: u64,
}

/// Atomic counters for the batch persistence consumer.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Messages consumed from the broker.
    pub rows_consumed: AtomicU64,
    /// Messages dropped because the payload was not a usable row.
    pub malformed_rows: AtomicU64,
    /// Batches flushed to storage.
    pub batches_flushed: AtomicU64,
    /// Rows successfully inserted.
    pub rows_inserted: AtomicU64,
    /// Failed batch inserts.
    pub insert_failures: AtomicU64,
    /// Rows lost to failed inserts.
    pub rows_dropped: AtomicU64,
    /// Flushes whose average drift exceeded the SLA threshold.
    pub sla_breaches: AtomicU64,
}

impl SinkMetrics {
    /// Creates a metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a consumed message.
    pub fn record_row(&self) {
        self.rows_consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a message dropped as malformed.
    pub fn record_malformed(&self) {
        self.malformed_rows.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful flush of `rows` rows.
    pub fn record_flush(&self, rows: u64) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted.fetch_add(rows, Ordering::Relaxed);
    }

    /// Records a failed insert that dropped `rows` rows.
    pub fn record_insert_failure(&self, rows: u64) {
        self.insert_failures.fetch_add(1, Ordering::Relaxed);
        self.rows_dropped.fetch_add(rows, Ordering::Relaxed);
    }

    /// Records a drift-SLA breach.
    pub fn record_sla_breach(&self) {
        self.sla_breaches.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> SinkMetricsSnapshot {
        SinkMetricsSnapshot {
            rows_consumed: self.rows_consumed.load(Ordering::Relaxed),
            malformed_rows: self.malformed_rows.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            insert_failures: self.insert_failures.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
            sla_breaches: self.sla_breaches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`SinkMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkMetricsSnapshot {
    /// Messages consumed from the broker.
    pub rows_consumed: u64,
    /// Messages dropped as malformed.
    pub malformed_rows: u64,
    /// Batches flushed to storage.
    pub batches_flushed: u64,
    /// Rows successfully inserted.
    pub rows_inserted: u64,
    /// Failed batch inserts.
    pub insert_failures: u64,
    /// Rows lost to failed inserts.
    pub rows_dropped: u64,
    /// Flushes whose average drift exceeded the SLA threshold.
    pub sla_breaches: u64,
}
