//! Batch persistence consumer.
//!
//! [`BatchConsumer`] reads normalized records back off the broker,
//! accumulates rows in a [`BatchWindow`], and flushes them through a
//! [`RowSink`] on a time or size trigger. Each flush logs a drift summary
//! and raises a warning when the average drift breaches the SLA threshold.
//! A failed insert drops the batch: persistence-side losses are counted,
//! not retried.

use std::sync::Arc;
use std::time::Instant;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::BridgeResult;
use crate::mapping::now_millis;
use crate::metrics::SinkMetrics;

use super::batch::{BatchWindow, DriftStats};
use super::config::SinkConfig;
use super::row::{build_row, drift_of, PersistRow};
use super::RowSink;

/// Consumes broker-delivered rows and persists them in batches.
pub struct BatchConsumer<S> {
    config: SinkConfig,
    sink: Arc<S>,
    metrics: Arc<SinkMetrics>,
    window: BatchWindow,
}

impl<S: RowSink> BatchConsumer<S> {
    /// Creates a consumer that persists through `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SinkConfig, sink: Arc<S>) -> BridgeResult<Self> {
        config.validate()?;
        let window = BatchWindow::new(config.max_batch_rows, config.flush_interval);
        Ok(Self {
            config,
            sink,
            metrics: Arc::new(SinkMetrics::new()),
            window,
        })
    }

    /// Returns a handle to the consumer metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs the consume loop until `shutdown_rx` signals, then makes a
    /// final flush of whatever the window still holds.
    ///
    /// # Errors
    ///
    /// Returns an error only if the Kafka consumer cannot be created or
    /// subscribed; consume and insert errors are logged and absorbed.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> BridgeResult<()> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()?;
        consumer.subscribe(&[self.config.topic.as_str()])?;

        info!(
            brokers = %self.config.brokers,
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            "persistence consumer started"
        );

        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    if let Some(rows) = self.window.take_if_ready(Instant::now()) {
                        self.flush(rows).await;
                    }
                }
                msg = consumer.recv() => match msg {
                    Ok(msg) => {
                        if let Some(payload) = msg.payload() {
                            self.ingest_payload(payload, now_millis());
                        }
                        if self.window.len() >= self.config.max_batch_rows {
                            if let Some(rows) = self.window.take_if_ready(Instant::now()) {
                                self.flush(rows).await;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "broker consume error");
                    }
                },
            }
        }

        let rows = self.window.take_all();
        if !rows.is_empty() {
            self.flush(rows).await;
        }
        consumer.unsubscribe();
        info!(topic = %self.config.topic, "persistence consumer stopped");
        Ok(())
    }

    /// Decodes one consumed payload into a row and accumulates it.
    ///
    /// Undecodable payloads and rows without a usable `produced_time` are
    /// dropped with a warning.
    fn ingest_payload(&mut self, payload: &[u8], consumed_time: i64) {
        self.metrics.record_row();
        let record: Map<String, Value> = match serde_json::from_slice(payload) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "dropping undecodable message");
                self.metrics.record_malformed();
                return;
            }
        };
        match build_row(&record, &self.config.columns, consumed_time) {
            Ok(row) => self.window.push(row),
            Err(err) => {
                warn!(error = %err, "dropping malformed row");
                self.metrics.record_malformed();
            }
        }
    }

    /// Inserts a flushed batch and logs its drift summary.
    async fn flush(&mut self, rows: Vec<PersistRow>) {
        let drifts: Vec<f64> = rows.iter().filter_map(drift_of).collect();

        match self.sink.insert_rows(&rows).await {
            Ok(()) => {
                self.metrics.record_flush(rows.len() as u64);
                if let Some(stats) = DriftStats::from_drifts(&drifts) {
                    info!(
                        rows = rows.len(),
                        max = stats.max,
                        avg = stats.avg,
                        p95 = stats.p95,
                        topic = %self.config.topic,
                        "flushed batch"
                    );
                    if stats.breaches(self.config.drift_warn_ms) {
                        self.metrics.record_sla_breach();
                        warn!(
                            avg_ms = stats.avg,
                            threshold_ms = self.config.drift_warn_ms,
                            topic = %self.config.topic,
                            "average drift exceeds threshold"
                        );
                    }
                }
            }
            Err(err) => {
                error!(
                    error = %err,
                    rows = rows.len(),
                    topic = %self.config.topic,
                    "insert failed, dropping batch"
                );
                self.metrics.record_insert_failure(rows.len() as u64);
            }
        }
    }
}

impl<S> std::fmt::Debug for BatchConsumer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConsumer")
            .field("topic", &self.config.topic)
            .field("pending_rows", &self.window.len())
            .finish_non_exhaustive()
    }
}
