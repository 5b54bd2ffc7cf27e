//! WebSocket-to-Kafka bridge.
//!
//! [`StreamBridge`] owns the connection loop: it keeps a subscription to the
//! upstream WebSocket endpoint alive indefinitely, maps each text frame to a
//! normalized record, and hands every record to an independently scheduled
//! publish task gated by a semaphore. Publish failures are diverted to the
//! fallback retry buffer owned by the background retry task.
//!
//! The read loop never awaits publish completion, so a slow broker does not
//! throttle frame consumption — the semaphore bounds in-flight publish
//! attempts, not inbound frames. Message arrival order is consequently not
//! preserved end to end.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use tungstenite::Message;

use crate::mapping::{now_millis, Mapper};
use crate::metrics::BridgeMetrics;
use crate::publish::Publisher;
use crate::retry::{spawn_retry_task, BufferedEntry};

use super::config::StreamConfig;
use super::connection::{ConnectionState, ReconnectPolicy};

/// Capacity of the channel feeding the retry task. Publish tasks block on a
/// full channel while holding their gate permit, which is acceptable: the
/// channel only fills when the broker is down and the sweep is backlogged.
const RETRY_CHANNEL_CAPACITY: usize = 1_024;

/// Long-lived bridge from one WebSocket subscription into the broker.
pub struct StreamBridge {
    config: StreamConfig,
    mapper: Mapper,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<BridgeMetrics>,
}

impl StreamBridge {
    /// Creates a bridge over `publisher` for the given subscription.
    #[must_use]
    pub fn new(config: StreamConfig, publisher: Arc<dyn Publisher>) -> Self {
        let mapper = Mapper::new(
            config.mapping.clone(),
            config.key_field.clone(),
            config.topic.clone(),
            config.topic_prefix.clone(),
        );
        Self {
            config,
            mapper,
            publisher,
            metrics: Arc::new(BridgeMetrics::new()),
        }
    }

    /// Returns a handle to the bridge metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs the bridge until `shutdown_rx` signals.
    ///
    /// Connection and protocol errors are never fatal: the loop reconnects
    /// with linear backoff (1 s, +2 s per consecutive failure, capped at
    /// 30 s; reset on success). On shutdown, in-flight publish tasks are
    /// joined and the retry task performs a final drain before this returns.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let (retry_tx, retry_rx) = mpsc::channel(RETRY_CHANNEL_CAPACITY);
        let retry_handle = spawn_retry_task(
            Arc::clone(&self.publisher),
            self.config.fallback_capacity,
            self.config.retry_interval,
            retry_rx,
            shutdown_rx.clone(),
            Arc::clone(&self.metrics),
        );

        let gate = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut tasks = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            info!(
                url = %self.config.url,
                state = %ConnectionState::Connecting,
                "connecting to stream"
            );

            match tokio_tungstenite::connect_async(&self.config.url).await {
                Ok((ws, _response)) => {
                    info!(
                        url = %self.config.url,
                        state = %ConnectionState::Connected,
                        "stream connection established"
                    );
                    policy.reset();

                    let shutdown_requested = self
                        .read_frames(ws, &mut shutdown_rx, &gate, &retry_tx, &mut tasks)
                        .await;
                    if shutdown_requested {
                        break;
                    }
                }
                Err(err) => {
                    warn!(url = %self.config.url, error = %err, "stream connection failed");
                }
            }

            self.metrics.record_reconnect();
            let delay = policy.next_backoff();
            warn!(
                delay_ms = delay.as_millis() as u64,
                attempt = policy.attempt(),
                state = %ConnectionState::Waiting,
                "reconnecting after backoff"
            );
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        // Join outstanding publish tasks, then let the retry task drain.
        while tasks.join_next().await.is_some() {}
        drop(retry_tx);
        let _ = retry_handle.await;
        info!("stream bridge stopped");
    }

    /// Reads frames from an established connection until it drops or
    /// shutdown is requested. Returns `true` if shutdown was requested.
    async fn read_frames(
        &self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        shutdown_rx: &mut watch::Receiver<bool>,
        gate: &Arc<Semaphore>,
        retry_tx: &mpsc::Sender<BufferedEntry>,
        tasks: &mut JoinSet<()>,
    ) -> bool {
        let (mut write, mut read) = ws.split();

        if let Some(ref msg) = self.config.subscribe_message {
            if let Err(err) = write.send(Message::Text(msg.clone().into())).await {
                warn!(error = %err, "failed to send subscribe message");
                return false;
            }
            debug!("subscribe message sent");
        }

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.dispatch(&text, gate, retry_tx, tasks);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(url = %self.config.url, "server sent close frame");
                        return false;
                    }
                    Some(Ok(_)) => {} // Binary, Pong, Frame — ignored
                    Some(Err(err)) => {
                        warn!(url = %self.config.url, error = %err, "stream read error");
                        return false;
                    }
                    None => {
                        info!(url = %self.config.url, "stream ended");
                        return false;
                    }
                },
                _ = shutdown_rx.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return true;
                }
            }
        }
    }

    /// Maps one text frame and spawns its gated publish task.
    ///
    /// A frame that cannot be decoded or mapped is dropped with a warning;
    /// the connection is unaffected.
    fn dispatch(
        &self,
        text: &str,
        gate: &Arc<Semaphore>,
        retry_tx: &mpsc::Sender<BufferedEntry>,
        tasks: &mut JoinSet<()>,
    ) {
        self.metrics.record_frame(text.len() as u64);

        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                self.metrics.record_mapping_error();
                return;
            }
        };

        let mapped = match self.mapper.map_frame(&frame, now_millis()) {
            Ok(mapped) => mapped,
            Err(err) => {
                warn!(error = %err, "dropping unmappable frame");
                self.metrics.record_mapping_error();
                return;
            }
        };

        // Reap completed publish tasks without blocking the reader.
        while tasks.try_join_next().is_some() {}

        let publisher = Arc::clone(&self.publisher);
        let gate = Arc::clone(gate);
        let retry_tx = retry_tx.clone();
        let metrics = Arc::clone(&self.metrics);

        tasks.spawn(async move {
            let Ok(_permit) = gate.acquire_owned().await else {
                return;
            };
            match publisher
                .publish(&mapped.topic, &mapped.key, &mapped.record)
                .await
            {
                Ok(()) => metrics.record_publish(),
                Err(err) => {
                    error!(
                        topic = %mapped.topic,
                        key = %mapped.key,
                        error = %err,
                        "publish failed, buffering for retry"
                    );
                    metrics.record_publish_failure();
                    let entry = BufferedEntry {
                        topic: mapped.topic,
                        key: mapped.key,
                        record: mapped.record,
                    };
                    if retry_tx.send(entry).await.is_err() {
                        warn!("retry task unavailable, dropping failed record");
                    }
                }
            }
        });
    }
}

impl std::fmt::Debug for StreamBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBridge")
            .field("url", &self.config.url)
            .field("topic", &self.config.topic)
            .field("max_in_flight", &self.config.max_in_flight)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::error::{BridgeError, BridgeResult};
    use crate::mapping::FieldMapping;
    use crate::stream::config::ReconnectConfig;

    struct TogglePublisher {
        fail: AtomicBool,
    }

    impl TogglePublisher {
        fn new(fail: bool) -> Self {
            Self {
                fail: AtomicBool::new(fail),
            }
        }
    }

    #[async_trait]
    impl Publisher for TogglePublisher {
        async fn publish(
            &self,
            _topic: &str,
            _key: &str,
            _record: &Map<String, Value>,
        ) -> BridgeResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(BridgeError::Publish("broker down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn test_bridge(publisher: Arc<dyn Publisher>) -> StreamBridge {
        let mut fields = BTreeMap::new();
        fields.insert("symbol".to_string(), "s".to_string());
        fields.insert("bid_price".to_string(), "b".to_string());
        let config = StreamConfig {
            url: "wss://stream.example.com/ws".into(),
            mapping: FieldMapping::Flat(fields),
            key_field: "symbol".into(),
            topic: "binance-ws-trades".into(),
            topic_prefix: "binance-ws".into(),
            subscribe_message: None,
            reconnect: ReconnectConfig::default(),
            max_in_flight: 2,
            fallback_capacity: 100,
            retry_interval: std::time::Duration::from_secs(1),
        };
        StreamBridge::new(config, publisher)
    }

    fn dispatch_harness() -> (Arc<Semaphore>, mpsc::Sender<BufferedEntry>, mpsc::Receiver<BufferedEntry>, JoinSet<()>) {
        let gate = Arc::new(Semaphore::new(2));
        let (tx, rx) = mpsc::channel(16);
        (gate, tx, rx, JoinSet::new())
    }

    #[tokio::test]
    async fn test_dispatch_publishes_mapped_record() {
        let bridge = test_bridge(Arc::new(TogglePublisher::new(false)));
        let (gate, tx, _rx, mut tasks) = dispatch_harness();

        bridge.dispatch(r#"{"s":"BTCUSDT","b":"50000.1"}"#, &gate, &tx, &mut tasks);
        while tasks.join_next().await.is_some() {}

        let snap = bridge.metrics().snapshot();
        assert_eq!(snap.frames_received, 1);
        assert_eq!(snap.records_published, 1);
        assert_eq!(snap.publish_failures, 0);
    }

    #[tokio::test]
    async fn test_dispatch_buffers_failed_publish() {
        let bridge = test_bridge(Arc::new(TogglePublisher::new(true)));
        let (gate, tx, mut rx, mut tasks) = dispatch_harness();

        bridge.dispatch(r#"{"s":"BTCUSDT","b":"50000.1"}"#, &gate, &tx, &mut tasks);
        while tasks.join_next().await.is_some() {}

        let entry = rx.recv().await.expect("failed publish should be buffered");
        assert_eq!(entry.topic, "binance-ws-trades");
        assert_eq!(entry.key, "BTCUSDT");
        assert_eq!(bridge.metrics().snapshot().publish_failures, 1);
    }

    #[tokio::test]
    async fn test_dispatch_drops_undecodable_frame() {
        let bridge = test_bridge(Arc::new(TogglePublisher::new(false)));
        let (gate, tx, _rx, mut tasks) = dispatch_harness();

        bridge.dispatch("{not json", &gate, &tx, &mut tasks);
        while tasks.join_next().await.is_some() {}

        let snap = bridge.metrics().snapshot();
        assert_eq!(snap.mapping_errors, 1);
        assert_eq!(snap.records_published, 0);
    }

    #[tokio::test]
    async fn test_dispatch_drops_unmappable_frame() {
        let bridge = test_bridge(Arc::new(TogglePublisher::new(false)));
        let (gate, tx, _rx, mut tasks) = dispatch_harness();

        // Missing the mapped "b" field.
        bridge.dispatch(r#"{"s":"BTCUSDT"}"#, &gate, &tx, &mut tasks);
        while tasks.join_next().await.is_some() {}

        let snap = bridge.metrics().snapshot();
        assert_eq!(snap.mapping_errors, 1);
        assert_eq!(snap.records_published, 0);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_block_reader_beyond_gate() {
        // With a single-permit gate and a failing publisher, dispatching
        // several frames must not deadlock the caller.
        let bridge = test_bridge(Arc::new(TogglePublisher::new(true)));
        let gate = Arc::new(Semaphore::new(1));
        let (tx, mut rx) = mpsc::channel(16);
        let mut tasks = JoinSet::new();

        for _ in 0..5 {
            bridge.dispatch(r#"{"s":"BTCUSDT","b":"1"}"#, &gate, &tx, &mut tasks);
        }
        while tasks.join_next().await.is_some() {}

        let mut buffered = 0;
        while rx.try_recv().is_ok() {
            buffered += 1;
        }
        assert_eq!(buffered, 5);
    }
}
