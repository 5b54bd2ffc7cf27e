//! Bridge error types.
//!
//! Provides [`BridgeError`] covering the pipeline's error taxonomy —
//! transport, mapping, publish, and storage failures — plus a convenience
//! [`BridgeResult`] alias. None of these are fatal to the process: the
//! connection loop reconnects on transport errors, mapping errors drop a
//! single frame, publish errors divert to the fallback buffer, and storage
//! errors drop the batch.

use thiserror::Error;

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur in the streaming bridge and persistence consumer.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// WebSocket transport error (connection refused, protocol violation).
    /// Recovered by the connection loop via reconnect-with-backoff.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// A frame could not be mapped to a normalized record. Fatal to that
    /// message only; the connection is unaffected.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// A record could not be published to the broker.
    #[error("publish error: {0}")]
    Publish(String),

    /// Kafka client error.
    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Storage-side failure (pool exhaustion, connection string parse).
    #[error("storage error: {0}")]
    Storage(String),

    /// Postgres query error.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_error_display() {
        let err = BridgeError::Mapping("source field 'b' missing".into());
        assert_eq!(err.to_string(), "mapping error: source field 'b' missing");
    }

    #[test]
    fn test_serde_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }

    #[test]
    fn test_configuration_error_display() {
        let err = BridgeError::Configuration("at least one column is required".into());
        assert!(err.to_string().contains("column"));
    }
}
