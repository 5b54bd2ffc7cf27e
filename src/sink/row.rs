//! Row assembly for the persistence stage.
//!
//! Broker messages arrive as JSON objects; the insert statement wants
//! positional parameters. [`build_row`] assembles a [`PersistRow`] in the
//! configured column order and appends the per-row drift (elapsed
//! milliseconds between production and consumption) as the final element.

use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};
use crate::mapping::PRODUCED_TIME_FIELD;

/// A dynamically typed SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    BigInt(i64),
    /// Double-precision float.
    Double(f64),
    /// Text.
    Text(String),
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Double(n.as_f64().unwrap_or(f64::NAN)), Self::BigInt),
            Value::String(s) => Self::Text(s.clone()),
            // Nested structures are persisted as their JSON text.
            other => Self::Text(other.to_string()),
        }
    }
}

/// One row of positional insert parameters, drift last.
pub type PersistRow = Vec<SqlValue>;

/// Returns a row's drift value (its final element).
#[must_use]
pub fn drift_of(row: &PersistRow) -> Option<f64> {
    match row.last() {
        Some(SqlValue::Double(d)) => Some(*d),
        _ => None,
    }
}

/// Assembles a row from a consumed record.
///
/// Values are taken in `columns` order; a column absent from the record
/// becomes SQL NULL. Drift is `consumed_time` minus the record's
/// `produced_time`, appended as the final element.
///
/// # Errors
///
/// Returns [`BridgeError::Mapping`] if the record lacks a numeric
/// `produced_time`; the caller drops the single offending message.
#[allow(clippy::cast_precision_loss)]
pub fn build_row(
    record: &Map<String, Value>,
    columns: &[String],
    consumed_time: i64,
) -> BridgeResult<PersistRow> {
    let produced = record
        .get(PRODUCED_TIME_FIELD)
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            BridgeError::Mapping(format!(
                "record is missing a numeric '{PRODUCED_TIME_FIELD}' field"
            ))
        })?;
    let drift = consumed_time as f64 - produced;

    let mut row = Vec::with_capacity(columns.len() + 1);
    for column in columns {
        row.push(record.get(column).map_or(SqlValue::Null, SqlValue::from));
    }
    row.push(SqlValue::Double(drift));
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "symbol": "BTCUSDT",
            "bid_price": "50000.1",
            "last_update_id": 42,
            "produced_time": 1_000
        }) else {
            unreachable!()
        };
        map
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_build_row_in_column_order_with_drift_last() {
        let row = build_row(
            &record(),
            &columns(&["symbol", "bid_price", "last_update_id"]),
            1_350,
        )
        .unwrap();

        assert_eq!(
            row,
            vec![
                SqlValue::Text("BTCUSDT".into()),
                SqlValue::Text("50000.1".into()),
                SqlValue::BigInt(42),
                SqlValue::Double(350.0),
            ]
        );
        assert_eq!(drift_of(&row), Some(350.0));
    }

    #[test]
    fn test_build_row_missing_column_is_null() {
        let row = build_row(&record(), &columns(&["symbol", "nonexistent"]), 1_000).unwrap();
        assert_eq!(row[1], SqlValue::Null);
    }

    #[test]
    fn test_build_row_without_produced_time_errors() {
        let mut rec = record();
        rec.remove(PRODUCED_TIME_FIELD);
        let err = build_row(&rec, &columns(&["symbol"]), 1_000).unwrap_err();
        assert!(matches!(err, BridgeError::Mapping(_)));
    }

    #[test]
    fn test_build_row_float_produced_time() {
        let mut rec = record();
        rec.insert(PRODUCED_TIME_FIELD.into(), json!(999.5));
        let row = build_row(&rec, &columns(&["symbol"]), 1_000).unwrap();
        assert_eq!(drift_of(&row), Some(0.5));
    }

    #[test]
    fn test_sql_value_from_json_kinds() {
        assert_eq!(SqlValue::from(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from(&json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from(&json!(42)), SqlValue::BigInt(42));
        assert_eq!(SqlValue::from(&json!(1.5)), SqlValue::Double(1.5));
        assert_eq!(SqlValue::from(&json!("x")), SqlValue::Text("x".into()));
        assert_eq!(
            SqlValue::from(&json!([1, 2])),
            SqlValue::Text("[1,2]".into())
        );
    }
}
