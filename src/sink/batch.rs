//! Batch accumulation and drift statistics.
//!
//! [`BatchWindow`] accumulates rows between flushes and decides when a flush
//! is due, from either a row-count or an elapsed-time trigger. [`DriftStats`]
//! summarizes a flushed batch's drift column: maximum, mean, and the
//! nearest-rank 95th percentile.

use std::time::{Duration, Instant};

use super::row::PersistRow;

/// Per-flush summary of the drift column, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftStats {
    /// Maximum drift, rounded to the nearest integer.
    pub max: i64,
    /// Mean drift, rounded to the nearest integer.
    pub avg: i64,
    /// Nearest-rank 95th percentile: the element at index
    /// `floor(n * 0.95) - 1` of the ascending-sorted drifts, clamped to the
    /// first element for small `n`. Unlike `max` and `avg` this is an actual
    /// observed value, so it is reported unrounded.
    pub p95: f64,
}

impl DriftStats {
    /// Computes statistics over a batch's drift values.
    ///
    /// Returns `None` for an empty batch.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_drifts(drifts: &[f64]) -> Option<Self> {
        if drifts.is_empty() {
            return None;
        }

        let max = drifts.iter().copied().fold(f64::MIN, f64::max);
        let avg = drifts.iter().sum::<f64>() / drifts.len() as f64;

        let mut sorted = drifts.to_vec();
        sorted.sort_by(f64::total_cmp);
        // floor(n * 0.95) can be 0 for small n; clamp instead of wrapping.
        let rank = (drifts.len() as f64 * 0.95).floor() as usize;
        let p95 = sorted[rank.saturating_sub(1)];

        Some(Self {
            max: max.round() as i64,
            avg: avg.round() as i64,
            p95,
        })
    }

    /// Whether the mean drift exceeds `threshold_ms` (the drift-SLA signal).
    #[must_use]
    pub fn breaches(&self, threshold_ms: i64) -> bool {
        self.avg > threshold_ms
    }
}

/// Accumulator of rows awaiting persistence.
#[derive(Debug)]
pub struct BatchWindow {
    rows: Vec<PersistRow>,
    last_flush: Instant,
    max_rows: usize,
    flush_interval: Duration,
}

impl BatchWindow {
    /// Creates an empty window; the flush clock starts now.
    #[must_use]
    pub fn new(max_rows: usize, flush_interval: Duration) -> Self {
        Self {
            rows: Vec::new(),
            last_flush: Instant::now(),
            max_rows,
            flush_interval,
        }
    }

    /// Number of accumulated rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the window holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row to the window.
    pub fn push(&mut self, row: PersistRow) {
        self.rows.push(row);
    }

    /// Returns the accumulated rows if a flush trigger has fired.
    ///
    /// A flush is due when the row count reaches the size threshold or the
    /// elapsed time since the last flush reaches the interval. Either way
    /// the flush clock resets; a time trigger over an empty window is a
    /// no-op that returns `None`.
    pub fn take_if_ready(&mut self, now: Instant) -> Option<Vec<PersistRow>> {
        let time_due = now.duration_since(self.last_flush) >= self.flush_interval;
        let size_due = self.rows.len() >= self.max_rows;
        if !time_due && !size_due {
            return None;
        }
        self.last_flush = now;
        if self.rows.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.rows))
    }

    /// Unconditionally takes all accumulated rows (final flush on shutdown).
    pub fn take_all(&mut self) -> Vec<PersistRow> {
        self.last_flush = Instant::now();
        std::mem::take(&mut self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::row::SqlValue;

    fn row(drift: f64) -> PersistRow {
        vec![SqlValue::Text("BTCUSDT".into()), SqlValue::Double(drift)]
    }

    #[test]
    fn test_drift_stats_reference_values() {
        let stats = DriftStats::from_drifts(&[100.0, 200.0, 300.0, 400.0, 500.0]).unwrap();
        assert_eq!(stats.max, 500);
        assert_eq!(stats.avg, 300);
        // floor(5 * 0.95) - 1 = 3 → sorted[3] = 400
        assert_eq!(stats.p95, 400.0);
    }

    #[test]
    fn test_drift_stats_empty_is_none() {
        assert!(DriftStats::from_drifts(&[]).is_none());
    }

    #[test]
    fn test_drift_stats_single_value() {
        // floor(1 * 0.95) = 0 → index clamps to 0 instead of wrapping.
        let stats = DriftStats::from_drifts(&[250.0]).unwrap();
        assert_eq!(stats.max, 250);
        assert_eq!(stats.avg, 250);
        assert_eq!(stats.p95, 250.0);
    }

    #[test]
    fn test_drift_stats_unsorted_input() {
        let stats = DriftStats::from_drifts(&[500.0, 100.0, 300.0, 200.0, 400.0]).unwrap();
        assert_eq!(stats.p95, 400.0);
    }

    #[test]
    fn test_drift_stats_p95_keeps_fractional_value() {
        // Only max and avg are rounded; p95 is an observed sample.
        let stats = DriftStats::from_drifts(&[1.4, 2.6]).unwrap();
        assert_eq!(stats.max, 3);
        assert_eq!(stats.avg, 2);
        assert_eq!(stats.p95, 1.4);
    }

    #[test]
    fn test_drift_stats_avg_rounds_to_nearest() {
        let stats = DriftStats::from_drifts(&[100.0, 101.0, 101.0]).unwrap();
        assert_eq!(stats.avg, 101); // 100.666… rounds up
    }

    #[test]
    fn test_sla_breach_thresholds() {
        let breach = DriftStats {
            max: 2000,
            avg: 1500,
            p95: 1800.0,
        };
        assert!(breach.breaches(1000));

        let ok = DriftStats {
            max: 1200,
            avg: 900,
            p95: 1100.0,
        };
        assert!(!ok.breaches(1000));

        // Exactly at the threshold is not a breach.
        let edge = DriftStats {
            max: 1000,
            avg: 1000,
            p95: 1000.0,
        };
        assert!(!edge.breaches(1000));
    }

    #[test]
    fn test_window_size_trigger() {
        let mut window = BatchWindow::new(3, Duration::from_secs(3600));
        let now = Instant::now();

        window.push(row(1.0));
        window.push(row(2.0));
        assert!(window.take_if_ready(now).is_none());

        window.push(row(3.0));
        let rows = window.take_if_ready(now).expect("size trigger");
        assert_eq!(rows.len(), 3);
        assert!(window.is_empty());
    }

    #[test]
    fn test_window_time_trigger() {
        let mut window = BatchWindow::new(1_000, Duration::from_secs(5));
        window.push(row(1.0));

        let early = Instant::now();
        assert!(window.take_if_ready(early).is_none());

        let later = early + Duration::from_secs(6);
        let rows = window.take_if_ready(later).expect("time trigger");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_window_empty_time_trigger_is_noop() {
        let mut window = BatchWindow::new(1_000, Duration::from_secs(5));
        let later = Instant::now() + Duration::from_secs(10);
        assert!(window.take_if_ready(later).is_none());
    }

    #[test]
    fn test_window_take_all() {
        let mut window = BatchWindow::new(1_000, Duration::from_secs(5));
        window.push(row(1.0));
        window.push(row(2.0));
        assert_eq!(window.take_all().len(), 2);
        assert!(window.is_empty());
    }
}
