//! Per-session pipeline counters.
//!
//! Tracks ingestion, tick, and emission totals for one dyad session so
//! operators can see what the engine did without inspecting raw streams.
//! Counters are atomics; the orchestrator and ingestion paths update them
//! from different tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one session's pipeline activity.
#[derive(Debug)]
pub struct SessionTelemetry {
    /// Samples accepted into stream buffers
    samples_accepted: AtomicU64,
    /// Samples rejected as out-of-order or duplicate
    samples_rejected: AtomicU64,
    /// Ticks that ran the full estimator set
    ticks_evaluated: AtomicU64,
    /// Ticks skipped because too few estimators were valid
    ticks_skipped: AtomicU64,
    /// Current run of skipped ticks, reset by each emission
    consecutive_skips: AtomicU64,
    /// Estimators that exceeded their per-tick budget
    estimator_timeouts: AtomicU64,
    /// Resonance records handed to the sink
    records_emitted: AtomicU64,
    /// Records dropped by the sink under backpressure
    records_dropped: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
}

impl SessionTelemetry {
    pub fn new() -> Self {
        Self {
            samples_accepted: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            ticks_evaluated: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            consecutive_skips: AtomicU64::new(0),
            estimator_timeouts: AtomicU64::new(0),
            records_emitted: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    /// Record the outcome of one ingestion batch.
    pub fn record_ingest(&self, accepted: u64, rejected: u64) {
        self.samples_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.samples_rejected.fetch_add(rejected, Ordering::Relaxed);
    }

    /// Record a tick that evaluated the estimator set and emitted a record.
    pub fn record_tick_emitted(&self) {
        self.ticks_evaluated.fetch_add(1, Ordering::Relaxed);
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
        self.consecutive_skips.store(0, Ordering::Relaxed);
    }

    /// Record a skipped tick; returns the current skip streak so the
    /// orchestrator can escalate after repeated misses.
    pub fn record_tick_skipped(&self) -> u64 {
        self.ticks_evaluated.fetch_add(1, Ordering::Relaxed);
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
        self.consecutive_skips.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record an estimator that ran out of budget.
    pub fn record_timeout(&self) {
        self.estimator_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tick that evaluated but whose record the sink refused.
    pub fn record_tick_dropped(&self) {
        self.ticks_evaluated.fetch_add(1, Ordering::Relaxed);
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
        self.consecutive_skips.store(0, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            ticks_evaluated: self.ticks_evaluated.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            estimator_timeouts: self.estimator_timeouts.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Samples accepted: {}\n\
             - Samples rejected (out-of-order): {}\n\
             - Ticks evaluated: {}\n\
             - Ticks skipped (insufficient data): {}\n\
             - Estimator timeouts: {}\n\
             - Resonance records emitted: {}\n\
             - Records dropped by sink: {}\n\
             - Session duration: {} seconds",
            stats.samples_accepted,
            stats.samples_rejected,
            stats.ticks_evaluated,
            stats.ticks_skipped,
            stats.estimator_timeouts,
            stats.records_emitted,
            stats.records_dropped,
            stats.session_duration_secs
        )
    }
}

impl Default for SessionTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub ticks_evaluated: u64,
    pub ticks_skipped: u64,
    pub estimator_timeouts: u64,
    pub records_emitted: u64,
    pub records_dropped: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared telemetry handle.
pub type SharedTelemetry = Arc<SessionTelemetry>;

/// Create a new shared telemetry handle.
pub fn create_shared_telemetry() -> SharedTelemetry {
    Arc::new(SessionTelemetry::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_counting() {
        let telemetry = SessionTelemetry::new();

        telemetry.record_ingest(100, 3);
        telemetry.record_tick_emitted();
        telemetry.record_timeout();

        let stats = telemetry.stats();
        assert_eq!(stats.samples_accepted, 100);
        assert_eq!(stats.samples_rejected, 3);
        assert_eq!(stats.ticks_evaluated, 1);
        assert_eq!(stats.records_emitted, 1);
        assert_eq!(stats.estimator_timeouts, 1);
    }

    #[test]
    fn test_skip_streak_resets_on_emission() {
        let telemetry = SessionTelemetry::new();

        assert_eq!(telemetry.record_tick_skipped(), 1);
        assert_eq!(telemetry.record_tick_skipped(), 2);
        telemetry.record_tick_emitted();
        assert_eq!(telemetry.record_tick_skipped(), 1);

        let stats = telemetry.stats();
        assert_eq!(stats.ticks_evaluated, 4);
        assert_eq!(stats.ticks_skipped, 3);
    }

    #[test]
    fn test_summary_format() {
        let telemetry = SessionTelemetry::new();
        let summary = telemetry.summary();

        assert!(summary.contains("Samples accepted"));
        assert!(summary.contains("Ticks evaluated"));
        assert!(summary.contains("records emitted"));
    }
}
