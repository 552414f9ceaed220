//! Resonance record sinks.
//!
//! The orchestrator emits each record exactly once per successful tick and
//! never waits on delivery. The buffered sink absorbs slow consumers with a
//! bounded channel and drops the oldest queued record under backpressure.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::core::fusion::Resonance;

/// Destination for emitted Resonance records.
///
/// `emit` must not block; it returns false when backpressure forced a
/// record to be discarded.
pub trait ResonanceSink: Send + Sync {
    fn emit(&self, record: Resonance) -> bool;

    /// Hook for sinks that batch; called once when the session closes.
    fn flush(&self) {}
}

/// Bounded in-process sink backed by a crossbeam channel.
///
/// Consumers drain via [`BufferedSink::receiver`]. When the queue is full
/// the oldest record is dropped to make room for the newest, so a stalled
/// consumer sees the most recent history rather than the most distant.
pub struct BufferedSink {
    sender: Sender<Resonance>,
    receiver: Receiver<Resonance>,
    dropped: AtomicU64,
}

impl BufferedSink {
    /// Create a sink holding at most `capacity` undelivered records.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            dropped: AtomicU64::new(0),
        }
    }

    /// Get the receiver for emitted records.
    pub fn receiver(&self) -> &Receiver<Resonance> {
        &self.receiver
    }

    /// Records discarded under backpressure so far.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ResonanceSink for BufferedSink {
    fn emit(&self, record: Resonance) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                // Make room by discarding the oldest queued record.
                let _ = self.receiver.try_recv();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                let _ = self.sender.try_send(record);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Sink that retains every record in memory, for tests and offline runs.
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<Resonance>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn records(&self) -> Vec<Resonance> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResonanceSink for CollectingSink {
    fn emit(&self, record: Resonance) -> bool {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(t_unix_ms: i64) -> Resonance {
        Resonance {
            session_id: "SESS-test".to_string(),
            t_unix_ms,
            plv: Some(0.8),
            r_env: Some(0.6),
            crqa: Some(0.4),
            fnirs: None,
            r: 0.62,
            conf: 0.55,
        }
    }

    #[test]
    fn test_buffered_sink_delivers_in_order() {
        let sink = BufferedSink::new(8);
        for t in 0..5 {
            assert!(sink.emit(record(t)));
        }
        let drained: Vec<i64> = sink.receiver().try_iter().map(|r| r.t_unix_ms).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert_eq!(sink.dropped_count(), 0);
    }

    #[test]
    fn test_buffered_sink_drops_oldest_under_backpressure() {
        let sink = BufferedSink::new(3);
        for t in 0..5 {
            let queued = sink.emit(record(t));
            assert_eq!(queued, t < 3);
        }
        let drained: Vec<i64> = sink.receiver().try_iter().map(|r| r.t_unix_ms).collect();
        assert_eq!(drained, vec![2, 3, 4]);
        assert_eq!(sink.dropped_count(), 2);
    }

    #[test]
    fn test_collecting_sink_retains_records() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());
        sink.emit(record(10));
        sink.emit(record(20));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1].t_unix_ms, 20);
    }
}
