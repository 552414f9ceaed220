//! Sample and ingestion types for the resonance engine.
//!
//! A sample carries only a timestamp and a scalar value; the owning buffer
//! identifies the participant and channel, so batches stay compact.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single timestamped measurement on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in Unix milliseconds
    pub t_unix_ms: i64,
    /// Measured value in channel units
    pub value: f64,
}

impl Sample {
    pub fn new(t_unix_ms: i64, value: f64) -> Self {
        Self { t_unix_ms, value }
    }
}

/// Outcome of pushing one sample into a stream buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Sample accepted and appended
    Accepted,
    /// Timestamp not after the last accepted sample; sample dropped
    OutOfOrder,
}

/// Result of ingesting one batch of samples.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Samples appended to the buffer
    pub accepted: usize,
    /// Samples rejected as out-of-order or duplicate
    pub rejected: usize,
}

impl IngestReport {
    pub fn record(&mut self, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Accepted => self.accepted += 1,
            PushOutcome::OutOfOrder => self.rejected += 1,
        }
    }
}

/// Errors returned by `DyadSession::ingest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Participant id does not belong to this session
    UnknownParticipant(String),
    /// Channel id is not configured for this session
    UnknownChannel(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::UnknownParticipant(id) => {
                write!(f, "unknown participant id: {}", id)
            }
            IngestError::UnknownChannel(id) => write!(f, "unknown channel id: {}", id),
        }
    }
}

impl std::error::Error for IngestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_outcomes() {
        let mut report = IngestReport::default();
        report.record(PushOutcome::Accepted);
        report.record(PushOutcome::Accepted);
        report.record(PushOutcome::OutOfOrder);

        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn test_ingest_error_display() {
        let err = IngestError::UnknownChannel("eeg".to_string());
        assert!(err.to_string().contains("eeg"));
    }
}
