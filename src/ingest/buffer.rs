//! Fixed-capacity stream buffer for one participant/channel pair.
//!
//! Samples are kept in time order with a hard capacity bound; the oldest
//! samples are evicted first. Reads return an owned snapshot so eviction
//! after a read never invalidates the returned range.

use std::collections::VecDeque;

use super::types::{PushOutcome, Sample};

/// Circular buffer of timestamped samples for a single channel.
///
/// Timestamps are strictly increasing: a sample whose timestamp is not
/// after the last accepted one is rejected, which makes duplicate delivery
/// of a batch harmless.
#[derive(Debug)]
pub struct StreamBuffer {
    capacity: usize,
    samples: VecDeque<Sample>,
    last_t_unix_ms: Option<i64>,
    rejected: u64,
}

impl StreamBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1).min(4096)),
            last_t_unix_ms: None,
            rejected: 0,
        }
    }

    /// Append a sample, evicting the oldest if the buffer is full.
    pub fn push(&mut self, sample: Sample) -> PushOutcome {
        if let Some(last) = self.last_t_unix_ms {
            if sample.t_unix_ms <= last {
                self.rejected += 1;
                return PushOutcome::OutOfOrder;
            }
        }

        self.samples.push_back(sample);
        self.last_t_unix_ms = Some(sample.t_unix_ms);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        PushOutcome::Accepted
    }

    /// Snapshot all samples with `t0 <= t < t1`, in time order.
    pub fn read(&self, t0_unix_ms: i64, t1_unix_ms: i64) -> SampleRange {
        if t1_unix_ms <= t0_unix_ms || self.samples.is_empty() {
            return SampleRange::empty();
        }
        let start = self.samples.partition_point(|s| s.t_unix_ms < t0_unix_ms);
        let end = self.samples.partition_point(|s| s.t_unix_ms < t1_unix_ms);
        SampleRange::new(self.samples.range(start..end).copied().collect())
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Timestamp of the newest accepted sample, if any.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_t_unix_ms
    }

    /// Count of samples rejected as out-of-order since creation.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}

/// An owned, restartable snapshot of samples in `[t0, t1)`.
#[derive(Debug, Clone, Default)]
pub struct SampleRange {
    samples: Vec<Sample>,
}

impl SampleRange {
    fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// First sample timestamp, if the range is non-empty.
    pub fn first_timestamp(&self) -> Option<i64> {
        self.samples.first().map(|s| s.t_unix_ms)
    }

    /// Last sample timestamp, if the range is non-empty.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.samples.last().map(|s| s.t_unix_ms)
    }
}

impl<'a> IntoIterator for &'a SampleRange {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

impl IntoIterator for SampleRange {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}
