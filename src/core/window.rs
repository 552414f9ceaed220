//! Time-aligned window extraction.
//!
//! Both participants' raw samples are resampled onto a uniform grid per
//! channel, with linear interpolation across gaps up to the configured
//! bound. The grid is shared between participants, so the estimators see
//! exactly aligned, gapless, equal-length signals.

use std::collections::HashMap;
use std::time::Duration;

use crate::estimators::EstimatorError;
use crate::ingest::SampleRange;

/// Both participants' signals for one channel over one window, resampled
/// onto a common uniform grid and trimmed to their common covered range.
#[derive(Debug, Clone)]
pub struct ChannelPair {
    pub channel_id: String,
    pub sample_rate_hz: f64,
    /// First participant's resampled signal
    pub a: Vec<f64>,
    /// Second participant's resampled signal, same length as `a`
    pub b: Vec<f64>,
    /// Fraction of the requested window the common range covers
    pub coverage: f64,
}

impl ChannelPair {
    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

/// Why a channel is invalid for a window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowGap {
    /// A participant supplied no samples in the window
    NoData { participant: String },
    /// Common covered range under `1 - max_gap_fraction` of the window
    LowCoverage { participant: String, coverage: f64 },
    /// An internal gap wider than the interpolation bound
    InternalGap { participant: String },
}

impl WindowGap {
    /// Convert into the estimator-facing error for a channel.
    pub fn into_data_gap(self, channel_id: &str) -> EstimatorError {
        let detail = match self {
            WindowGap::NoData { participant } => {
                format!("no samples from {} in window", participant)
            }
            WindowGap::LowCoverage {
                participant,
                coverage,
            } => format!("{} covers only {:.0}% of window", participant, coverage * 100.0),
            WindowGap::InternalGap { participant } => {
                format!("gap beyond interpolation bound in {} stream", participant)
            }
        };
        EstimatorError::data_gap(channel_id, detail)
    }
}

/// Read-only, time-aligned view over both participants' buffers for one
/// analysis instant.
#[derive(Debug)]
pub struct AnalysisWindow {
    pub t_start_ms: i64,
    pub t_end_ms: i64,
    pairs: HashMap<String, Result<ChannelPair, WindowGap>>,
}

impl AnalysisWindow {
    pub fn new(t_start_ms: i64, t_end_ms: i64) -> Self {
        Self {
            t_start_ms,
            t_end_ms,
            pairs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, channel_id: impl Into<String>, pair: Result<ChannelPair, WindowGap>) {
        self.pairs.insert(channel_id.into(), pair);
    }

    /// The aligned pair for a channel, or the estimator-facing gap error.
    pub fn pair(&self, channel_id: &str) -> Result<&ChannelPair, EstimatorError> {
        match self.pairs.get(channel_id) {
            Some(Ok(pair)) => Ok(pair),
            Some(Err(gap)) => Err(gap.clone().into_data_gap(channel_id)),
            None => Err(EstimatorError::data_gap(channel_id, "channel not configured")),
        }
    }

    /// Number of channels with a valid aligned pair.
    pub fn valid_channels(&self) -> usize {
        self.pairs.values().filter(|p| p.is_ok()).count()
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(|k| k.as_str())
    }
}

/// Resample both participants' samples onto the window's uniform grid and
/// trim to the common covered range.
///
/// The sample ranges may extend up to one interpolation bound beyond the
/// window on both sides; the extra samples only serve as interpolation
/// brackets for edge grid points.
#[allow(clippy::too_many_arguments)]
pub fn align_pair(
    channel_id: &str,
    participants: &[String; 2],
    a: &SampleRange,
    b: &SampleRange,
    t_start_ms: i64,
    t_end_ms: i64,
    sample_rate_hz: f64,
    max_gap: Duration,
    max_gap_fraction: f64,
) -> Result<ChannelPair, WindowGap> {
    let window_ms = (t_end_ms - t_start_ms) as f64;
    let n = (window_ms / 1000.0 * sample_rate_hz).round() as usize;
    if n < 2 {
        return Err(WindowGap::NoData {
            participant: participants[0].clone(),
        });
    }
    let step_ms = 1000.0 / sample_rate_hz;
    let max_gap_ms = max_gap.as_millis() as f64;

    let grid_a = resample(a, t_start_ms, n, step_ms, max_gap_ms)
        .map_err(|r| r.into_gap(&participants[0]))?;
    let grid_b = resample(b, t_start_ms, n, step_ms, max_gap_ms)
        .map_err(|r| r.into_gap(&participants[1]))?;

    let first = grid_a.first.max(grid_b.first);
    let last = grid_a.last.min(grid_b.last);
    if last < first {
        return Err(WindowGap::LowCoverage {
            participant: participants[0].clone(),
            coverage: 0.0,
        });
    }

    let coverage = (last - first + 1) as f64 / n as f64;
    if coverage < 1.0 - max_gap_fraction {
        // Blame the participant whose own coverage is worse.
        let cov_a = grid_a.coverage(n);
        let cov_b = grid_b.coverage(n);
        let participant = if cov_a <= cov_b {
            participants[0].clone()
        } else {
            participants[1].clone()
        };
        return Err(WindowGap::LowCoverage {
            participant,
            coverage,
        });
    }

    Ok(ChannelPair {
        channel_id: channel_id.to_string(),
        sample_rate_hz,
        a: grid_a.slice(first, last),
        b: grid_b.slice(first, last),
        coverage,
    })
}

/// One participant's resampled grid: values for indices `first..=last`.
struct ResampledGrid {
    values: Vec<f64>,
    first: usize,
    last: usize,
}

impl ResampledGrid {
    fn coverage(&self, n: usize) -> f64 {
        (self.last - self.first + 1) as f64 / n as f64
    }

    fn slice(&self, first: usize, last: usize) -> Vec<f64> {
        let offset = first - self.first;
        self.values[offset..offset + (last - first + 1)].to_vec()
    }
}

enum ResampleFailure {
    NoData,
    InternalGap,
}

impl ResampleFailure {
    fn into_gap(self, participant: &str) -> WindowGap {
        match self {
            ResampleFailure::NoData => WindowGap::NoData {
                participant: participant.to_string(),
            },
            ResampleFailure::InternalGap => WindowGap::InternalGap {
                participant: participant.to_string(),
            },
        }
    }
}

/// Fill the uniform grid by linear interpolation between bracketing
/// samples. A grid point is filled when its brackets are at most
/// `max_gap_ms` apart; unfilled points are only tolerated at the edges,
/// an unfilled interior point means a gap beyond the bound.
fn resample(
    samples: &SampleRange,
    t_start_ms: i64,
    n: usize,
    step_ms: f64,
    max_gap_ms: f64,
) -> Result<ResampledGrid, ResampleFailure> {
    let points = samples.as_slice();
    if points.is_empty() {
        return Err(ResampleFailure::NoData);
    }

    let mut filled: Vec<Option<f64>> = vec![None; n];
    let mut j = 0usize;
    for (k, slot) in filled.iter_mut().enumerate() {
        let t = t_start_ms as f64 + k as f64 * step_ms;

        // Advance so points[j] is the last sample at or before t.
        while j + 1 < points.len() && (points[j + 1].t_unix_ms as f64) <= t {
            j += 1;
        }

        let prev = points[j];
        let prev_t = prev.t_unix_ms as f64;
        if prev_t > t {
            continue; // before the first sample
        }
        if (t - prev_t).abs() < 1e-9 {
            *slot = Some(prev.value);
            continue;
        }
        if j + 1 < points.len() {
            let next = points[j + 1];
            let next_t = next.t_unix_ms as f64;
            if next_t - prev_t <= max_gap_ms {
                let frac = (t - prev_t) / (next_t - prev_t);
                *slot = Some(prev.value + frac * (next.value - prev.value));
            }
        }
    }

    let first = match filled.iter().position(|v| v.is_some()) {
        Some(i) => i,
        None => return Err(ResampleFailure::NoData),
    };
    let last = filled
        .iter()
        .rposition(|v| v.is_some())
        .unwrap_or(first);

    let mut values = Vec::with_capacity(last - first + 1);
    for slot in &filled[first..=last] {
        match slot {
            Some(v) => values.push(*v),
            // A hole between the first and last filled points can only
            // come from a bracket wider than max_gap_ms.
            None => return Err(ResampleFailure::InternalGap),
        }
    }

    Ok(ResampledGrid {
        values,
        first,
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{Sample, StreamBuffer};

    fn participants() -> [String; 2] {
        ["alice".to_string(), "bob".to_string()]
    }

    fn buffer_with(samples: impl IntoIterator<Item = (i64, f64)>) -> StreamBuffer {
        let mut buffer = StreamBuffer::new(10_000);
        for (t, v) in samples {
            buffer.push(Sample::new(t, v));
        }
        buffer
    }

    fn dense(t0: i64, step: i64, count: usize) -> StreamBuffer {
        buffer_with((0..count).map(|i| (t0 + step * i as i64, i as f64)))
    }

    #[test]
    fn test_full_coverage_alignment() {
        // 100 Hz data exactly on a 100 Hz grid.
        let a = dense(0, 10, 200);
        let b = dense(0, 10, 200);
        let pair = align_pair(
            "eeg",
            &participants(),
            &a.read(0, 1000),
            &b.read(0, 1000),
            0,
            1000,
            100.0,
            Duration::from_millis(100),
            0.25,
        )
        .unwrap();

        assert_eq!(pair.len(), 100);
        assert!((pair.coverage - 1.0).abs() < 1e-12);
        // Linear data survives linear interpolation exactly.
        assert!((pair.a[10] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_jittered_samples_interpolate() {
        // Samples offset from the grid by 3 ms everywhere.
        let a = buffer_with((0..200).map(|i| (3 + 10 * i as i64, i as f64)));
        let b = dense(0, 10, 200);
        let pair = align_pair(
            "eeg",
            &participants(),
            &a.read(0, 1000),
            &b.read(0, 1000),
            0,
            1000,
            100.0,
            Duration::from_millis(100),
            0.25,
        )
        .unwrap();

        assert!(pair.len() >= 98);
        // Interpolated linear ramp still matches the grid positions.
        let idx = 50;
        assert!((pair.a[idx] - pair.b[idx]).abs() < 0.5);
    }

    #[test]
    fn test_internal_gap_invalidates() {
        // 300 ms hole in the middle of otherwise dense 100 Hz data.
        let a = buffer_with(
            (0..40)
                .map(|i| (10 * i as i64, 1.0))
                .chain((0..40).map(|i| (700 + 10 * i as i64, 1.0))),
        );
        let b = dense(0, 10, 120);
        let err = align_pair(
            "eeg",
            &participants(),
            &a.read(0, 1000),
            &b.read(0, 1000),
            0,
            1000,
            100.0,
            Duration::from_millis(100),
            0.5,
        )
        .unwrap_err();

        assert_eq!(
            err,
            WindowGap::InternalGap {
                participant: "alice".to_string()
            }
        );
    }

    #[test]
    fn test_low_coverage_invalidates() {
        // Alice only covers the last quarter of the window.
        let a = dense(750, 10, 30);
        let b = dense(0, 10, 120);
        let err = align_pair(
            "eeg",
            &participants(),
            &a.read(0, 1000),
            &b.read(0, 1000),
            0,
            1000,
            100.0,
            Duration::from_millis(100),
            0.25,
        )
        .unwrap_err();

        match err {
            WindowGap::LowCoverage {
                participant,
                coverage,
            } => {
                assert_eq!(participant, "alice");
                assert!(coverage < 0.75);
            }
            other => panic!("expected LowCoverage, got {:?}", other),
        }
    }

    #[test]
    fn test_no_data_invalidates() {
        let a = StreamBuffer::new(16);
        let b = dense(0, 10, 120);
        let err = align_pair(
            "eeg",
            &participants(),
            &a.read(0, 1000),
            &b.read(0, 1000),
            0,
            1000,
            100.0,
            Duration::from_millis(100),
            0.25,
        )
        .unwrap_err();

        assert_eq!(
            err,
            WindowGap::NoData {
                participant: "alice".to_string()
            }
        );
    }

    #[test]
    fn test_window_pair_lookup() {
        let mut window = AnalysisWindow::new(0, 1000);
        window.insert(
            "eeg",
            Ok(ChannelPair {
                channel_id: "eeg".to_string(),
                sample_rate_hz: 100.0,
                a: vec![0.0; 100],
                b: vec![0.0; 100],
                coverage: 1.0,
            }),
        );
        window.insert(
            "fnirs",
            Err(WindowGap::NoData {
                participant: "bob".to_string(),
            }),
        );

        assert!(window.pair("eeg").is_ok());
        assert!(window.pair("fnirs").is_err());
        assert!(window.pair("unknown").is_err());
        assert_eq!(window.valid_channels(), 1);
    }
}
