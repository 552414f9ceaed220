//! Synchrony estimators.
//!
//! Each estimator is a stateless pure function over one analysis window,
//! returning a tagged result: a score in [0,1] with an SNR figure, or a
//! typed error describing why the window was unusable. Errors never escape
//! the estimator boundary; fusion sees them as invalid results.

pub mod coherence;
pub mod crqa;
pub mod envelope;
pub mod plv;
pub mod signal;

use std::fmt;

/// The four estimators, in canonical fusion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimatorKind {
    Plv,
    Envelope,
    Crqa,
    Coherence,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 4] = [
        EstimatorKind::Plv,
        EstimatorKind::Envelope,
        EstimatorKind::Crqa,
        EstimatorKind::Coherence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EstimatorKind::Plv => "plv",
            EstimatorKind::Envelope => "envelope",
            EstimatorKind::Crqa => "crqa",
            EstimatorKind::Coherence => "coherence",
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A valid estimator output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorScore {
    /// Synchrony score in [0,1]
    pub value: f64,
    /// Signal-to-noise figure; band power ratio for filtered estimators,
    /// recurrence evidence density for CRQA
    pub snr: f64,
}

impl EstimatorScore {
    pub fn new(value: f64, snr: f64) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            snr: if snr.is_finite() { snr.max(0.0) } else { f64::MAX },
        }
    }
}

/// Why an estimator produced no score for a window. All variants are
/// local and recoverable; the tick proceeds with a reduced weight set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstimatorError {
    /// Channel absent or window coverage below the configured bound
    DataGap { channel: String, detail: String },
    /// Signal present but unusable: zero variance, undefined phase,
    /// under-sampled embedding
    DegenerateSignal { detail: String },
    /// Did not complete within the per-tick budget
    Timeout,
    /// Task aborted before producing a result
    Cancelled,
}

impl EstimatorError {
    pub fn data_gap(channel: impl Into<String>, detail: impl Into<String>) -> Self {
        EstimatorError::DataGap {
            channel: channel.into(),
            detail: detail.into(),
        }
    }

    pub fn degenerate(detail: impl Into<String>) -> Self {
        EstimatorError::DegenerateSignal {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorError::DataGap { channel, detail } => {
                write!(f, "data gap on channel {}: {}", channel, detail)
            }
            EstimatorError::DegenerateSignal { detail } => {
                write!(f, "degenerate signal: {}", detail)
            }
            EstimatorError::Timeout => write!(f, "estimator exceeded its time budget"),
            EstimatorError::Cancelled => write!(f, "estimator task was cancelled"),
        }
    }
}

impl std::error::Error for EstimatorError {}

/// One estimator's outcome for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorResult {
    pub kind: EstimatorKind,
    pub outcome: Result<EstimatorScore, EstimatorError>,
}

impl EstimatorResult {
    pub fn valid(kind: EstimatorKind, score: EstimatorScore) -> Self {
        Self {
            kind,
            outcome: Ok(score),
        }
    }

    pub fn invalid(kind: EstimatorKind, error: EstimatorError) -> Self {
        Self {
            kind,
            outcome: Err(error),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Score value when valid.
    pub fn value(&self) -> Option<f64> {
        self.outcome.as_ref().ok().map(|s| s.value)
    }

    pub fn snr(&self) -> Option<f64> {
        self.outcome.as_ref().ok().map(|s| s.snr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_clamps_value() {
        let score = EstimatorScore::new(1.2, 3.0);
        assert_eq!(score.value, 1.0);
        let score = EstimatorScore::new(-0.1, 3.0);
        assert_eq!(score.value, 0.0);
    }

    #[test]
    fn test_result_accessors() {
        let ok = EstimatorResult::valid(EstimatorKind::Plv, EstimatorScore::new(0.8, 2.0));
        assert!(ok.is_valid());
        assert_eq!(ok.value(), Some(0.8));

        let bad = EstimatorResult::invalid(
            EstimatorKind::Coherence,
            EstimatorError::data_gap("fnirs", "channel not configured"),
        );
        assert!(!bad.is_valid());
        assert_eq!(bad.value(), None);
    }

    #[test]
    fn test_kind_names() {
        let names: Vec<&str> = EstimatorKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["plv", "envelope", "crqa", "coherence"]);
    }
}
