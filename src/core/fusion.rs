//! Fusion of estimator outputs into a single Resonance record.
//!
//! Invalid estimators are excluded and their weight mass is redistributed
//! proportionally among the valid ones, so a missing channel never caps the
//! fused score below its achievable range. The weighted sum is squashed
//! through a logistic into the open interval (0,1).

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::{FusionConfig, FusionWeights};
use crate::estimators::{EstimatorKind, EstimatorResult};

/// One fused synchrony record, emitted at most once per tick.
///
/// Estimator fields are `None` when that estimator was invalid for the
/// tick; the record itself only exists when at least the configured
/// minimum number of estimators was valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resonance {
    /// Session this record belongs to
    pub session_id: String,
    /// Evaluation instant (window end)
    pub t_unix_ms: i64,
    /// Phase-locking value
    pub plv: Option<f64>,
    /// Envelope correlation, rescaled to [0,1]
    pub r_env: Option<f64>,
    /// Normalized cross-recurrence score
    pub crqa: Option<f64>,
    /// Band-averaged fNIRS coherence
    pub fnirs: Option<f64>,
    /// Fused synchrony score, open interval (0,1)
    pub r: f64,
    /// Confidence in the fused score
    pub conf: f64,
}

/// Fuse one tick's estimator results into a Resonance record.
///
/// Returns `None` when fewer than `min_valid` estimators produced a valid
/// score; the orchestrator skips the tick rather than emitting a
/// zero-filled record.
pub fn fuse(
    session_id: &str,
    t_unix_ms: i64,
    results: &[EstimatorResult],
    weights: &FusionWeights,
    config: &FusionConfig,
    min_valid: usize,
) -> Option<Resonance> {
    let valid: Vec<&EstimatorResult> = results.iter().filter(|r| r.is_valid()).collect();
    if valid.is_empty() || valid.len() < min_valid {
        return None;
    }

    let total_weight: f64 = valid.iter().map(|r| weights.get(r.kind)).sum();
    if total_weight <= 0.0 {
        return None;
    }

    // Renormalized weighted sum over the valid estimators.
    let mut z = 0.0;
    for result in &valid {
        if let Some(value) = result.value() {
            z += weights.get(result.kind) / total_weight * value;
        }
    }
    let r = logistic(config.steepness * (z - config.midpoint));

    Some(Resonance {
        session_id: session_id.to_string(),
        t_unix_ms,
        plv: value_of(results, EstimatorKind::Plv),
        r_env: value_of(results, EstimatorKind::Envelope),
        crqa: value_of(results, EstimatorKind::Crqa),
        fnirs: value_of(results, EstimatorKind::Coherence),
        r,
        conf: confidence(&valid, config),
    })
}

/// Confidence in the fused score.
///
/// Half the mass comes from estimator SNR (each mapped onto [0,1) via
/// snr/(1+snr)), half from agreement (one minus the population variance of
/// the valid scores against the 0.25 maximum possible on [0,1]). A single
/// valid estimator cannot claim more than the configured cap.
fn confidence(valid: &[&EstimatorResult], config: &FusionConfig) -> f64 {
    let quality: Vec<f64> = valid
        .iter()
        .filter_map(|r| r.snr())
        .map(|snr| snr / (1.0 + snr))
        .collect();
    let scores: Vec<f64> = valid.iter().filter_map(|r| r.value()).collect();

    let snr_term = quality.iter().mean();
    let agreement = 1.0 - (scores.iter().population_variance() / 0.25).clamp(0.0, 1.0);

    let conf = 0.5 * snr_term + 0.5 * agreement;
    if valid.len() == 1 {
        conf.min(config.single_estimator_conf_cap)
    } else {
        conf
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn value_of(results: &[EstimatorResult], kind: EstimatorKind) -> Option<f64> {
    results.iter().find(|r| r.kind == kind).and_then(|r| r.value())
}
