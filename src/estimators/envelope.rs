//! Envelope correlation estimator.
//!
//! Correlates the amplitude envelopes of the band-limited signals. The
//! Pearson coefficient is re-based onto [0,1] as (r+1)/2: fusion expects a
//! unipolar score, and the default weights are calibrated for that
//! convention. Raw r is never fed to fusion.

use super::signal;
use super::{EstimatorError, EstimatorScore};
use crate::config::EnvelopeConfig;
use crate::core::window::ChannelPair;

const MIN_WINDOW_SAMPLES: usize = 32;

/// Estimate envelope correlation for one aligned window.
pub fn estimate(
    pair: &ChannelPair,
    config: &EnvelopeConfig,
) -> Result<EstimatorScore, EstimatorError> {
    let n = pair.len();
    let band = &config.band;

    // The envelope only carries information over at least one full cycle
    // of the slowest in-band component.
    let required = ((pair.sample_rate_hz / band.low_hz).ceil() as usize).max(MIN_WINDOW_SAMPLES);
    if n < required {
        return Err(EstimatorError::data_gap(
            &config.channel,
            format!(
                "window of {} samples covers less than one cycle of {} Hz",
                n, band.low_hz
            ),
        ));
    }

    if signal::is_flat(&pair.a) || signal::is_flat(&pair.b) {
        return Err(EstimatorError::degenerate("flat signal"));
    }

    let filtered_a =
        signal::bandpass_zero_phase(&pair.a, pair.sample_rate_hz, band.low_hz, band.high_hz);
    let filtered_b =
        signal::bandpass_zero_phase(&pair.b, pair.sample_rate_hz, band.low_hz, band.high_hz);

    let env_a = signal::envelope(&signal::analytic_signal(&filtered_a));
    let env_b = signal::envelope(&signal::analytic_signal(&filtered_b));

    let r = match pearson(&env_a, &env_b) {
        Some(r) => r,
        None => {
            return Err(EstimatorError::degenerate(
                "constant envelope, correlation undefined",
            ))
        }
    };

    let snr =
        0.5 * (signal::band_snr(&pair.a, &filtered_a) + signal::band_snr(&pair.b, &filtered_b));
    Ok(EstimatorScore::new((r + 1.0) / 2.0, snr))
}

/// Pearson correlation; `None` when either side has no variance.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = signal::mean(&a[..n]);
    let mean_b = signal::mean(&b[..n]);

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for k in 0..n {
        let da = a[k] - mean_a;
        let db = b[k] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= 1e-12 {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}
