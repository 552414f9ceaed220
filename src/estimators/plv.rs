//! Phase-locking value estimator.
//!
//! Band-limits both signals, extracts instantaneous phase from the
//! analytic signal, and measures how constant the phase difference stays
//! across the window: PLV = |mean(exp(i*(phi_a - phi_b)))|.

use rand::seq::SliceRandom;
use rand::Rng;

use super::signal;
use super::{EstimatorError, EstimatorScore};
use crate::config::{Band, PlvConfig};
use crate::core::window::ChannelPair;

/// Fewer grid points than this cannot support the band-pass transient.
const MIN_WINDOW_SAMPLES: usize = 32;

/// Estimate phase locking for one aligned window.
pub fn estimate(pair: &ChannelPair, config: &PlvConfig) -> Result<EstimatorScore, EstimatorError> {
    phase_locking(&pair.a, &pair.b, pair.sample_rate_hz, &config.band)
}

fn phase_locking(
    a: &[f64],
    b: &[f64],
    sample_rate_hz: f64,
    band: &Band,
) -> Result<EstimatorScore, EstimatorError> {
    let n = a.len();
    if n < MIN_WINDOW_SAMPLES || b.len() != n {
        return Err(EstimatorError::degenerate(
            "window too short for phase estimation",
        ));
    }

    if signal::is_flat(a) || signal::is_flat(b) {
        return Err(EstimatorError::degenerate("flat signal, phase undefined"));
    }

    let filtered_a = signal::bandpass_zero_phase(a, sample_rate_hz, band.low_hz, band.high_hz);
    let filtered_b = signal::bandpass_zero_phase(b, sample_rate_hz, band.low_hz, band.high_hz);

    let phase_a = signal::instantaneous_phase(&signal::analytic_signal(&filtered_a));
    let phase_b = signal::instantaneous_phase(&signal::analytic_signal(&filtered_b));

    let plv = plv_of_phases(&phase_a, &phase_b);
    let snr = 0.5 * (signal::band_snr(a, &filtered_a) + signal::band_snr(b, &filtered_b));

    Ok(EstimatorScore::new(plv, snr))
}

/// |mean(exp(i * dphi))| over paired phase samples.
fn plv_of_phases(phase_a: &[f64], phase_b: &[f64]) -> f64 {
    let n = phase_a.len().min(phase_b.len());
    if n == 0 {
        return 0.0;
    }
    let mut sum_cos = 0.0;
    let mut sum_sin = 0.0;
    for k in 0..n {
        let d = phase_a[k] - phase_b[k];
        sum_cos += d.cos();
        sum_sin += d.sin();
    }
    (sum_cos * sum_cos + sum_sin * sum_sin).sqrt() / n as f64
}

/// PLV over one sliding window position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowedPlv {
    /// Window center in seconds from the start of the record
    pub center_s: f64,
    pub plv: f64,
}

/// Offline sliding-window PLV over a long two-signal record.
///
/// Windows that fail (flat segments) are skipped rather than reported as
/// zero.
pub fn sliding_plv(
    a: &[f64],
    b: &[f64],
    sample_rate_hz: f64,
    band: &Band,
    window_samples: usize,
    overlap: f64,
) -> Vec<WindowedPlv> {
    let n = a.len().min(b.len());
    let window = window_samples.max(MIN_WINDOW_SAMPLES);
    if n < window {
        return Vec::new();
    }
    let step = ((window as f64) * (1.0 - overlap.clamp(0.0, 0.95))).round() as usize;
    let step = step.max(1);

    let mut out = Vec::new();
    let mut start = 0;
    while start + window <= n {
        if let Ok(score) = phase_locking(
            &a[start..start + window],
            &b[start..start + window],
            sample_rate_hz,
            band,
        ) {
            out.push(WindowedPlv {
                center_s: (start as f64 + window as f64 / 2.0) / sample_rate_hz,
                plv: score.value,
            });
        }
        start += step;
    }
    out
}

/// Permutation-surrogate significance test for an observed PLV.
#[derive(Debug, Clone, Copy)]
pub struct SurrogateTest {
    pub observed: f64,
    /// Fraction of surrogates reaching at least the observed PLV
    pub p_value: f64,
    /// 95th percentile of the surrogate distribution
    pub percentile_95: f64,
    pub n_surrogates: usize,
}

/// Test an observed PLV against phase-shuffled surrogates.
pub fn surrogate_significance<R: Rng>(
    a: &[f64],
    b: &[f64],
    sample_rate_hz: f64,
    band: &Band,
    n_surrogates: usize,
    rng: &mut R,
) -> Result<SurrogateTest, EstimatorError> {
    let n = a.len().min(b.len());
    if n < MIN_WINDOW_SAMPLES {
        return Err(EstimatorError::degenerate(
            "window too short for phase estimation",
        ));
    }

    if signal::is_flat(&a[..n]) || signal::is_flat(&b[..n]) {
        return Err(EstimatorError::degenerate("flat signal, phase undefined"));
    }

    let filtered_a = signal::bandpass_zero_phase(&a[..n], sample_rate_hz, band.low_hz, band.high_hz);
    let filtered_b = signal::bandpass_zero_phase(&b[..n], sample_rate_hz, band.low_hz, band.high_hz);

    let phase_a = signal::instantaneous_phase(&signal::analytic_signal(&filtered_a));
    let phase_b = signal::instantaneous_phase(&signal::analytic_signal(&filtered_b));
    let observed = plv_of_phases(&phase_a, &phase_b);

    let n_surrogates = n_surrogates.max(1);
    let mut surrogates = Vec::with_capacity(n_surrogates);
    let mut shuffled = phase_b.clone();
    for _ in 0..n_surrogates {
        shuffled.shuffle(rng);
        surrogates.push(plv_of_phases(&phase_a, &shuffled));
    }

    let exceeding = surrogates.iter().filter(|&&s| s >= observed).count();
    let p_value = exceeding as f64 / n_surrogates as f64;

    surrogates.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((n_surrogates as f64 * 0.95) as usize).min(n_surrogates - 1);
    let percentile_95 = surrogates[idx];

    Ok(SurrogateTest {
        observed,
        p_value,
        percentile_95,
        n_surrogates,
    })
}
