//! Hemodynamic coherence between the participants' fNIRS channels.
//!
//! The default method is Morlet wavelet coherence: both signals are
//! transformed at log-spaced scales across the band, the cross and auto
//! spectra are smoothed with a scale-matched boxcar, and the squared
//! coherence is averaged over every scale/time cell outside the cone of
//! influence. Welch magnitude-squared coherence is available as a cheaper
//! alternative for long windows.

use num_complex::Complex;
use rustfft::FftPlanner;

use super::signal;
use super::{EstimatorError, EstimatorScore};
use crate::config::{Band, CoherenceConfig, CoherenceMethod};
use crate::core::window::ChannelPair;

/// Guard against vanishing auto-spectra in coherence denominators.
const DENOM_FLOOR: f64 = 1e-10;

/// Estimate band-averaged coherence for one aligned window.
pub fn estimate(
    pair: &ChannelPair,
    config: &CoherenceConfig,
) -> Result<EstimatorScore, EstimatorError> {
    let fs = pair.sample_rate_hz;
    let duration_s = pair.len() as f64 / fs;
    let required_s = config.min_cycles / config.band.low_hz;
    if duration_s < required_s {
        return Err(EstimatorError::data_gap(
            &pair.channel_id,
            format!(
                "window of {:.1}s holds fewer than {} cycles of {} Hz",
                duration_s, config.min_cycles, config.band.low_hz
            ),
        ));
    }

    if signal::is_flat(&pair.a) || signal::is_flat(&pair.b) {
        return Err(EstimatorError::degenerate("flat signal, coherence undefined"));
    }
    let a = signal::detrend(&pair.a);
    let b = signal::detrend(&pair.b);
    if signal::is_flat(&a) || signal::is_flat(&b) {
        return Err(EstimatorError::degenerate("no variation left after detrending"));
    }

    let value = match config.method {
        CoherenceMethod::Wavelet => wavelet_coherence(&a, &b, fs, config)?,
        CoherenceMethod::Welch => welch_coherence(&a, &b, fs, config.band, config.welch_segment)?,
    };

    let band_a = signal::bandpass_zero_phase(&a, fs, config.band.low_hz, config.band.high_hz);
    let band_b = signal::bandpass_zero_phase(&b, fs, config.band.low_hz, config.band.high_hz);
    let snr = 0.5 * (signal::band_snr(&a, &band_a) + signal::band_snr(&b, &band_b));

    Ok(EstimatorScore::new(value, snr))
}

/// Morlet wavelet coherence averaged over the band and the cone of influence.
fn wavelet_coherence(
    a: &[f64],
    b: &[f64],
    fs: f64,
    config: &CoherenceConfig,
) -> Result<f64, EstimatorError> {
    let n = a.len();
    let scales = log_scales(config.band, config.omega0, config.n_scales);

    let spectrum_a = fft_forward(a);
    let spectrum_b = fft_forward(b);

    let mut scale_sum = 0.0;
    let mut scale_count = 0usize;

    for &scale in &scales {
        // Cone of influence: the Morlet e-folding time is sqrt(2) * scale.
        let margin = (std::f64::consts::SQRT_2 * scale * fs).ceil() as usize;
        if 2 * margin >= n {
            continue;
        }
        let valid = margin..(n - margin);

        let wa = cwt_at_scale(&spectrum_a, fs, scale, config.omega0);
        let wb = cwt_at_scale(&spectrum_b, fs, scale, config.omega0);

        let cross: Vec<Complex<f64>> = wa.iter().zip(&wb).map(|(x, y)| x * y.conj()).collect();
        let power_a: Vec<f64> = wa.iter().map(|x| x.norm_sqr()).collect();
        let power_b: Vec<f64> = wb.iter().map(|x| x.norm_sqr()).collect();

        let width = ((4.0 * scale * fs).round() as usize).clamp(5, n);
        let smooth_cross = boxcar_complex(&cross, width);
        let smooth_a = boxcar(&power_a, width);
        let smooth_b = boxcar(&power_b, width);

        let mut time_sum = 0.0;
        let mut time_count = 0usize;
        for t in valid {
            let denom = smooth_a[t] * smooth_b[t];
            if denom > DENOM_FLOOR {
                time_sum += smooth_cross[t].norm_sqr() / denom;
                time_count += 1;
            }
        }
        if time_count > 0 {
            scale_sum += time_sum / time_count as f64;
            scale_count += 1;
        }
    }

    if scale_count == 0 {
        return Err(EstimatorError::degenerate(
            "window entirely inside cone of influence",
        ));
    }
    Ok(scale_sum / scale_count as f64)
}

/// Log-spaced wavelet scales spanning the band edges.
fn log_scales(band: Band, omega0: f64, n_scales: usize) -> Vec<f64> {
    // Scale-to-frequency conversion for the Morlet wavelet.
    let fourier_factor = 4.0 * std::f64::consts::PI / (omega0 + (2.0 + omega0 * omega0).sqrt());
    let s_min = 1.0 / (fourier_factor * band.high_hz);
    let s_max = 1.0 / (fourier_factor * band.low_hz);
    if n_scales <= 1 {
        return vec![(s_min * s_max).sqrt()];
    }
    let ratio = (s_max / s_min).ln();
    (0..n_scales)
        .map(|i| s_min * (ratio * i as f64 / (n_scales - 1) as f64).exp())
        .collect()
}

fn fft_forward(x: &[f64]) -> Vec<Complex<f64>> {
    let mut buffer: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    FftPlanner::new().plan_fft_forward(buffer.len()).process(&mut buffer);
    buffer
}

/// One row of the continuous wavelet transform, computed in the frequency
/// domain against the analytic Morlet kernel.
fn cwt_at_scale(spectrum: &[Complex<f64>], fs: f64, scale: f64, omega0: f64) -> Vec<Complex<f64>> {
    let n = spectrum.len();
    let mut buffer: Vec<Complex<f64>> = Vec::with_capacity(n);
    for (k, &coeff) in spectrum.iter().enumerate() {
        // Angular frequency of bin k, negative past the Nyquist fold.
        let omega = if k <= n / 2 {
            2.0 * std::f64::consts::PI * k as f64 * fs / n as f64
        } else {
            -2.0 * std::f64::consts::PI * (n - k) as f64 * fs / n as f64
        };
        if omega > 0.0 {
            let arg = scale * omega - omega0;
            buffer.push(coeff * (-0.5 * arg * arg).exp());
        } else {
            buffer.push(Complex::new(0.0, 0.0));
        }
    }
    FftPlanner::new().plan_fft_inverse(n).process(&mut buffer);
    let norm = 1.0 / n as f64;
    for value in &mut buffer {
        *value *= norm;
    }
    buffer
}

/// Centered moving average with edges shrunk to the available span.
fn boxcar(x: &[f64], width: usize) -> Vec<f64> {
    let half = width / 2;
    let mut prefix = Vec::with_capacity(x.len() + 1);
    prefix.push(0.0);
    for &v in x {
        prefix.push(prefix[prefix.len() - 1] + v);
    }
    (0..x.len())
        .map(|t| {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(x.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

fn boxcar_complex(x: &[Complex<f64>], width: usize) -> Vec<Complex<f64>> {
    let half = width / 2;
    let mut prefix = Vec::with_capacity(x.len() + 1);
    prefix.push(Complex::new(0.0, 0.0));
    for &v in x {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }
    (0..x.len())
        .map(|t| {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(x.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Welch magnitude-squared coherence averaged over the band bins.
fn welch_coherence(
    a: &[f64],
    b: &[f64],
    fs: f64,
    band: Band,
    segment: usize,
) -> Result<f64, EstimatorError> {
    let n = a.len();
    let seg = if segment == 0 { (n / 4).max(16) } else { segment };
    let seg = seg.min(n);
    let hop = (seg / 2).max(1);

    let window = signal::hann(seg);
    let fft = FftPlanner::new().plan_fft_forward(seg);

    let bins = seg / 2 + 1;
    let mut pxx = vec![0.0f64; bins];
    let mut pyy = vec![0.0f64; bins];
    let mut pxy = vec![Complex::new(0.0f64, 0.0); bins];

    let mut segments = 0usize;
    let mut start = 0usize;
    while start + seg <= n {
        let mut fa: Vec<Complex<f64>> = a[start..start + seg]
            .iter()
            .zip(&window)
            .map(|(&v, &w)| Complex::new(v * w, 0.0))
            .collect();
        let mut fb: Vec<Complex<f64>> = b[start..start + seg]
            .iter()
            .zip(&window)
            .map(|(&v, &w)| Complex::new(v * w, 0.0))
            .collect();
        fft.process(&mut fa);
        fft.process(&mut fb);

        for k in 0..bins {
            pxx[k] += fa[k].norm_sqr();
            pyy[k] += fb[k].norm_sqr();
            pxy[k] += fa[k] * fb[k].conj();
        }
        segments += 1;
        start += hop;
    }

    // One segment makes the estimate identically 1 whatever the signals.
    if segments < 2 {
        return Err(EstimatorError::degenerate(
            "too few Welch segments for coherence",
        ));
    }

    let mut band_sum = 0.0;
    let mut band_count = 0usize;
    for (k, ((&sxx, &syy), sxy)) in pxx.iter().zip(&pyy).zip(&pxy).enumerate() {
        let freq = k as f64 * fs / seg as f64;
        if freq < band.low_hz || freq > band.high_hz {
            continue;
        }
        let denom = sxx * syy;
        if denom > DENOM_FLOOR {
            band_sum += sxy.norm_sqr() / denom;
            band_count += 1;
        }
    }
    if band_count == 0 {
        return Err(EstimatorError::degenerate("no spectral bins in band"));
    }
    Ok(band_sum / band_count as f64)
}
