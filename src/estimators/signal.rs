//! Shared signal primitives: zero-phase band-pass filtering, analytic
//! signal, detrending and normalization.
//!
//! Estimators own their filtering because their bands differ; the window
//! extractor hands them unfiltered resampled signals.

use rustfft::{num_complex::Complex, FftPlanner};

/// Second-order IIR band-pass section with direct-form-I state.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Band-pass section with 0 dB peak gain at the geometric center of
    /// `[low_hz, high_hz]`.
    fn band_pass(sample_rate_hz: f64, low_hz: f64, high_hz: f64) -> Self {
        let f0 = (low_hz * high_hz).sqrt();
        let q = f0 / (high_hz - low_hz);
        let omega = 2.0 * std::f64::consts::PI * f0 / sample_rate_hz;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        let a0 = 1.0 + alpha;
        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn step(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    fn run(&mut self, signal: &mut [f64]) {
        for sample in signal.iter_mut() {
            *sample = self.step(*sample);
        }
    }
}

/// Zero-phase band-pass: one forward and one backward pass of the same
/// band-pass section over an odd-reflected extension of the signal, so the
/// filter transient lands in the padding and the passband keeps zero phase
/// shift.
pub fn bandpass_zero_phase(signal: &[f64], sample_rate_hz: f64, low_hz: f64, high_hz: f64) -> Vec<f64> {
    let n = signal.len();
    if n < 4 {
        return signal.to_vec();
    }

    // Enough padding to absorb the transient of the lowest in-band period.
    let pad = ((3.0 * sample_rate_hz / low_hz).round() as usize)
        .max(12)
        .min(n - 1);

    let mut extended = Vec::with_capacity(n + 2 * pad);
    let first = signal[0];
    let last = signal[n - 1];
    for i in (1..=pad).rev() {
        extended.push(2.0 * first - signal[i]);
    }
    extended.extend_from_slice(signal);
    for i in 1..=pad {
        extended.push(2.0 * last - signal[n - 1 - i]);
    }

    let mut filter = Biquad::band_pass(sample_rate_hz, low_hz, high_hz);
    filter.run(&mut extended);
    extended.reverse();
    let mut filter = Biquad::band_pass(sample_rate_hz, low_hz, high_hz);
    filter.run(&mut extended);
    extended.reverse();

    extended[pad..pad + n].to_vec()
}

/// Analytic signal via the frequency-domain Hilbert construction: positive
/// frequencies doubled, negative frequencies zeroed.
pub fn analytic_signal(signal: &[f64]) -> Vec<Complex<f64>> {
    let n = signal.len();
    if n < 2 {
        return signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex<f64>> =
        signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    fft.process(&mut spectrum);

    let half = n / 2;
    for (k, bin) in spectrum.iter_mut().enumerate() {
        if k == 0 || (n % 2 == 0 && k == half) {
            // DC and Nyquist stay as they are
        } else if k < half || (n % 2 == 1 && k == half) {
            *bin *= 2.0;
        } else {
            *bin = Complex::new(0.0, 0.0);
        }
    }

    ifft.process(&mut spectrum);
    let scale = 1.0 / n as f64;
    for bin in spectrum.iter_mut() {
        *bin *= scale;
    }
    spectrum
}

/// Instantaneous phase of an analytic signal, in radians.
pub fn instantaneous_phase(analytic: &[Complex<f64>]) -> Vec<f64> {
    analytic.iter().map(|z| z.im.atan2(z.re)).collect()
}

/// Amplitude envelope of an analytic signal.
pub fn envelope(analytic: &[Complex<f64>]) -> Vec<f64> {
    analytic.iter().map(|z| z.norm()).collect()
}

/// Remove the least-squares linear trend.
pub fn detrend(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n < 2 {
        return signal.to_vec();
    }

    let t_mean = (n - 1) as f64 / 2.0;
    let x_mean = mean(signal);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &x) in signal.iter().enumerate() {
        let dt = i as f64 - t_mean;
        num += dt * (x - x_mean);
        den += dt * dt;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };

    signal
        .iter()
        .enumerate()
        .map(|(i, &x)| x - x_mean - slope * (i as f64 - t_mean))
        .collect()
}

/// True when the sample spread is within float resolution at the signal's
/// magnitude. Constant windows land here even when their computed variance
/// carries summation noise instead of an exact zero.
pub fn is_flat(signal: &[f64]) -> bool {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &x in signal {
        lo = lo.min(x);
        hi = hi.max(x);
    }
    if !(lo.is_finite() && hi.is_finite()) {
        return true;
    }
    hi - lo <= f64::EPSILON * lo.abs().max(hi.abs()).max(1.0)
}

/// Z-score against the population moments; `None` when the signal is flat.
pub fn zscore(signal: &[f64]) -> Option<Vec<f64>> {
    if is_flat(signal) {
        return None;
    }
    let std = population_std(signal);
    if !(std.is_finite() && std > 0.0) {
        return None;
    }
    let m = mean(signal);
    Some(signal.iter().map(|&x| (x - m) / std).collect())
}

pub fn mean(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().sum::<f64>() / signal.len() as f64
}

/// Population variance (divide by N).
pub fn population_variance(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let m = mean(signal);
    signal.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / signal.len() as f64
}

pub fn population_std(signal: &[f64]) -> f64 {
    population_variance(signal).sqrt()
}

/// In-band power over residual power given a raw signal and its band-passed
/// version. Returns infinity for a purely in-band signal.
pub fn band_snr(raw: &[f64], filtered: &[f64]) -> f64 {
    let band_power = population_variance(filtered);
    let residual: Vec<f64> = raw
        .iter()
        .zip(filtered.iter())
        .map(|(&r, &f)| r - f)
        .collect();
    let residual_power = population_variance(&residual);
    if residual_power > f64::EPSILON {
        band_power / residual_power
    } else {
        f64::INFINITY
    }
}

/// Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
        })
        .collect()
}
