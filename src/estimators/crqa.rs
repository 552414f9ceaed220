//! Cross-recurrence quantification analysis.
//!
//! Builds a cross-recurrence matrix between the two signals, either from
//! time-delay embedded trajectories or from thresholded event sequences,
//! and quantifies shared structure through diagonal and vertical line
//! statistics. The matrix is O(N^2), so inputs are decimated down to the
//! configured point budget before anything else.

use super::signal;
use super::{EstimatorError, EstimatorScore};
use crate::config::{CrqaConfig, CrqaMetricKind, CrqaMode, RecurrenceRadius};
use crate::core::window::ChannelPair;

/// Full metric set for one cross-recurrence analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrqaMetrics {
    /// Fraction of matrix cells that are recurrent
    pub recurrence_rate: f64,
    /// Fraction of recurrent points on diagonal lines >= min_diagonal
    pub determinism: f64,
    /// Fraction of recurrent points on vertical lines >= min_vertical
    pub laminarity: f64,
    /// Mean vertical line length among lines >= min_vertical
    pub trapping_time: f64,
    /// Longest diagonal line
    pub max_diagonal: usize,
    /// Longest vertical line
    pub max_vertical: usize,
    /// Shannon entropy (bits) of the diagonal line length distribution
    pub diagonal_entropy: f64,
    /// Total recurrent cells
    pub recurrent_points: usize,
    pub matrix_rows: usize,
    pub matrix_cols: usize,
}

impl CrqaMetrics {
    /// The raw metric selected for normalization.
    pub fn raw(&self, kind: CrqaMetricKind) -> f64 {
        match kind {
            CrqaMetricKind::Determinism => self.determinism,
            CrqaMetricKind::RecurrenceRate => self.recurrence_rate,
        }
    }
}

/// Estimate the normalized CRQA score for one aligned window.
pub fn estimate(pair: &ChannelPair, config: &CrqaConfig) -> Result<EstimatorScore, EstimatorError> {
    let metrics = analyze(&pair.a, &pair.b, config)?;
    let score = config.calibration.normalize(metrics.raw(config.calibration.metric));

    // Evidence density: recurrent cells per trajectory point.
    let span = metrics.matrix_rows.max(metrics.matrix_cols).max(1);
    let snr = metrics.recurrent_points as f64 / span as f64;

    Ok(EstimatorScore::new(score, snr))
}

/// Run the full analysis and return every metric.
pub fn analyze(a: &[f64], b: &[f64], config: &CrqaConfig) -> Result<CrqaMetrics, EstimatorError> {
    let matrix = match config.mode {
        CrqaMode::Embedded { dim, delay } => {
            embedded_matrix(a, b, dim, delay, config.radius, config.max_points)?
        }
        CrqaMode::Events { threshold } => events_matrix(a, b, threshold, config.max_points)?,
    };
    Ok(quantify(&matrix, config.min_diagonal, config.min_vertical))
}

/// Dense boolean cross-recurrence matrix.
struct RecurrenceMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl RecurrenceMatrix {
    fn at(&self, i: usize, j: usize) -> bool {
        self.cells[i * self.cols + j]
    }
}

/// Keep every `stride`-th point so at most `max_points` survive.
fn decimate(series: &[f64], max_points: usize) -> Vec<f64> {
    let stride = ((series.len() + max_points - 1) / max_points).max(1);
    series.iter().step_by(stride).copied().collect()
}

/// Event-pooled decimation: a pooled bin is an event when any sample in
/// its stride group crosses the threshold.
fn decimate_events(series: &[f64], threshold: f64, max_points: usize) -> Vec<bool> {
    let stride = ((series.len() + max_points - 1) / max_points).max(1);
    series
        .chunks(stride)
        .map(|chunk| chunk.iter().any(|&x| x > threshold))
        .collect()
}

fn embedded_matrix(
    a: &[f64],
    b: &[f64],
    dim: usize,
    delay: usize,
    radius: RecurrenceRadius,
    max_points: usize,
) -> Result<RecurrenceMatrix, EstimatorError> {
    let a = decimate(a, max_points);
    let b = decimate(b, max_points);

    let a = signal::zscore(&a)
        .ok_or_else(|| EstimatorError::degenerate("zero variance, recurrence undefined"))?;
    let b = signal::zscore(&b)
        .ok_or_else(|| EstimatorError::degenerate("zero variance, recurrence undefined"))?;

    let span = (dim - 1) * delay;
    if a.len() <= span || b.len() <= span {
        return Err(EstimatorError::degenerate(format!(
            "embedding dim {} delay {} needs more than {} samples",
            dim,
            delay,
            span
        )));
    }
    let rows = a.len() - span;
    let cols = b.len() - span;
    if rows < 2 || cols < 2 {
        return Err(EstimatorError::degenerate("embedding under-sampled"));
    }

    // Euclidean distances between embedded vectors, computed straight from
    // the delay structure without materializing the vectors.
    let mut distances = vec![0.0f64; rows * cols];
    let mut max_distance = 0.0f64;
    for i in 0..rows {
        for j in 0..cols {
            let mut sum = 0.0;
            for k in 0..dim {
                let d = a[i + k * delay] - b[j + k * delay];
                sum += d * d;
            }
            let dist = sum.sqrt();
            distances[i * cols + j] = dist;
            if dist > max_distance {
                max_distance = dist;
            }
        }
    }

    let epsilon = match radius {
        RecurrenceRadius::Fixed { epsilon } => epsilon,
        RecurrenceRadius::MaxFraction { fraction } => fraction * max_distance,
        RecurrenceRadius::Quantile { q } => {
            let mut sorted = distances.clone();
            sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
            let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
            sorted[idx]
        }
    };

    let cells = distances.iter().map(|&d| d <= epsilon).collect();
    Ok(RecurrenceMatrix { rows, cols, cells })
}

fn events_matrix(
    a: &[f64],
    b: &[f64],
    threshold: f64,
    max_points: usize,
) -> Result<RecurrenceMatrix, EstimatorError> {
    let events_a = decimate_events(a, threshold, max_points);
    let events_b = decimate_events(b, threshold, max_points);

    if !events_a.iter().any(|&e| e) || !events_b.iter().any(|&e| e) {
        return Err(EstimatorError::degenerate("no events in window"));
    }

    let rows = events_a.len();
    let cols = events_b.len();
    let mut cells = Vec::with_capacity(rows * cols);
    for &ea in &events_a {
        for &eb in &events_b {
            cells.push(ea && eb);
        }
    }
    Ok(RecurrenceMatrix { rows, cols, cells })
}

/// Scan the matrix for line structures and derive all metrics.
fn quantify(matrix: &RecurrenceMatrix, min_diagonal: usize, min_vertical: usize) -> CrqaMetrics {
    let total_cells = matrix.rows * matrix.cols;
    let recurrent_points = matrix.cells.iter().filter(|&&c| c).count();
    let recurrence_rate = recurrent_points as f64 / total_cells as f64;

    // Diagonal lines: walk every diagonal offset once, counting runs.
    let mut diagonal_lengths: Vec<usize> = Vec::new();
    let mut on_diagonals = 0usize;
    let mut max_diagonal = 0usize;
    for offset in 1..(matrix.rows + matrix.cols) {
        let (mut i, mut j) = if offset <= matrix.rows {
            (matrix.rows - offset, 0)
        } else {
            (0, offset - matrix.rows)
        };
        let mut run = 0usize;
        while i < matrix.rows && j < matrix.cols {
            if matrix.at(i, j) {
                run += 1;
            } else if run > 0 {
                if run >= min_diagonal {
                    on_diagonals += run;
                    diagonal_lengths.push(run);
                }
                max_diagonal = max_diagonal.max(run);
                run = 0;
            }
            i += 1;
            j += 1;
        }
        if run >= min_diagonal {
            on_diagonals += run;
            diagonal_lengths.push(run);
        }
        max_diagonal = max_diagonal.max(run);
    }

    // Vertical lines per column.
    let mut on_verticals = 0usize;
    let mut vertical_sum = 0usize;
    let mut vertical_count = 0usize;
    let mut max_vertical = 0usize;
    for j in 0..matrix.cols {
        let mut run = 0usize;
        for i in 0..matrix.rows {
            if matrix.at(i, j) {
                run += 1;
            } else if run > 0 {
                if run >= min_vertical {
                    on_verticals += run;
                    vertical_sum += run;
                    vertical_count += 1;
                }
                max_vertical = max_vertical.max(run);
                run = 0;
            }
        }
        if run >= min_vertical {
            on_verticals += run;
            vertical_sum += run;
            vertical_count += 1;
        }
        max_vertical = max_vertical.max(run);
    }

    // Ratios guard the empty matrix so an unshared structure is a valid 0.
    let determinism = if recurrent_points > 0 {
        on_diagonals as f64 / recurrent_points as f64
    } else {
        0.0
    };
    let laminarity = if recurrent_points > 0 {
        on_verticals as f64 / recurrent_points as f64
    } else {
        0.0
    };
    let trapping_time = if vertical_count > 0 {
        vertical_sum as f64 / vertical_count as f64
    } else {
        0.0
    };

    CrqaMetrics {
        recurrence_rate,
        determinism,
        laminarity,
        trapping_time,
        max_diagonal,
        max_vertical,
        diagonal_entropy: line_entropy(&diagonal_lengths),
        recurrent_points,
        matrix_rows: matrix.rows,
        matrix_cols: matrix.cols,
    }
}

/// Shannon entropy (bits) of a line length distribution.
fn line_entropy(lengths: &[usize]) -> f64 {
    if lengths.is_empty() {
        return 0.0;
    }
    let mut counts: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    for &len in lengths {
        *counts.entry(len).or_insert(0) += 1;
    }
    let total = lengths.len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrqaCalibration;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn embedded_config() -> CrqaConfig {
        CrqaConfig {
            channel: "eeg".to_string(),
            mode: CrqaMode::Embedded { dim: 3, delay: 1 },
            radius: RecurrenceRadius::MaxFraction { fraction: 0.1 },
            min_diagonal: 2,
            min_vertical: 2,
            max_points: 200,
            calibration: CrqaCalibration::default(),
        }
    }

    fn events_config() -> CrqaConfig {
        CrqaConfig {
            mode: CrqaMode::Events { threshold: 0.5 },
            ..embedded_config()
        }
    }

    fn sine(n: usize, freq: f64) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / 128.0).sin()).collect()
    }

    /// Event trace with runs of ones at the given bin ranges.
    fn event_trace(n: usize, runs: &[(usize, usize)]) -> Vec<f64> {
        let mut trace = vec![0.0; n];
        for &(start, end) in runs {
            for slot in &mut trace[start..end] {
                *slot = 1.0;
            }
        }
        trace
    }

    #[test]
    fn test_identical_event_runs_are_deterministic() {
        let trace = event_trace(100, &[(10, 20), (40, 52), (70, 85)]);
        let metrics = analyze(&trace, &trace, &events_config()).unwrap();
        assert!(
            metrics.determinism > 0.9,
            "det = {}",
            metrics.determinism
        );
        assert!(metrics.max_diagonal >= 12);
    }

    #[test]
    fn test_scattered_disjoint_events_have_zero_determinism() {
        // Isolated single-bin events never form a diagonal pair.
        let a = event_trace(100, &[(4, 5), (23, 24), (57, 58), (81, 82)]);
        let b = event_trace(100, &[(11, 12), (37, 38), (66, 67), (93, 94)]);
        let metrics = analyze(&a, &b, &events_config()).unwrap();
        assert!(metrics.recurrent_points > 0);
        assert_eq!(metrics.determinism, 0.0);
    }

    #[test]
    fn test_no_events_is_degenerate() {
        let silent = vec![0.0; 100];
        let active = event_trace(100, &[(10, 20)]);
        let err = analyze(&silent, &active, &events_config()).unwrap_err();
        assert!(matches!(err, EstimatorError::DegenerateSignal { .. }));
    }

    #[test]
    fn test_identical_signals_recur_strongly() {
        let signal = sine(600, 4.0);
        let metrics = analyze(&signal, &signal, &embedded_config()).unwrap();
        assert!(metrics.recurrence_rate > 0.0 && metrics.recurrence_rate < 1.0);
        assert!(metrics.determinism > 0.9, "det = {}", metrics.determinism);
        assert!(metrics.max_diagonal >= metrics.matrix_rows / 2);
    }

    #[test]
    fn test_identical_beat_independent_noise() {
        let mut rng = StdRng::seed_from_u64(5);
        let shared = sine(600, 4.0);
        let noise_a: Vec<f64> = (0..600).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let noise_b: Vec<f64> = (0..600).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let coupled = analyze(&shared, &shared, &embedded_config()).unwrap();
        let uncoupled = analyze(&noise_a, &noise_b, &embedded_config()).unwrap();
        assert!(coupled.determinism > uncoupled.determinism);
    }

    #[test]
    fn test_flat_signal_is_degenerate() {
        // Non-zero constant whose computed variance is rounding residue.
        let flat = vec![0.3; 300];
        let wave = sine(300, 4.0);
        let err = analyze(&flat, &wave, &embedded_config()).unwrap_err();
        assert!(matches!(err, EstimatorError::DegenerateSignal { .. }));
    }

    #[test]
    fn test_under_sampled_embedding_is_degenerate() {
        let config = CrqaConfig {
            mode: CrqaMode::Embedded { dim: 5, delay: 6 },
            ..embedded_config()
        };
        let short = sine(20, 4.0);
        let err = analyze(&short, &short, &config).unwrap_err();
        assert!(matches!(err, EstimatorError::DegenerateSignal { .. }));
    }

    #[test]
    fn test_quantile_radius_sets_recurrence_rate() {
        let mut rng = StdRng::seed_from_u64(11);
        let a: Vec<f64> = (0..200).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let b: Vec<f64> = (0..200).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let config = CrqaConfig {
            radius: RecurrenceRadius::Quantile { q: 0.1 },
            ..embedded_config()
        };
        let metrics = analyze(&a, &b, &config).unwrap();
        // The q-quantile threshold admits roughly a q fraction of cells.
        assert!((metrics.recurrence_rate - 0.1).abs() < 0.05);
    }

    #[test]
    fn test_max_points_bounds_matrix() {
        let long = sine(4000, 2.0);
        let metrics = analyze(&long, &long, &embedded_config()).unwrap();
        assert!(metrics.matrix_rows <= 200);
        assert!(metrics.matrix_cols <= 200);
    }

    #[test]
    fn test_calibration_rescales_score() {
        let signal = sine(600, 4.0);
        let pair = ChannelPair {
            channel_id: "eeg".to_string(),
            sample_rate_hz: 128.0,
            a: signal.clone(),
            b: signal,
            coverage: 1.0,
        };

        let identity = estimate(&pair, &embedded_config()).unwrap();
        let calibrated_config = CrqaConfig {
            calibration: CrqaCalibration {
                metric: CrqaMetricKind::Determinism,
                floor: 0.5,
                ceiling: 2.0,
            },
            ..embedded_config()
        };
        let calibrated = estimate(&pair, &calibrated_config).unwrap();

        // Identity calibration passes raw determinism through; the wider
        // band compresses it.
        assert!(calibrated.value < identity.value);
    }

    #[test]
    fn test_entropy_zero_for_single_line_length() {
        assert_eq!(line_entropy(&[]), 0.0);
        assert_eq!(line_entropy(&[4, 4, 4]), 0.0);
        assert!(line_entropy(&[2, 3, 4, 5]) > 1.9);
    }
}
