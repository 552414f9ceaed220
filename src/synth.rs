//! Synthetic coupled dyad generator.
//!
//! Produces two participants' oscillation and slow-wave streams whose
//! synchrony is governed by a single coupling parameter. Used by the
//! `simulate` subcommand, the bundled example, and the integration tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

use crate::ingest::Sample;

/// Carrier frequency of the oscillation channel, Hz.
const CARRIER_HZ: f64 = 10.0;

/// Amplitude-modulation frequency of the oscillation channel, Hz.
const AM_HZ: f64 = 0.8;

/// Half-width of one uniform phase-walk step, radians per sample.
const PHASE_WALK_STEP: f64 = 0.1;

/// Pole of the AR(1) slow-wave sources.
const SLOW_POLE: f64 = 0.97;

/// Two-participant signal source with a tunable coupling level.
///
/// At coupling 1.0 both participants ride the same phase walk and the same
/// slow source; at 0.0 their phases and slow waves drift independently.
/// Output is deterministic for a given seed, and timestamps advance
/// monotonically from the epoch across successive batches.
pub struct DyadGenerator {
    coupling: f64,
    epoch_ms: i64,
    rng: StdRng,
    shared_walk: f64,
    private_walk: [f64; 2],
    am_offset: [f64; 2],
    shared_slow: f64,
    private_slow: [f64; 2],
    oscillation_index: u64,
    slow_index: u64,
}

impl DyadGenerator {
    pub fn new(coupling: f64, seed: u64, epoch_ms: i64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let am_offset = [rng.gen_range(0.0..TAU), rng.gen_range(0.0..TAU)];
        Self {
            coupling: coupling.clamp(0.0, 1.0),
            epoch_ms,
            rng,
            shared_walk: 0.0,
            private_walk: [0.0; 2],
            am_offset,
            shared_slow: 0.0,
            private_slow: [0.0; 2],
            oscillation_index: 0,
            slow_index: 0,
        }
    }

    pub fn coupling(&self) -> f64 {
        self.coupling
    }

    /// Next batch of amplitude-modulated oscillation samples for both
    /// participants. The sample rate must stay constant across batches.
    pub fn oscillation_batch(&mut self, rate_hz: f64, n: usize) -> [Vec<Sample>; 2] {
        let decouple = 1.0 - self.coupling;
        let mut out = [Vec::with_capacity(n), Vec::with_capacity(n)];
        for _ in 0..n {
            let t_ms = self.epoch_ms + timestamp_offset_ms(self.oscillation_index, rate_hz);
            let t_s = self.oscillation_index as f64 / rate_hz;
            self.oscillation_index += 1;

            self.shared_walk += self.rng.gen_range(-PHASE_WALK_STEP..PHASE_WALK_STEP);
            for (p, stream) in out.iter_mut().enumerate() {
                self.private_walk[p] += self.rng.gen_range(-PHASE_WALK_STEP..PHASE_WALK_STEP);
                let phase =
                    TAU * CARRIER_HZ * t_s + self.shared_walk + decouple * self.private_walk[p];
                let am = 1.0 + 0.4 * (TAU * AM_HZ * t_s + decouple * self.am_offset[p]).sin();
                let value = am * phase.sin() + 0.05 * self.rng.gen_range(-1.0..1.0);
                stream.push(Sample::new(t_ms, value));
            }
        }
        out
    }

    /// Next batch of slow hemodynamic-like samples for both participants.
    /// Broadband below the sample rate, so band-averaged coherence responds
    /// to the coupling level across the whole analysis band.
    pub fn slow_wave_batch(&mut self, rate_hz: f64, n: usize) -> [Vec<Sample>; 2] {
        let c = self.coupling;
        let mut out = [Vec::with_capacity(n), Vec::with_capacity(n)];
        for _ in 0..n {
            let t_ms = self.epoch_ms + timestamp_offset_ms(self.slow_index, rate_hz);
            self.slow_index += 1;

            self.shared_slow = SLOW_POLE * self.shared_slow + self.rng.gen_range(-1.0..1.0);
            for (p, stream) in out.iter_mut().enumerate() {
                self.private_slow[p] =
                    SLOW_POLE * self.private_slow[p] + self.rng.gen_range(-1.0..1.0);
                let value = c * self.shared_slow
                    + (1.0 - c) * self.private_slow[p]
                    + 0.02 * self.rng.gen_range(-1.0..1.0);
                stream.push(Sample::new(t_ms, value));
            }
        }
        out
    }
}

fn timestamp_offset_ms(index: u64, rate_hz: f64) -> i64 {
    (index as f64 * 1000.0 / rate_hz).round() as i64
}
