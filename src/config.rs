//! Per-session configuration for the resonance engine.
//!
//! A `SessionConfig` is supplied once at session creation, validated, and
//! immutable for the session's lifetime. Changing any parameter requires a
//! new session.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::estimators::EstimatorKind;

/// Frequency band in Hz, `low_hz < high_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl Band {
    pub fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    /// Geometric center frequency of the band.
    pub fn center_hz(&self) -> f64 {
        (self.low_hz * self.high_hz).sqrt()
    }

    pub fn width_hz(&self) -> f64 {
        self.high_hz - self.low_hz
    }
}

/// One signal channel shared by both participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel identifier used by ingestion calls
    pub id: String,
    /// Sampling rate for this channel's analysis grid; `None` uses the
    /// session nominal rate
    #[serde(default)]
    pub sample_rate_hz: Option<f64>,
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sample_rate_hz: None,
        }
    }

    pub fn with_rate(id: impl Into<String>, sample_rate_hz: f64) -> Self {
        Self {
            id: id.into(),
            sample_rate_hz: Some(sample_rate_hz),
        }
    }
}

/// Fusion weights per estimator, renormalized over the valid set each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub plv: f64,
    pub envelope: f64,
    pub crqa: f64,
    pub coherence: f64,
}

impl FusionWeights {
    pub fn get(&self, kind: EstimatorKind) -> f64 {
        match kind {
            EstimatorKind::Plv => self.plv,
            EstimatorKind::Envelope => self.envelope,
            EstimatorKind::Crqa => self.crqa,
            EstimatorKind::Coherence => self.coherence,
        }
    }

    fn iter(&self) -> [(EstimatorKind, f64); 4] {
        [
            (EstimatorKind::Plv, self.plv),
            (EstimatorKind::Envelope, self.envelope),
            (EstimatorKind::Crqa, self.crqa),
            (EstimatorKind::Coherence, self.coherence),
        ]
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            plv: 0.3,
            envelope: 0.3,
            crqa: 0.2,
            coherence: 0.2,
        }
    }
}

/// Squashing and confidence parameters for the fusion engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Logistic steepness applied to the weighted sum
    pub steepness: f64,
    /// Weighted-sum value mapping to r = 0.5
    pub midpoint: f64,
    /// Confidence ceiling when only one estimator is valid
    pub single_estimator_conf_cap: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            steepness: 6.0,
            midpoint: 0.5,
            single_estimator_conf_cap: 0.5,
        }
    }
}

/// Phase-locking value estimator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlvConfig {
    /// Channel the phases are extracted from
    pub channel: String,
    /// Band-pass applied before the analytic transform
    pub band: Band,
}

impl Default for PlvConfig {
    fn default() -> Self {
        Self {
            channel: "eeg".to_string(),
            band: Band::new(8.0, 12.0),
        }
    }
}

/// Envelope correlation estimator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub channel: String,
    pub band: Band,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            channel: "eeg".to_string(),
            band: Band::new(8.0, 12.0),
        }
    }
}

/// How CRQA turns the two signals into recurrence inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrqaMode {
    /// Time-delay embedding of z-scored continuous signals
    Embedded { dim: usize, delay: usize },
    /// Pre-binarized event sequences: a bin is an event when the signal
    /// exceeds the threshold
    Events { threshold: f64 },
}

/// Recurrence radius policy for the continuous CRQA mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceRadius {
    /// Fixed distance threshold
    Fixed { epsilon: f64 },
    /// Fraction of the maximum pairwise distance
    MaxFraction { fraction: f64 },
    /// Quantile of the pairwise distance distribution
    Quantile { q: f64 },
}

/// Which raw CRQA metric is normalized into the fused scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrqaMetricKind {
    Determinism,
    RecurrenceRate,
}

/// Calibration bounds mapping a raw CRQA metric onto [0,1].
///
/// These are a deployment input (pilot-tuned per population); the default
/// identity mapping passes raw determinism through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrqaCalibration {
    pub metric: CrqaMetricKind,
    pub floor: f64,
    pub ceiling: f64,
}

impl CrqaCalibration {
    /// Map a raw metric value onto [0,1] against the calibration bounds.
    pub fn normalize(&self, raw: f64) -> f64 {
        ((raw - self.floor) / (self.ceiling - self.floor)).clamp(0.0, 1.0)
    }
}

impl Default for CrqaCalibration {
    fn default() -> Self {
        Self {
            metric: CrqaMetricKind::Determinism,
            floor: 0.0,
            ceiling: 1.0,
        }
    }
}

/// Cross-recurrence estimator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrqaConfig {
    pub channel: String,
    pub mode: CrqaMode,
    pub radius: RecurrenceRadius,
    /// Minimum diagonal line length counted as deterministic structure
    pub min_diagonal: usize,
    /// Minimum vertical line length counted as laminar structure
    pub min_vertical: usize,
    /// Upper bound on points entering the O(N^2) recurrence matrix;
    /// longer windows are decimated down to this
    pub max_points: usize,
    pub calibration: CrqaCalibration,
}

impl Default for CrqaConfig {
    fn default() -> Self {
        Self {
            channel: "eeg".to_string(),
            mode: CrqaMode::Embedded { dim: 3, delay: 1 },
            radius: RecurrenceRadius::MaxFraction { fraction: 0.1 },
            min_diagonal: 2,
            min_vertical: 2,
            max_points: 220,
            calibration: CrqaCalibration::default(),
        }
    }
}

/// Coherence computation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceMethod {
    /// Morlet wavelet coherence, band- and time-averaged
    Wavelet,
    /// Welch magnitude-squared coherence, band-averaged
    Welch,
}

/// fNIRS coherence estimator parameters. Omitting the whole struct from the
/// session config disables the estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceConfig {
    pub channel: String,
    /// Hemodynamic band of interest
    pub band: Band,
    pub method: CoherenceMethod,
    /// Number of log-spaced wavelet scales across the band
    pub n_scales: usize,
    /// Morlet center frequency (nondimensional)
    pub omega0: f64,
    /// Required full cycles of the band's low edge within one window
    pub min_cycles: f64,
    /// Welch segment length in samples; 0 selects len/4 automatically
    pub welch_segment: usize,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            channel: "fnirs".to_string(),
            band: Band::new(0.05, 0.2),
            method: CoherenceMethod::Wavelet,
            n_scales: 32,
            omega0: 6.0,
            min_cycles: 1.0,
            welch_segment: 0,
        }
    }
}

/// Complete immutable configuration for one dyad session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session identifier carried on every Resonance record
    pub session_id: String,

    /// The two participant identifiers, order fixed for the session
    pub participants: [String; 2],

    /// Default analysis sampling rate for channels without an override
    pub nominal_rate_hz: f64,

    /// Channels both participants stream
    pub channels: Vec<ChannelConfig>,

    /// Per-channel circular buffer capacity in samples
    pub buffer_capacity: usize,

    /// Analysis window length
    #[serde(with = "duration_ms")]
    pub window_len: Duration,

    /// Orchestrator tick interval
    #[serde(with = "duration_ms")]
    pub tick_interval: Duration,

    /// Wall-clock budget per estimator per tick
    #[serde(with = "duration_ms")]
    pub estimator_timeout: Duration,

    /// Largest gap bridged by linear interpolation during resampling
    #[serde(with = "duration_ms")]
    pub max_gap: Duration,

    /// Maximum fraction of a window that may be uncovered
    pub max_gap_fraction: f64,

    /// Minimum number of valid estimators required to emit a record
    pub min_valid_estimators: usize,

    pub weights: FusionWeights,
    pub fusion: FusionConfig,
    pub plv: PlvConfig,
    pub envelope: EnvelopeConfig,
    pub crqa: CrqaConfig,
    /// `None` runs the session without the fNIRS estimator
    pub coherence: Option<CoherenceConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("SESS-{}", Uuid::new_v4()),
            participants: ["participant-a".to_string(), "participant-b".to_string()],
            nominal_rate_hz: 128.0,
            channels: vec![
                ChannelConfig::new("eeg"),
                ChannelConfig::with_rate("fnirs", 10.0),
            ],
            buffer_capacity: 10_000,
            window_len: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            estimator_timeout: Duration::from_millis(750),
            max_gap: Duration::from_millis(250),
            max_gap_fraction: 0.25,
            min_valid_estimators: 1,
            weights: FusionWeights::default(),
            fusion: FusionConfig::default(),
            plv: PlvConfig::default(),
            envelope: EnvelopeConfig::default(),
            crqa: CrqaConfig::default(),
            coherence: Some(CoherenceConfig::default()),
        }
    }
}

impl SessionConfig {
    /// Look up a configured channel by id.
    pub fn channel(&self, id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Effective analysis rate for a configured channel.
    pub fn channel_rate_hz(&self, id: &str) -> Option<f64> {
        self.channel(id)
            .map(|c| c.sample_rate_hz.unwrap_or(self.nominal_rate_hz))
    }

    /// Index of a participant id within this session, if present.
    pub fn participant_index(&self, id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p == id)
    }

    /// Number of estimators this configuration enables.
    pub fn enabled_estimators(&self) -> usize {
        if self.coherence.is_some() {
            4
        } else {
            3
        }
    }

    /// Validate every parameter; called once at session creation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_id.trim().is_empty() {
            return Err(invalid("session_id must not be empty"));
        }
        let [a, b] = &self.participants;
        if a.trim().is_empty() || b.trim().is_empty() {
            return Err(invalid("participant ids must not be empty"));
        }
        if a == b {
            return Err(invalid("participant ids must be distinct"));
        }

        if !(self.nominal_rate_hz.is_finite() && self.nominal_rate_hz > 0.0) {
            return Err(invalid("nominal_rate_hz must be positive and finite"));
        }
        if self.channels.is_empty() {
            return Err(invalid("at least one channel is required"));
        }
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.id.trim().is_empty() {
                return Err(invalid("channel ids must not be empty"));
            }
            if !seen.insert(channel.id.as_str()) {
                return Err(invalid(format!("duplicate channel id: {}", channel.id)));
            }
            if let Some(rate) = channel.sample_rate_hz {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(invalid(format!(
                        "channel {} sample rate must be positive and finite",
                        channel.id
                    )));
                }
            }
        }

        if self.window_len.is_zero() {
            return Err(invalid("window_len must be positive"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("tick_interval must be positive"));
        }
        if self.estimator_timeout.is_zero() {
            return Err(invalid("estimator_timeout must be positive"));
        }
        if self.estimator_timeout > self.tick_interval {
            return Err(invalid("estimator_timeout must not exceed tick_interval"));
        }
        if self.max_gap.is_zero() {
            return Err(invalid("max_gap must be positive"));
        }
        if !(self.max_gap_fraction.is_finite()
            && (0.0..1.0).contains(&self.max_gap_fraction))
        {
            return Err(invalid("max_gap_fraction must lie in [0, 1)"));
        }

        if self.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity must be positive"));
        }
        let window_secs = self.window_len.as_secs_f64();
        for channel in &self.channels {
            let rate = channel.sample_rate_hz.unwrap_or(self.nominal_rate_hz);
            let needed = (rate * window_secs).ceil() as usize;
            if needed > self.buffer_capacity {
                return Err(invalid(format!(
                    "buffer_capacity {} cannot hold one {}s window of channel {} at {} Hz",
                    self.buffer_capacity, window_secs, channel.id, rate
                )));
            }
            if (rate * window_secs).round() < 16.0 {
                return Err(invalid(format!(
                    "window_len spans fewer than 16 grid points of channel {} at {} Hz",
                    channel.id, rate
                )));
            }
        }

        if !(1..=self.enabled_estimators()).contains(&self.min_valid_estimators) {
            return Err(invalid(format!(
                "min_valid_estimators must lie in 1..={}",
                self.enabled_estimators()
            )));
        }

        for (kind, weight) in self.weights.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(format!(
                    "{} weight must be non-negative and finite",
                    kind.as_str()
                )));
            }
        }
        let weight_sum =
            self.weights.plv + self.weights.envelope + self.weights.crqa + self.weights.coherence;
        if weight_sum <= 0.0 {
            return Err(invalid("fusion weights must not all be zero"));
        }

        if !(self.fusion.steepness.is_finite() && self.fusion.steepness > 0.0) {
            return Err(invalid("fusion steepness must be positive and finite"));
        }
        if !(self.fusion.midpoint.is_finite() && (0.0..=1.0).contains(&self.fusion.midpoint)) {
            return Err(invalid("fusion midpoint must lie in [0, 1]"));
        }
        if !((0.0..=1.0).contains(&self.fusion.single_estimator_conf_cap)) {
            return Err(invalid("single_estimator_conf_cap must lie in [0, 1]"));
        }

        self.validate_band("plv", &self.plv.channel, &self.plv.band)?;
        self.validate_band("envelope", &self.envelope.channel, &self.envelope.band)?;
        self.validate_crqa()?;
        if let Some(coherence) = &self.coherence {
            self.validate_coherence(coherence)?;
        }

        Ok(())
    }

    fn validate_band(&self, estimator: &str, channel: &str, band: &Band) -> Result<(), ConfigError> {
        let rate = self.channel_rate_hz(channel).ok_or_else(|| {
            invalid(format!(
                "{} estimator references unknown channel {}",
                estimator, channel
            ))
        })?;
        if !(band.low_hz.is_finite() && band.high_hz.is_finite() && band.low_hz > 0.0) {
            return Err(invalid(format!(
                "{} band edges must be positive and finite",
                estimator
            )));
        }
        if band.low_hz >= band.high_hz {
            return Err(invalid(format!(
                "{} band low edge must be below the high edge",
                estimator
            )));
        }
        if band.high_hz >= rate / 2.0 {
            return Err(invalid(format!(
                "{} band high edge {} Hz exceeds the Nyquist limit of channel {} ({} Hz)",
                estimator,
                band.high_hz,
                channel,
                rate / 2.0
            )));
        }
        Ok(())
    }

    fn validate_crqa(&self) -> Result<(), ConfigError> {
        let cfg = &self.crqa;
        if self.channel(&cfg.channel).is_none() {
            return Err(invalid(format!(
                "crqa estimator references unknown channel {}",
                cfg.channel
            )));
        }
        match cfg.mode {
            CrqaMode::Embedded { dim, delay } => {
                if dim == 0 || delay == 0 {
                    return Err(invalid("crqa embedding dim and delay must be at least 1"));
                }
            }
            CrqaMode::Events { threshold } => {
                if !threshold.is_finite() {
                    return Err(invalid("crqa event threshold must be finite"));
                }
            }
        }
        match cfg.radius {
            RecurrenceRadius::Fixed { epsilon } => {
                if !(epsilon.is_finite() && epsilon > 0.0) {
                    return Err(invalid("crqa fixed radius must be positive and finite"));
                }
            }
            RecurrenceRadius::MaxFraction { fraction } => {
                if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) {
                    return Err(invalid("crqa radius fraction must lie in (0, 1]"));
                }
            }
            RecurrenceRadius::Quantile { q } => {
                if !(q.is_finite() && q > 0.0 && q < 1.0) {
                    return Err(invalid("crqa radius quantile must lie in (0, 1)"));
                }
            }
        }
        if cfg.min_diagonal < 2 || cfg.min_vertical < 2 {
            return Err(invalid("crqa minimum line lengths must be at least 2"));
        }
        if cfg.max_points < 16 {
            return Err(invalid("crqa max_points must be at least 16"));
        }
        let cal = &cfg.calibration;
        if !(cal.floor.is_finite() && cal.ceiling.is_finite()) {
            return Err(invalid("crqa calibration bounds must be finite"));
        }
        if cal.ceiling <= cal.floor {
            return Err(invalid("crqa calibration ceiling must exceed the floor"));
        }
        Ok(())
    }

    fn validate_coherence(&self, cfg: &CoherenceConfig) -> Result<(), ConfigError> {
        self.validate_band("coherence", &cfg.channel, &cfg.band)?;
        if cfg.n_scales < 4 {
            return Err(invalid("coherence n_scales must be at least 4"));
        }
        if !(cfg.omega0.is_finite() && cfg.omega0 >= 2.0) {
            return Err(invalid("coherence omega0 must be at least 2"));
        }
        if !(cfg.min_cycles.is_finite() && cfg.min_cycles > 0.0) {
            return Err(invalid("coherence min_cycles must be positive"));
        }
        let cycles = self.window_len.as_secs_f64() * cfg.band.low_hz;
        if cycles < cfg.min_cycles {
            return Err(invalid(format!(
                "window_len covers {:.2} cycles of the {} Hz band edge; at least {} required",
                cycles, cfg.band.low_hz, cfg.min_cycles
            )));
        }
        if cfg.welch_segment != 0 && cfg.welch_segment < 16 {
            return Err(invalid("coherence welch_segment must be 0 (auto) or >= 16"));
        }
        Ok(())
    }

    /// Load a session configuration from a JSON file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: SessionConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config)
    }

    /// Save this configuration as pretty JSON.
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Default location for the engine's session configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resonance-engine")
            .join("session.json")
    }

    /// Default directory for exported session records.
    pub fn default_export_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resonance-engine")
            .join("exports")
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Configuration errors. `Invalid` is fatal at session creation.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_estimators(), 4);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = SessionConfig::default();
        config.weights.crqa = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_weight_rejected() {
        let mut config = SessionConfig::default();
        config.weights.plv = f64::NAN;
        assert!(config.validate().is_err());

        config.weights.plv = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_estimator_channel_rejected() {
        let mut config = SessionConfig::default();
        config.plv.channel = "missing".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_band_above_nyquist_rejected() {
        let mut config = SessionConfig::default();
        config.plv.band = Band::new(8.0, 70.0); // eeg runs at 128 Hz
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_beyond_tick_rejected() {
        let mut config = SessionConfig::default();
        config.estimator_timeout = Duration::from_secs(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_calibration_floor_above_ceiling_rejected() {
        let mut config = SessionConfig::default();
        config.crqa.calibration = CrqaCalibration {
            metric: CrqaMetricKind::Determinism,
            floor: 0.8,
            ceiling: 0.3,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_window_fails_coherence_cycles() {
        let mut config = SessionConfig::default();
        config.window_len = Duration::from_secs(5); // 0.25 cycles of 0.05 Hz
        assert!(config.validate().is_err());

        // Without the coherence estimator the short window is fine.
        config.coherence = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_too_small_for_window_rejected() {
        let mut config = SessionConfig::default();
        config.buffer_capacity = 1000; // eeg needs 128 * 30 = 3840
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_calibration_normalize_clamps() {
        let cal = CrqaCalibration {
            metric: CrqaMetricKind::Determinism,
            floor: 0.2,
            ceiling: 0.7,
        };
        assert_eq!(cal.normalize(0.2), 0.0);
        assert_eq!(cal.normalize(0.7), 1.0);
        assert!((cal.normalize(0.45) - 0.5).abs() < 1e-12);
        assert_eq!(cal.normalize(0.9), 1.0);
        assert_eq!(cal.normalize(0.0), 0.0);
    }

    #[test]
    fn test_config_roundtrip_json() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, config.session_id);
        assert_eq!(back.window_len, config.window_len);
        assert_eq!(back.weights, config.weights);
    }
}
