//! Dyad session lifecycle: buffers, ingestion, and per-tick evaluation.
//!
//! A session owns its two participants' stream buffers and can evaluate an
//! analysis window at any instant. Tick scheduling and state transitions
//! live in the orchestrator; everything here is callable directly, which
//! keeps offline replay deterministic.

pub mod orchestrator;

pub use orchestrator::{spawn, SessionHandle};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::{ConfigError, SessionConfig};
use crate::core::fusion::{fuse, Resonance};
use crate::core::window::{align_pair, AnalysisWindow};
use crate::estimators::{
    coherence, crqa, envelope, plv, EstimatorError, EstimatorKind, EstimatorResult, EstimatorScore,
};
use crate::ingest::{IngestError, IngestReport, Sample, SampleRange, StreamBuffer};
use crate::telemetry::{create_shared_telemetry, SharedTelemetry};

/// Lifecycle states of a dyad session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet ticking
    Idle,
    /// Ticking and emitting records
    Active,
    /// Ticking suppressed; buffers keep accepting samples
    Paused,
    /// Terminal; in-flight evaluation is discarded
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from session control calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The requested lifecycle transition is not legal
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
    /// The session has already closed
    Closed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidTransition { from, to } => {
                write!(f, "illegal session transition {} -> {}", from, to)
            }
            SessionError::Closed => write!(f, "session is closed"),
        }
    }
}

impl std::error::Error for SessionError {}

/// One dyad's configuration, buffers, and evaluation pipeline.
///
/// All mutable state is scoped to the session instance; two sessions never
/// share anything.
pub struct DyadSession {
    config: SessionConfig,
    /// Per-participant, per-channel buffers, locked per channel so
    /// ingestion on one channel never blocks reads on another.
    buffers: [HashMap<String, Mutex<StreamBuffer>>; 2],
    telemetry: SharedTelemetry,
}

impl DyadSession {
    /// Create a session, rejecting bad configuration before any ticking.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let buffers = [channel_buffers(&config), channel_buffers(&config)];
        Ok(Self {
            config,
            buffers,
            telemetry: create_shared_telemetry(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn telemetry(&self) -> SharedTelemetry {
        self.telemetry.clone()
    }

    /// Ingest a sample batch for one participant's channel.
    ///
    /// Duplicate or out-of-order samples are rejected per sample; the
    /// report carries both counts so transports can detect replay.
    pub fn ingest(
        &self,
        participant_id: &str,
        channel_id: &str,
        samples: &[Sample],
    ) -> Result<IngestReport, IngestError> {
        let index = self
            .config
            .participant_index(participant_id)
            .ok_or_else(|| IngestError::UnknownParticipant(participant_id.to_string()))?;
        let slot = self.buffers[index]
            .get(channel_id)
            .ok_or_else(|| IngestError::UnknownChannel(channel_id.to_string()))?;

        let mut report = IngestReport::default();
        {
            let mut buffer = lock(slot);
            for &sample in samples {
                report.record(buffer.push(sample));
            }
        }
        self.telemetry
            .record_ingest(report.accepted as u64, report.rejected as u64);
        Ok(report)
    }

    /// Extract the aligned analysis window ending at `t_end_ms`.
    ///
    /// Buffer reads extend one interpolation bound past the window so edge
    /// grid points still find their brackets.
    pub fn extract_window(&self, t_end_ms: i64) -> AnalysisWindow {
        let window_ms = self.config.window_len.as_millis() as i64;
        let margin_ms = self.config.max_gap.as_millis() as i64;
        let t_start_ms = t_end_ms - window_ms;

        let mut window = AnalysisWindow::new(t_start_ms, t_end_ms);
        for channel in &self.config.channels {
            let rate = channel.sample_rate_hz.unwrap_or(self.config.nominal_rate_hz);
            let a = self.read_range(0, &channel.id, t_start_ms - margin_ms, t_end_ms + margin_ms);
            let b = self.read_range(1, &channel.id, t_start_ms - margin_ms, t_end_ms + margin_ms);
            let pair = align_pair(
                &channel.id,
                &self.config.participants,
                &a,
                &b,
                t_start_ms,
                t_end_ms,
                rate,
                self.config.max_gap,
                self.config.max_gap_fraction,
            );
            window.insert(channel.id.clone(), pair);
        }
        window
    }

    fn read_range(&self, participant: usize, channel_id: &str, t0: i64, t1: i64) -> SampleRange {
        match self.buffers[participant].get(channel_id) {
            Some(slot) => lock(slot).read(t0, t1),
            None => SampleRange::default(),
        }
    }

    /// Evaluate one tick: extract the window, fan the estimators out under
    /// a shared deadline, fuse. `None` means the tick is skipped.
    pub async fn evaluate_at(&self, t_end_ms: i64) -> Option<Resonance> {
        let window = self.extract_window(t_end_ms);
        let results = self.run_estimators(&window).await;
        fuse(
            &self.config.session_id,
            t_end_ms,
            &results,
            &self.config.weights,
            &self.config.fusion,
            self.config.min_valid_estimators,
        )
    }

    /// Run every enabled estimator concurrently against one shared
    /// wall-clock deadline. An estimator that misses the deadline is
    /// invalid for this tick; its blocking task finishes in the background.
    async fn run_estimators(&self, window: &AnalysisWindow) -> Vec<EstimatorResult> {
        let deadline = Instant::now() + self.config.estimator_timeout;

        let mut tasks: Vec<(EstimatorKind, JoinHandle<_>)> = Vec::new();
        for kind in self.estimator_kinds() {
            tasks.push((kind, self.spawn_estimator(kind, window)));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (kind, task) in tasks {
            let outcome = match time::timeout_at(deadline, task).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(EstimatorError::Cancelled),
                Err(_) => {
                    self.telemetry.record_timeout();
                    Err(EstimatorError::Timeout)
                }
            };
            if let Err(error) = &outcome {
                tracing::debug!(estimator = %kind, %error, "estimator invalid this tick");
            }
            results.push(EstimatorResult { kind, outcome });
        }
        results
    }

    fn estimator_kinds(&self) -> Vec<EstimatorKind> {
        let mut kinds = vec![
            EstimatorKind::Plv,
            EstimatorKind::Envelope,
            EstimatorKind::Crqa,
        ];
        if self.config.coherence.is_some() {
            kinds.push(EstimatorKind::Coherence);
        }
        kinds
    }

    fn spawn_estimator(
        &self,
        kind: EstimatorKind,
        window: &AnalysisWindow,
    ) -> JoinHandle<Result<EstimatorScore, EstimatorError>> {
        match kind {
            EstimatorKind::Plv => {
                let config = self.config.plv.clone();
                let pair = window.pair(&config.channel).map(|p| p.clone());
                tokio::task::spawn_blocking(move || plv::estimate(&pair?, &config))
            }
            EstimatorKind::Envelope => {
                let config = self.config.envelope.clone();
                let pair = window.pair(&config.channel).map(|p| p.clone());
                tokio::task::spawn_blocking(move || envelope::estimate(&pair?, &config))
            }
            EstimatorKind::Crqa => {
                let config = self.config.crqa.clone();
                let pair = window.pair(&config.channel).map(|p| p.clone());
                tokio::task::spawn_blocking(move || crqa::estimate(&pair?, &config))
            }
            EstimatorKind::Coherence => match self.config.coherence.clone() {
                Some(config) => {
                    let pair = window.pair(&config.channel).map(|p| p.clone());
                    tokio::task::spawn_blocking(move || coherence::estimate(&pair?, &config))
                }
                None => tokio::task::spawn_blocking(|| {
                    Err(EstimatorError::data_gap("fnirs", "coherence not configured"))
                }),
            },
        }
    }
}

fn channel_buffers(config: &SessionConfig) -> HashMap<String, Mutex<StreamBuffer>> {
    config
        .channels
        .iter()
        .map(|c| {
            (
                c.id.clone(),
                Mutex::new(StreamBuffer::new(config.buffer_capacity)),
            )
        })
        .collect()
}

/// Lock a channel buffer, recovering the data from a poisoned lock.
fn lock(slot: &Mutex<StreamBuffer>) -> MutexGuard<'_, StreamBuffer> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use std::f64::consts::PI;
    use std::time::Duration;

    /// A compact session: one 128 Hz EEG channel, 2 s windows, coherence off.
    fn test_config() -> SessionConfig {
        SessionConfig {
            session_id: "SESS-unit".to_string(),
            participants: ["alice".to_string(), "bob".to_string()],
            channels: vec![ChannelConfig::new("eeg")],
            window_len: Duration::from_secs(2),
            tick_interval: Duration::from_millis(250),
            estimator_timeout: Duration::from_millis(250),
            coherence: None,
            ..SessionConfig::default()
        }
    }

    /// Alpha carrier with slow amplitude modulation, so both phase and
    /// envelope structure are present.
    fn modulated_alpha(t0_ms: i64, duration_ms: i64, rate_hz: f64) -> Vec<Sample> {
        let step_ms = (1000.0 / rate_hz) as i64;
        (0..duration_ms / step_ms)
            .map(|i| {
                let t = t0_ms + i * step_ms;
                let secs = t as f64 / 1000.0;
                let envelope = 1.0 + 0.5 * (2.0 * PI * 0.8 * secs).sin();
                Sample::new(t, envelope * (2.0 * PI * 10.0 * secs).sin())
            })
            .collect()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = test_config();
        config.weights.plv = -0.1;
        assert!(DyadSession::new(config).is_err());
    }

    #[test]
    fn test_ingest_rejects_unknown_ids() {
        let session = DyadSession::new(test_config()).unwrap();
        let samples = [Sample::new(0, 1.0)];

        let err = session.ingest("carol", "eeg", &samples).unwrap_err();
        assert!(matches!(err, IngestError::UnknownParticipant(_)));

        let err = session.ingest("alice", "emg", &samples).unwrap_err();
        assert!(matches!(err, IngestError::UnknownChannel(_)));
    }

    #[test]
    fn test_ingest_reports_rejections() {
        let session = DyadSession::new(test_config()).unwrap();
        let samples = [
            Sample::new(100, 1.0),
            Sample::new(110, 2.0),
            Sample::new(105, 3.0),
            Sample::new(120, 4.0),
        ];
        let report = session.ingest("alice", "eeg", &samples).unwrap();
        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected, 1);

        let stats = session.telemetry().stats();
        assert_eq!(stats.samples_accepted, 3);
        assert_eq!(stats.samples_rejected, 1);
    }

    #[tokio::test]
    async fn test_evaluate_coupled_dyad_emits_high_resonance() {
        let session = DyadSession::new(test_config()).unwrap();
        let signal = modulated_alpha(0, 4000, 128.0);
        session.ingest("alice", "eeg", &signal).unwrap();
        session.ingest("bob", "eeg", &signal).unwrap();

        let record = session.evaluate_at(3000).await.expect("record");
        assert_eq!(record.session_id, "SESS-unit");
        assert_eq!(record.t_unix_ms, 3000);
        assert!(record.plv.unwrap() > 0.99);
        assert!(record.r_env.unwrap() > 0.95);
        assert!(record.crqa.unwrap() > 0.8);
        assert_eq!(record.fnirs, None);
        assert!(record.r > 0.85, "r = {}", record.r);
    }

    #[tokio::test]
    async fn test_evaluate_empty_buffers_skips() {
        let session = DyadSession::new(test_config()).unwrap();
        assert!(session.evaluate_at(3000).await.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_one_sided_data_skips() {
        let session = DyadSession::new(test_config()).unwrap();
        let signal = modulated_alpha(0, 4000, 128.0);
        session.ingest("alice", "eeg", &signal).unwrap();

        assert!(session.evaluate_at(3000).await.is_none());
    }

    #[tokio::test]
    async fn test_window_with_stale_data_skips() {
        // Data ends 10 s before the evaluation instant.
        let session = DyadSession::new(test_config()).unwrap();
        let signal = modulated_alpha(0, 2000, 128.0);
        session.ingest("alice", "eeg", &signal).unwrap();
        session.ingest("bob", "eeg", &signal).unwrap();

        assert!(session.evaluate_at(12_000).await.is_none());
    }

    #[tokio::test]
    async fn test_estimator_timeout_skips_the_tick() {
        let mut config = test_config();
        // A budget that is already spent when the first estimator is
        // polled, so every estimator reports Timeout instead of a score.
        config.estimator_timeout = Duration::from_nanos(1);
        config.window_len = Duration::from_secs(8);
        let session = DyadSession::new(config).unwrap();
        let signal = modulated_alpha(0, 10_000, 128.0);
        session.ingest("alice", "eeg", &signal).unwrap();
        session.ingest("bob", "eeg", &signal).unwrap();

        assert!(session.evaluate_at(9000).await.is_none());
        assert_eq!(session.telemetry().stats().estimator_timeouts, 3);
    }
}
