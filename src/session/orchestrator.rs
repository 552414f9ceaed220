//! Tick scheduling and session control.
//!
//! The orchestrator runs one task per session: a fixed-interval ticker
//! gated by the session state. Control transitions travel over a watch
//! channel; closing is the only transition that interrupts an in-flight
//! evaluation, pausing lets it finish and suppresses the following ticks.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::{DyadSession, SessionError, SessionState};
use crate::sink::ResonanceSink;
use crate::telemetry::{SharedTelemetry, TelemetryStats};

/// Skip streaks at multiples of this are logged at warn level.
const SKIP_WARN_EVERY: u64 = 5;

/// Control handle for a running session task.
///
/// Dropping the handle without calling [`SessionHandle::close`] leaves the
/// task running detached until its runtime shuts down.
pub struct SessionHandle {
    session: Arc<DyadSession>,
    control: watch::Sender<SessionState>,
    task: tokio::task::JoinHandle<()>,
    telemetry: SharedTelemetry,
}

/// Validate the session config and launch its orchestrator task in IDLE
/// state. Call [`SessionHandle::start`] to begin ticking.
pub fn spawn(session: DyadSession, sink: Arc<dyn ResonanceSink>) -> SessionHandle {
    let session = Arc::new(session);
    let telemetry = session.telemetry();
    let (control, state) = watch::channel(SessionState::Idle);
    let task = tokio::spawn(run(session.clone(), sink, state));
    SessionHandle {
        session,
        control,
        task,
        telemetry,
    }
}

impl SessionHandle {
    /// The underlying session, for ingestion while the task runs.
    pub fn session(&self) -> &DyadSession {
        &self.session
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.control.borrow()
    }

    /// Begin ticking. Legal only from IDLE.
    pub fn start(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Active)
    }

    /// Suppress ticking without discarding buffered samples. Legal only
    /// from ACTIVE.
    pub fn pause(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Active => self.transition(SessionState::Paused),
            from => Err(SessionError::InvalidTransition {
                from,
                to: SessionState::Paused,
            }),
        }
    }

    /// Resume ticking. Legal only from PAUSED.
    pub fn resume(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Paused => self.transition(SessionState::Active),
            from => Err(SessionError::InvalidTransition {
                from,
                to: SessionState::Active,
            }),
        }
    }

    /// Close the session: cancel any in-flight evaluation, flush the sink,
    /// and return the final counters. Legal from every state.
    pub async fn close(self) -> TelemetryStats {
        let _ = self.control.send(SessionState::Closed);
        let _ = self.task.await;
        self.telemetry.stats()
    }

    fn transition(&self, to: SessionState) -> Result<(), SessionError> {
        let from = self.state();
        let legal = matches!(
            (from, to),
            (SessionState::Idle, SessionState::Active)
                | (SessionState::Active, SessionState::Paused)
                | (SessionState::Paused, SessionState::Active)
        );
        if !legal {
            return Err(SessionError::InvalidTransition { from, to });
        }
        self.control.send(to).map_err(|_| SessionError::Closed)
    }
}

/// The per-session orchestrator loop.
async fn run(
    session: Arc<DyadSession>,
    sink: Arc<dyn ResonanceSink>,
    mut state: watch::Receiver<SessionState>,
) {
    let session_id = session.config().session_id.clone();
    let telemetry = session.telemetry();

    let mut ticker = interval(session.config().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(%session_id, "session task started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Copy the state out so no watch read guard is held
                // across the evaluation await.
                let current = *state.borrow();
                match current {
                    SessionState::Active => {
                        let t_end_ms = Utc::now().timestamp_millis();
                        if !evaluate_tick(&session, &sink, &telemetry, &mut state, t_end_ms).await {
                            break;
                        }
                    }
                    SessionState::Closed => break,
                    SessionState::Idle | SessionState::Paused => {}
                }
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SessionState::Closed {
                    break;
                }
            }
        }
    }

    sink.flush();
    tracing::info!(%session_id, "session closed");
}

/// Run one evaluation, racing it against a close signal. Returns false
/// when the session closed and the partial result was discarded.
async fn evaluate_tick(
    session: &Arc<DyadSession>,
    sink: &Arc<dyn ResonanceSink>,
    telemetry: &SharedTelemetry,
    state: &mut watch::Receiver<SessionState>,
    t_end_ms: i64,
) -> bool {
    let evaluation = session.evaluate_at(t_end_ms);
    tokio::pin!(evaluation);

    loop {
        tokio::select! {
            record = &mut evaluation => {
                match record {
                    Some(record) => {
                        if sink.emit(record) {
                            telemetry.record_tick_emitted();
                        } else {
                            telemetry.record_tick_dropped();
                            tracing::warn!(
                                session_id = %session.config().session_id,
                                "sink refused a resonance record"
                            );
                        }
                    }
                    None => {
                        let streak = telemetry.record_tick_skipped();
                        if streak % SKIP_WARN_EVERY == 0 {
                            tracing::warn!(
                                session_id = %session.config().session_id,
                                streak,
                                "skipping ticks, estimators keep coming back invalid"
                            );
                        } else {
                            tracing::debug!(
                                session_id = %session.config().session_id,
                                "no data this tick"
                            );
                        }
                    }
                }
                return true;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SessionState::Closed {
                    // Discard the in-flight evaluation.
                    return false;
                }
                // Pause mid-evaluation lets the tick finish; only the
                // following ticks are suppressed.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, SessionConfig};
    use crate::ingest::Sample;
    use crate::sink::CollectingSink;
    use std::f64::consts::PI;
    use std::time::Duration;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            session_id: "SESS-orch".to_string(),
            participants: ["alice".to_string(), "bob".to_string()],
            channels: vec![ChannelConfig::new("eeg")],
            window_len: Duration::from_secs(2),
            tick_interval: Duration::from_millis(50),
            estimator_timeout: Duration::from_millis(50),
            coherence: None,
            ..SessionConfig::default()
        }
    }

    /// Fill both participants' buffers around the current wall clock.
    fn fill_dyad(session: &DyadSession) {
        let now_ms = Utc::now().timestamp_millis();
        let samples: Vec<Sample> = (0..1280)
            .map(|i| {
                let t = now_ms - 5000 + i * 8;
                let secs = t as f64 / 1000.0;
                let envelope = 1.0 + 0.5 * (2.0 * PI * 0.8 * secs).sin();
                Sample::new(t, envelope * (2.0 * PI * 10.0 * secs).sin())
            })
            .collect();
        session.ingest("alice", "eeg", &samples).unwrap();
        session.ingest("bob", "eeg", &samples).unwrap();
    }

    #[tokio::test]
    async fn test_transition_legality() {
        let sink = Arc::new(CollectingSink::new());
        let handle = spawn(DyadSession::new(fast_config()).unwrap(), sink);

        assert_eq!(handle.state(), SessionState::Idle);
        assert!(handle.pause().is_err());
        assert!(handle.resume().is_err());

        handle.start().unwrap();
        assert_eq!(handle.state(), SessionState::Active);
        assert!(handle.start().is_err());
        assert!(handle.resume().is_err());

        handle.pause().unwrap();
        assert_eq!(handle.state(), SessionState::Paused);
        assert!(handle.pause().is_err());

        handle.resume().unwrap();
        assert_eq!(handle.state(), SessionState::Active);

        handle.close().await;
    }

    #[tokio::test]
    async fn test_idle_session_never_ticks() {
        let sink = Arc::new(CollectingSink::new());
        let handle = spawn(DyadSession::new(fast_config()).unwrap(), sink.clone());
        fill_dyad(handle.session());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.is_empty());

        let stats = handle.close().await;
        assert_eq!(stats.ticks_evaluated, 0);
    }

    #[tokio::test]
    async fn test_active_session_emits_records() {
        let sink = Arc::new(CollectingSink::new());
        let handle = spawn(DyadSession::new(fast_config()).unwrap(), sink.clone());
        fill_dyad(handle.session());

        handle.start().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let stats = handle.close().await;

        assert!(sink.len() >= 2, "only {} records", sink.len());
        assert_eq!(stats.records_emitted, sink.len() as u64);
        for record in sink.records() {
            assert_eq!(record.session_id, "SESS-orch");
            assert!(record.r > 0.0 && record.r < 1.0);
        }
    }

    #[tokio::test]
    async fn test_pause_suppresses_emission() {
        let sink = Arc::new(CollectingSink::new());
        let handle = spawn(DyadSession::new(fast_config()).unwrap(), sink.clone());
        fill_dyad(handle.session());

        handle.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.pause().unwrap();
        // One in-flight evaluation may still land after the pause.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let paused_count = sink.len();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sink.len(), paused_count);

        handle.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(sink.len() > paused_count);

        handle.close().await;
    }

    #[tokio::test]
    async fn test_close_is_legal_from_idle() {
        let sink = Arc::new(CollectingSink::new());
        let handle = spawn(DyadSession::new(fast_config()).unwrap(), sink);
        let stats = handle.close().await;
        assert_eq!(stats.records_emitted, 0);
    }
}
