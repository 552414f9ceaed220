//! Resonance Engine - Real-time dyad synchrony estimation.
//!
//! This library ingests paired physiological streams from two participants,
//! aligns them into rolling analysis windows, and fuses several synchrony
//! estimators into a single resonance score with a confidence rating.
//!
//! # Estimators
//!
//! Four complementary measures run on every evaluation tick:
//!
//! - **PLV**: phase-locking of band-passed oscillations (EEG)
//! - **Envelope**: Pearson correlation of amplitude envelopes
//! - **CRQA**: determinism of the cross-recurrence structure
//! - **Coherence**: wavelet coherence of slow hemodynamics (fNIRS)
//!
//! An estimator that cannot produce a defensible number for a window reports
//! why instead of guessing; fusion renormalizes over whatever remains valid.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Resonance Engine                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Stream    │──▶│  Windowing  │──▶│ Estimators  │       │
//! │  │   Buffers   │   │ (resample)  │   │ (parallel)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐                     ┌─────────────┐       │
//! │  │  Telemetry  │                     │   Fusion    │       │
//! │  │  Counters   │                     │ (Resonance) │       │
//! │  └─────────────┘                     └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use resonance_engine::{CollectingSink, DyadSession, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::default();
//!     let session = DyadSession::new(config)?;
//!     let sink = Arc::new(CollectingSink::new());
//!
//!     let handle = resonance_engine::spawn(session, sink.clone());
//!     handle.start()?;
//!
//!     // Feed samples as they arrive from the acquisition front-end:
//!     // handle.session().ingest("participant-a", "eeg", &samples)?;
//!
//!     let stats = handle.close().await;
//!     println!(
//!         "{} ticks evaluated, {} records fused",
//!         stats.ticks_evaluated,
//!         sink.records().len()
//!     );
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod estimators;
pub mod ingest;
pub mod session;
pub mod sink;
pub mod synth;
pub mod telemetry;

// Re-export key types at crate root for convenience
pub use config::{ConfigError, SessionConfig};
pub use core::{fuse, AnalysisWindow, ChannelPair, Resonance};
pub use estimators::{EstimatorError, EstimatorKind, EstimatorResult, EstimatorScore};
pub use ingest::{IngestError, IngestReport, PushOutcome, Sample, StreamBuffer};
pub use session::{spawn, DyadSession, SessionError, SessionHandle, SessionState};
pub use sink::{BufferedSink, CollectingSink, ResonanceSink};
pub use synth::DyadGenerator;
pub use telemetry::{SessionTelemetry, SharedTelemetry, TelemetryStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
