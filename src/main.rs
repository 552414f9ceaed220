//! Resonance Engine CLI
//!
//! Synthetic dyad simulation, offline estimator analysis, and
//! configuration inspection.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resonance_engine::{
    estimators::{coherence, crqa, envelope, plv},
    synth::DyadGenerator,
    BufferedSink, ChannelPair, DyadSession, EstimatorError, EstimatorKind, EstimatorResult,
    EstimatorScore, Resonance, Sample, SessionConfig, VERSION,
};

#[derive(Parser)]
#[command(name = "resonance-engine")]
#[command(version = VERSION)]
#[command(about = "Real-time dyad synchrony estimation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a synthetic coupled dyad through a live session
    Simulate {
        /// Seconds to run (0 = until Ctrl+C)
        #[arg(long, default_value = "30")]
        duration: u64,

        /// Coupling between the synthetic participants (0 = independent, 1 = locked)
        #[arg(long, default_value = "0.8")]
        coupling: f64,

        /// Seed for the synthetic dyad
        #[arg(long, default_value = "7")]
        seed: u64,

        /// Session configuration file (JSON); built-in defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for the exported records
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Run all estimators once over a recorded two-signal JSON file
    Analyze {
        /// Input file: {"sample_rate_hz": .., "a": [..], "b": [..]}
        input: PathBuf,

        /// Phase-shuffle surrogates for the PLV significance test
        #[arg(long, default_value = "200")]
        surrogates: usize,

        /// Seed for the surrogate shuffles
        #[arg(long, default_value = "7")]
        seed: u64,

        /// Sliding PLV window length in seconds (0 disables the sweep)
        #[arg(long, default_value = "10")]
        window: u64,

        /// Sliding window overlap fraction
        #[arg(long, default_value = "0.5")]
        overlap: f64,

        /// Session configuration file (JSON); built-in defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show or write the session configuration
    Config {
        /// Write the default configuration instead of printing
        #[arg(long)]
        init: bool,

        /// Configuration path (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            duration,
            coupling,
            seed,
            config,
            output,
        } => cmd_simulate(duration, coupling, seed, config, output).await,
        Commands::Analyze {
            input,
            surrogates,
            seed,
            window,
            overlap,
            config,
        } => cmd_analyze(&input, surrogates, seed, window, overlap, config),
        Commands::Config { init, path } => cmd_config(init, path),
    }
}

async fn cmd_simulate(
    duration: u64,
    coupling: f64,
    seed: u64,
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("Resonance Engine v{VERSION}");
    println!();

    let session = DyadSession::new(config).context("invalid session configuration")?;
    let cfg = session.config().clone();
    let telemetry = session.telemetry();

    let oscillation_channel = cfg.plv.channel.clone();
    let oscillation_rate = cfg
        .channel_rate_hz(&oscillation_channel)
        .unwrap_or(cfg.nominal_rate_hz);
    let slow_channel = cfg.coherence.as_ref().map(|c| {
        let rate = cfg.channel_rate_hz(&c.channel).unwrap_or(cfg.nominal_rate_hz);
        (c.channel.clone(), rate)
    });

    println!("Session: {}", cfg.session_id);
    println!("  Participants: {} / {}", cfg.participants[0], cfg.participants[1]);
    println!(
        "  Window: {} s, tick: {} ms",
        cfg.window_len.as_secs(),
        cfg.tick_interval.as_millis()
    );
    println!("  Oscillation channel: {oscillation_channel} @ {oscillation_rate} Hz");
    match &slow_channel {
        Some((channel, rate)) => println!("  Slow channel: {channel} @ {rate} Hz"),
        None => println!("  Slow channel: disabled"),
    }
    println!("  Coupling: {coupling:.2} (seed {seed})");
    if duration == 0 {
        println!("  Duration: until Ctrl+C");
    } else {
        println!("  Duration: {duration} s");
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let sink = Arc::new(BufferedSink::new(1024));
    let handle = resonance_engine::spawn(session, sink.clone());

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    // Start the synthetic clock one window back and ingest the backlog
    // before the first tick, so it already sees a full window of history.
    let epoch_ms = Utc::now().timestamp_millis() - cfg.window_len.as_millis() as i64;
    let mut generator = DyadGenerator::new(coupling, seed, epoch_ms);

    let backlog = (cfg.window_len.as_secs_f64() * oscillation_rate) as usize;
    ingest_pair(
        handle.session(),
        &cfg.participants,
        &oscillation_channel,
        generator.oscillation_batch(oscillation_rate, backlog),
    )?;
    if let Some((channel, rate)) = &slow_channel {
        let backlog = (cfg.window_len.as_secs_f64() * rate) as usize;
        ingest_pair(
            handle.session(),
            &cfg.participants,
            channel,
            generator.slow_wave_batch(*rate, backlog),
        )?;
    }
    handle.start().context("starting session")?;

    let batch_interval = Duration::from_millis(250);
    let deadline = (duration > 0).then(|| Instant::now() + Duration::from_secs(duration));
    let mut ticker = tokio::time::interval(batch_interval);
    let mut oscillation_due = 0.0;
    let mut slow_due = 0.0;
    let mut records: Vec<Resonance> = Vec::new();

    while running.load(Ordering::SeqCst) {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        ticker.tick().await;

        oscillation_due += batch_interval.as_secs_f64() * oscillation_rate;
        let n = oscillation_due as usize;
        oscillation_due -= n as f64;
        if n > 0 {
            ingest_pair(
                handle.session(),
                &cfg.participants,
                &oscillation_channel,
                generator.oscillation_batch(oscillation_rate, n),
            )?;
        }

        if let Some((channel, rate)) = &slow_channel {
            slow_due += batch_interval.as_secs_f64() * rate;
            let n = slow_due as usize;
            slow_due -= n as f64;
            if n > 0 {
                ingest_pair(
                    handle.session(),
                    &cfg.participants,
                    channel,
                    generator.slow_wave_batch(*rate, n),
                )?;
            }
        }

        for record in sink.receiver().try_iter() {
            print_record(&record);
            records.push(record);
        }
    }

    println!();
    println!("Stopping session...");
    handle.close().await;
    for record in sink.receiver().try_iter() {
        print_record(&record);
        records.push(record);
    }

    if !records.is_empty() {
        let export_dir = output.unwrap_or_else(SessionConfig::default_export_dir);
        std::fs::create_dir_all(&export_dir)
            .with_context(|| format!("creating export directory {export_dir:?}"))?;
        let export_path = export_dir.join(format!(
            "session_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));

        let export = SessionExport {
            engine_version: VERSION.to_string(),
            host: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            session_id: cfg.session_id.clone(),
            exported_at: Utc::now(),
            coupling,
            records,
        };
        let json = serde_json::to_string_pretty(&export)?;
        std::fs::write(&export_path, json).with_context(|| format!("writing {export_path:?}"))?;
        println!(
            "Exported {} records to {:?}",
            export.records.len(),
            export_path
        );
    } else {
        println!("No records emitted, nothing to export.");
    }

    println!();
    println!("{}", telemetry.summary());
    Ok(())
}

fn cmd_analyze(
    input: &Path,
    surrogates: usize,
    seed: u64,
    window_s: u64,
    overlap: f64,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    config.validate().context("invalid session configuration")?;

    let content =
        std::fs::read_to_string(input).with_context(|| format!("reading {input:?}"))?;
    let recorded: RecordedPair =
        serde_json::from_str(&content).context("parsing two-signal record")?;
    anyhow::ensure!(
        recorded.sample_rate_hz > 0.0,
        "sample_rate_hz must be positive"
    );
    let n = recorded.a.len().min(recorded.b.len());
    anyhow::ensure!(n > 0, "record holds no samples");
    let fs = recorded.sample_rate_hz;

    let pair = ChannelPair {
        channel_id: recorded
            .channel
            .clone()
            .unwrap_or_else(|| "recorded".to_string()),
        sample_rate_hz: fs,
        a: recorded.a[..n].to_vec(),
        b: recorded.b[..n].to_vec(),
        coverage: 1.0,
    };

    println!("Resonance Analysis");
    println!("==================");
    println!();
    println!("Input: {input:?}");
    println!(
        "  {} samples @ {} Hz ({:.1} s), channel {}",
        n,
        fs,
        n as f64 / fs,
        pair.channel_id
    );
    println!();

    let mut results = Vec::new();

    let outcome = plv::estimate(&pair, &config.plv);
    print_estimate("PLV", &outcome);
    results.push(EstimatorResult {
        kind: EstimatorKind::Plv,
        outcome,
    });

    let outcome = envelope::estimate(&pair, &config.envelope);
    print_estimate("Envelope", &outcome);
    results.push(EstimatorResult {
        kind: EstimatorKind::Envelope,
        outcome,
    });

    let outcome = crqa::estimate(&pair, &config.crqa);
    print_estimate("CRQA", &outcome);
    if let Ok(metrics) = crqa::analyze(&pair.a, &pair.b, &config.crqa) {
        println!(
            "           RR {:.3}  DET {:.3}  LAM {:.3}  TT {:.2}  Lmax {}  Vmax {}  entropy {:.2} bits",
            metrics.recurrence_rate,
            metrics.determinism,
            metrics.laminarity,
            metrics.trapping_time,
            metrics.max_diagonal,
            metrics.max_vertical,
            metrics.diagonal_entropy
        );
    }
    results.push(EstimatorResult {
        kind: EstimatorKind::Crqa,
        outcome,
    });

    if let Some(coherence_config) = &config.coherence {
        let outcome = coherence::estimate(&pair, coherence_config);
        print_estimate("Coherence", &outcome);
        results.push(EstimatorResult {
            kind: EstimatorKind::Coherence,
            outcome,
        });
    }
    println!();

    match resonance_engine::fuse(
        &config.session_id,
        0,
        &results,
        &config.weights,
        &config.fusion,
        config.min_valid_estimators,
    ) {
        Some(record) => println!(
            "Fused resonance: r = {:.3}, confidence = {:.2}",
            record.r, record.conf
        ),
        None => println!("Fused resonance: not enough valid estimators"),
    }
    println!();

    let band = &config.plv.band;
    let mut rng = StdRng::seed_from_u64(seed);
    match plv::surrogate_significance(&pair.a, &pair.b, fs, band, surrogates, &mut rng) {
        Ok(test) => println!(
            "PLV surrogate test ({} shuffles): observed {:.3}, p = {:.3}, 95th percentile {:.3}",
            test.n_surrogates, test.observed, test.p_value, test.percentile_95
        ),
        Err(e) => println!("PLV surrogate test skipped: {e}"),
    }

    if window_s > 0 {
        println!();
        let window_samples = (window_s as f64 * fs) as usize;
        let points = plv::sliding_plv(&pair.a, &pair.b, fs, band, window_samples, overlap);
        if points.is_empty() {
            println!("Sliding PLV: record shorter than one {window_s} s window");
        } else {
            println!(
                "Sliding PLV ({} s windows, {:.0}% overlap):",
                window_s,
                overlap * 100.0
            );
            for point in &points {
                println!("  [{:>8.1} s] {:.3}", point.center_s, point.plv);
            }
        }
    }

    Ok(())
}

fn cmd_config(init: bool, path: Option<PathBuf>) -> anyhow::Result<()> {
    if init {
        let target = path.unwrap_or_else(SessionConfig::default_path);
        let config = SessionConfig::default();
        config
            .save(&target)
            .with_context(|| format!("writing {target:?}"))?;
        println!("Wrote default configuration to {target:?}");
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();

    let source = path.unwrap_or_else(SessionConfig::default_path);
    let config = if source.exists() {
        println!("Config file: {source:?}");
        SessionConfig::load(&source).with_context(|| format!("loading {source:?}"))?
    } else {
        println!("Config file: {source:?} (not present, showing defaults)");
        SessionConfig::default()
    };
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Input format for `analyze`: one channel recorded from both participants.
#[derive(Deserialize)]
struct RecordedPair {
    sample_rate_hz: f64,
    #[serde(default)]
    channel: Option<String>,
    a: Vec<f64>,
    b: Vec<f64>,
}

/// Export envelope written by `simulate`.
#[derive(Serialize)]
struct SessionExport {
    engine_version: String,
    host: String,
    session_id: String,
    exported_at: DateTime<Utc>,
    coupling: f64,
    records: Vec<Resonance>,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<SessionConfig> {
    match path {
        Some(p) => {
            SessionConfig::load(&p).with_context(|| format!("loading configuration from {p:?}"))
        }
        None => Ok(SessionConfig::default()),
    }
}

fn ingest_pair(
    session: &DyadSession,
    participants: &[String; 2],
    channel: &str,
    batches: [Vec<Sample>; 2],
) -> anyhow::Result<()> {
    let [a, b] = batches;
    session.ingest(&participants[0], channel, &a)?;
    session.ingest(&participants[1], channel, &b)?;
    Ok(())
}

fn print_record(record: &Resonance) {
    let stamp = DateTime::<Utc>::from_timestamp_millis(record.t_unix_ms)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| record.t_unix_ms.to_string());
    println!(
        "[{stamp}] r = {:.3}  conf = {:.2}  | plv {}  env {}  crqa {}  fnirs {}",
        record.r,
        record.conf,
        fmt_component(record.plv),
        fmt_component(record.r_env),
        fmt_component(record.crqa),
        fmt_component(record.fnirs)
    );
}

fn fmt_component(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "--".to_string(),
    }
}

fn print_estimate(label: &str, outcome: &Result<EstimatorScore, EstimatorError>) {
    match outcome {
        Ok(score) => println!("{label:<10} {:.3}  (snr {:.1})", score.value, score.snr),
        Err(e) => println!("{label:<10} invalid: {e}"),
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
