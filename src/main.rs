//! GradeGuard CLI
//!
//! Real-time exam proctoring monitor.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver, Sender};
use gradeguard::{
    collector::{
        check_permission, Collector, CollectorConfig, FocusSource, KeyEvent, PlatformFocusSource,
    },
    config::Config,
    core::{
        alert::{AlertDispatcher, OverlayAlert},
        event_log::{open_shared_log, read_rows},
        fusion::{Collaborators, FusionLoop, TerminationReason},
        keyboard::KeyboardConsumer,
        recorder::IncidentRecorder,
        session::MonitorSession,
        sources::NullDisplay,
    },
    recording::{ImageSequenceBackend, MemoryBackend, RecordingBackend},
    replay::ReplayScript,
    transparency::{create_shared_stats_with_persistence, CumulativeStats},
    MONITORING_NOTICE, VERSION,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const STATS_FILE: &str = "session_stats.json";

#[derive(Parser)]
#[command(name = "gradeguard")]
#[command(version = VERSION)]
#[command(about = "Real-time exam proctoring monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one monitoring session
    Start {
        /// Replay script driving frames, detections and focus
        #[arg(long)]
        script: PathBuf,

        /// Directory of PNG/JPEG frames to use instead of blank frames
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Override the configured object sampling interval
        #[arg(long)]
        sample_interval: Option<u64>,

        /// Capture real key presses and window focus from this machine
        #[arg(long)]
        live_input: bool,

        /// Keep incident frames in memory instead of writing them to disk
        #[arg(long)]
        dry_run: bool,
    },

    /// Show configuration, permission and cumulative statistics
    Status,

    /// Print the most recent audit log rows
    Events {
        /// Number of rows to show
        #[arg(long, default_value = "20")]
        tail: usize,
    },

    /// Display the monitoring notice
    Notice,

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            script,
            frames,
            sample_interval,
            live_input,
            dry_run,
        } => cmd_start(&script, frames.as_deref(), sample_interval, live_input, dry_run),
        Commands::Status => cmd_status(),
        Commands::Events { tail } => cmd_events(tail),
        Commands::Notice => {
            println!("{MONITORING_NOTICE}");
            Ok(())
        }
        Commands::Config => cmd_config(),
    }
}

fn cmd_start(
    script_path: &Path,
    frames_dir: Option<&Path>,
    sample_interval: Option<u64>,
    live_input: bool,
    dry_run: bool,
) -> Result<()> {
    println!("GradeGuard v{VERSION}");
    println!("{MONITORING_NOTICE}");

    let mut config = Config::load().context("loading configuration")?;
    if let Some(interval) = sample_interval {
        config.sample_interval = interval;
    }
    config.validate()?;
    config
        .ensure_directories()
        .context("creating data directories")?;

    if live_input && !check_permission() {
        eprintln!("Error: key capture permission not granted.");
        eprintln!();
        eprintln!("On macOS, add this application under System Settings >");
        eprintln!("Privacy & Security > Input Monitoring, then restart it.");
        std::process::exit(1);
    }

    let script = ReplayScript::load(script_path)
        .with_context(|| format!("loading replay script {}", script_path.display()))?;
    info!(frames = script.frames.len(), script = %script_path.display(), "replay script loaded");

    let stats = create_shared_stats_with_persistence(config.data_path.join(STATS_FILE));
    let log = open_shared_log(&config.log_path)
        .with_context(|| format!("opening audit log {}", config.log_path.display()))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("installing Ctrl+C handler")?;

    // Scripted keys and live keys share one channel.
    let mut collector = None;
    let (key_sender, key_receiver): (Sender<KeyEvent>, Receiver<KeyEvent>) = if live_input {
        let mut c = Collector::new(CollectorConfig::default());
        c.start().context("starting key capture")?;
        let pair = (c.sender(), c.receiver().clone());
        collector = Some(c);
        pair
    } else {
        unbounded()
    };

    let parts = script.into_parts(frames_dir, Some(key_sender))?;

    let focus: Box<dyn FocusSource> = if live_input {
        Box::new(PlatformFocusSource::new())
    } else {
        Box::new(parts.focus)
    };
    let frame_source = if live_input {
        parts
            .frames
            .with_pace(Duration::from_secs_f64(1.0 / config.recording.frame_rate))
    } else {
        parts.frames
    };

    let backend: Box<dyn RecordingBackend> = if dry_run {
        Box::new(MemoryBackend::new())
    } else {
        Box::new(ImageSequenceBackend::new())
    };
    let recorder = IncidentRecorder::new(config.recording_settings(), backend);

    let io = Collaborators {
        frames: Box::new(frame_source),
        objects: Box::new(parts.objects),
        heads: Box::new(parts.heads),
        focus,
        alerts: alert_dispatcher(),
        display: Box::new(NullDisplay),
    };

    let fusion = FusionLoop::new(
        config.fusion_settings(),
        io,
        recorder,
        log.clone(),
        stats.clone(),
        running.clone(),
    );
    let keyboard = KeyboardConsumer::spawn(
        key_receiver,
        config.keys,
        log.clone(),
        running.clone(),
        stats.clone(),
    )
    .context("starting keyboard listener")?;

    println!("Audit log: {}", config.log_path.display());
    println!(
        "Press '{}' to end the session, or Ctrl+C to stop",
        config.keys.quit
    );
    println!();

    let report = MonitorSession::new(fusion, keyboard).run();

    if let Some(mut c) = collector {
        c.stop();
    }

    println!();
    match report.termination {
        TerminationReason::EndOfStream => println!("Replay finished after {} frames", report.frames),
        TerminationReason::QuitRequested => println!("Stopped after {} frames", report.frames),
    }
    match &report.clip {
        Some(_) if dry_run => println!(
            "Incident recorded: {} frames (dry run, nothing written)",
            report.clip_frames
        ),
        Some(clip) => println!(
            "Incident recorded: {} frames in {}",
            report.clip_frames,
            clip.display()
        ),
        None => println!("No incident recorded"),
    }

    if let Err(e) = stats.save() {
        warn!("could not save session statistics: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

#[cfg(feature = "audio")]
fn alert_dispatcher() -> Box<dyn AlertDispatcher> {
    Box::new(OverlayAlert::new(gradeguard::core::alert::ToneBeeper::new()))
}

#[cfg(not(feature = "audio"))]
fn alert_dispatcher() -> Box<dyn AlertDispatcher> {
    Box::new(OverlayAlert::new(gradeguard::core::alert::TerminalBell))
}

fn cmd_status() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("GradeGuard Status");
    println!("=================");
    println!();

    println!(
        "Key Capture Permission: {}",
        if check_permission() {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!();

    println!("Configuration:");
    println!("  Sample interval: every {} frame(s)", config.sample_interval);
    println!("  Prohibited objects: {}", config.prohibited_labels.join(", "));
    println!(
        "  Recording: {}x{} @ {} fps",
        config.recording.width, config.recording.height, config.recording.frame_rate
    );
    println!("  Quit key: {}", config.keys.quit);
    println!("  Audit log: {}", config.log_path.display());
    println!();

    match CumulativeStats::load(&config.data_path.join(STATS_FILE)) {
        Ok(Some(totals)) => {
            println!("Cumulative Statistics:");
            println!("  Sessions: {}", totals.sessions);
            println!("  Frames processed: {}", totals.frames_processed);
            println!("  Events logged: {}", totals.events_logged);
            println!("  Frames recorded: {}", totals.frames_recorded);
            println!("  Detector failures: {}", totals.detector_failures);
            if totals.event_log_failures > 0 {
                println!("  Audit log write failures: {}", totals.event_log_failures);
            }
        }
        Ok(None) => println!("No previous session data found."),
        Err(e) => warn!("could not read session statistics: {e}"),
    }
    Ok(())
}

fn cmd_events(tail: usize) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    if !config.log_path.exists() {
        println!("No audit log at {}", config.log_path.display());
        println!("Run 'gradeguard start' to begin monitoring.");
        return Ok(());
    }

    let rows = read_rows(&config.log_path)
        .with_context(|| format!("reading {}", config.log_path.display()))?;

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &rows {
        if let Some((kind, _)) = row.observation() {
            *counts.entry(kind).or_default() += 1;
        }
    }

    let start = rows.len().saturating_sub(tail);
    for row in &rows[start..] {
        match row.observation() {
            Some((kind, value)) => println!("{}  {kind}: {value}", row.timestamp),
            None => println!("{}  (empty row)", row.timestamp),
        }
    }

    println!();
    println!("{} event(s) in {}", rows.len(), config.log_path.display());
    for (kind, count) in counts {
        println!("  {kind}: {count}");
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    if let Err(e) = config.validate() {
        bail!("configuration at {} is invalid: {e}", Config::config_path().display());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
