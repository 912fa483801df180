//! Headless calibration runner.
//!
//! Runs the sampling controller at a fixed tick rate against the engine
//! relay. A run starts with `--auto-start`, on a remote start command from
//! the engine, or when Enter is pressed on stdin (Enter again aborts it).

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::{unbounded, Receiver};
use hmd_calib::{
    inbound_queue, AppConfig, CalibrationEvent, CalibrationMode, CalibrationSession,
    CameraModel, LoggingMarker, RecordingTransport, SamplingController, SentPackets,
    TargetSequence, TelemetryStore, Transport, UdpTransport,
};
use hmd_wire::decode_reference_data;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    #[value(name = "2d")]
    TwoD,
    #[value(name = "3d")]
    ThreeD,
}

impl From<ModeArg> for CalibrationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::TwoD => CalibrationMode::TwoD,
            ModeArg::ThreeD => CalibrationMode::ThreeD,
        }
    }
}

/// Eye-tracking calibration driver for head-mounted displays
#[derive(Parser, Debug)]
#[command(name = "hmd_calibrate")]
#[command(about = "Run an HMD eye-tracking calibration against the engine relay")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local address to bind (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Relay address (overrides config)
    #[arg(long)]
    remote: Option<String>,

    /// Calibration mode (overrides config)
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Controller tick rate in Hz
    #[arg(long, default_value = "60")]
    tick_hz: f64,

    /// Start a calibration immediately
    #[arg(long)]
    auto_start: bool,

    /// Exit after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Record packets in memory instead of opening a socket
    #[arg(long)]
    dry_run: bool,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

/// Lines on stdin, one message per Enter press
fn spawn_stdin_toggle() -> Receiver<()> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

fn report_dry_run(sent: &SentPackets) {
    let packets = sent.packets();
    let batches: Vec<_> = packets
        .iter()
        .filter_map(|p| decode_reference_data(p).ok())
        .collect();
    let samples: usize = batches.iter().map(|b| b.samples.len()).sum();
    info!(
        "Dry run sent {} packets: {} reference batches with {samples} samples",
        packets.len(),
        batches.len()
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        AppConfig::default()
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.connection.bind_addr = bind.clone();
    }
    if let Some(remote) = &args.remote {
        config.connection.remote_addr = remote.clone();
    }
    if let Some(mode) = args.mode {
        config.calibration.mode = mode.into();
    }
    config.validate().context("Invalid configuration")?;

    if !(args.tick_hz.is_finite() && args.tick_hz > 0.0) {
        bail!("--tick-hz must be positive, got {}", args.tick_hz);
    }

    let targets = TargetSequence::from_layout(&config.targets)?;
    let camera = CameraModel::from_config(&config.camera);
    let telemetry = Arc::new(TelemetryStore::new());
    let (inbound_tx, inbound_rx) =
        inbound_queue(config.connection.queue_capacity, config.connection.overflow);

    let mut dry_run_log = None;
    let transport: Box<dyn Transport> = if args.dry_run {
        let transport = RecordingTransport::new();
        dry_run_log = Some(transport.sent());
        info!("Dry run: packets are recorded, not sent");
        Box::new(transport)
    } else {
        Box::new(
            UdpTransport::bind(&config.connection, inbound_tx.clone())
                .context("Failed to open UDP transport")?,
        )
    };

    let (event_tx, event_rx) = unbounded();
    let session = CalibrationSession::new(transport, LoggingMarker::new(), event_tx);
    let mut controller = SamplingController::new(
        session,
        config.calibration,
        targets,
        camera,
        inbound_rx,
        telemetry.clone(),
    );

    info!(
        "{} targets, mode {:?}, ticking at {} Hz",
        controller.targets().count(),
        config.calibration.mode,
        args.tick_hz
    );
    for (i, target) in controller.targets().iter().enumerate() {
        debug!(
            "Target {i}: ({:.3}, {:.3}, {:.3})",
            target.x, target.y, target.z
        );
    }

    let toggle = spawn_stdin_toggle();
    let period = Duration::from_secs_f64(1.0 / args.tick_hz);
    let clock = Instant::now();
    let mut last_tick = 0.0;
    let mut last_report = 0.0;
    let mut outcome = None;

    if args.auto_start {
        controller
            .start_calibration(0.0)
            .context("Failed to start calibration")?;
    }

    loop {
        let now = clock.elapsed().as_secs_f64();
        let frame_dt = now - last_tick;
        last_tick = now;

        if toggle.try_recv().is_ok() {
            if let Err(e) = controller.toggle_calibration(now) {
                warn!("Toggle failed: {e}");
            }
        }

        if let Err(e) = controller.tick(now, frame_dt) {
            warn!("Calibration tick failed: {e}");
        }

        if let Ok(event) = event_rx.try_recv() {
            outcome = Some(event);
            break;
        }

        if args.dry_run && controller.session().awaiting_outcome() {
            info!("All targets sent; no engine to wait for in a dry run");
            break;
        }

        if now - last_report >= 1.0 {
            let t = telemetry.snapshot();
            info!(
                "gaze 2d ({:.3}, {:.3}) gaze 3d ({:.3}, {:.3}, {:.3}) [{} updates, {} dropped]",
                t.gaze_2d.x,
                t.gaze_2d.y,
                t.gaze_3d.x,
                t.gaze_3d.y,
                t.gaze_3d.z,
                telemetry.update_count(),
                inbound_tx.dropped()
            );
            last_report = now;
        }

        if args.duration.is_some_and(|limit| now >= limit) {
            info!("Duration elapsed");
            break;
        }

        let busy = clock.elapsed().as_secs_f64() - now;
        thread::sleep(period.saturating_sub(Duration::from_secs_f64(busy.max(0.0))));
    }

    if controller.session().is_sampling() {
        controller
            .stop_calibration()
            .context("Failed to stop calibration")?;
    }

    if let Some(sent) = &dry_run_log {
        report_dry_run(sent);
    }

    match outcome {
        Some(CalibrationEvent::Succeeded) => {
            info!("Calibration succeeded");
            Ok(())
        }
        Some(CalibrationEvent::Failed) => bail!("Engine reported calibration failure"),
        None => Ok(()),
    }
}
