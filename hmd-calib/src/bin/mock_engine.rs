//! Simulated eye-tracking engine relay for bench testing.
//!
//! Acknowledges the first datagram from a headset with `0I`, accumulates
//! reference batches, and answers a calibration stop with success or failure
//! depending on how many reference samples arrived. While a headset is
//! known, synthetic gaze telemetry is streamed back to it.

use std::f32::consts::TAU;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use hmd_wire::{
    decode, decode_reference_data, encode_engine_message, tags, CalibrationOutcome,
    ControlCommand, GazeSample, WireMessage,
};
use tracing::{debug, info, warn};

/// Simulated engine relay
#[derive(Parser, Debug)]
#[command(name = "mock_engine")]
#[command(about = "Simulated eye-tracking engine relay for bench testing")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:50021")]
    bind: String,

    /// Reference samples needed in a run for the calibration to succeed
    #[arg(long, default_value = "1")]
    min_samples: usize,

    /// Rate of synthetic gaze packets in Hz (0 disables)
    #[arg(long, default_value = "30")]
    gaze_hz: f64,

    /// Exit after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,
}

/// Per-headset calibration bookkeeping
#[derive(Debug, Default)]
struct RunState {
    running: bool,
    batches: usize,
    samples: usize,
}

struct MockEngine {
    socket: UdpSocket,
    headset: Option<SocketAddr>,
    run: RunState,
    min_samples: usize,
}

impl MockEngine {
    fn reply(&self, message: &WireMessage) {
        let Some(headset) = self.headset else {
            return;
        };
        if let Err(e) = self.socket.send_to(&encode_engine_message(message), headset) {
            warn!("Failed to send to {headset}: {e}");
        }
    }

    fn handle_datagram(&mut self, packet: &[u8], from: SocketAddr) {
        if self.headset != Some(from) {
            info!("Headset connected from {from}");
            self.headset = Some(from);
            self.reply(&WireMessage::ConnectionEstablished);
        }

        if packet.first() == Some(&tags::head::REFERENCE_DATA) {
            match decode_reference_data(packet) {
                Ok(batch) if self.run.running => {
                    self.run.batches += 1;
                    self.run.samples += batch.samples.len();
                    info!(
                        "Batch {} for {} ({}): {} samples",
                        self.run.batches,
                        batch.plugin_name,
                        batch.position_key,
                        batch.samples.len()
                    );
                }
                Ok(_) => warn!("Reference data outside a calibration run"),
                Err(e) => warn!("Bad reference data: {e}"),
            }
            return;
        }

        match decode(packet) {
            Ok(WireMessage::Control(ControlCommand::Start)) => {
                let plugin = String::from_utf8_lossy(packet.get(2..).unwrap_or_default());
                info!("Calibration started with plugin {plugin}");
                self.run = RunState {
                    running: true,
                    ..RunState::default()
                };
            }
            Ok(WireMessage::Control(ControlCommand::Stop)) => {
                if !self.run.running {
                    debug!("Stop without a running calibration");
                    return;
                }
                self.run.running = false;
                let outcome = if self.run.samples >= self.min_samples.max(1) {
                    CalibrationOutcome::Success
                } else {
                    CalibrationOutcome::Failure
                };
                info!(
                    "Calibration stopped after {} batches / {} samples: {outcome:?}",
                    self.run.batches, self.run.samples
                );
                self.reply(&WireMessage::CalibrationEnded(outcome));
            }
            Ok(other) => debug!("Ignoring {other:?}"),
            Err(e) => warn!("Undecodable datagram: {e}"),
        }
    }

    fn stream_gaze(&self, t: f32) {
        let angle = TAU * 0.25 * t;
        let (x, y) = (0.5 + 0.2 * angle.cos(), 0.5 + 0.2 * angle.sin());
        for sample in [
            GazeSample::LeftEye([x - 0.02, y]),
            GazeSample::RightEye([x + 0.02, y]),
            GazeSample::Point2d([x, y]),
            GazeSample::Point3d([(x - 0.5) * 2.0, (y - 0.5) * 2.0, 2.0]),
        ] {
            self.reply(&WireMessage::Gaze(sample));
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let socket =
        UdpSocket::bind(&args.bind).with_context(|| format!("Failed to bind {}", args.bind))?;
    let gaze_period = (args.gaze_hz > 0.0).then(|| Duration::from_secs_f64(1.0 / args.gaze_hz));
    socket.set_read_timeout(Some(
        gaze_period.unwrap_or(Duration::from_millis(100)),
    ))?;
    info!("Mock engine listening on {}", socket.local_addr()?);

    let mut engine = MockEngine {
        socket,
        headset: None,
        run: RunState::default(),
        min_samples: args.min_samples,
    };

    let clock = Instant::now();
    let mut last_gaze = Duration::ZERO;
    let mut buf = vec![0u8; 65_507];

    loop {
        match engine.socket.recv_from(&mut buf) {
            Ok((len, from)) => engine.handle_datagram(&buf[..len], from),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => warn!("Receive failed: {e}"),
        }

        let elapsed = clock.elapsed();
        if let Some(period) = gaze_period {
            if elapsed - last_gaze >= period {
                engine.stream_gaze(elapsed.as_secs_f32());
                last_gaze = elapsed;
            }
        }

        if args
            .duration
            .is_some_and(|limit| elapsed.as_secs_f64() >= limit)
        {
            info!("Duration elapsed");
            return Ok(());
        }
    }
}
