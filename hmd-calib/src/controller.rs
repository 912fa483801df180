//! Fixed-cadence sampling controller.
//!
//! The controller is ticked from a single thread at the display frame rate.
//! Each tick first replays inbound datagrams queued by the transport, then
//! decides whether to take a reference sample for the current target and
//! whether to move on to the next one.
//!
//! Timing comparisons allow half a frame of slack, so a sample or target
//! change due between two ticks happens on the nearer tick.

use std::sync::Arc;

use hmd_wire::{decode, ControlCommand, WireMessage};
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::camera::CameraModel;
use crate::marker::Marker;
use crate::reference::reference_position;
use crate::session::{CalibrationError, CalibrationSession, CalibrationStatus};
use crate::settings::{CalibrationMode, CalibrationSettings};
use crate::targets::TargetSequence;
use crate::telemetry::TelemetryStore;
use crate::transport::{InboundReceiver, Transport};

/// Drives a [`CalibrationSession`] through a [`TargetSequence`].
pub struct SamplingController<T: Transport, M: Marker> {
    session: CalibrationSession<T, M>,
    /// Settings for the next run
    settings: CalibrationSettings,
    /// Settings captured when the current run started
    run_settings: CalibrationSettings,
    targets: TargetSequence,
    camera: CameraModel,
    inbound: InboundReceiver,
    telemetry: Arc<TelemetryStore>,
    connected: bool,
    current_target: Point3<f32>,
    t_last_sample: f64,
    t_last_target: f64,
}

impl<T: Transport, M: Marker> SamplingController<T, M> {
    pub fn new(
        session: CalibrationSession<T, M>,
        settings: CalibrationSettings,
        targets: TargetSequence,
        camera: CameraModel,
        inbound: InboundReceiver,
        telemetry: Arc<TelemetryStore>,
    ) -> Self {
        let current_target = targets.position_at(0).unwrap_or_else(Point3::origin);
        Self {
            session,
            settings,
            run_settings: settings,
            targets,
            camera,
            inbound,
            telemetry,
            connected: false,
            current_target,
            t_last_sample: f64::NEG_INFINITY,
            t_last_target: 0.0,
        }
    }

    /// Advance the controller to time `now` (seconds).
    ///
    /// `frame_dt` is the time since the previous tick. Inbound messages are
    /// always processed; errors from handling them are logged, not returned.
    ///
    /// # Errors
    /// Failures sending a reference batch or the final stop. The run still
    /// moves on to the next target when a batch fails to send. If the last
    /// batch and the stop both fail, both are returned in
    /// [`CalibrationError::LastBatchAndStop`].
    pub fn tick(&mut self, now: f64, frame_dt: f64) -> Result<(), CalibrationError> {
        self.process_inbound(now);

        if !self.session.is_sampling() {
            return Ok(());
        }

        let half_frame_slack = frame_dt / 2.0;
        if now - self.t_last_sample < self.run_settings.sample_interval() - half_frame_slack {
            return Ok(());
        }
        if now - self.t_last_target < self.run_settings.ignore_initial_seconds - half_frame_slack {
            return Ok(());
        }

        let point = reference_position(self.run_settings.mode, &self.camera, &self.current_target);
        self.session.add_reference_sample(point, now as f32);
        self.t_last_sample = now;

        let target_full =
            self.session.samples_in_current_target() >= self.run_settings.samples_per_target;
        let target_expired = now - self.t_last_target >= self.run_settings.seconds_per_target;
        if !(target_full || target_expired) {
            return Ok(());
        }

        let flushed = self.session.flush_batch();
        if self.session.advance_target() {
            self.move_to_target(self.session.current_target_index(), now);
        } else if let Err(stop) = self.session.finish() {
            return Err(match flushed {
                Ok(_) => stop,
                Err(batch) => CalibrationError::LastBatchAndStop {
                    batch: Box::new(batch),
                    stop: Box::new(stop),
                },
            });
        }
        flushed.map(|_| ())
    }

    /// Start a run from the first target.
    pub fn start_calibration(&mut self, now: f64) -> Result<(), CalibrationError> {
        self.session.start(&self.settings, self.targets.count())?;
        self.run_settings = self.settings;
        self.t_last_sample = f64::NEG_INFINITY;
        self.move_to_target(0, now);
        info!(
            "Sample rate {:.2} Hz, {:.1} s per target",
            self.run_settings.sample_rate(),
            self.run_settings.seconds_per_target
        );
        Ok(())
    }

    /// Abort the current run, if any
    pub fn stop_calibration(&mut self) -> Result<(), CalibrationError> {
        self.session.stop()
    }

    /// Stop a running calibration, or start a new one
    pub fn toggle_calibration(&mut self, now: f64) -> Result<(), CalibrationError> {
        if self.session.is_running() {
            self.stop_calibration()
        } else {
            self.start_calibration(now)
        }
    }

    /// Decode and dispatch every queued inbound datagram.
    ///
    /// Returns the number of datagrams that decoded successfully.
    pub fn process_inbound(&mut self, now: f64) -> usize {
        let mut handled = 0;
        for packet in self.inbound.drain() {
            let message = match decode(&packet) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping inbound packet: {e}");
                    continue;
                }
            };
            handled += 1;
            match self.handle_message(message, now) {
                Ok(()) => {}
                Err(e @ CalibrationError::StaleOutcome(_)) => debug!("{e}"),
                Err(e) => warn!("Failed to handle inbound message: {e}"),
            }
        }
        handled
    }

    /// Apply one decoded message.
    pub fn handle_message(&mut self, message: WireMessage, now: f64) -> Result<(), CalibrationError> {
        match message {
            WireMessage::ConnectionEstablished => {
                if !self.connected {
                    info!("Connected to engine relay");
                }
                self.connected = true;
            }
            WireMessage::CalibrationEnded(outcome) => {
                self.session.on_outcome_received(outcome)?;
            }
            WireMessage::Gaze(sample) => self.telemetry.apply(&sample),
            WireMessage::Control(ControlCommand::Start) => {
                if self.session.is_running() {
                    debug!("Ignoring remote start: calibration already running");
                } else {
                    info!("Remote start requested");
                    self.start_calibration(now)?;
                }
            }
            WireMessage::Control(ControlCommand::Stop) => {
                info!("Remote stop requested");
                self.stop_calibration()?;
            }
            WireMessage::VersionDowngrade => {
                if self.settings.mode != CalibrationMode::TwoD {
                    warn!("Engine does not support 3D calibration, falling back to 2D");
                }
                if self.session.is_running() && self.run_settings.mode != CalibrationMode::TwoD {
                    warn!("Running 3D calibration continues; 2D applies to the next run");
                }
                self.settings.mode = CalibrationMode::TwoD;
            }
            WireMessage::RawText(text) => info!("Engine: {text}"),
        }
        Ok(())
    }

    fn move_to_target(&mut self, index: usize, now: f64) {
        let Some(local) = self.targets.position_at(index) else {
            return;
        };
        self.current_target = local;
        let world = self.camera.local_to_world(&local);
        self.session.marker_mut().set_position(world);
        self.t_last_target = now;
        debug!("Target {index} at local ({:.3}, {:.3}, {:.3})", local.x, local.y, local.z);
    }

    pub fn session(&self) -> &CalibrationSession<T, M> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CalibrationSession<T, M> {
        &mut self.session
    }

    pub fn status(&self) -> CalibrationStatus {
        self.session.status()
    }

    /// Settings the next run will use
    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    /// Replace the settings for the next run. A run in progress is unaffected.
    pub fn set_settings(&mut self, settings: CalibrationSettings) {
        self.settings = settings;
    }

    pub fn targets(&self) -> &TargetSequence {
        &self.targets
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn telemetry(&self) -> Arc<TelemetryStore> {
        self.telemetry.clone()
    }

    /// True once the relay has acknowledged the connection
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Camera-local position of the target being sampled
    pub fn current_target(&self) -> Point3<f32> {
        self.current_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::LoggingMarker;
    use crate::transport::{inbound_queue, InboundSender, OverflowPolicy, RecordingTransport};
    use bytes::Bytes;
    use crossbeam_channel::unbounded;
    use hmd_wire::GazeSample;

    fn controller(
        settings: CalibrationSettings,
    ) -> (
        SamplingController<RecordingTransport, LoggingMarker>,
        InboundSender,
    ) {
        let (events, _) = unbounded();
        let session = CalibrationSession::new(RecordingTransport::new(), LoggingMarker::new(), events);
        let targets = TargetSequence::circle(4, 0.2, 2.0, false).unwrap();
        let (tx, rx) = inbound_queue(16, OverflowPolicy::DropOldest);
        let controller = SamplingController::new(
            session,
            settings,
            targets,
            CameraModel::default(),
            rx,
            Arc::new(TelemetryStore::new()),
        );
        (controller, tx)
    }

    #[test]
    fn test_tick_idle_does_nothing() {
        let (mut controller, _tx) = controller(CalibrationSettings::default());
        controller.tick(0.5, 1.0 / 60.0).unwrap();
        assert_eq!(controller.status(), CalibrationStatus::Idle);
        assert!(controller.session().transport().sent().is_empty());
    }

    #[test]
    fn test_settle_window_blocks_first_sample() {
        let (mut controller, _tx) = controller(CalibrationSettings::default());
        controller.start_calibration(10.0).unwrap();

        controller.tick(10.05, 1.0 / 60.0).unwrap();
        assert_eq!(controller.session().samples_in_current_target(), 0);

        controller.tick(10.1, 1.0 / 60.0).unwrap();
        assert_eq!(controller.session().samples_in_current_target(), 1);
    }

    #[test]
    fn test_marker_follows_target() {
        let (mut controller, _tx) = controller(CalibrationSettings::default());
        controller.start_calibration(0.0).unwrap();
        let marker = controller.session().marker();
        assert!(marker.is_active());
        let position = marker.position().unwrap();
        assert_eq!(position, controller.camera().local_to_world(&controller.current_target()));
    }

    #[test]
    fn test_toggle() {
        let (mut controller, _tx) = controller(CalibrationSettings::default());
        controller.toggle_calibration(0.0).unwrap();
        assert_eq!(controller.status(), CalibrationStatus::Running);
        controller.toggle_calibration(0.5).unwrap();
        assert_eq!(controller.status(), CalibrationStatus::Idle);
    }

    #[test]
    fn test_inbound_dispatch() {
        let (mut controller, tx) = controller(CalibrationSettings::default());

        tx.push(Bytes::from_static(b"0I"));
        let mut gaze = b"EG21".to_vec();
        gaze.extend_from_slice(&0.25f32.to_le_bytes());
        gaze.extend_from_slice(&0.75f32.to_le_bytes());
        tx.push(Bytes::from(gaze));
        tx.push(Bytes::from_static(b"E?"));
        tx.push(Bytes::from_static(b"Xengine ready"));
        tx.push(Bytes::from_static(b"ECS"));

        let handled = controller.process_inbound(0.0);
        assert_eq!(handled, 4);
        assert!(controller.is_connected());
        assert_eq!(controller.telemetry().left_eye(), nalgebra::Point2::new(0.25, 0.75));
        // Stale outcome is ignored
        assert_eq!(controller.status(), CalibrationStatus::Idle);
    }

    #[test]
    fn test_remote_start_and_stop() {
        let (mut controller, tx) = controller(CalibrationSettings::default());

        tx.push(Bytes::from_static(&[90, 1]));
        controller.tick(1.0, 1.0 / 60.0).unwrap();
        assert_eq!(controller.status(), CalibrationStatus::Running);

        // A second start while running is ignored
        tx.push(Bytes::from_static(&[90, 1]));
        controller.tick(1.1, 1.0 / 60.0).unwrap();
        assert_eq!(controller.session().transport().sent().len(), 1);

        tx.push(Bytes::from_static(&[90, 0]));
        controller.tick(1.2, 1.0 / 60.0).unwrap();
        assert_eq!(controller.status(), CalibrationStatus::Idle);
    }

    #[test]
    fn test_version_downgrade_applies_to_next_run() {
        let settings = CalibrationSettings {
            mode: CalibrationMode::ThreeD,
            ..CalibrationSettings::default()
        };
        let (mut controller, _tx) = controller(settings);
        controller.start_calibration(0.0).unwrap();

        controller
            .handle_message(WireMessage::VersionDowngrade, 0.0)
            .unwrap();
        assert_eq!(controller.settings().mode, CalibrationMode::TwoD);

        // The running 3D run keeps producing 3D samples
        controller.tick(0.2, 1.0 / 60.0).unwrap();
        let sample = controller.session().pending_samples()[0];
        assert_eq!(sample.point.arity(), 3);

        controller.stop_calibration().unwrap();
        controller.start_calibration(1.0).unwrap();
        let start = controller.session().transport().sent().packets().pop().unwrap();
        assert_eq!(&start[2..], b"HMD_Calibration");
    }

    #[test]
    fn test_failed_last_batch_and_stop_both_reported() {
        let settings = CalibrationSettings::new(CalibrationMode::TwoD, 1.0, 0.1, 1);
        let (mut controller, _tx) = controller(settings);
        controller.start_calibration(0.0).unwrap();
        controller.session_mut().transport_mut().set_fail_sends(true);

        // One sample per target, so each tick finishes a target
        for now in [0.5, 1.5, 2.5] {
            let err = controller.tick(now, 1.0 / 60.0).unwrap_err();
            assert!(matches!(err, CalibrationError::Transport(_)));
        }
        let err = controller.tick(3.5, 1.0 / 60.0).unwrap_err();
        let CalibrationError::LastBatchAndStop { batch, stop } = err else {
            panic!("Expected both failures, got {err:?}");
        };
        assert!(matches!(*batch, CalibrationError::Transport(_)));
        assert!(matches!(*stop, CalibrationError::Transport(_)));
        assert!(controller.session().awaiting_outcome());
        assert_eq!(controller.session().current_target_index(), 4);
    }

    #[test]
    fn test_gaze_telemetry_updates_while_running() {
        let (mut controller, _tx) = controller(CalibrationSettings::default());
        controller.start_calibration(0.0).unwrap();
        controller
            .handle_message(WireMessage::Gaze(GazeSample::Point3d([0.1, 0.2, 0.3])), 0.0)
            .unwrap();
        assert_eq!(controller.telemetry().update_count(), 1);
    }
}
