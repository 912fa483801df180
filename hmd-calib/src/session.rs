//! Calibration session state machine.
//!
//! ```text
//!            start                 outcome
//!   Idle ----------> Running ----------------> Succeeded | Failed
//!    ^                  |                            |
//!    +------ stop ------+          start             |
//!                       ^----------------------------+
//! ```
//!
//! A run visits every target, batching reference samples per target. After
//! the last target [`CalibrationSession::finish`] tells the engine to compute
//! its calibration and the session waits, still `Running`, for the engine's
//! outcome. [`CalibrationSession::stop`] aborts a run at any point.

use crossbeam_channel::Sender;
use hmd_wire::{
    CalibrationOutcome, OutboundMessage, ProtocolError, ReferenceBatch, ReferencePoint,
    ReferenceSample,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::marker::Marker;
use crate::settings::{CalibrationSettings, SettingsError};
use crate::transport::{Transport, TransportError};

/// Lifecycle state of a calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Completion notification, sent once per run that reaches an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationEvent {
    Succeeded,
    Failed,
}

impl From<CalibrationOutcome> for CalibrationEvent {
    fn from(outcome: CalibrationOutcome) -> Self {
        match outcome {
            CalibrationOutcome::Success => CalibrationEvent::Succeeded,
            CalibrationOutcome::Failure => CalibrationEvent::Failed,
        }
    }
}

/// Errors from calibration session operations
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("A calibration is already running")]
    AlreadyRunning,

    /// The engine reported an outcome for a run that is not in progress
    #[error("Outcome {0:?} received while no calibration is running")]
    StaleOutcome(CalibrationOutcome),

    #[error("Calibration needs at least one target")]
    NoTargets,

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Both the last reference batch and the stop that follows it failed
    #[error("Last batch failed ({batch}) and stop failed ({stop})")]
    LastBatchAndStop {
        batch: Box<CalibrationError>,
        stop: Box<CalibrationError>,
    },
}

/// One calibration run's state, plus the transport and marker it drives.
pub struct CalibrationSession<T: Transport, M: Marker> {
    transport: T,
    marker: M,
    events: Sender<CalibrationEvent>,
    status: CalibrationStatus,
    awaiting_outcome: bool,
    target_count: usize,
    current_target_index: usize,
    samples_in_current_target: u32,
    pending: Vec<ReferenceSample>,
    plugin_name: &'static str,
    position_key: &'static str,
}

impl<T: Transport, M: Marker> CalibrationSession<T, M> {
    /// Create an idle session.
    ///
    /// Completion events are sent on `events`; a dropped receiver is not an
    /// error.
    pub fn new(transport: T, marker: M, events: Sender<CalibrationEvent>) -> Self {
        let settings = CalibrationSettings::default();
        Self {
            transport,
            marker,
            events,
            status: CalibrationStatus::Idle,
            awaiting_outcome: false,
            target_count: 0,
            current_target_index: 0,
            samples_in_current_target: 0,
            pending: Vec::new(),
            plugin_name: settings.plugin_name(),
            position_key: settings.position_key(),
        }
    }

    /// Begin a run over `target_count` targets.
    ///
    /// Announces the run to the engine, then resets all per-run state. On
    /// any error the session is left exactly as it was.
    pub fn start(
        &mut self,
        settings: &CalibrationSettings,
        target_count: usize,
    ) -> Result<(), CalibrationError> {
        if self.status == CalibrationStatus::Running {
            return Err(CalibrationError::AlreadyRunning);
        }
        settings.validate()?;
        if target_count == 0 {
            return Err(CalibrationError::NoTargets);
        }

        let plugin_name = settings.plugin_name();
        let packet = OutboundMessage::StartCalibration { plugin_name }.encode()?;
        self.transport.send(&packet)?;

        self.plugin_name = plugin_name;
        self.position_key = settings.position_key();
        self.target_count = target_count;
        self.current_target_index = 0;
        self.samples_in_current_target = 0;
        self.pending.clear();
        self.awaiting_outcome = false;
        self.status = CalibrationStatus::Running;
        self.marker.set_active(true);

        info!(
            "Calibration started: {plugin_name}, {target_count} targets, {} samples per target",
            settings.samples_per_target
        );
        Ok(())
    }

    /// Queue a reference sample for the current target.
    ///
    /// Returns false, dropping the sample, unless the session is sampling.
    pub fn add_reference_sample(&mut self, point: ReferencePoint, timestamp: f32) -> bool {
        if !self.is_sampling() {
            debug!("Dropping reference sample at t={timestamp:.3}: not sampling");
            return false;
        }
        self.pending.push(ReferenceSample::new(point, timestamp));
        self.samples_in_current_target += 1;
        true
    }

    /// Send the pending samples as one reference batch.
    ///
    /// The pending batch and the per-target sample count are cleared before
    /// encoding, so they are empty afterwards even if sending fails. Returns
    /// the number of samples sent; an empty batch sends nothing.
    pub fn flush_batch(&mut self) -> Result<usize, CalibrationError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let samples = std::mem::take(&mut self.pending);
        self.samples_in_current_target = 0;

        let packet = OutboundMessage::ReferenceData(ReferenceBatch {
            plugin_name: self.plugin_name,
            position_key: self.position_key,
            samples: &samples,
        })
        .encode()?;
        self.transport.send(&packet)?;

        debug!(
            "Sent {} reference samples for target {}",
            samples.len(),
            self.current_target_index
        );
        Ok(samples.len())
    }

    /// Move to the next target. Returns false once every target is done.
    pub fn advance_target(&mut self) -> bool {
        self.current_target_index += 1;
        self.current_target_index < self.target_count
    }

    /// Complete a run after its last target.
    ///
    /// Tells the engine to compute the calibration. The session stays
    /// `Running` until [`on_outcome_received`](Self::on_outcome_received).
    pub fn finish(&mut self) -> Result<(), CalibrationError> {
        if self.status != CalibrationStatus::Running || self.awaiting_outcome {
            return Ok(());
        }
        self.pending.clear();
        self.samples_in_current_target = 0;
        self.awaiting_outcome = true;
        info!("All targets visited, waiting for engine result");
        self.send_stop()
    }

    /// Abort the current run, if any, and return to `Idle`.
    ///
    /// Unsent samples are discarded and no completion event is emitted. The
    /// engine is only notified when a run was in progress.
    pub fn stop(&mut self) -> Result<(), CalibrationError> {
        let was_running = self.status == CalibrationStatus::Running;
        self.pending.clear();
        self.samples_in_current_target = 0;
        self.awaiting_outcome = false;
        self.status = CalibrationStatus::Idle;

        if was_running {
            self.marker.set_active(false);
            info!("Calibration stopped");
            self.send_stop()?;
        }
        Ok(())
    }

    /// Apply the engine's verdict on the current run.
    ///
    /// # Errors
    /// [`CalibrationError::StaleOutcome`] if no run is in progress. The
    /// session is unchanged in that case.
    pub fn on_outcome_received(
        &mut self,
        outcome: CalibrationOutcome,
    ) -> Result<CalibrationEvent, CalibrationError> {
        if self.status != CalibrationStatus::Running {
            return Err(CalibrationError::StaleOutcome(outcome));
        }

        self.status = match outcome {
            CalibrationOutcome::Success => CalibrationStatus::Succeeded,
            CalibrationOutcome::Failure => CalibrationStatus::Failed,
        };
        self.pending.clear();
        self.samples_in_current_target = 0;
        self.awaiting_outcome = false;
        self.marker.set_active(false);

        let event = CalibrationEvent::from(outcome);
        info!("Calibration ended: {event:?}");
        if self.events.send(event).is_err() {
            debug!("No listener for calibration events");
        }
        Ok(event)
    }

    fn send_stop(&mut self) -> Result<(), CalibrationError> {
        let packet = OutboundMessage::StopCalibration.encode()?;
        self.transport.send(&packet)?;
        Ok(())
    }

    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == CalibrationStatus::Running
    }

    /// Running and still collecting samples
    pub fn is_sampling(&self) -> bool {
        self.is_running() && !self.awaiting_outcome
    }

    pub fn awaiting_outcome(&self) -> bool {
        self.awaiting_outcome
    }

    pub fn current_target_index(&self) -> usize {
        self.current_target_index
    }

    pub fn samples_in_current_target(&self) -> u32 {
        self.samples_in_current_target
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    pub fn pending_samples(&self) -> &[ReferenceSample] {
        &self.pending
    }

    pub fn marker(&self) -> &M {
        &self.marker
    }

    pub fn marker_mut(&mut self) -> &mut M {
        &mut self.marker
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
