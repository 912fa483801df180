//! Eye-tracking calibration driver for head-mounted displays.
//!
//! Presents a sequence of targets, samples the expected gaze position for
//! each one and streams those reference samples to an external eye-tracking
//! engine over UDP. Status and live gaze telemetry coming back from the
//! engine are decoded with [`hmd_wire`] and applied on the same tick.
//!
//! # Layout
//!
//! - [`controller`] - fixed-cadence tick loop and inbound dispatch
//! - [`session`] - calibration run state machine and batching
//! - [`targets`] - target layouts
//! - [`reference`] and [`camera`] - reference-position computation
//! - [`telemetry`] - shared last-value gaze store
//! - [`transport`] - UDP link, inbound queue and a recording mock
//! - [`marker`] - target display interface
//! - [`settings`] and [`config`] - run settings and the JSON config file

pub mod camera;
pub mod config;
pub mod controller;
pub mod marker;
pub mod reference;
pub mod session;
pub mod settings;
pub mod targets;
pub mod telemetry;
pub mod transport;

pub use camera::{CameraConfig, CameraModel};
pub use config::{AppConfig, ConfigError, ConnectionConfig};
pub use controller::SamplingController;
pub use marker::{LoggingMarker, Marker};
pub use reference::reference_position;
pub use session::{CalibrationError, CalibrationEvent, CalibrationSession, CalibrationStatus};
pub use settings::{CalibrationMode, CalibrationSettings, SettingsError};
pub use targets::{TargetError, TargetLayout, TargetSequence};
pub use telemetry::{TelemetrySample, TelemetryStore};
pub use transport::{
    inbound_queue, InboundReceiver, InboundSender, OverflowPolicy, RecordingTransport,
    SentPackets, Transport, TransportError, UdpTransport,
};
