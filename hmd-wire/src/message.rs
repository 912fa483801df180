//! Inbound message types
//!
//! Everything the engine's relay can send back to the headset, after the tag
//! bytes have been resolved by the [`parser`](crate::parser).

/// Result of a calibration run as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    Success,
    Failure,
}

/// Calibration control command
///
/// Sent by the engine to start or stop a run remotely, and by the headset to
/// announce its own runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
}

/// One live gaze or eye-position reading
///
/// 2D values are normalized viewport coordinates. The 3D gaze point has
/// already been converted from protocol units back to engine units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GazeSample {
    LeftEye([f32; 2]),
    RightEye([f32; 2]),
    Point2d([f32; 2]),
    Point3d([f32; 3]),
}

impl GazeSample {
    /// Number of floats this kind of sample carries
    pub fn arity(&self) -> usize {
        match self {
            GazeSample::Point3d(_) => 3,
            _ => 2,
        }
    }

    /// Short name used in logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            GazeSample::LeftEye(_) => "left eye",
            GazeSample::RightEye(_) => "right eye",
            GazeSample::Point2d(_) => "gaze 2d",
            GazeSample::Point3d(_) => "gaze 3d",
        }
    }
}

/// A decoded inbound packet
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// The relay acknowledged the headset (`'0' 'I'`)
    ConnectionEstablished,
    /// The engine finished computing a calibration (`'E' 'C' ...`)
    CalibrationEnded(CalibrationOutcome),
    /// Live gaze telemetry (`'E' 'G' ...`)
    Gaze(GazeSample),
    /// Remote start/stop request (`90 ...`)
    Control(ControlCommand),
    /// The engine predates 3D calibration support (`91`)
    VersionDowngrade,
    /// Any other packet, surfaced as diagnostic text
    RawText(String),
}

impl WireMessage {
    /// True for messages that only update telemetry
    pub fn is_telemetry(&self) -> bool {
        matches!(self, WireMessage::Gaze(_))
    }
}
