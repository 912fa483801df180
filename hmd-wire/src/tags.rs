//! Tag byte constants for the relay protocol
//!
//! Inbound packets nest up to four tag bytes before their payload. The
//! constants are grouped by the position they occupy in the packet.

/// First-byte tags
pub mod head {
    /// Connection family (`'0'`)
    pub const CONNECTION: u8 = b'0';
    /// Engine event family (`'E'`)
    pub const EVENT: u8 = b'E';
    /// Calibration control command, both directions
    pub const CONTROL: u8 = 90;
    /// Engine is too old for 3D calibration
    pub const LEGACY_VERSION: u8 = 91;
    /// Outbound calibration reference data (`'R'`)
    pub const REFERENCE_DATA: u8 = b'R';
    /// Lead byte the relay uses for diagnostic text. Any byte outside the
    /// families decodes as text.
    pub const TEXT: u8 = b'T';
}

/// Second byte under [`head::CONNECTION`]
pub mod connection {
    pub const ESTABLISHED: u8 = b'I';
}

/// Second and third bytes under [`head::EVENT`]
pub mod event {
    /// Calibration ended (`'C'`), followed by an outcome byte
    pub const CALIBRATION_ENDED: u8 = b'C';
    pub const SUCCEEDED: u8 = b'S';
    pub const FAILED: u8 = b'F';

    /// Gaze data (`'G'`), followed by a dimension byte
    pub const GAZE: u8 = b'G';
    pub const GAZE_2D: u8 = b'2';
    pub const GAZE_3D: u8 = b'3';
}

/// Fourth byte under `'E' 'G' '2'`
pub mod gaze_2d {
    pub const LEFT_EYE: u8 = b'1';
    pub const RIGHT_EYE: u8 = b'0';
    pub const GAZE_POINT: u8 = b'2';
}

/// Second byte under [`head::CONTROL`]
pub mod control {
    pub const STOP: u8 = 0;
    pub const START: u8 = 1;
}

/// Byte offset of the float payload in gaze packets.
///
/// The 3D gaze packet only carries three tag bytes but its payload still
/// starts at offset 4.
pub const GAZE_PAYLOAD_OFFSET: usize = 4;
