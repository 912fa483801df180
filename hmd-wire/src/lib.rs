//! HMD calibration relay protocol
//!
//! This crate provides the message types and the byte-level codec for the
//! UDP protocol spoken between the headset-side calibration driver and the
//! eye-tracking engine's relay.
//!
//! Inbound packets have no length prefix: the first one to four bytes are
//! single-byte tags, followed by either packed little-endian `f32`s or ASCII
//! text. Decoding is driven by a declarative grammar table (see [`parser`]).
//! Outbound packets (calibration control and reference data) are built by
//! [`encode`].

pub mod encode;
pub mod floats;
pub mod message;
pub mod parser;
pub mod tags;

pub use encode::{
    decode_reference_data, encode_engine_message, OutboundMessage, ReferenceBatch,
    ReferenceData, ReferencePoint, ReferenceSample,
};
pub use floats::{float_array_from_packet, implied_float_count, string_from_packet, FLOAT_SIZE};
pub use message::{CalibrationOutcome, ControlCommand, GazeSample, WireMessage};
pub use parser::{decode, ProtocolError};

/// Scale between engine units (metres) and protocol units (millimetres).
///
/// Outbound 3D reference positions are multiplied by this factor and inbound
/// 3D gaze points are divided by it.
pub const UNIT_SCALE: f32 = 1000.0;
