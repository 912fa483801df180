//! Grammar-driven decoder for inbound packets
//!
//! Each production in [`GRAMMAR`] pairs a tag prefix with the rule that
//! decodes the rest of the packet. A packet is matched against the table in
//! order; the first production whose prefix the packet starts with wins.
//!
//! Packets that match no production fall into one of three cases:
//!
//! - The first byte is a *family* tag (`'0'` or `'E'`) and the packet stops
//!   part-way through a known prefix: [`ProtocolError::TruncatedPacket`].
//! - The first byte is a family tag and some sub-tag is unknown:
//!   [`ProtocolError::UnrecognizedTag`].
//! - Anything else is diagnostic text from the relay and decodes to
//!   [`WireMessage::RawText`].

use thiserror::Error;

use crate::floats::{float_array_from_packet, string_from_packet};
use crate::message::{CalibrationOutcome, ControlCommand, GazeSample, WireMessage};
use crate::tags::{self, connection, control, event, gaze_2d, head};
use crate::UNIT_SCALE;

/// Errors produced while decoding or encoding relay packets.
///
/// Decode errors are always local to one packet: callers log them, drop the
/// packet and keep going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Zero-length datagram
    #[error("Empty packet")]
    EmptyPacket,

    /// A family tag was followed by a sub-tag no production knows.
    #[error("Unrecognized tag sequence {path:?}")]
    UnrecognizedTag {
        /// Tag bytes up to and including the first unknown one
        path: Vec<u8>,
    },

    /// The packet ends before its tags or payload are complete.
    #[error("Truncated packet: need {needed} bytes, got {actual}")]
    TruncatedPacket { needed: usize, actual: usize },

    /// Reference data packet that does not follow the batch layout
    #[error("Malformed reference data: {0}")]
    MalformedReferenceData(String),

    /// A reference batch mixed 2D and 3D points
    #[error("Reference batch mixes points of different arity")]
    MixedArity,

    /// Plugin name or position key does not fit its one-byte length field
    #[error("Name too long for the wire ({0} bytes, max 255)")]
    NameTooLong(usize),
}

type Rule = fn(&[u8]) -> Result<WireMessage, ProtocolError>;

/// One grammar production: packets starting with `prefix` are decoded by `rule`.
struct Production {
    prefix: &'static [u8],
    rule: Rule,
}

const GRAMMAR: &[Production] = &[
    Production {
        prefix: &[head::CONNECTION, connection::ESTABLISHED],
        rule: connection_established,
    },
    Production {
        prefix: &[head::EVENT, event::CALIBRATION_ENDED, event::SUCCEEDED],
        rule: calibration_succeeded,
    },
    Production {
        prefix: &[head::EVENT, event::CALIBRATION_ENDED, event::FAILED],
        rule: calibration_failed,
    },
    Production {
        prefix: &[head::EVENT, event::GAZE, event::GAZE_2D, gaze_2d::LEFT_EYE],
        rule: left_eye,
    },
    Production {
        prefix: &[head::EVENT, event::GAZE, event::GAZE_2D, gaze_2d::RIGHT_EYE],
        rule: right_eye,
    },
    Production {
        prefix: &[head::EVENT, event::GAZE, event::GAZE_2D, gaze_2d::GAZE_POINT],
        rule: gaze_point_2d,
    },
    Production {
        prefix: &[head::EVENT, event::GAZE, event::GAZE_3D],
        rule: gaze_point_3d,
    },
    Production {
        prefix: &[head::CONTROL],
        rule: control_command,
    },
    Production {
        prefix: &[head::LEGACY_VERSION],
        rule: version_downgrade,
    },
];

/// First bytes whose sub-tags are fully enumerated by [`GRAMMAR`]
const FAMILIES: &[u8] = &[head::CONNECTION, head::EVENT];

/// Decode one inbound packet.
///
/// # Errors
/// - [`ProtocolError::EmptyPacket`] for a zero-length packet
/// - [`ProtocolError::UnrecognizedTag`] for an unknown sub-tag in a family
/// - [`ProtocolError::TruncatedPacket`] when tags or payload are cut short
pub fn decode(packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    let Some(&first) = packet.first() else {
        return Err(ProtocolError::EmptyPacket);
    };

    if let Some(production) = GRAMMAR.iter().find(|p| packet.starts_with(p.prefix)) {
        return (production.rule)(packet);
    }

    if !FAMILIES.contains(&first) {
        return Ok(WireMessage::RawText(string_from_packet(packet)));
    }

    if let Some(production) = GRAMMAR.iter().find(|p| p.prefix.starts_with(packet)) {
        return Err(ProtocolError::TruncatedPacket {
            needed: production.prefix.len(),
            actual: packet.len(),
        });
    }

    let matched = GRAMMAR
        .iter()
        .map(|p| common_prefix_len(p.prefix, packet))
        .max()
        .unwrap_or(0);
    let path_len = (matched + 1).min(packet.len());
    Err(ProtocolError::UnrecognizedTag {
        path: packet[..path_len].to_vec(),
    })
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn connection_established(_packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::ConnectionEstablished)
}

fn calibration_succeeded(_packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::CalibrationEnded(CalibrationOutcome::Success))
}

fn calibration_failed(_packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::CalibrationEnded(CalibrationOutcome::Failure))
}

fn left_eye(packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    let [x, y] = gaze_floats(packet)?;
    Ok(WireMessage::Gaze(GazeSample::LeftEye([x, y])))
}

fn right_eye(packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    let [x, y] = gaze_floats(packet)?;
    Ok(WireMessage::Gaze(GazeSample::RightEye([x, y])))
}

fn gaze_point_2d(packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    let [x, y] = gaze_floats(packet)?;
    Ok(WireMessage::Gaze(GazeSample::Point2d([x, y])))
}

fn gaze_point_3d(packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    let point: [f32; 3] = gaze_floats(packet)?;
    Ok(WireMessage::Gaze(GazeSample::Point3d(
        point.map(|v| v / UNIT_SCALE),
    )))
}

fn control_command(packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    let Some(&command) = packet.get(1) else {
        return Err(ProtocolError::TruncatedPacket {
            needed: 2,
            actual: packet.len(),
        });
    };
    let command = if command == control::START {
        ControlCommand::Start
    } else {
        ControlCommand::Stop
    };
    Ok(WireMessage::Control(command))
}

fn version_downgrade(_packet: &[u8]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::VersionDowngrade)
}

/// Read the first `N` floats of a gaze payload.
fn gaze_floats<const N: usize>(packet: &[u8]) -> Result<[f32; N], ProtocolError> {
    let values = float_array_from_packet(packet, tags::GAZE_PAYLOAD_OFFSET)?;
    if values.len() < N {
        return Err(ProtocolError::TruncatedPacket {
            needed: tags::GAZE_PAYLOAD_OFFSET + N * crate::FLOAT_SIZE,
            actual: packet.len(),
        });
    }
    let mut out = [0.0; N];
    out.copy_from_slice(&values[..N]);
    Ok(out)
}
