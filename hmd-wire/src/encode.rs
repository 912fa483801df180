//! Outbound packets: calibration control and reference data
//!
//! Reference data layout (all multi-byte values little-endian):
//!
//! ```text
//! 'R' | name_len u8 | plugin name | key_len u8 | position key | arity u8 | count u16
//!     | count x ( arity x f32 position, f32 timestamp )
//! ```
//!
//! Unlike inbound packets the reference batch carries explicit lengths, so the
//! engine side (and [`decode_reference_data`]) can validate it exactly.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::floats::{put_floats, FLOAT_SIZE};
use crate::message::{CalibrationOutcome, ControlCommand, GazeSample, WireMessage};
use crate::parser::ProtocolError;
use crate::tags::{connection, control, event, gaze_2d, head};
use crate::UNIT_SCALE;

/// Expected gaze position for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferencePoint {
    /// Normalized viewport coordinates (2D calibration)
    Planar([f32; 2]),
    /// Camera-local position in protocol units (3D calibration)
    Spatial([f32; 3]),
}

impl ReferencePoint {
    /// Number of position floats on the wire
    pub fn arity(&self) -> usize {
        self.as_slice().len()
    }

    pub fn as_slice(&self) -> &[f32] {
        match self {
            ReferencePoint::Planar(p) => p,
            ReferencePoint::Spatial(p) => p,
        }
    }

    fn from_slice(values: &[f32]) -> Option<Self> {
        match *values {
            [x, y] => Some(ReferencePoint::Planar([x, y])),
            [x, y, z] => Some(ReferencePoint::Spatial([x, y, z])),
            _ => None,
        }
    }
}

/// A reference point and the time (seconds) it was sampled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceSample {
    pub point: ReferencePoint,
    pub timestamp: f32,
}

impl ReferenceSample {
    pub fn new(point: ReferencePoint, timestamp: f32) -> Self {
        Self { point, timestamp }
    }
}

/// One target's worth of reference samples, tagged for the engine
#[derive(Debug, Clone, Copy)]
pub struct ReferenceBatch<'a> {
    /// Engine calibration plugin the batch is meant for
    pub plugin_name: &'a str,
    /// Name of the position field in the engine's reference datum
    pub position_key: &'a str,
    pub samples: &'a [ReferenceSample],
}

/// Packets the headset sends to the relay
#[derive(Debug, Clone, Copy)]
pub enum OutboundMessage<'a> {
    /// `[90, 1]` followed by the plugin name as ASCII
    StartCalibration { plugin_name: &'a str },
    /// `[90, 0]`
    StopCalibration,
    ReferenceData(ReferenceBatch<'a>),
}

impl OutboundMessage<'_> {
    /// Serialize the message into a datagram payload.
    ///
    /// # Errors
    /// Reference batches fail with [`ProtocolError::MixedArity`] when 2D and 3D
    /// points are mixed, [`ProtocolError::NameTooLong`] when a name exceeds 255
    /// bytes, and [`ProtocolError::MalformedReferenceData`] when the batch has
    /// more samples than the count field can hold.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        match self {
            OutboundMessage::StartCalibration { plugin_name } => {
                let mut buf = BytesMut::with_capacity(2 + plugin_name.len());
                buf.put_u8(head::CONTROL);
                buf.put_u8(control::START);
                buf.put_slice(plugin_name.as_bytes());
                Ok(buf.freeze())
            }
            OutboundMessage::StopCalibration => {
                Ok(Bytes::from_static(&[head::CONTROL, control::STOP]))
            }
            OutboundMessage::ReferenceData(batch) => encode_reference_batch(batch),
        }
    }
}

fn encode_reference_batch(batch: &ReferenceBatch<'_>) -> Result<Bytes, ProtocolError> {
    let arity = batch.samples.first().map_or(0, |s| s.point.arity());
    if batch.samples.iter().any(|s| s.point.arity() != arity) {
        return Err(ProtocolError::MixedArity);
    }
    let count = u16::try_from(batch.samples.len()).map_err(|_| {
        ProtocolError::MalformedReferenceData(format!(
            "batch of {} samples exceeds {}",
            batch.samples.len(),
            u16::MAX
        ))
    })?;

    let payload_len = batch.samples.len() * (arity + 1) * FLOAT_SIZE;
    let mut buf = BytesMut::with_capacity(
        6 + batch.plugin_name.len() + batch.position_key.len() + payload_len,
    );
    buf.put_u8(head::REFERENCE_DATA);
    put_name(&mut buf, batch.plugin_name)?;
    put_name(&mut buf, batch.position_key)?;
    buf.put_u8(arity as u8);
    buf.put_u16_le(count);
    for sample in batch.samples {
        put_floats(&mut buf, sample.point.as_slice());
        buf.put_f32_le(sample.timestamp);
    }
    Ok(buf.freeze())
}

fn put_name(buf: &mut BytesMut, name: &str) -> Result<(), ProtocolError> {
    let len = u8::try_from(name.len()).map_err(|_| ProtocolError::NameTooLong(name.len()))?;
    buf.put_u8(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

/// A reference batch as received by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceData {
    pub plugin_name: String,
    pub position_key: String,
    pub samples: Vec<ReferenceSample>,
}

/// Decode a reference data packet produced by [`OutboundMessage::encode`].
///
/// This is the engine-side view of the batch, used by the mock engine and by
/// tests to check what actually went over the wire.
pub fn decode_reference_data(packet: &[u8]) -> Result<ReferenceData, ProtocolError> {
    let mut buf = packet;
    let total = packet.len();

    match buf.first() {
        Some(&head::REFERENCE_DATA) => buf.advance(1),
        Some(&other) => {
            return Err(ProtocolError::MalformedReferenceData(format!(
                "unexpected tag {other}"
            )))
        }
        None => return Err(ProtocolError::EmptyPacket),
    }

    let plugin_name = take_name(&mut buf, total)?;
    let position_key = take_name(&mut buf, total)?;

    ensure_remaining(buf, 3, total)?;
    let arity = buf.get_u8() as usize;
    let count = buf.get_u16_le() as usize;
    if count > 0 && !(2..=3).contains(&arity) {
        return Err(ProtocolError::MalformedReferenceData(format!(
            "unsupported arity {arity}"
        )));
    }

    let payload_len = count * (arity + 1) * FLOAT_SIZE;
    ensure_remaining(buf, payload_len, total)?;
    if buf.remaining() > payload_len {
        return Err(ProtocolError::MalformedReferenceData(format!(
            "{} trailing bytes",
            buf.remaining() - payload_len
        )));
    }

    let mut samples = Vec::with_capacity(count);
    let mut position = [0.0f32; 3];
    for _ in 0..count {
        for value in position.iter_mut().take(arity) {
            *value = buf.get_f32_le();
        }
        let timestamp = buf.get_f32_le();
        let point = ReferencePoint::from_slice(&position[..arity]).ok_or_else(|| {
            ProtocolError::MalformedReferenceData(format!("unsupported arity {arity}"))
        })?;
        samples.push(ReferenceSample::new(point, timestamp));
    }

    Ok(ReferenceData {
        plugin_name,
        position_key,
        samples,
    })
}

fn take_name(buf: &mut &[u8], total: usize) -> Result<String, ProtocolError> {
    ensure_remaining(buf, 1, total)?;
    let len = buf.get_u8() as usize;
    ensure_remaining(buf, len, total)?;
    let name = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| ProtocolError::MalformedReferenceData(format!("name is not text: {e}")))?;
    buf.advance(len);
    Ok(name)
}

fn ensure_remaining(buf: &[u8], wanted: usize, total: usize) -> Result<(), ProtocolError> {
    if buf.len() < wanted {
        return Err(ProtocolError::TruncatedPacket {
            needed: total - buf.len() + wanted,
            actual: total,
        });
    }
    Ok(())
}

/// Encode a message the way the engine relay sends it.
///
/// Inverse of [`decode`](crate::parser::decode) for every message kind. Used
/// by the mock engine and by tests that feed the headset side.
pub fn encode_engine_message(message: &WireMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    match message {
        WireMessage::ConnectionEstablished => {
            buf.put_slice(&[head::CONNECTION, connection::ESTABLISHED]);
        }
        WireMessage::CalibrationEnded(outcome) => {
            let outcome = match outcome {
                CalibrationOutcome::Success => event::SUCCEEDED,
                CalibrationOutcome::Failure => event::FAILED,
            };
            buf.put_slice(&[head::EVENT, event::CALIBRATION_ENDED, outcome]);
        }
        WireMessage::Gaze(sample) => {
            buf.put_slice(&[head::EVENT, event::GAZE]);
            match sample {
                GazeSample::LeftEye(v) => put_gaze_2d(&mut buf, gaze_2d::LEFT_EYE, v),
                GazeSample::RightEye(v) => put_gaze_2d(&mut buf, gaze_2d::RIGHT_EYE, v),
                GazeSample::Point2d(v) => put_gaze_2d(&mut buf, gaze_2d::GAZE_POINT, v),
                GazeSample::Point3d(v) => {
                    // Pad byte keeps the payload at the common offset
                    buf.put_slice(&[event::GAZE_3D, 0]);
                    put_floats(&mut buf, &v.map(|x| x * UNIT_SCALE));
                }
            }
        }
        WireMessage::Control(command) => {
            let command = match command {
                ControlCommand::Start => control::START,
                ControlCommand::Stop => control::STOP,
            };
            buf.put_slice(&[head::CONTROL, command]);
        }
        WireMessage::VersionDowngrade => buf.put_u8(head::LEGACY_VERSION),
        WireMessage::RawText(text) => {
            buf.put_u8(head::TEXT);
            buf.put_slice(text.as_bytes());
        }
    }
    buf.freeze()
}

fn put_gaze_2d(buf: &mut BytesMut, kind: u8, values: &[f32; 2]) {
    buf.put_slice(&[event::GAZE_2D, kind]);
    put_floats(buf, values);
}
