//! Payload helpers: packed little-endian floats and ASCII text
//!
//! Both payload kinds follow the tag bytes directly with no length field, so
//! their extent is derived from the packet length alone.

use bytes::{Buf, BufMut};

use crate::parser::ProtocolError;

/// Size in bytes of one packed float
pub const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

/// Number of floats a packet is taken to carry.
///
/// The relay sizes every float array as if exactly one tag byte preceded it,
/// regardless of where the payload actually starts: `(len - 1) / 4`.
pub fn implied_float_count(packet_len: usize) -> usize {
    packet_len.saturating_sub(1) / FLOAT_SIZE
}

/// Decode the float array carried by `packet`, starting at `offset`.
///
/// Element `i` is read little-endian from `offset + 4 * i`. The element count
/// comes from [`implied_float_count`]; if the packet is too short to hold that
/// many floats past `offset` the packet is rejected rather than read out of
/// bounds.
///
/// # Errors
/// Returns [`ProtocolError::TruncatedPacket`] when
/// `packet.len() < offset + 4 * count`.
pub fn float_array_from_packet(packet: &[u8], offset: usize) -> Result<Vec<f32>, ProtocolError> {
    let count = implied_float_count(packet.len());
    let needed = offset + count * FLOAT_SIZE;
    if packet.len() < needed {
        return Err(ProtocolError::TruncatedPacket {
            needed,
            actual: packet.len(),
        });
    }

    let mut payload = &packet[offset..needed];
    Ok((0..count).map(|_| payload.get_f32_le()).collect())
}

/// Append `values` to `buf` as packed little-endian floats.
pub fn put_floats<B: BufMut>(buf: &mut B, values: &[f32]) {
    for &value in values {
        buf.put_f32_le(value);
    }
}

/// Decode everything after the tag byte as ASCII.
///
/// Bytes outside the ASCII range become `'?'`.
pub fn string_from_packet(packet: &[u8]) -> String {
    packet
        .iter()
        .skip(1)
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaze_packet(tags: &[u8], values: &[f32]) -> Vec<u8> {
        let mut packet = tags.to_vec();
        put_floats(&mut packet, values);
        packet
    }

    #[test]
    fn test_implied_count_ignores_partial_floats() {
        assert_eq!(implied_float_count(0), 0);
        assert_eq!(implied_float_count(1), 0);
        assert_eq!(implied_float_count(5), 1);
        assert_eq!(implied_float_count(12), 2);
        assert_eq!(implied_float_count(13), 3);
    }

    #[test]
    fn test_two_floats_at_offset_four() {
        let packet = gaze_packet(b"EG21", &[0.25, -1.5]);
        assert_eq!(packet.len(), 12);

        let values = float_array_from_packet(&packet, 4).unwrap();
        assert_eq!(values, vec![0.25, -1.5]);
    }

    #[test]
    fn test_length_matches_implied_count() {
        for extra in 0..12 {
            let mut packet = gaze_packet(b"EG3", &[0.0]);
            packet.resize(4 + extra * FLOAT_SIZE, 0);
            if let Ok(values) = float_array_from_packet(&packet, 4) {
                assert_eq!(values.len(), implied_float_count(packet.len()));
            }
        }
    }

    #[test]
    fn test_offset_one_reads_whole_tail() {
        let packet = gaze_packet(&[b'X'], &[1.0, 2.0, 3.0]);
        let values = float_array_from_packet(&packet, 1).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_truncated_packet_rejected() {
        // 13 bytes imply 3 floats, which need 16 bytes from offset 4
        let mut packet = gaze_packet(b"EG21", &[1.0, 2.0]);
        packet.push(0xFF);

        let err = float_array_from_packet(&packet, 4).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TruncatedPacket {
                needed: 16,
                actual: 13
            }
        );
    }

    #[test]
    fn test_offset_past_end_rejected() {
        let err = float_array_from_packet(b"EG", 4).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedPacket { .. }));
    }

    #[test]
    fn test_string_skips_tag_byte() {
        assert_eq!(string_from_packet(b"hello"), "ello");
        assert_eq!(string_from_packet(&[200, b'o', b'k']), "ok");
        assert_eq!(string_from_packet(&[1, 0xE9, b'a']), "?a");
        assert_eq!(string_from_packet(&[]), "");
    }
}
