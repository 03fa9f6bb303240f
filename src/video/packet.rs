//! Encoded packet type and wire framing
//!
//! Packets come out of the encoder and are owned solely by the network
//! producer until transmitted or dropped.

use bytes::{BufMut, Bytes, BytesMut};

/// Wire kind tag for video units
const KIND_VIDEO: u8 = 1;
/// Wire kind tag for non-video units (codec headers, metadata)
const KIND_DATA: u8 = 0;

/// An encoder output unit
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Opaque encoded payload
    pub data: Bytes,
    /// Whether this is a video unit (non-video units are never shed)
    pub is_video: bool,
    /// Presentation timestamp in microseconds, monotonically increasing
    pub pts_us: u64,
}

impl EncodedPacket {
    /// Create a video packet
    pub fn video(data: Bytes, pts_us: u64) -> Self {
        Self {
            data,
            is_video: true,
            pts_us,
        }
    }

    /// Create a non-video packet (codec configuration, metadata)
    pub fn data_unit(data: Bytes, pts_us: u64) -> Self {
        Self {
            data,
            is_video: false,
            pts_us,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialize onto the wire: `[len:u32 BE][kind:u8][pts:u64 BE][payload]`
    /// where `len` counts everything after itself.
    pub fn to_wire(&self) -> Bytes {
        let body_len = 1 + 8 + self.data.len();
        let mut buf = BytesMut::with_capacity(4 + body_len);
        buf.put_u32(body_len as u32);
        buf.put_u8(if self.is_video { KIND_VIDEO } else { KIND_DATA });
        buf.put_u64(self.pts_us);
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let packet = EncodedPacket::video(Bytes::from_static(b"nalu"), 0x0102);
        let wire = packet.to_wire();

        assert_eq!(&wire[0..4], &[0, 0, 0, 13]); // 1 + 8 + 4
        assert_eq!(wire[4], KIND_VIDEO);
        assert_eq!(&wire[5..13], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(&wire[13..], b"nalu");
    }

    #[test]
    fn test_data_unit_kind() {
        let packet = EncodedPacket::data_unit(Bytes::from_static(b"sps"), 0);
        assert!(!packet.is_video);
        assert_eq!(packet.to_wire()[4], KIND_DATA);
    }
}
