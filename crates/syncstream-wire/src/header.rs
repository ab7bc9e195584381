//! Fixed header for command frames
//!
//! Fixed header is 36 bytes, little endian:
//! - Byte 0: Version (4 bits) + reserved (4 bits)
//! - Byte 1: Payload tag
//! - Bytes 2-3: Body length
//! - Bytes 4-11: Sender ID
//! - Bytes 12-19: Command ID
//! - Bytes 20-27: Issue time (f64 bits)
//! - Bytes 28-35: Send time (f64 bits)

use bytes::{Buf, BufMut};

use syncstream_core::{CommandId, SenderId, SyncError, SyncResult, Timestamp};

/// Fixed header size in bytes
pub const FIXED_HEADER_SIZE: usize = 36;

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Fixed header structure
#[derive(Clone, Debug, PartialEq)]
pub struct FixedHeader {
    pub version: u8,
    /// `CommandPayload::tag` of the carried command
    pub tag: u8,
    pub body_len: u16,
    pub sender: SenderId,
    pub command_id: CommandId,
    pub issue_time: Timestamp,
    /// Sender clock reading when the frame left
    pub sent_at: Timestamp,
}

impl FixedHeader {
    /// Parse header from the front of `buf`
    pub fn parse(mut buf: &[u8]) -> SyncResult<Self> {
        if buf.len() < FIXED_HEADER_SIZE {
            return Err(SyncError::BufferTooShort {
                expected: FIXED_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let version = buf.get_u8() >> 4;
        if version != WIRE_VERSION {
            return Err(SyncError::Wire(format!("unsupported version {version}")));
        }
        let tag = buf.get_u8();
        let body_len = buf.get_u16_le();
        let sender = SenderId::new(buf.get_u64_le());
        let command_id = CommandId::new(buf.get_u64_le());
        let issue_time = Timestamp(buf.get_f64_le());
        let sent_at = Timestamp(buf.get_f64_le());

        if !issue_time.is_finite() || !sent_at.is_finite() {
            return Err(SyncError::Wire("non-finite time field".into()));
        }

        Ok(FixedHeader {
            version,
            tag,
            body_len,
            sender,
            command_id,
            issue_time,
            sent_at,
        })
    }

    /// Append the header to `buf`
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.version << 4);
        buf.put_u8(self.tag);
        buf.put_u16_le(self.body_len);
        buf.put_u64_le(self.sender.0);
        buf.put_u64_le(self.command_id.0);
        buf.put_f64_le(self.issue_time.as_secs_f64());
        buf.put_f64_le(self.sent_at.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FixedHeader {
        FixedHeader {
            version: WIRE_VERSION,
            tag: 0x02,
            body_len: 0,
            sender: SenderId::new(0xABCD),
            command_id: CommandId::new(9),
            issue_time: Timestamp(12.5),
            sent_at: Timestamp(12.0),
        }
    }

    #[test]
    fn test_header_layout() {
        let mut buf = Vec::new();
        header().serialize(&mut buf);

        assert_eq!(buf.len(), FIXED_HEADER_SIZE);
        assert_eq!(buf[0], WIRE_VERSION << 4);
        assert_eq!(buf[1], 0x02);
        assert_eq!(&buf[4..12], &SenderId::new(0xABCD).to_bytes());
        assert_eq!(FixedHeader::parse(&buf).unwrap(), header());
    }

    #[test]
    fn test_header_too_short() {
        let err = FixedHeader::parse(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            SyncError::BufferTooShort {
                expected: FIXED_HEADER_SIZE,
                actual: 10
            }
        );
    }

    #[test]
    fn test_header_rejects_unknown_version() {
        let mut buf = Vec::new();
        header().serialize(&mut buf);
        buf[0] = 0x70;
        assert!(matches!(FixedHeader::parse(&buf), Err(SyncError::Wire(_))));
    }

    #[test]
    fn test_header_rejects_nan_time() {
        let mut bad = header();
        bad.issue_time = Timestamp(f64::NAN);
        let mut buf = Vec::new();
        bad.serialize(&mut buf);
        assert!(FixedHeader::parse(&buf).is_err());
    }
}
