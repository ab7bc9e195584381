//! Complete command frame
//!
//! Frame = Fixed Header + Body. The body holds the marker token as UTF-8
//! and is empty for start/pause/stop.

use bytes::{Bytes, BytesMut};

use syncstream_core::{CommandPayload, ControlCommand, SyncError, SyncResult, Timestamp};

use crate::{FixedHeader, FIXED_HEADER_SIZE, WIRE_VERSION};

/// Maximum frame size (MTU-friendly)
pub const MAX_FRAME_SIZE: usize = 1400;

/// Maximum marker body length
pub const MAX_BODY_SIZE: usize = MAX_FRAME_SIZE - FIXED_HEADER_SIZE;

/// A control command as carried on the wire
#[derive(Clone, Debug, PartialEq)]
pub struct CommandFrame {
    pub command: ControlCommand,
    /// Sender clock reading at transmission, feeds offset estimation
    pub sent_at: Timestamp,
}

impl CommandFrame {
    pub fn new(command: ControlCommand, sent_at: Timestamp) -> Self {
        CommandFrame { command, sent_at }
    }

    /// Parse a frame from one datagram
    pub fn parse(buf: &[u8]) -> SyncResult<Self> {
        let header = FixedHeader::parse(buf)?;

        let body_end = FIXED_HEADER_SIZE + header.body_len as usize;
        if buf.len() != body_end {
            return Err(SyncError::Wire(format!(
                "body length {} does not match frame of {} bytes",
                header.body_len,
                buf.len()
            )));
        }
        let body = &buf[FIXED_HEADER_SIZE..body_end];

        let payload = match header.tag {
            0x01 => CommandPayload::Start,
            0x02 => CommandPayload::Pause,
            0x03 => CommandPayload::Stop,
            0x10 => {
                let token = std::str::from_utf8(body)
                    .map_err(|e| SyncError::Wire(format!("marker is not UTF-8: {e}")))?;
                CommandPayload::Marker(token.to_string())
            }
            other => {
                return Err(SyncError::Wire(format!("unknown payload tag {other:#04x}")));
            }
        };
        if !matches!(payload, CommandPayload::Marker(_)) && !body.is_empty() {
            return Err(SyncError::Wire(format!(
                "unexpected body on {} command",
                payload.name()
            )));
        }

        Ok(CommandFrame {
            command: ControlCommand::new(
                header.sender,
                header.command_id,
                header.issue_time,
                payload,
            ),
            sent_at: header.sent_at,
        })
    }

    /// Serialize the frame into one datagram
    pub fn serialize(&self) -> SyncResult<Bytes> {
        let body: &[u8] = match &self.command.payload {
            CommandPayload::Marker(token) => token.as_bytes(),
            _ => &[],
        };
        if body.len() > MAX_BODY_SIZE {
            return Err(SyncError::Wire(format!(
                "Frame too large: {} > {}",
                FIXED_HEADER_SIZE + body.len(),
                MAX_FRAME_SIZE
            )));
        }
        if !self.command.issue_time.is_finite() || !self.sent_at.is_finite() {
            return Err(SyncError::Wire("non-finite time field".into()));
        }

        let header = FixedHeader {
            version: WIRE_VERSION,
            tag: self.command.payload.tag(),
            body_len: body.len() as u16,
            sender: self.command.sender,
            command_id: self.command.id,
            issue_time: self.command.issue_time,
            sent_at: self.sent_at,
        };

        let mut buf = BytesMut::with_capacity(self.size());
        header.serialize(&mut buf);
        buf.extend_from_slice(body);
        Ok(buf.freeze())
    }

    /// Total frame size
    pub fn size(&self) -> usize {
        let body = match &self.command.payload {
            CommandPayload::Marker(token) => token.len(),
            _ => 0,
        };
        FIXED_HEADER_SIZE + body
    }

    pub fn fits_mtu(&self) -> bool {
        self.size() <= MAX_FRAME_SIZE
    }
}
