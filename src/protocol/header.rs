// @see https://www.mongodb.com/docs/manual/reference/mongodb-wire-protocol/#standard-message-header

use crate::error::FramingError;

use super::opcode::OP_REPLY;

pub const MESSAGE_HEADER_LENGTH: usize = 16;
pub const REPLY_HEADER_LENGTH: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    // total message size, including this
    pub message_length: i32,

    // identifier for this message
    pub request_id: i32,

    // requestID from the original request (used in responses from db)
    pub response_to: i32,

    // request type
    pub op_code: i32,
}

impl MessageHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self, FramingError> {
        ensure_len(buffer, MESSAGE_HEADER_LENGTH)?;
        Ok(Self {
            message_length: read_i32(buffer, 0),
            request_id: read_i32(buffer, 4),
            response_to: read_i32(buffer, 8),
            op_code: read_i32(buffer, 12),
        })
    }

    pub fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.message_length.to_le_bytes());
        buffer.extend_from_slice(&self.request_id.to_le_bytes());
        buffer.extend_from_slice(&self.response_to.to_le_bytes());
        buffer.extend_from_slice(&self.op_code.to_le_bytes());
    }
}

/// Fixed 36-byte prefix of every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
    pub response_flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
}

impl ReplyHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self, FramingError> {
        ensure_len(buffer, REPLY_HEADER_LENGTH)?;
        let header = MessageHeader::parse(buffer)?;
        Ok(Self {
            message_length: header.message_length,
            request_id: header.request_id,
            response_to: header.response_to,
            op_code: header.op_code,
            response_flags: read_i32(buffer, 16),
            cursor_id: read_i64(buffer, 20),
            starting_from: read_i32(buffer, 28),
            number_returned: read_i32(buffer, 32),
        })
    }

    /// Checks that this header answers `request_id` and carries the reply opcode.
    pub fn validate(&self, request_id: i32) -> Result<(), FramingError> {
        if self.response_to != request_id {
            return Err(FramingError::ResponseTo {
                expected: request_id,
                actual: self.response_to,
            });
        }
        if self.op_code != OP_REPLY {
            return Err(FramingError::OpCode {
                expected: OP_REPLY,
                actual: self.op_code,
            });
        }
        Ok(())
    }

    pub fn write_to(&self, buffer: &mut Vec<u8>) {
        MessageHeader {
            message_length: self.message_length,
            request_id: self.request_id,
            response_to: self.response_to,
            op_code: self.op_code,
        }
        .write_to(buffer);
        buffer.extend_from_slice(&self.response_flags.to_le_bytes());
        buffer.extend_from_slice(&self.cursor_id.to_le_bytes());
        buffer.extend_from_slice(&self.starting_from.to_le_bytes());
        buffer.extend_from_slice(&self.number_returned.to_le_bytes());
    }
}

fn ensure_len(buffer: &[u8], expected: usize) -> Result<(), FramingError> {
    if buffer.len() < expected {
        return Err(FramingError::Truncated {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

/// Callers must have checked that `offset + 4` is in bounds.
pub(crate) fn read_i32(buffer: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

fn read_i64(buffer: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buffer[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}
