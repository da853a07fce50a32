use std::io::{self, Read, Write};

use log::trace;

use super::{ConnectionError, ResponseBuffers};

/// Frames may not be shorter than the standard message header.
const MIN_FRAME_LENGTH: i32 = 16;
/// Upper bound accepted for an incoming frame; twice the default max message size.
const MAX_FRAME_LENGTH: i32 = 96_000_000;

/// Length-prefixed framing over any bidirectional byte stream.
pub struct FrameTransport<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> FrameTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        trace!("writing frame of {} bytes", bytes.len());
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Reads one complete frame: the little-endian length prefix, then the rest of the frame.
    pub fn read_frame(&mut self) -> Result<ResponseBuffers, ConnectionError> {
        let mut prefix = [0u8; 4];
        self.stream.read_exact(&mut prefix)?;
        let length = i32::from_le_bytes(prefix);
        if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&length) {
            return Err(ConnectionError::FrameLength(length));
        }

        let mut bytes = vec![0u8; length as usize];
        bytes[..4].copy_from_slice(&prefix);
        self.stream.read_exact(&mut bytes[4..]).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                trace!("stream ended inside a frame of {length} bytes");
            }
            ConnectionError::Io(e)
        })?;
        trace!("read frame of {length} bytes");
        Ok(ResponseBuffers::new(bytes))
    }
}
