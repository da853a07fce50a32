//! Connection boundary.
//!
//! A [`Connection`] is an opaque, already-established channel to one server. The wire core
//! only ever hands it complete, encoded request frames tagged with their request id and reads
//! back complete reply frames; pooling, discovery and reconnects live outside this crate.
//!
//! # Execution models
//!
//! Every connection offers both models over the same frames:
//!
//! - blocking: [`Connection::send_message`] / [`Connection::receive_message`] run on the
//!   caller's thread.
//! - non-blocking: [`Connection::send_message_async`] / [`Connection::receive_message_async`]
//!   return immediately and invoke the supplied callback later, on whatever thread the
//!   connection completes I/O on.
//!
//! Several exchanges may be in flight on one connection; they are told apart only by request
//! id, never by locking the connection for the duration of an exchange.
//!
//! # See Also
//!
//! - [`protocol`](crate::protocol): builds the frames sent through this boundary.
use std::{fmt, str::FromStr};

use thiserror::Error;

#[cfg(test)]
pub(crate) mod mock;
mod tcp;
mod thread;
mod transport;

pub use tcp::TcpConnection;
pub use thread::ThreadPool;
pub use transport::FrameTransport;

pub const DEFAULT_PORT: u16 = 27017;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection to {0} is closed")]
    Closed(ServerAddress),

    #[error("invalid server address '{0}'")]
    InvalidAddress(String),

    #[error("invalid frame length {0}")]
    FrameLength(i32),
}

/// Host and port of the server a connection talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConnectionError::InvalidAddress(s.to_string()))?;
                Ok(Self::new(host, port))
            }
            Some(_) => Err(ConnectionError::InvalidAddress(s.to_string())),
            None if !s.is_empty() => Ok(Self::new(s, DEFAULT_PORT)),
            None => Err(ConnectionError::InvalidAddress(s.to_string())),
        }
    }
}

/// A complete reply frame, header included, as read off the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBuffers {
    bytes: Vec<u8>,
}

impl ResponseBuffers {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The `responseTo` field of the frame, if the frame is long enough to carry one.
    pub fn response_to(&self) -> Option<i32> {
        let field = self.bytes.get(8..12)?;
        Some(i32::from_le_bytes([field[0], field[1], field[2], field[3]]))
    }
}

pub type SendCallback = Box<dyn FnOnce(Result<(), ConnectionError>) + Send + 'static>;
pub type ReceiveCallback =
    Box<dyn FnOnce(Result<ResponseBuffers, ConnectionError>) + Send + 'static>;

/// An established channel to a single server.
pub trait Connection: Send + Sync {
    fn server_address(&self) -> &ServerAddress;

    /// Identifier used in diagnostics.
    fn id(&self) -> &str;

    /// Writes one complete request frame.
    fn send_message(&self, bytes: &[u8], request_id: i32) -> Result<(), ConnectionError>;

    /// Blocks until the next complete reply frame has been read.
    fn receive_message(&self) -> Result<ResponseBuffers, ConnectionError>;

    /// Writes `bytes` without blocking the caller. The buffer is owned by the connection until
    /// the write completes and is dropped before `callback` runs.
    fn send_message_async(&self, bytes: Vec<u8>, request_id: i32, callback: SendCallback);

    /// Delivers the reply whose `responseTo` equals `request_id` to `callback`.
    fn receive_message_async(&self, request_id: i32, callback: ReceiveCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_address_with_port() {
        let address: ServerAddress = "db.example.com:27018".parse().unwrap();
        assert_eq!(address.host(), "db.example.com");
        assert_eq!(address.port(), 27018);
        assert_eq!(address.to_string(), "db.example.com:27018");
    }

    #[test]
    fn parse_address_defaults_port() {
        let address: ServerAddress = "localhost".parse().unwrap();
        assert_eq!(address, ServerAddress::default());
    }

    #[test]
    fn parse_address_rejects_garbage() {
        assert!(matches!(
            "localhost:mongo".parse::<ServerAddress>(),
            Err(ConnectionError::InvalidAddress(_))
        ));
        assert!(":27017".parse::<ServerAddress>().is_err());
        assert!("".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn response_to_is_read_from_header() {
        let mut frame = vec![0u8; 16];
        frame[8..12].copy_from_slice(&42_i32.to_le_bytes());

        assert_eq!(ResponseBuffers::new(frame).response_to(), Some(42));
        assert_eq!(ResponseBuffers::new(vec![0u8; 4]).response_to(), None);
    }
}
