//! Wire-protocol round trips.
//!
//! This module turns command documents into legacy wire-protocol frames, hands them to a
//! [`Connection`](crate::connection::Connection), and turns the frames that come back into
//! typed results or typed failures.
//!
//! # Overview
//!
//! Every exchange is a single request and a single reply. The request is an `OP_QUERY`
//! addressed to `<database>.$cmd`; the reply is an `OP_REPLY` whose `responseTo` must equal
//! the request id and whose first document is the command's outcome.
//!
//! Two execution models share one validation routine:
//!
//! - [`execute_command`] blocks the calling thread until the reply has been read.
//! - [`send_command_async`] returns a [`SingleResultFuture`] right away. The exchange then
//!   advances through [`RoundTripEvent::Sent`] and [`RoundTripEvent::Received`] on the
//!   connection's I/O thread. A failed send completes the cell immediately and no receive is
//!   ever started.
//!
//! # Key Components
//!
//! - [`CommandMessage`]: encodes a command into an [`OutboundMessage`] under a fresh request id.
//! - [`ReplyHeader`] / [`ReplyMessage`]: the 36-byte reply prefix and the validated reply.
//! - [`CommandResult`]: server address, reply document and elapsed time.
//! - [`MessageSettings`]: size limits applied while encoding.
//!
//! # Binary Format
//!
//! - Every frame starts with a 16-byte header: length, request id, response-to, opcode.
//! - Reply frames extend it with flags, cursor id, starting offset and document count.
//! - All integers are little-endian.
//!
//! A reply that answers some other request or carries an unexpected opcode is a
//! [`MongoError::Framing`](crate::MongoError::Framing) error. The stream can no longer be
//! trusted after one, so the connection must be discarded.
//!
//! # See Also
//!
//! - [`write`](crate::write): write commands built on the blocking round trip.
//! - [`auth`](crate::auth): authentication handshakes built on the blocking round trip.
mod command;
mod future;
mod header;
mod message;
pub mod opcode;
mod reply;
mod result;
mod settings;

pub(crate) use command::round_trip;
pub use command::{RoundTripEvent, execute_command, send_command_async};
pub use future::{ResultCompleter, SingleResultFuture};
pub use header::{MESSAGE_HEADER_LENGTH, MessageHeader, REPLY_HEADER_LENGTH, ReplyHeader};
pub use message::{
    COMMAND_COLLECTION_NAME, COMMAND_HEADROOM, CommandMessage, MessageKind, Namespace,
    OutboundMessage, QUERY_FLAG_SLAVE_OK, next_request_id,
};
pub use opcode::OpCode;
pub use reply::ReplyMessage;
pub use result::CommandResult;
pub use settings::MessageSettings;

#[cfg(test)]
pub(crate) use message::parse_query_message;
#[cfg(test)]
pub(crate) use reply::encode_reply;
