use std::{
    fmt,
    sync::atomic::{AtomicI32, Ordering},
};

use bson::Document;
use log::trace;

use crate::{
    document::DocumentCodec,
    error::{MongoError, Result},
};

use super::{
    header::MessageHeader,
    opcode::OP_QUERY,
    settings::MessageSettings,
};

pub const COMMAND_COLLECTION_NAME: &str = "$cmd";

/// Extra room a command document may take above the max document size, for the command's
/// own fields wrapped around user documents.
pub const COMMAND_HEADROOM: usize = 16 * 1024;

/// Query flag allowing a command to run on a secondary.
pub const QUERY_FLAG_SLAVE_OK: i32 = 1 << 2;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Process-wide request id; never reused while the process lives (modulo wrap-around).
pub fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Database and collection pair addressed by a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// The `<database>.$cmd` namespace commands are sent to.
    pub fn command(database: impl Into<String>) -> Self {
        Self::new(database, COMMAND_COLLECTION_NAME)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command,
    WriteCommand,
}

/// An encoded request frame ready to be handed to a connection.
#[derive(Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    request_id: i32,
    kind: MessageKind,
    payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A command addressed to `<database>.$cmd`, framed as an `OP_QUERY`.
#[derive(Debug)]
pub struct CommandMessage<'a> {
    namespace: Namespace,
    command: &'a Document,
    kind: MessageKind,
    flags: i32,
}

impl<'a> CommandMessage<'a> {
    pub fn new(database: &str, command: &'a Document) -> Self {
        Self {
            namespace: Namespace::command(database),
            command,
            kind: MessageKind::Command,
            flags: 0,
        }
    }

    pub fn write_command(database: &str, command: &'a Document) -> Self {
        Self {
            kind: MessageKind::WriteCommand,
            ..Self::new(database, command)
        }
    }

    pub fn slave_ok(mut self, slave_ok: bool) -> Self {
        if slave_ok {
            self.flags |= QUERY_FLAG_SLAVE_OK;
        } else {
            self.flags &= !QUERY_FLAG_SLAVE_OK;
        }
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Encodes the frame under a freshly allocated request id.
    pub fn encode<D>(&self, codec: &D, settings: &MessageSettings) -> Result<OutboundMessage>
    where
        D: DocumentCodec + ?Sized,
    {
        let request_id = next_request_id();
        let mut buffer = Vec::with_capacity(128);
        MessageHeader {
            message_length: 0,
            request_id,
            response_to: 0,
            op_code: OP_QUERY,
        }
        .write_to(&mut buffer);
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(self.namespace.full_name().as_bytes());
        buffer.push(0);
        // numberToSkip, numberToReturn
        buffer.extend_from_slice(&0_i32.to_le_bytes());
        buffer.extend_from_slice(&(-1_i32).to_le_bytes());

        let document_start = buffer.len();
        codec.encode(self.command, &mut buffer)?;
        let document_size = buffer.len() - document_start;

        let max_document = settings.max_document_size + COMMAND_HEADROOM;
        if document_size > max_document {
            return Err(MongoError::DocumentTooLarge {
                size: document_size,
                max: max_document,
            });
        }
        let length = i32::try_from(buffer.len())
            .ok()
            .filter(|_| buffer.len() <= settings.max_message_size)
            .ok_or(MongoError::DocumentTooLarge {
                size: buffer.len(),
                max: settings.max_message_size,
            })?;
        buffer[..4].copy_from_slice(&length.to_le_bytes());

        trace!(
            "encoded {:?} {request_id} for {} ({length} bytes)",
            self.kind, self.namespace
        );
        Ok(OutboundMessage {
            request_id,
            kind: self.kind,
            payload: buffer,
        })
    }
}

/// Splits an `OP_QUERY` frame back into its header, namespace and query document.
#[cfg(test)]
pub(crate) fn parse_query_message(bytes: &[u8]) -> (MessageHeader, String, Document) {
    use crate::document::BsonCodec;

    let header = MessageHeader::parse(bytes).unwrap();
    let rest = &bytes[20..];
    let end = rest.iter().position(|b| *b == 0).unwrap();
    let namespace = String::from_utf8(rest[..end].to_vec()).unwrap();
    let document = BsonCodec.decode(&rest[end + 9..]).unwrap();
    (header, namespace, document)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::document::BsonCodec;

    #[test]
    fn request_ids_increase() {
        let first = next_request_id();
        let second = next_request_id();
        assert!(second > first);
    }

    #[test]
    fn command_frame_layout() {
        let command = doc! { "ping": 1 };
        let message = CommandMessage::new("admin", &command)
            .encode(&BsonCodec, &MessageSettings::default())
            .unwrap();
        let (header, namespace, document) = parse_query_message(message.as_bytes());

        assert_eq!(header.message_length as usize, message.len());
        assert_eq!(header.request_id, message.request_id());
        assert_eq!(header.response_to, 0);
        assert_eq!(header.op_code, OP_QUERY);
        assert_eq!(namespace, "admin.$cmd");
        assert_eq!(document, command);
        assert_eq!(message.kind(), MessageKind::Command);
    }

    #[test]
    fn slave_ok_sets_query_flag() {
        let command = doc! { "isMaster": 1 };
        let message = CommandMessage::new("admin", &command)
            .slave_ok(true)
            .encode(&BsonCodec, &MessageSettings::default())
            .unwrap();
        let flags = i32::from_le_bytes(message.as_bytes()[16..20].try_into().unwrap());

        assert_eq!(flags, QUERY_FLAG_SLAVE_OK);
    }

    #[test]
    fn each_encoding_gets_a_fresh_request_id() {
        let command = doc! { "ping": 1 };
        let message = CommandMessage::new("admin", &command);
        let first = message.encode(&BsonCodec, &MessageSettings::default()).unwrap();
        let second = message.encode(&BsonCodec, &MessageSettings::default()).unwrap();

        assert_ne!(first.request_id(), second.request_id());
    }

    #[test]
    fn oversized_command_is_rejected() {
        let command = doc! { "insert": "c", "blob": "x".repeat(2048) };
        let settings = MessageSettings {
            max_document_size: 64,
            max_message_size: 1 << 20,
            max_write_batch_size: 10,
        };
        let tight = MessageSettings {
            max_message_size: 256,
            ..settings
        };

        assert!(CommandMessage::write_command("db", &command)
            .encode(&BsonCodec, &settings)
            .is_ok());
        assert!(matches!(
            CommandMessage::write_command("db", &command).encode(&BsonCodec, &tight),
            Err(MongoError::DocumentTooLarge { max: 256, .. })
        ));
    }

    #[test]
    fn namespace_names() {
        let namespace = Namespace::new("test", "users");
        assert_eq!(namespace.full_name(), "test.users");
        assert_eq!(namespace.to_string(), "test.users");
        assert_eq!(Namespace::command("admin").full_name(), "admin.$cmd");
    }
}
