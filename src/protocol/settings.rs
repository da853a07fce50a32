use bson::Document;

use crate::document::numeric_value;

pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 48_000_000;
pub const DEFAULT_MAX_WRITE_BATCH_SIZE: usize = 1000;

/// Size limits negotiated with the server, applied while building outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSettings {
    pub max_document_size: usize,
    pub max_message_size: usize,
    pub max_write_batch_size: usize,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_write_batch_size: DEFAULT_MAX_WRITE_BATCH_SIZE,
        }
    }
}

impl MessageSettings {
    /// Reads the limits advertised in an `isMaster` reply, falling back to the defaults for
    /// anything missing or nonsensical.
    pub fn from_is_master(reply: &Document) -> Self {
        let defaults = Self::default();
        let limit = |key: &str, fallback: usize| {
            reply
                .get(key)
                .and_then(numeric_value)
                .and_then(|value| usize::try_from(value).ok())
                .filter(|value| *value > 0)
                .unwrap_or(fallback)
        };

        Self {
            max_document_size: limit("maxBsonObjectSize", defaults.max_document_size),
            max_message_size: limit("maxMessageSizeBytes", defaults.max_message_size),
            max_write_batch_size: limit("maxWriteBatchSize", defaults.max_write_batch_size),
        }
    }
}
