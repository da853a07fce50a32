//! Document codec boundary.
//!
//! The wire core never looks inside a document's bytes beyond the 4-byte length prefix; all
//! encoding and decoding goes through a [`DocumentCodec`]. [`BsonCodec`] is the stock
//! implementation backed by the `bson` crate.
use bson::{Bson, Document};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),
    #[error("failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),
}

/// Encodes command and write documents to bytes and back.
pub trait DocumentCodec {
    /// Appends the encoded form of `document` to `buffer`.
    fn encode(&self, document: &Document, buffer: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decodes exactly one document from `bytes`.
    fn decode(&self, bytes: &[u8]) -> Result<Document, CodecError>;

    /// Size of `document` once encoded.
    fn encoded_len(&self, document: &Document) -> Result<usize, CodecError> {
        let mut scratch = Vec::new();
        self.encode(document, &mut scratch)?;
        Ok(scratch.len())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BsonCodec;

impl DocumentCodec for BsonCodec {
    fn encode(&self, document: &Document, buffer: &mut Vec<u8>) -> Result<(), CodecError> {
        document.to_writer(buffer)?;
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document, CodecError> {
        Ok(Document::from_reader(bytes)?)
    }
}

/// Server-style truthiness: booleans as-is, numbers when non-zero, `null` and missing as false.
pub fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(d) => *d != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Reads a numeric field the way servers report counters: as int32, int64 or double.
pub fn numeric_value(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(d) if d.fract() == 0.0 => Some(*d as i64),
        _ => None,
    }
}

/// Numeric field of `document` narrowed to an `i32`, as used for server error codes.
pub fn get_i32_lenient(document: &Document, key: &str) -> Option<i32> {
    document
        .get(key)
        .and_then(numeric_value)
        .and_then(|value| i32::try_from(value).ok())
}
