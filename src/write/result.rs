use bson::{Bson, Document};

use crate::{
    document::{get_i32_lenient, numeric_value},
    error::{MongoError, Result},
};

/// Server codes reported for unique index violations.
pub const DUPLICATE_KEY_CODES: [i32; 3] = [11000, 11001, 12582];

/// One item of a batch the server refused.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    /// Position of the item in the caller's batch.
    pub index: usize,
    pub code: i32,
    pub message: String,
    pub details: Option<Document>,
}

impl WriteError {
    pub fn is_duplicate_key(&self) -> bool {
        DUPLICATE_KEY_CODES.contains(&self.code)
    }
}

/// The write was applied but the requested acknowledgment level was not met.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcernError {
    pub code: i32,
    pub message: String,
    pub details: Option<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    pub index: usize,
    pub id: Bson,
}

/// Outcome of a write command.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    acknowledged: bool,
    count: i64,
    modified: Option<i64>,
    upserts: Vec<Upsert>,
    write_errors: Vec<WriteError>,
    write_concern_error: Option<WriteConcernError>,
}

impl WriteResult {
    pub(crate) fn empty(acknowledged: bool) -> Self {
        Self {
            acknowledged,
            count: 0,
            modified: None,
            upserts: Vec::new(),
            write_errors: Vec::new(),
            write_concern_error: None,
        }
    }

    /// Result of a write the server was asked not to acknowledge.
    pub fn unacknowledged() -> Self {
        Self::empty(false)
    }

    /// Parses an acknowledged write command reply. Item indexes are shifted by `offset`, the
    /// position of the message's first item in the caller's batch.
    pub(crate) fn from_reply(reply: &Document, offset: usize) -> Result<Self> {
        let count = reply.get("n").and_then(numeric_value).unwrap_or(0);
        let modified = reply.get("nModified").and_then(numeric_value);

        let upserts = entries(reply, "upserted")?
            .map(|entry| {
                Ok(Upsert {
                    index: index(entry, offset)?,
                    id: entry.get("_id").cloned().unwrap_or(Bson::Null),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let write_errors = entries(reply, "writeErrors")?
            .map(|entry| {
                Ok(WriteError {
                    index: index(entry, offset)?,
                    code: get_i32_lenient(entry, "code").unwrap_or_default(),
                    message: entry.get_str("errmsg").unwrap_or_default().to_string(),
                    details: entry.get_document("errInfo").ok().cloned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let write_concern_error = match reply.get("writeConcernError") {
            None => None,
            Some(Bson::Document(entry)) => Some(WriteConcernError {
                code: get_i32_lenient(entry, "code").unwrap_or_default(),
                message: entry.get_str("errmsg").unwrap_or_default().to_string(),
                details: entry.get_document("errInfo").ok().cloned(),
            }),
            Some(other) => {
                return Err(MongoError::InvalidResponse(format!(
                    "writeConcernError is not a document: {other}"
                )));
            }
        };

        Ok(Self {
            acknowledged: true,
            count,
            modified,
            upserts,
            write_errors,
            write_concern_error,
        })
    }

    /// Folds the result of a later message of the same batch into this one.
    pub(crate) fn merge(&mut self, other: WriteResult) {
        self.acknowledged &= other.acknowledged;
        self.count += other.count;
        self.modified = match (self.modified, other.modified) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        self.upserts.extend(other.upserts);
        self.write_errors.extend(other.write_errors);
        if self.write_concern_error.is_none() {
            self.write_concern_error = other.write_concern_error;
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Documents inserted, matched or deleted.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Documents changed by an update; absent for other writes.
    pub fn modified_count(&self) -> Option<i64> {
        self.modified
    }

    pub fn upserts(&self) -> &[Upsert] {
        &self.upserts
    }

    pub fn write_errors(&self) -> &[WriteError] {
        &self.write_errors
    }

    pub fn write_concern_error(&self) -> Option<&WriteConcernError> {
        self.write_concern_error.as_ref()
    }

    pub fn has_write_errors(&self) -> bool {
        !self.write_errors.is_empty()
    }

    /// Code of the first write error, or of the write concern error if there is none.
    pub fn error_code(&self) -> Option<i32> {
        self.write_errors
            .first()
            .map(|e| e.code)
            .or_else(|| self.write_concern_error.as_ref().map(|e| e.code))
    }

    pub fn first_error_message(&self) -> &str {
        self.write_errors
            .first()
            .map(|e| e.message.as_str())
            .or_else(|| self.write_concern_error.as_ref().map(|e| e.message.as_str()))
            .unwrap_or("no error message")
    }
}

fn entries<'a>(reply: &'a Document, key: &str) -> Result<impl Iterator<Item = &'a Document>> {
    let values = match reply.get(key) {
        None => &[][..],
        Some(Bson::Array(values)) => values.as_slice(),
        Some(other) => {
            return Err(MongoError::InvalidResponse(format!(
                "{key} is not an array: {other}"
            )));
        }
    };
    if let Some(bad) = values.iter().find(|v| !matches!(v, Bson::Document(_))) {
        return Err(MongoError::InvalidResponse(format!(
            "{key} holds a non-document entry: {bad}"
        )));
    }
    Ok(values.iter().filter_map(Bson::as_document))
}

fn index(entry: &Document, offset: usize) -> Result<usize> {
    entry
        .get("index")
        .and_then(numeric_value)
        .and_then(|i| usize::try_from(i).ok())
        .map(|i| i + offset)
        .ok_or_else(|| MongoError::InvalidResponse(format!("entry without a valid index: {entry}")))
}
