use bson::{Document, doc};

use super::{WriteKind, WriteRequest};

/// One `deletes` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    filter: Document,
    // 0 removes every match, 1 only the first
    limit: i32,
}

impl DeleteRequest {
    /// Removes every document matching `filter`.
    pub fn new(filter: Document) -> Self {
        Self { filter, limit: 0 }
    }

    /// Removes at most one document matching `filter`.
    pub fn single(filter: Document) -> Self {
        Self { filter, limit: 1 }
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn is_multi(&self) -> bool {
        self.limit == 0
    }
}

impl WriteRequest for DeleteRequest {
    const KIND: WriteKind = WriteKind::Delete;

    fn to_document(&self) -> Document {
        doc! { "q": self.filter.clone(), "limit": self.limit }
    }
}
