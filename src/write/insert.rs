use bson::{Bson, Document, oid::ObjectId};

use super::{WriteKind, WriteRequest};

/// A document to insert. Documents without an `_id` get a fresh [`ObjectId`] as their first
/// field, so the caller knows the id of everything it inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    document: Document,
}

impl InsertRequest {
    pub fn new(document: Document) -> Self {
        if document.contains_key("_id") {
            return Self { document };
        }
        let mut with_id = Document::new();
        with_id.insert("_id", ObjectId::new());
        for (key, value) in document {
            with_id.insert(key, value);
        }
        Self { document: with_id }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn id(&self) -> Option<&Bson> {
        self.document.get("_id")
    }
}

impl From<Document> for InsertRequest {
    fn from(document: Document) -> Self {
        Self::new(document)
    }
}

impl WriteRequest for InsertRequest {
    const KIND: WriteKind = WriteKind::Insert;

    fn to_document(&self) -> Document {
        self.document.clone()
    }
}
