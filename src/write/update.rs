use bson::{Document, doc};

use super::{WriteKind, WriteRequest};

/// One `updates` entry: documents matching `filter` receive `update`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    filter: Document,
    update: Document,
    upsert: bool,
    multi: bool,
}

impl UpdateRequest {
    pub fn new(filter: Document, update: Document) -> Self {
        Self {
            filter,
            update,
            upsert: false,
            multi: false,
        }
    }

    /// Inserts `update` as a new document when nothing matches.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Applies the update to every match instead of the first one.
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn update(&self) -> &Document {
        &self.update
    }
}

impl WriteRequest for UpdateRequest {
    const KIND: WriteKind = WriteKind::Update;

    fn to_document(&self) -> Document {
        doc! {
            "q": self.filter.clone(),
            "u": self.update.clone(),
            "upsert": self.upsert,
            "multi": self.multi,
        }
    }
}
