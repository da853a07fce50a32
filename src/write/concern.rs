use std::time::Duration;

use bson::{Bson, Document};

/// The `w` component of a write concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgment {
    /// Number of members that must apply the write. Zero disables acknowledgment.
    Nodes(i32),
    Majority,
    /// A replica set tag set name.
    Tag(String),
}

impl From<&Acknowledgment> for Bson {
    fn from(value: &Acknowledgment) -> Self {
        match value {
            Acknowledgment::Nodes(n) => Bson::Int32(*n),
            Acknowledgment::Majority => Bson::String("majority".into()),
            Acknowledgment::Tag(tag) => Bson::String(tag.clone()),
        }
    }
}

/// Acknowledgment level a write requires before the server answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConcern {
    w: Option<Acknowledgment>,
    w_timeout: Option<Duration>,
    journal: Option<bool>,
    fsync: Option<bool>,
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self::ACKNOWLEDGED
    }
}

impl WriteConcern {
    pub const ACKNOWLEDGED: WriteConcern = WriteConcern {
        w: Some(Acknowledgment::Nodes(1)),
        w_timeout: None,
        journal: None,
        fsync: None,
    };

    pub const UNACKNOWLEDGED: WriteConcern = WriteConcern {
        w: Some(Acknowledgment::Nodes(0)),
        w_timeout: None,
        journal: None,
        fsync: None,
    };

    pub const JOURNALED: WriteConcern = WriteConcern {
        w: Some(Acknowledgment::Nodes(1)),
        w_timeout: None,
        journal: Some(true),
        fsync: None,
    };

    pub const MAJORITY: WriteConcern = WriteConcern {
        w: Some(Acknowledgment::Majority),
        w_timeout: None,
        journal: None,
        fsync: None,
    };

    pub fn w(mut self, w: Acknowledgment) -> Self {
        self.w = Some(w);
        self
    }

    pub fn w_timeout(mut self, timeout: Duration) -> Self {
        self.w_timeout = Some(timeout);
        self
    }

    pub fn journal(mut self, journal: bool) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn fsync(mut self, fsync: bool) -> Self {
        self.fsync = Some(fsync);
        self
    }

    /// `false` only for `w: 0` without journaling or fsync, where the server sends back
    /// nothing worth reading.
    pub fn is_acknowledged(&self) -> bool {
        let unacknowledged_w = matches!(self.w, Some(Acknowledgment::Nodes(n)) if n <= 0);
        !unacknowledged_w || self.journal == Some(true) || self.fsync == Some(true)
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(w) = &self.w {
            document.insert("w", Bson::from(w));
        }
        if let Some(timeout) = self.w_timeout {
            let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            document.insert("wtimeout", millis);
        }
        if let Some(journal) = self.journal {
            document.insert("j", journal);
        }
        if let Some(fsync) = self.fsync {
            document.insert("fsync", fsync);
        }
        document
    }
}
