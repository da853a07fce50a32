//! Write commands.
//!
//! Inserts, updates and deletes are sent as `insert` / `update` / `delete` commands and
//! answered with a single reply describing every item of the batch.
//!
//! # Overview
//!
//! A [`WriteCommandProtocol`] owns one batch of requests and runs it to completion:
//!
//! 1. The batch is split into as many command documents as the server's
//!    [`MessageSettings`] require. An item that alone exceeds the max document size fails the
//!    whole call before anything is sent.
//! 2. Each command is exchanged with a blocking round trip.
//! 3. Replies are merged into one [`WriteResult`] whose item indexes refer to the caller's
//!    batch. An ordered batch stops after the first message that reports write errors.
//!
//! Item errors turn into [`MongoError::WriteFailure`], or into [`MongoError::DuplicateKey`]
//! when a single inserted document hit a unique index. An unmet write concern is only
//! reported through [`WriteResult::write_concern_error`].
//!
//! With an unacknowledged [`WriteConcern`] the reply is checked for `ok` and nothing else.
mod concern;
mod delete;
mod insert;
mod result;
mod update;

use std::ops::Range;

use bson::{Bson, Document};
use log::debug;

use crate::{
    connection::Connection,
    document::{BsonCodec, DocumentCodec},
    error::{MongoError, Result},
    protocol::{
        COMMAND_HEADROOM, CommandMessage, MESSAGE_HEADER_LENGTH, MessageSettings, Namespace,
        round_trip,
    },
};

pub use concern::{Acknowledgment, WriteConcern};
pub use delete::DeleteRequest;
pub use insert::InsertRequest;
pub use result::{DUPLICATE_KEY_CODES, Upsert, WriteConcernError, WriteError, WriteResult};
pub use update::UpdateRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

impl WriteKind {
    pub fn command_name(self) -> &'static str {
        match self {
            WriteKind::Insert => "insert",
            WriteKind::Update => "update",
            WriteKind::Delete => "delete",
        }
    }

    fn items_field(self) -> &'static str {
        match self {
            WriteKind::Insert => "documents",
            WriteKind::Update => "updates",
            WriteKind::Delete => "deletes",
        }
    }

    fn log_target(self) -> &'static str {
        match self {
            WriteKind::Insert => "mongowire::protocol::insert",
            WriteKind::Update => "mongowire::protocol::update",
            WriteKind::Delete => "mongowire::protocol::delete",
        }
    }

    fn progressive(self) -> &'static str {
        match self {
            WriteKind::Insert => "Inserting",
            WriteKind::Update => "Updating",
            WriteKind::Delete => "Deleting",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            WriteKind::Insert => "Insert",
            WriteKind::Update => "Update",
            WriteKind::Delete => "Delete",
        }
    }
}

/// An item of a write batch.
pub trait WriteRequest {
    const KIND: WriteKind;

    /// The item as embedded in the command's items array.
    fn to_document(&self) -> Document;
}

pub type InsertCommandProtocol<'a, C> = WriteCommandProtocol<'a, C, InsertRequest>;
pub type UpdateCommandProtocol<'a, C> = WriteCommandProtocol<'a, C, UpdateRequest>;
pub type DeleteCommandProtocol<'a, C> = WriteCommandProtocol<'a, C, DeleteRequest>;

pub struct WriteCommandProtocol<'a, C: ?Sized, R> {
    namespace: Namespace,
    write_concern: WriteConcern,
    ordered: bool,
    requests: Vec<R>,
    settings: MessageSettings,
    connection: &'a C,
}

impl<'a, C, R> WriteCommandProtocol<'a, C, R>
where
    C: Connection + ?Sized,
    R: WriteRequest,
{
    pub fn new(
        namespace: Namespace,
        write_concern: WriteConcern,
        requests: Vec<R>,
        settings: MessageSettings,
        connection: &'a C,
    ) -> Self {
        Self {
            namespace,
            write_concern,
            ordered: true,
            requests,
            settings,
            connection,
        }
    }

    /// Unordered batches keep going after a message reports write errors.
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn execute(&self) -> Result<WriteResult> {
        let target = R::KIND.log_target();
        debug!(
            target: target,
            "{} documents in namespace {} on connection [{}] to server {}",
            R::KIND.progressive(),
            self.namespace,
            self.connection.id(),
            self.connection.server_address()
        );
        let result = self.execute_batches()?;
        debug!(target: target, "{} completed", R::KIND.noun());
        Ok(result)
    }

    fn execute_batches(&self) -> Result<WriteResult> {
        let acknowledged = self.write_concern.is_acknowledged();
        if self.requests.is_empty() {
            return Ok(WriteResult::empty(acknowledged));
        }

        let items: Vec<Document> = self.requests.iter().map(R::to_document).collect();
        let batches = self.split(&items)?;

        let mut merged = WriteResult::empty(true);
        for batch in batches {
            let offset = batch.start;
            let command = self.command(&items[batch]);
            let message = CommandMessage::write_command(self.namespace.database(), &command)
                .encode(&BsonCodec, &self.settings)?;
            let reply = round_trip(message, &BsonCodec, self.connection)?;
            if !acknowledged {
                continue;
            }

            let result = WriteResult::from_reply(reply.response(), offset)?;
            let failed = result.has_write_errors();
            merged.merge(result);
            if failed && self.ordered {
                debug!(target: R::KIND.log_target(), "ordered batch stopped at item errors");
                break;
            }
        }

        if !acknowledged {
            return Ok(WriteResult::unacknowledged());
        }
        self.check(merged)
    }

    fn check(&self, result: WriteResult) -> Result<WriteResult> {
        if !result.has_write_errors() {
            return Ok(result);
        }
        let duplicate_key = match result.write_errors() {
            [error] if R::KIND == WriteKind::Insert && self.requests.len() == 1 => {
                error.is_duplicate_key().then_some(error.code)
            }
            _ => None,
        };
        match duplicate_key {
            Some(code) => Err(MongoError::DuplicateKey {
                code,
                result: Box::new(result),
            }),
            None => Err(MongoError::WriteFailure(Box::new(result))),
        }
    }

    fn command(&self, items: &[Document]) -> Document {
        let mut command = Document::new();
        command.insert(R::KIND.command_name(), self.namespace.collection());
        command.insert("ordered", self.ordered);
        let concern = self.write_concern.to_document();
        if !concern.is_empty() {
            command.insert("writeConcern", concern);
        }
        command.insert(
            R::KIND.items_field(),
            items.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
        );
        command
    }

    /// Largest command document a single message may carry.
    fn command_size_limit(&self) -> usize {
        // flags, cstring namespace, numberToSkip and numberToReturn
        let query_overhead =
            MESSAGE_HEADER_LENGTH + 4 + self.namespace.database().len() + ".$cmd".len() + 1 + 8;
        (self.settings.max_document_size + COMMAND_HEADROOM)
            .min(self.settings.max_message_size.saturating_sub(query_overhead))
    }

    /// Groups items into consecutive ranges that each fit one command.
    fn split(&self, items: &[Document]) -> Result<Vec<Range<usize>>> {
        let limit = self.command_size_limit();
        let max_items = self.settings.max_write_batch_size.max(1);
        let base = BsonCodec.encoded_len(&self.command(&[]))?;

        let mut batches = Vec::new();
        let mut start = 0;
        let mut size = base;
        for (i, item) in items.iter().enumerate() {
            let item_size = BsonCodec.encoded_len(item)?;
            if item_size > self.settings.max_document_size {
                return Err(MongoError::DocumentTooLarge {
                    size: item_size,
                    max: self.settings.max_document_size,
                });
            }
            if i > start && (i - start >= max_items || size + element_size(i - start, item_size) > limit) {
                batches.push(start..i);
                start = i;
                size = base;
            }
            size += element_size(i - start, item_size);
        }
        batches.push(start..items.len());
        Ok(batches)
    }
}

/// Bytes an item adds to a BSON array at `position`: type byte, decimal key, nul, document.
fn element_size(position: usize, document_size: usize) -> usize {
    1 + position.to_string().len() + 1 + document_size
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::Mutex,
    };

    use bson::doc;

    use super::*;
    use crate::connection::mock::MockConnection;

    /// Plays a server with a unique index on `_id`. Documents with a `bad` field fail.
    fn collection_server() -> MockConnection {
        let ids = Mutex::new(HashSet::new());
        MockConnection::with_handler(move |command: &Document| {
            let mut ids = ids.lock().unwrap();
            let documents = command.get_array("documents").unwrap();
            let mut inserted = 0;
            let mut errors = Vec::new();
            for (index, document) in documents.iter().enumerate() {
                let document = document.as_document().unwrap();
                if document.contains_key("bad") {
                    errors.push(doc! { "index": index as i32, "code": 2, "errmsg": "bad document" });
                } else if !ids.insert(document.get("_id").unwrap().to_string()) {
                    errors.push(doc! {
                        "index": index as i32,
                        "code": 11000,
                        "errmsg": "E11000 duplicate key error index: test.users.$_id_",
                    });
                } else {
                    inserted += 1;
                }
                if !errors.is_empty() && command.get_bool("ordered").unwrap() {
                    break;
                }
            }
            let mut reply = doc! { "ok": 1, "n": inserted };
            if !errors.is_empty() {
                reply.insert("writeErrors", errors);
            }
            reply
        })
    }

    fn insert<'a>(
        connection: &'a MockConnection,
        documents: Vec<Document>,
        settings: MessageSettings,
    ) -> InsertCommandProtocol<'a, MockConnection> {
        InsertCommandProtocol::new(
            Namespace::new("test", "users"),
            WriteConcern::ACKNOWLEDGED,
            documents.into_iter().map(InsertRequest::new).collect(),
            settings,
            connection,
        )
    }

    fn small_batches(max_write_batch_size: usize) -> MessageSettings {
        MessageSettings {
            max_write_batch_size,
            ..MessageSettings::default()
        }
    }

    #[test]
    fn insert_command_document() {
        let connection = collection_server();
        let result = insert(
            &connection,
            vec![doc! { "_id": 1, "name": "ada" }],
            MessageSettings::default(),
        )
        .execute()
        .unwrap();

        assert_eq!(result.count(), 1);
        assert!(result.is_acknowledged());
        let sent = connection.sent();
        assert_eq!(sent[0].0, "test.$cmd");
        assert_eq!(
            sent[0].1,
            doc! {
                "insert": "users",
                "ordered": true,
                "writeConcern": { "w": 1 },
                "documents": [{ "_id": 1, "name": "ada" }],
            }
        );
    }

    #[test]
    fn duplicate_id_is_duplicate_key_error() {
        let connection = collection_server();
        let document = doc! { "_id": 1 };

        insert(&connection, vec![document.clone()], MessageSettings::default())
            .execute()
            .unwrap();
        let err = insert(&connection, vec![document], MessageSettings::default())
            .execute()
            .unwrap_err();

        match err {
            MongoError::DuplicateKey { code, result } => {
                assert_eq!(code, 11000);
                assert_eq!(result.error_code(), Some(11000));
                assert_eq!(result.count(), 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_in_multi_insert_is_write_failure() {
        let connection = collection_server();
        let err = insert(
            &connection,
            vec![doc! { "_id": 1 }, doc! { "_id": 1 }],
            MessageSettings::default(),
        )
        .execute()
        .unwrap_err();

        assert!(matches!(err, MongoError::WriteFailure(_)));
        assert_eq!(err.code(), Some(11000));
        assert_eq!(err.write_result().unwrap().write_errors()[0].index, 1);
    }

    #[test]
    fn batches_follow_max_write_batch_size() {
        let connection = collection_server();
        let documents = (0..5).map(|i| doc! { "_id": i }).collect();

        let result = insert(&connection, documents, small_batches(2)).execute().unwrap();

        assert_eq!(result.count(), 5);
        let sizes: Vec<_> = connection
            .commands()
            .iter()
            .map(|command| command.get_array("documents").unwrap().len())
            .collect();
        assert_eq!(sizes, [2, 2, 1]);
    }

    #[test]
    fn batches_follow_message_size() {
        let connection = collection_server();
        let documents: Vec<_> = (0..6)
            .map(|i| doc! { "_id": i, "payload": "x".repeat(100) })
            .collect();
        let settings = MessageSettings {
            max_message_size: 400,
            ..MessageSettings::default()
        };

        let result = insert(&connection, documents, settings).execute().unwrap();

        assert_eq!(result.count(), 6);
        let commands = connection.commands();
        assert!(commands.len() > 1);
        let total: usize = commands
            .iter()
            .map(|command| command.get_array("documents").unwrap().len())
            .sum();
        assert_eq!(total, 6);
        for command in commands {
            assert!(BsonCodec.encoded_len(&command).unwrap() <= 400);
        }
    }

    #[test]
    fn ordered_batch_stops_at_first_failing_message() {
        let connection = collection_server();
        let documents = vec![doc! { "_id": 1 }, doc! { "_id": 2, "bad": true }, doc! { "_id": 3 }];

        let err = insert(&connection, documents, small_batches(1)).execute().unwrap_err();

        assert_eq!(connection.sent().len(), 2);
        let result = err.write_result().unwrap();
        assert_eq!(result.count(), 1);
        assert_eq!(result.write_errors()[0].index, 1);
    }

    #[test]
    fn unordered_batch_continues() {
        let connection = collection_server();
        let documents = vec![doc! { "_id": 1 }, doc! { "_id": 2, "bad": true }, doc! { "_id": 3 }];

        let err = insert(&connection, documents, small_batches(1))
            .ordered(false)
            .execute()
            .unwrap_err();

        assert_eq!(connection.sent().len(), 3);
        assert!(!connection.commands()[0].get_bool("ordered").unwrap());
        let result = err.write_result().unwrap();
        assert_eq!(result.count(), 2);
        assert_eq!(result.write_errors().len(), 1);
        assert_eq!(result.write_errors()[0].index, 1);
    }

    #[test]
    fn oversized_item_fails_before_sending() {
        let connection = collection_server();
        let settings = MessageSettings {
            max_document_size: 64,
            ..MessageSettings::default()
        };

        let err = insert(
            &connection,
            vec![doc! { "_id": 1 }, doc! { "_id": 2, "blob": "x".repeat(128) }],
            settings,
        )
        .execute()
        .unwrap_err();

        assert!(matches!(err, MongoError::DocumentTooLarge { max: 64, .. }));
        assert!(connection.sent().is_empty());
    }

    #[test]
    fn empty_batch_sends_nothing() {
        let connection = collection_server();

        let result = insert(&connection, Vec::new(), MessageSettings::default())
            .execute()
            .unwrap();

        assert!(result.is_acknowledged());
        assert_eq!(result.count(), 0);
        assert!(connection.sent().is_empty());
    }

    #[test]
    fn write_concern_error_is_not_raised() {
        let connection = MockConnection::new();
        connection.push_reply(doc! {
            "ok": 1,
            "n": 1,
            "writeConcernError": { "code": 64, "errmsg": "waiting for replication timed out" },
        });

        let result = InsertCommandProtocol::new(
            Namespace::new("test", "users"),
            WriteConcern::MAJORITY,
            vec![InsertRequest::new(doc! { "name": "ada" })],
            MessageSettings::default(),
            &connection,
        )
        .execute()
        .unwrap();

        assert_eq!(result.count(), 1);
        assert_eq!(result.write_concern_error().unwrap().code, 64);
        assert_eq!(
            connection.commands()[0].get_document("writeConcern").unwrap(),
            &doc! { "w": "majority" }
        );
    }

    #[test]
    fn unacknowledged_reply_is_not_parsed() {
        let connection = MockConnection::new();
        connection.push_reply(doc! { "ok": 1, "n": 5, "writeErrors": "garbage" });

        let result = InsertCommandProtocol::new(
            Namespace::new("test", "users"),
            WriteConcern::UNACKNOWLEDGED,
            vec![InsertRequest::new(doc! { "name": "ada" })],
            MessageSettings::default(),
            &connection,
        )
        .execute()
        .unwrap();

        assert_eq!(result, WriteResult::unacknowledged());
    }

    #[test]
    fn failed_write_command_is_command_failure() {
        let connection = MockConnection::new();
        connection.push_reply(doc! { "ok": 0, "errmsg": "not master", "code": 10107 });

        let err = DeleteCommandProtocol::new(
            Namespace::new("test", "users"),
            WriteConcern::ACKNOWLEDGED,
            vec![DeleteRequest::new(doc! {})],
            MessageSettings::default(),
            &connection,
        )
        .execute()
        .unwrap_err();

        assert!(matches!(err, MongoError::CommandFailure(_)));
        assert_eq!(err.code(), Some(10107));
    }

    #[test]
    fn update_upserts_are_rebased() {
        let connection = MockConnection::new();
        connection.push_reply(doc! { "ok": 1, "n": 1, "nModified": 1 });
        connection.push_reply(doc! { "ok": 1, "n": 1, "nModified": 0, "upserted": [{ "index": 0, "_id": 99 }] });

        let result = UpdateCommandProtocol::new(
            Namespace::new("test", "users"),
            WriteConcern::ACKNOWLEDGED,
            vec![
                UpdateRequest::new(doc! { "_id": 1 }, doc! { "$set": { "x": 1 } }),
                UpdateRequest::new(doc! { "_id": 99 }, doc! { "$set": { "x": 1 } }).upsert(true),
            ],
            small_batches(1),
            &connection,
        )
        .execute()
        .unwrap();

        assert_eq!(result.count(), 2);
        assert_eq!(result.modified_count(), Some(1));
        assert_eq!(result.upserts()[0].index, 1);
        assert_eq!(result.upserts()[0].id, Bson::Int32(99));

        let commands = connection.commands();
        assert_eq!(commands[1].get_str("update").unwrap(), "users");
        assert_eq!(
            commands[1].get_array("updates").unwrap()[0],
            Bson::Document(doc! { "q": { "_id": 99 }, "u": { "$set": { "x": 1 } }, "upsert": true, "multi": false })
        );
    }

    #[test]
    fn delete_command_document() {
        let connection = MockConnection::new();
        connection.push_reply(doc! { "ok": 1, "n": 3 });

        let result = DeleteCommandProtocol::new(
            Namespace::new("test", "users"),
            WriteConcern::JOURNALED,
            vec![DeleteRequest::new(doc! { "age": { "$gt": 90 } })],
            MessageSettings::default(),
            &connection,
        )
        .execute()
        .unwrap();

        assert_eq!(result.count(), 3);
        assert_eq!(result.modified_count(), None);
        assert_eq!(
            connection.commands()[0],
            doc! {
                "delete": "users",
                "ordered": true,
                "writeConcern": { "w": 1, "j": true },
                "deletes": [{ "q": { "age": { "$gt": 90 } }, "limit": 0 }],
            }
        );
    }
}
