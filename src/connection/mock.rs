//! Scripted in-memory connection for unit tests.
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bson::Document;

use crate::protocol::{encode_reply, opcode::OP_REPLY, parse_query_message};

use super::{
    Connection, ConnectionError, ReceiveCallback, ResponseBuffers, SendCallback, ServerAddress,
};

type Reply = Box<dyn FnOnce(i32, &Document) -> Vec<u8> + Send>;
type Handler = Box<dyn Fn(&Document) -> Document + Send + Sync>;

/// Answers each sent command with the next queued reply, or with `handler` once the queue is
/// empty. Async calls complete inline on the caller's thread.
pub(crate) struct MockConnection {
    address: ServerAddress,
    replies: Mutex<VecDeque<Reply>>,
    handler: Option<Handler>,
    sent: Mutex<Vec<(String, Document)>>,
    pending: Mutex<VecDeque<(i32, Document)>>,
    receive_calls: AtomicUsize,
    fail_next_send: AtomicBool,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self {
            address: ServerAddress::default(),
            replies: Mutex::new(VecDeque::new()),
            handler: None,
            sent: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            receive_calls: AtomicUsize::new(0),
            fail_next_send: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Document) -> Document + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new()
        }
    }

    /// Queues `document` as the reply to the next command.
    pub(crate) fn push_reply(&self, document: Document) {
        self.push_frame(move |request_id, _| encode_reply(request_id, OP_REPLY, &[document]));
    }

    /// Queues a raw frame built from the request id and command of the next exchange.
    pub(crate) fn push_frame<F>(&self, build: F)
    where
        F: FnOnce(i32, &Document) -> Vec<u8> + Send + 'static,
    {
        self.replies.lock().unwrap().push_back(Box::new(build));
    }

    pub(crate) fn fail_next_send(&self) {
        self.fail_next_send.store(true, Ordering::SeqCst);
    }

    /// Namespace and command of every message sent so far.
    pub(crate) fn sent(&self) -> Vec<(String, Document)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn commands(&self) -> Vec<Document> {
        self.sent().into_iter().map(|(_, command)| command).collect()
    }

    pub(crate) fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    fn server_address(&self) -> &ServerAddress {
        &self.address
    }

    fn id(&self) -> &str {
        "mock"
    }

    fn send_message(&self, bytes: &[u8], request_id: i32) -> Result<(), ConnectionError> {
        if self.fail_next_send.swap(false, Ordering::SeqCst) {
            return Err(ConnectionError::Closed(self.address.clone()));
        }
        let (header, namespace, command) = parse_query_message(bytes);
        assert_eq!(header.request_id, request_id);

        self.sent
            .lock()
            .unwrap()
            .push((namespace, command.clone()));
        self.pending
            .lock()
            .unwrap()
            .push_back((request_id, command));
        Ok(())
    }

    fn receive_message(&self) -> Result<ResponseBuffers, ConnectionError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        let closed = || ConnectionError::Closed(self.address.clone());
        let (request_id, command) = self.pending.lock().unwrap().pop_front().ok_or_else(closed)?;
        let queued = self.replies.lock().unwrap().pop_front();
        let frame = match (queued, &self.handler) {
            (Some(build), _) => build(request_id, &command),
            (None, Some(handler)) => encode_reply(request_id, OP_REPLY, &[handler(&command)]),
            (None, None) => return Err(closed()),
        };
        Ok(ResponseBuffers::new(frame))
    }

    fn send_message_async(&self, bytes: Vec<u8>, request_id: i32, callback: SendCallback) {
        let outcome = self.send_message(&bytes, request_id);
        drop(bytes);
        callback(outcome);
    }

    fn receive_message_async(&self, _request_id: i32, callback: ReceiveCallback) {
        callback(self.receive_message());
    }
}
