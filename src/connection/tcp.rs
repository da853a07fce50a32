use std::{
    collections::HashMap,
    net::{Shutdown, TcpStream},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
};

use log::{debug, trace, warn};

use super::{
    Connection, ConnectionError, FrameTransport, ReceiveCallback, ResponseBuffers, SendCallback,
    ServerAddress, ThreadPool,
};

const IO_WORKERS: usize = 4;

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// [`Connection`] over a plain TCP stream.
///
/// Blocking calls run on the caller's thread; async calls are queued on the connection's own
/// worker pool and complete there.
pub struct TcpConnection {
    inner: Arc<Inner>,
    pool: ThreadPool,
}

struct Inner {
    id: String,
    address: ServerAddress,
    writer: Mutex<FrameTransport<TcpStream>>,
    reader: Mutex<FrameTransport<TcpStream>>,
    // replies read on behalf of another in-flight request
    parked: Mutex<HashMap<i32, ResponseBuffers>>,
    // request awaiting a blocking receive, per sending thread
    pending: Mutex<HashMap<ThreadId, i32>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TcpConnection {
    pub fn connect(address: &ServerAddress) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect((address.host(), address.port()))?;
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;

        let id = format!("conn-{}", NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        debug!("opened connection [{id}] to server {address}");

        Ok(Self {
            pool: ThreadPool::new(&id, IO_WORKERS),
            inner: Arc::new(Inner {
                id,
                address: address.clone(),
                writer: Mutex::new(FrameTransport::new(stream)),
                reader: Mutex::new(FrameTransport::new(reader)),
                parked: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
            }),
        })
    }

    fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(job) = self.pool.execute(f) {
            warn!(
                "worker pool of connection [{}] is gone, completing inline",
                self.inner.id
            );
            job();
        }
    }
}

impl Inner {
    fn send(&self, bytes: &[u8], request_id: i32) -> Result<(), ConnectionError> {
        trace!("[{}] sending request {request_id}", self.id);
        lock(&self.writer).write_frame(bytes)
    }

    fn take_parked(&self, request_id: i32) -> Option<ResponseBuffers> {
        lock(&self.parked).remove(&request_id)
    }

    /// Reads frames until the one answering `request_id` shows up, parking the others.
    fn receive_for(&self, request_id: i32) -> Result<ResponseBuffers, ConnectionError> {
        if let Some(frame) = self.take_parked(request_id) {
            return Ok(frame);
        }
        let mut reader = lock(&self.reader);
        loop {
            // another receiver may have read our frame while we waited for the reader
            if let Some(frame) = self.take_parked(request_id) {
                return Ok(frame);
            }
            let frame = reader.read_frame()?;
            match frame.response_to() {
                Some(response_to) if response_to != request_id => {
                    trace!("[{}] parking reply to request {response_to}", self.id);
                    lock(&self.parked).insert(response_to, frame);
                }
                _ => return Ok(frame),
            }
        }
    }
}

impl Connection for TcpConnection {
    fn server_address(&self) -> &ServerAddress {
        &self.inner.address
    }

    fn id(&self) -> &str {
        &self.inner.id
    }

    fn send_message(&self, bytes: &[u8], request_id: i32) -> Result<(), ConnectionError> {
        self.inner.send(bytes, request_id)?;
        lock(&self.inner.pending).insert(thread::current().id(), request_id);
        Ok(())
    }

    /// Receives the reply to the last request this thread sent with [`Connection::send_message`],
    /// parking replies that belong to other exchanges on the connection.
    fn receive_message(&self) -> Result<ResponseBuffers, ConnectionError> {
        let pending = lock(&self.inner.pending).remove(&thread::current().id());
        match pending {
            Some(request_id) => self.inner.receive_for(request_id),
            None => lock(&self.inner.reader).read_frame(),
        }
    }

    fn send_message_async(&self, bytes: Vec<u8>, request_id: i32, callback: SendCallback) {
        let inner = Arc::clone(&self.inner);
        self.spawn(move || {
            let outcome = inner.send(&bytes, request_id);
            drop(bytes);
            callback(outcome);
        });
    }

    fn receive_message_async(&self, request_id: i32, callback: ReceiveCallback) {
        let inner = Arc::clone(&self.inner);
        self.spawn(move || callback(inner.receive_for(request_id)));
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        debug!("closing connection [{}]", self.inner.id);
        // wakes workers blocked on a read so the pool can be joined
        if let Err(e) = lock(&self.inner.writer).get_ref().shutdown(Shutdown::Both) {
            trace!("[{}] shutdown failed: {e}", self.inner.id);
        }
    }
}
