use std::{sync::Arc, time::Instant};

use bson::Document;
use log::{debug, trace};

use crate::{
    connection::{Connection, ConnectionError, ResponseBuffers, ServerAddress},
    document::DocumentCodec,
    error::{MongoError, Result},
};

use super::{
    CommandResult, MessageSettings, ReplyMessage, ResultCompleter, SingleResultFuture,
    message::{CommandMessage, OutboundMessage},
};

/// Runs `command` against `database` and blocks until the server has answered it.
///
/// Fails with [`MongoError::Framing`] if the reply does not answer this request, and with
/// [`MongoError::CommandFailure`] if the server reported `ok: 0`.
pub fn execute_command<C, D>(
    database: &str,
    command: &Document,
    codec: &D,
    connection: &C,
) -> Result<CommandResult>
where
    C: Connection + ?Sized,
    D: DocumentCodec + ?Sized,
{
    let message = CommandMessage::new(database, command).encode(codec, &MessageSettings::default())?;
    round_trip(message, codec, connection)
}

/// Blocking exchange of an already encoded message.
pub(crate) fn round_trip<C, D>(
    message: OutboundMessage,
    codec: &D,
    connection: &C,
) -> Result<CommandResult>
where
    C: Connection + ?Sized,
    D: DocumentCodec + ?Sized,
{
    let request_id = message.request_id();
    let started = Instant::now();
    trace!(
        "sending request {request_id} on connection [{}] to server {}",
        connection.id(),
        connection.server_address()
    );

    connection.send_message(message.as_bytes(), request_id)?;
    drop(message);

    let buffers = connection.receive_message()?;
    complete_round_trip(buffers, request_id, codec, connection.server_address(), started)
}

/// Validation shared by the blocking and non-blocking paths.
fn complete_round_trip<D>(
    buffers: ResponseBuffers,
    request_id: i32,
    codec: &D,
    address: &ServerAddress,
    started: Instant,
) -> Result<CommandResult>
where
    D: DocumentCodec + ?Sized,
{
    let elapsed = started.elapsed();
    let reply = ReplyMessage::parse(&buffers, codec, request_id, elapsed)?;
    drop(buffers);

    let response = reply
        .into_documents()
        .into_iter()
        .next()
        .ok_or_else(|| MongoError::InvalidResponse("command reply carried no document".into()))?;
    let result = CommandResult::new(address.clone(), response, elapsed);
    trace!("request {request_id} answered in {elapsed:?}");

    if result.is_ok() {
        Ok(result)
    } else {
        debug!(
            "command failed on server {address}: {}",
            result.error_message().unwrap_or("no error message")
        );
        Err(MongoError::CommandFailure(Box::new(result)))
    }
}

/// Starts `command` without blocking. The returned cell is completed from the connection's
/// I/O thread once the reply has been validated.
pub fn send_command_async<C, D>(
    database: &str,
    command: &Document,
    codec: D,
    connection: Arc<C>,
) -> SingleResultFuture<CommandResult>
where
    C: Connection + ?Sized + 'static,
    D: DocumentCodec + Send + Sync + 'static,
{
    let (completer, future) = SingleResultFuture::channel();
    let message = match CommandMessage::new(database, command)
        .encode(&codec, &MessageSettings::default())
    {
        Ok(message) => message,
        Err(e) => {
            completer.complete(Err(e));
            return future;
        }
    };

    let request_id = message.request_id();
    let exchange = AsyncRoundTrip {
        request_id,
        codec,
        connection: Arc::clone(&connection),
        completer,
        started: Instant::now(),
    };
    connection.send_message_async(
        message.into_bytes(),
        request_id,
        Box::new(move |outcome| exchange.on_event(RoundTripEvent::Sent(outcome))),
    );
    future
}

/// Completion events of one non-blocking exchange, in the order they can occur.
#[derive(Debug)]
pub enum RoundTripEvent {
    Sent(std::result::Result<(), ConnectionError>),
    Received(std::result::Result<ResponseBuffers, ConnectionError>),
}

/// State carried from the send completion to the receive completion.
struct AsyncRoundTrip<C: ?Sized, D> {
    request_id: i32,
    codec: D,
    connection: Arc<C>,
    completer: ResultCompleter<CommandResult>,
    started: Instant,
}

impl<C, D> AsyncRoundTrip<C, D>
where
    C: Connection + ?Sized + 'static,
    D: DocumentCodec + Send + Sync + 'static,
{
    fn on_event(self, event: RoundTripEvent) {
        match event {
            RoundTripEvent::Sent(Err(e)) => {
                debug!("request {} was not sent: {e}", self.request_id);
                self.completer.complete(Err(e.into()));
            }
            RoundTripEvent::Sent(Ok(())) => {
                let connection = Arc::clone(&self.connection);
                let request_id = self.request_id;
                connection.receive_message_async(
                    request_id,
                    Box::new(move |outcome| self.on_event(RoundTripEvent::Received(outcome))),
                );
            }
            RoundTripEvent::Received(outcome) => {
                let result = outcome.map_err(MongoError::from).and_then(|buffers| {
                    complete_round_trip(
                        buffers,
                        self.request_id,
                        &self.codec,
                        self.connection.server_address(),
                        self.started,
                    )
                });
                self.completer.complete(result);
            }
        }
    }
}
