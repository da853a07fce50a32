use bson::Document;
use log::{debug, trace};

use crate::{
    command,
    connection::{Connection, ServerAddress},
    document::BsonCodec,
    error::{AuthError, Result},
    protocol::execute_command,
};

use super::{Credential, credential::GSSAPI_MECHANISM};

/// Upper bound on `saslContinue` round trips before the conversation is abandoned.
const MAX_CONVERSATION_STEPS: usize = 10;

/// One side of a GSSAPI security context, e.g. a Kerberos client context.
pub trait SecurityContext: Send {
    /// Consumes the server's challenge and produces the next token. The first call receives
    /// an empty challenge.
    fn step(&mut self, challenge: &[u8]) -> std::result::Result<Vec<u8>, String>;
}

/// Creates security contexts for GSSAPI handshakes.
pub trait SecurityContextFactory: Send + Sync {
    fn create(
        &self,
        credential: &Credential,
        address: &ServerAddress,
    ) -> std::result::Result<Box<dyn SecurityContext>, String>;
}

fn handshake_error(credential: &Credential, reason: impl Into<String>) -> AuthError {
    AuthError::Handshake {
        database: credential.source().to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn authenticate<C>(
    credential: &Credential,
    connection: &C,
    factory: Option<&dyn SecurityContextFactory>,
) -> Result<()>
where
    C: Connection + ?Sized,
{
    let factory = factory
        .ok_or_else(|| handshake_error(credential, "no GSSAPI security context configured"))?;
    let mut context = factory
        .create(credential, connection.server_address())
        .map_err(|reason| handshake_error(credential, reason))?;

    let token = context
        .step(&[])
        .map_err(|reason| handshake_error(credential, reason))?;
    let mut reply = execute_command(
        credential.source(),
        &command::sasl_start(GSSAPI_MECHANISM, token),
        &BsonCodec,
        connection,
    )?
    .into_response();

    for step in 0..MAX_CONVERSATION_STEPS {
        if reply.get_bool("done").unwrap_or(false) {
            debug!("GSSAPI conversation for '{}' finished", credential.user_name());
            return Ok(());
        }
        trace!("GSSAPI step {step} for '{}'", credential.user_name());

        let (conversation_id, challenge) = challenge(credential, &reply)?;
        let token = context
            .step(&challenge)
            .map_err(|reason| handshake_error(credential, reason))?;
        reply = execute_command(
            credential.source(),
            &command::sasl_continue(conversation_id, token),
            &BsonCodec,
            connection,
        )?
        .into_response();
    }

    if reply.get_bool("done").unwrap_or(false) {
        return Ok(());
    }
    Err(handshake_error(
        credential,
        format!("conversation not finished after {MAX_CONVERSATION_STEPS} steps"),
    )
    .into())
}

fn challenge(credential: &Credential, reply: &Document) -> Result<(bson::Bson, Vec<u8>)> {
    let conversation_id = reply
        .get("conversationId")
        .cloned()
        .ok_or_else(|| handshake_error(credential, "reply carried no conversationId"))?;
    let payload = reply
        .get_binary_generic("payload")
        .cloned()
        .unwrap_or_default();
    Ok((conversation_id, payload))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bson::{Binary, Bson, doc, spec::BinarySubtype};

    use super::*;
    use crate::{connection::mock::MockConnection, error::MongoError};

    /// Answers each challenge with the challenge bytes plus one, recording what it saw.
    struct EchoContext {
        seen: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SecurityContext for EchoContext {
        fn step(&mut self, challenge: &[u8]) -> std::result::Result<Vec<u8>, String> {
            self.seen.lock().unwrap().push(challenge.to_vec());
            Ok(challenge.iter().map(|b| b + 1).collect())
        }
    }

    struct EchoFactory {
        seen: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SecurityContextFactory for EchoFactory {
        fn create(
            &self,
            credential: &Credential,
            _address: &ServerAddress,
        ) -> std::result::Result<Box<dyn SecurityContext>, String> {
            assert_eq!(credential.user_name(), "bob@EXAMPLE.COM");
            Ok(Box::new(EchoContext {
                seen: Arc::clone(&self.seen),
            }))
        }
    }

    fn payload(bytes: &[u8]) -> Bson {
        Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.to_vec(),
        })
    }

    #[test]
    fn conversation_runs_until_done() {
        let connection = MockConnection::new();
        connection.push_reply(doc! { "conversationId": 1, "done": false, "payload": payload(&[1]), "ok": 1 });
        connection.push_reply(doc! { "conversationId": 1, "done": false, "payload": payload(&[5]), "ok": 1 });
        connection.push_reply(doc! { "conversationId": 1, "done": true, "payload": payload(&[]), "ok": 1 });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = EchoFactory {
            seen: Arc::clone(&seen),
        };

        authenticate(&Credential::gssapi("bob@EXAMPLE.COM"), &connection, Some(&factory)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![vec![], vec![1], vec![5]]);
        let sent = connection.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].0, "$external.$cmd");
        assert_eq!(sent[0].1.get_str("mechanism").unwrap(), "GSSAPI");
        assert_eq!(sent[1].1.get_i32("conversationId").unwrap(), 1);
        assert_eq!(sent[1].1.get_binary_generic("payload").unwrap(), &vec![2]);
        assert_eq!(sent[2].1.get_binary_generic("payload").unwrap(), &vec![6]);
    }

    #[test]
    fn missing_factory_is_handshake_error() {
        let connection = MockConnection::new();

        let err = authenticate(&Credential::gssapi("bob@EXAMPLE.COM"), &connection, None)
            .unwrap_err();
        assert!(matches!(err, MongoError::Auth(AuthError::Handshake { .. })));
        assert!(connection.sent().is_empty());
    }

    #[test]
    fn endless_conversation_is_abandoned() {
        let connection = MockConnection::with_handler(|_| {
            doc! { "conversationId": 9, "done": false, "payload": payload(&[0]), "ok": 1 }
        });
        let factory = EchoFactory {
            seen: Arc::new(Mutex::new(Vec::new())),
        };

        let err = authenticate(&Credential::gssapi("bob@EXAMPLE.COM"), &connection, Some(&factory))
            .unwrap_err();
        assert!(matches!(err, MongoError::Auth(AuthError::Handshake { .. })));
        assert_eq!(connection.sent().len(), MAX_CONVERSATION_STEPS + 1);
    }
}
