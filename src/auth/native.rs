// MONGODB-CR challenge-response.

use log::debug;

use crate::{
    command,
    connection::Connection,
    document::BsonCodec,
    error::{AuthError, Result},
    protocol::execute_command,
};

use super::Credential;

/// `md5("<user>:mongo:<password>")`, hex encoded.
pub fn password_digest(user_name: &str, password: &str) -> String {
    format!("{:x}", md5::compute(format!("{user_name}:mongo:{password}")))
}

/// `md5(nonce + user + password_digest)`, hex encoded.
pub fn authentication_key(user_name: &str, password: &str, nonce: &str) -> String {
    let digest = password_digest(user_name, password);
    format!("{:x}", md5::compute(format!("{nonce}{user_name}{digest}")))
}

pub(crate) fn authenticate<C>(credential: &Credential, connection: &C) -> Result<()>
where
    C: Connection + ?Sized,
{
    let source = credential.source();
    let password = credential.password().ok_or_else(|| AuthError::Handshake {
        database: source.to_string(),
        reason: "MONGODB-CR requires a password".into(),
    })?;

    let reply = execute_command(source, &command::get_nonce(), &BsonCodec, connection)?;
    let nonce = reply
        .response()
        .get_str("nonce")
        .map_err(|_| AuthError::Handshake {
            database: source.to_string(),
            reason: "getnonce reply carried no nonce".into(),
        })?;
    debug!("received nonce for '{}' from {}", source, reply.address());

    let key = authentication_key(credential.user_name(), password, nonce);
    execute_command(
        source,
        &command::authenticate(credential.user_name(), nonce, &key),
        &BsonCodec,
        connection,
    )?;
    Ok(())
}
