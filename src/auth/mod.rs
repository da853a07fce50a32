//! Authentication of a connector against its credential sources.
//!
//! [`CachingAuthenticator`] remembers which source databases have completed a handshake and
//! only ever authenticates the rest. Handshakes are blocking round trips driven by the
//! mechanism named in each [`Credential`]:
//!
//! - `MONGODB-CR`: `getnonce`, then `authenticate` with an MD5 key derived from the nonce.
//! - `GSSAPI`: a SASL conversation whose tokens come from a pluggable [`SecurityContext`].
//!
//! Any other mechanism aborts the batch with
//! [`AuthError::UnsupportedMechanism`](crate::error::AuthError::UnsupportedMechanism).
//!
//! # Concurrency
//!
//! The authenticated set is shared by every thread holding the authenticator and only grows.
//! Two racing [`CachingAuthenticator::authenticate_all`] calls may both authenticate the same
//! source; the server accepts the repeated handshake.
mod credential;
mod gssapi;
mod native;

use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
};

use log::{debug, info};

use crate::{
    connection::Connection,
    error::{AuthError, Result},
};

pub use credential::{
    AuthenticationMechanism, Credential, CredentialStore, EXTERNAL_SOURCE, GSSAPI_MECHANISM,
    MONGODB_CR_MECHANISM,
};
pub use gssapi::{SecurityContext, SecurityContextFactory};
pub use native::{authentication_key, password_digest};

pub struct CachingAuthenticator<C: ?Sized> {
    credentials: CredentialStore,
    authenticated: RwLock<HashSet<String>>,
    security_contexts: Option<Arc<dyn SecurityContextFactory>>,
    connection: Arc<C>,
}

impl<C> CachingAuthenticator<C>
where
    C: Connection + ?Sized,
{
    pub fn new(credentials: CredentialStore, connection: Arc<C>) -> Self {
        Self {
            credentials,
            authenticated: RwLock::new(HashSet::new()),
            security_contexts: None,
            connection,
        }
    }

    /// Supplies the security contexts used for GSSAPI credentials.
    pub fn with_security_context_factory(mut self, factory: Arc<dyn SecurityContextFactory>) -> Self {
        self.security_contexts = Some(factory);
        self
    }

    /// Authenticates every credential source that has not been authenticated yet.
    ///
    /// Stops at the first failure; sources authenticated before it stay recorded.
    pub fn authenticate_all(&self) -> Result<()> {
        let mut pending: Vec<String> = {
            let authenticated = self
                .authenticated
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            self.credentials
                .databases()
                .into_iter()
                .filter(|source| !authenticated.contains(source))
                .collect()
        };
        pending.sort();

        for source in pending {
            let credential = self
                .credentials
                .get(&source)
                .ok_or_else(|| AuthError::MissingCredential(source.clone()))?;
            self.authenticate(credential)?;
            self.authenticated
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(source);
        }
        Ok(())
    }

    fn authenticate(&self, credential: &Credential) -> Result<()> {
        let mechanism = credential.authentication_mechanism()?;
        debug!(
            "authenticating '{}' against '{}' with {} on connection [{}]",
            credential.user_name(),
            credential.source(),
            mechanism,
            self.connection.id()
        );

        match mechanism {
            AuthenticationMechanism::MongoDbCr => native::authenticate(credential, &*self.connection)?,
            AuthenticationMechanism::Gssapi => gssapi::authenticate(
                credential,
                &*self.connection,
                self.security_contexts.as_deref(),
            )?,
        }

        info!(
            "authenticated '{}' against '{}' on server {}",
            credential.user_name(),
            credential.source(),
            self.connection.server_address()
        );
        Ok(())
    }

    pub fn is_authenticated(&self, source: &str) -> bool {
        self.authenticated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(source)
    }

    pub fn authenticated_databases(&self) -> HashSet<String> {
        self.authenticated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    #[cfg(test)]
    fn mark_authenticated(&self, source: &str) {
        self.authenticated
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.to_string());
    }
}
