use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
};

use crate::error::AuthError;

pub const MONGODB_CR_MECHANISM: &str = "MONGODB-CR";
pub const GSSAPI_MECHANISM: &str = "GSSAPI";

/// Source database of credentials verified outside the server, such as Kerberos principals.
pub const EXTERNAL_SOURCE: &str = "$external";

/// Authentication protocols this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationMechanism {
    MongoDbCr,
    Gssapi,
}

impl AuthenticationMechanism {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthenticationMechanism::MongoDbCr => MONGODB_CR_MECHANISM,
            AuthenticationMechanism::Gssapi => GSSAPI_MECHANISM,
        }
    }
}

impl FromStr for AuthenticationMechanism {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            MONGODB_CR_MECHANISM => Ok(AuthenticationMechanism::MongoDbCr),
            GSSAPI_MECHANISM => Ok(AuthenticationMechanism::Gssapi),
            other => Err(AuthError::UnsupportedMechanism(other.to_string())),
        }
    }
}

impl fmt::Display for AuthenticationMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A principal and its secret, bound to the database that verifies them.
///
/// The mechanism is kept as the tag it was configured with; it is only resolved when the
/// credential is used, so a store may hold credentials this crate cannot drive.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    mechanism: String,
    source: String,
    user_name: String,
    password: Option<String>,
}

impl Credential {
    pub fn new(
        mechanism: impl Into<String>,
        source: impl Into<String>,
        user_name: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            mechanism: mechanism.into(),
            source: source.into(),
            user_name: user_name.into(),
            password,
        }
    }

    pub fn mongodb_cr(
        user_name: impl Into<String>,
        source: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(
            MONGODB_CR_MECHANISM,
            source,
            user_name,
            Some(password.into()),
        )
    }

    pub fn gssapi(user_name: impl Into<String>) -> Self {
        Self::new(GSSAPI_MECHANISM, EXTERNAL_SOURCE, user_name, None)
    }

    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    pub fn authentication_mechanism(&self) -> Result<AuthenticationMechanism, AuthError> {
        self.mechanism.parse()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("mechanism", &self.mechanism)
            .field("source", &self.source)
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Credentials keyed by source database. A source holds at most one credential.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    credentials: HashMap<String, Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_credentials<I>(credentials: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = Credential>,
    {
        let mut store = Self::new();
        for credential in credentials {
            store.add(credential)?;
        }
        Ok(store)
    }

    pub fn add(&mut self, credential: Credential) -> Result<(), AuthError> {
        if self.credentials.contains_key(credential.source()) {
            return Err(AuthError::DuplicateCredential(credential.source.clone()));
        }
        self.credentials
            .insert(credential.source.clone(), credential);
        Ok(())
    }

    pub fn databases(&self) -> HashSet<String> {
        self.credentials.keys().cloned().collect()
    }

    pub fn get(&self, database: &str) -> Option<&Credential> {
        self.credentials.get(database)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_tags() {
        assert_eq!(
            "MONGODB-CR".parse::<AuthenticationMechanism>().unwrap(),
            AuthenticationMechanism::MongoDbCr
        );
        assert_eq!(
            "GSSAPI".parse::<AuthenticationMechanism>().unwrap(),
            AuthenticationMechanism::Gssapi
        );
        assert_eq!(
            "PLAIN".parse::<AuthenticationMechanism>(),
            Err(AuthError::UnsupportedMechanism("PLAIN".into()))
        );
    }

    #[test]
    fn debug_hides_password() {
        let credential = Credential::mongodb_cr("bob", "admin", "pencil");
        let debug = format!("{credential:?}");

        assert!(!debug.contains("pencil"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn gssapi_uses_external_source() {
        let credential = Credential::gssapi("bob@EXAMPLE.COM");
        assert_eq!(credential.source(), EXTERNAL_SOURCE);
        assert_eq!(credential.password(), None);
    }

    #[test]
    fn store_rejects_duplicate_sources() {
        let mut store = CredentialStore::new();
        store.add(Credential::mongodb_cr("bob", "admin", "a")).unwrap();

        assert_eq!(
            store.add(Credential::mongodb_cr("alice", "admin", "b")),
            Err(AuthError::DuplicateCredential("admin".into()))
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("admin").unwrap().user_name(), "bob");
    }

    #[test]
    fn store_lists_databases() {
        let store = CredentialStore::from_credentials([
            Credential::mongodb_cr("bob", "a", "x"),
            Credential::mongodb_cr("bob", "b", "y"),
        ])
        .unwrap();

        assert_eq!(
            store.databases(),
            HashSet::from(["a".to_string(), "b".to_string()])
        );
        assert!(store.get("c").is_none());
    }
}
