pub mod auth;
pub mod command;
pub mod connection;
pub mod document;
pub mod error;
pub mod protocol;
pub mod write;

pub use auth::{CachingAuthenticator, Credential, CredentialStore};
pub use connection::{Connection, ServerAddress, TcpConnection};
pub use document::{BsonCodec, DocumentCodec};
pub use error::{MongoError, Result};
pub use protocol::{CommandResult, SingleResultFuture, execute_command, send_command_async};
pub use write::{WriteCommandProtocol, WriteConcern, WriteResult};
