use std::time::Duration;

use bson::Document;

use crate::{
    connection::ServerAddress,
    document::{get_i32_lenient, is_truthy},
};

/// Outcome of one command round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    address: ServerAddress,
    response: Document,
    elapsed: Duration,
}

impl CommandResult {
    pub fn new(address: ServerAddress, response: Document, elapsed: Duration) -> Self {
        Self {
            address,
            response,
            elapsed,
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn response(&self) -> &Document {
        &self.response
    }

    pub fn into_response(self) -> Document {
        self.response
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// `true` when the reply's `ok` field is truthy. A missing `ok` counts as failure.
    pub fn is_ok(&self) -> bool {
        self.response.get("ok").is_some_and(is_truthy)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.response.get_str("errmsg").ok()
    }

    pub fn error_code(&self) -> Option<i32> {
        get_i32_lenient(&self.response, "code")
    }
}
