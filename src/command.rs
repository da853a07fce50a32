//! Command documents.
//!
//! Builders for the commands the wire core sends on its own behalf (handshakes, liveness
//! probes) and for [`MapReduceCommand`], the one command whose document has enough structure
//! to deserve a typed builder.
//!
//! # Overview
//!
//! Every builder produces a plain [`Document`] whose first key is the command name, as the
//! server requires. Documents are run with
//! [`execute_command`](crate::protocol::execute_command) or
//! [`send_command_async`](crate::protocol::send_command_async).
//!
//! # Example
//! ```rust
//! use mongowire::command::{MapReduceCommand, MapReduceOutput};
//!
//! let command = MapReduceCommand::new("orders", "function() {}", "function(k, v) {}", MapReduceOutput::Inline)
//!     .limit(10)
//!     .to_document();
//! assert_eq!(command.get_str("mapreduce").unwrap(), "orders");
//! ```
//!
//! # See Also
//! - [`auth`](crate::auth): drives the handshake commands built here.
use bson::{Binary, Bson, Document, doc, spec::BinarySubtype};

use crate::{
    connection::Connection,
    document::DocumentCodec,
    error::Result,
    protocol::{CommandResult, execute_command},
};

pub fn ping() -> Document {
    doc! { "ping": 1 }
}

pub fn is_master() -> Document {
    doc! { "isMaster": 1 }
}

pub fn get_nonce() -> Document {
    doc! { "getnonce": 1 }
}

/// Second step of the MONGODB-CR handshake.
pub fn authenticate(user: &str, nonce: &str, key: &str) -> Document {
    doc! {
        "authenticate": 1,
        "user": user,
        "nonce": nonce,
        "key": key,
    }
}

pub fn sasl_start(mechanism: &str, payload: Vec<u8>) -> Document {
    doc! {
        "saslStart": 1,
        "mechanism": mechanism,
        "payload": binary(payload),
    }
}

pub fn sasl_continue(conversation_id: Bson, payload: Vec<u8>) -> Document {
    doc! {
        "saslContinue": 1,
        "conversationId": conversation_id,
        "payload": binary(payload),
    }
}

fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    })
}

/// What the server does with documents already in a map/reduce output collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputAction {
    #[default]
    Replace,
    Merge,
    Reduce,
}

impl OutputAction {
    fn key(self) -> &'static str {
        match self {
            OutputAction::Replace => "replace",
            OutputAction::Merge => "merge",
            OutputAction::Reduce => "reduce",
        }
    }
}

/// Where map/reduce results go.
#[derive(Debug, Clone, PartialEq)]
pub enum MapReduceOutput {
    /// Results are returned in the command reply.
    Inline,
    Collection {
        name: String,
        action: OutputAction,
        database: Option<String>,
        sharded: bool,
        non_atomic: bool,
    },
}

impl MapReduceOutput {
    pub fn collection(name: impl Into<String>, action: OutputAction) -> Self {
        MapReduceOutput::Collection {
            name: name.into(),
            action,
            database: None,
            sharded: false,
            non_atomic: false,
        }
    }

    fn to_document(&self) -> Document {
        match self {
            MapReduceOutput::Inline => doc! { "inline": 1 },
            MapReduceOutput::Collection {
                name,
                action,
                database,
                sharded,
                non_atomic,
            } => {
                let mut out = Document::new();
                out.insert(action.key(), name.as_str());
                if let Some(database) = database {
                    out.insert("db", database.as_str());
                }
                if *sharded {
                    out.insert("sharded", true);
                }
                if *non_atomic {
                    out.insert("nonAtomic", true);
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapReduceCommand {
    input: String,
    map: String,
    reduce: String,
    output: MapReduceOutput,
    query: Option<Document>,
    sort: Option<Document>,
    limit: i32,
    finalize: Option<String>,
    scope: Option<Document>,
    verbose: bool,
    js_mode: bool,
    extra_options: Document,
}

impl MapReduceCommand {
    pub fn new(
        input: impl Into<String>,
        map: impl Into<String>,
        reduce: impl Into<String>,
        output: MapReduceOutput,
    ) -> Self {
        Self {
            input: input.into(),
            map: map.into(),
            reduce: reduce.into(),
            output,
            query: None,
            sort: None,
            limit: 0,
            finalize: None,
            scope: None,
            verbose: true,
            js_mode: false,
            extra_options: Document::new(),
        }
    }

    pub fn query(mut self, query: Document) -> Self {
        self.query = Some(query);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Caps the number of input documents. Zero means no limit.
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = limit;
        self
    }

    pub fn finalize(mut self, finalize: impl Into<String>) -> Self {
        self.finalize = Some(finalize.into());
        self
    }

    pub fn scope(mut self, scope: Document) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn js_mode(mut self, js_mode: bool) -> Self {
        self.js_mode = js_mode;
        self
    }

    /// Adds a field copied verbatim into the command, replacing any field of the same name.
    pub fn extra_option(mut self, name: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.extra_options.insert(name.into(), value.into());
        self
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &MapReduceOutput {
        &self.output
    }

    pub fn to_document(&self) -> Document {
        let mut command = doc! {
            "mapreduce": self.input.as_str(),
            "map": Bson::JavaScriptCode(self.map.clone()),
            "reduce": Bson::JavaScriptCode(self.reduce.clone()),
            "verbose": self.verbose,
            "out": self.output.to_document(),
        };
        if let Some(query) = &self.query {
            command.insert("query", query.clone());
        }
        if let Some(finalize) = &self.finalize {
            command.insert("finalize", Bson::JavaScriptCode(finalize.clone()));
        }
        if let Some(sort) = &self.sort {
            command.insert("sort", sort.clone());
        }
        if self.limit > 0 {
            command.insert("limit", self.limit);
        }
        if let Some(scope) = &self.scope {
            command.insert("scope", scope.clone());
        }
        if self.js_mode {
            command.insert("jsMode", true);
        }
        for (name, value) in &self.extra_options {
            command.insert(name.clone(), value.clone());
        }
        command
    }

    /// Runs the command against `database` with a blocking round trip.
    pub fn execute<C, D>(&self, database: &str, codec: &D, connection: &C) -> Result<CommandResult>
    where
        C: Connection + ?Sized,
        D: DocumentCodec + ?Sized,
    {
        execute_command(database, &self.to_document(), codec, connection)
    }
}
