use std::{error::Error, sync::Arc};

use clap::Parser;
use log::info;

use mongowire::{
    BsonCodec, CachingAuthenticator, Credential, CredentialStore, ServerAddress, TcpConnection,
    auth::MONGODB_CR_MECHANISM, execute_command,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server to connect to, as host[:port]
    #[arg(default_value = "localhost:27017")]
    address: ServerAddress,

    /// Database the command runs against
    #[arg(short, long, default_value = "admin")]
    database: String,

    /// Command name, sent as `{ <command>: 1 }`
    #[arg(short, long, default_value = "ping")]
    command: String,

    /// User to authenticate as before running the command
    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long, requires = "username")]
    password: Option<String>,

    /// Database holding the user's credentials; defaults to --database
    #[arg(long)]
    source: Option<String>,

    #[arg(long, default_value = MONGODB_CR_MECHANISM)]
    mechanism: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; RUST_LOG controls verbosity
    env_logger::init();

    let cli = Cli::parse();
    let connection = Arc::new(TcpConnection::connect(&cli.address)?);

    if let Some(user) = cli.username {
        let source = cli.source.unwrap_or_else(|| cli.database.clone());
        let credential = Credential::new(cli.mechanism, source, user, cli.password);
        let store = CredentialStore::from_credentials([credential])?;
        CachingAuthenticator::new(store, Arc::clone(&connection)).authenticate_all()?;
    }

    let mut command = bson::Document::new();
    command.insert(cli.command.as_str(), 1);
    info!("running {command} against {}", cli.database);

    match execute_command(&cli.database, &command, &BsonCodec, &*connection) {
        Ok(result) => {
            println!("{}", result.response());
            Ok(())
        }
        Err(e) => {
            if let Some(response) = e.server_response() {
                eprintln!("{response}");
            }
            Err(e.into())
        }
    }
}
