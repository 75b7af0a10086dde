// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::path::Path;

use clap::Parser;
use cli::{AddClient, Cli, ClientCommand, Commands};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use warden_core::client::{ClientData, ClientRecord};
use warden_core::storage::{PgStorage, Storage, StorageError};

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    match &args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::Migrate => block_on(migrate(&args.database_url))?,
        Commands::Purge => block_on(purge(&args.database_url))?,
        Commands::Client(command) => {
            // Validate file input before touching the database.
            let import = match command {
                ClientCommand::Import { file } => Some(read_clients(file)?),
                _ => None,
            };
            block_on(client(&args.database_url, command, import))?
        }
    }

    Ok(())
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

async fn connect(database_url: &str) -> Result<PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?)
}

async fn migrate(database_url: &str) -> Result<()> {
    let pool = connect(database_url).await?;
    warden_core::migrate::migrate(&pool).await?;
    log::info!("database is up to date");
    Ok(())
}

async fn purge(database_url: &str) -> Result<()> {
    let storage = PgStorage::new(connect(database_url).await?);
    let report = warden_core::maintenance::purge_expired(&storage, chrono::Utc::now()).await?;
    log::info!(
        "purged {} access tokens and {} authorization codes",
        report.access_tokens,
        report.authorization_codes
    );
    Ok(())
}

fn read_clients(file: &Path) -> Result<Vec<ClientRecord>> {
    let raw = std::fs::read_to_string(file)?;
    let data: Vec<ClientData> = serde_json::from_str(&raw)?;
    Ok(data
        .into_iter()
        .map(ClientRecord::new)
        .collect::<core::result::Result<_, _>>()?)
}

fn add_client_data(add: &AddClient) -> ClientData {
    ClientData {
        id: add.id.clone(),
        name: add.name.clone(),
        description: add.description.clone(),
        secret: add.secret.clone(),
        client_type: add.client_type.clone(),
        redirect_uri: add.redirect_uri.clone(),
        icon: add.icon.clone(),
        allowed_scope: add.allowed_scope.clone(),
        contact_email: add.contact_email.clone(),
        disable_user_consent: add.disable_user_consent,
    }
}

async fn client(
    database_url: &str,
    command: &ClientCommand,
    import: Option<Vec<ClientRecord>>,
) -> Result<()> {
    let storage = PgStorage::new(connect(database_url).await?);

    match command {
        ClientCommand::Add(add) => {
            let client = ClientRecord::new(add_client_data(add))?;
            storage.add_client(&client).await?;
            log::info!("registered client {}", client.id());
            println!("{}", serde_json::to_string_pretty(&client)?);
        }
        ClientCommand::List => {
            let clients = storage.list_clients().await?;
            println!("{}", serde_json::to_string_pretty(&clients)?);
        }
        ClientCommand::Remove { id } => {
            if !storage.delete_client(id).await? {
                return Err(Error::Custom(format!("no client with id {id:?}")));
            }
            log::info!("removed client {id}");
        }
        ClientCommand::Import { .. } => {
            for client in import.unwrap_or_default() {
                match storage.add_client(&client).await {
                    Ok(()) => log::info!("registered client {}", client.id()),
                    Err(StorageError::Conflict(_)) => {
                        storage.update_client(&client).await?;
                        log::info!("updated client {}", client.id());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(())
}
