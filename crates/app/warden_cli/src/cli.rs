use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Warden authorization server administration")]
pub struct Cli {
    /// PostgreSQL connection URL.
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/warden"
    )]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Manage registered clients
    #[command(subcommand)]
    Client(ClientCommand),

    /// Delete long expired access tokens and authorization codes
    Purge,

    /// Print version
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Register a new client
    Add(AddClient),

    /// List registered clients as JSON
    List,

    /// Remove a client together with its approvals and tokens
    Remove {
        /// Client id
        id: String,
    },

    /// Register or update clients from a JSON file holding an array of clients
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct AddClient {
    /// Client id
    #[arg(long)]
    pub id: String,

    /// Display name shown on the consent page
    #[arg(long)]
    pub name: String,

    /// Client profile: web_application, native_application or user_agent_based_application
    #[arg(long = "type")]
    pub client_type: String,

    /// Registered redirect URI
    #[arg(long)]
    pub redirect_uri: String,

    /// Space separated scope the client may request
    #[arg(long, default_value = "")]
    pub allowed_scope: String,

    /// Client secret (generated for web applications when omitted)
    #[arg(long)]
    pub secret: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub icon: Option<String>,

    #[arg(long)]
    pub contact_email: Option<String>,

    /// Skip the consent page for this client
    #[arg(long)]
    pub disable_user_consent: bool,
}
