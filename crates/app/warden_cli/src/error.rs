use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("FlexiLogger::{:?}: {}", .0, .0)]
    FlexiLogger(#[from] flexi_logger::FlexiLoggerError),

    #[error("Json: {}", .0)]
    Json(#[from] serde_json::Error),

    #[error("Database: {}", .0)]
    Database(#[from] sqlx::Error),

    #[error("Migration: {}", .0)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Storage: {}", .0)]
    Storage(#[from] warden_core::storage::StorageError),

    #[error("{}", .0)]
    InvalidClient(#[from] warden_core::client::InvalidClient),
}
