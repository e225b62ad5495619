//! Passkey credential storage
//!
//! Three backends share the [`CredentialStore`] trait:
//! - **JSON file** (default): a single document, `.data/webauthn.json` unless
//!   `CREDENTIAL_STORE_PATH` says otherwise.
//! - **PostgreSQL**: selected when `DATABASE_URL` is set.
//! - **Memory**: development and tests; lost on restart.

mod file;
mod memory;
mod postgres;

pub use file::{JsonFileStore, DEFAULT_STORE_PATH};
pub use memory::MemoryStore;
pub use postgres::PostgresCredentialStore;

use std::sync::Arc;

use async_trait::async_trait;

use ariane_core::{ArianeError, StoredCredential};

use crate::config::Config;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StorageError> for ArianeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Serialization(msg) => ArianeError::Serialization(msg),
            other => ArianeError::Storage(other.to_string()),
        }
    }
}

/// Keyed collection of passkey credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<StoredCredential>, StorageError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredCredential>, StorageError>;

    /// Insert, or replace the record with the same id.
    async fn upsert(&self, credential: StoredCredential) -> Result<(), StorageError>;

    async fn check_health(&self) -> Result<(), StorageError>;

    /// Short backend name for diagnostics.
    fn backend(&self) -> &'static str;
}

/// Open the backend selected by configuration.
pub async fn open_store(config: &Config) -> Result<Arc<dyn CredentialStore>, StorageError> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Using PostgreSQL credential storage");
            let store =
                PostgresCredentialStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!(path = %config.credential_store_path.display(), "Using JSON file credential storage");
            Ok(Arc::new(JsonFileStore::new(&config.credential_store_path)))
        }
    }
}
