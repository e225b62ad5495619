//! PostgreSQL storage for passkey credentials

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ariane_core::StoredCredential;

use super::{CredentialStore, StorageError};

/// PostgreSQL-backed credential storage
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    /// Connect a new pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::info!(max_connections, "Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<StoredCredential>, StorageError> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT credential_id, user_id, public_key, sign_count, transports, passkey_data
            FROM webauthn_credentials
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(CredentialRow::into_stored).collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredCredential>, StorageError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT credential_id, user_id, public_key, sign_count, transports, passkey_data
            FROM webauthn_credentials
            WHERE credential_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(CredentialRow::into_stored).transpose()
    }

    async fn upsert(&self, credential: StoredCredential) -> Result<(), StorageError> {
        let transports = credential
            .transports
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO webauthn_credentials
                (credential_id, user_id, public_key, sign_count, transports, passkey_data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (credential_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                public_key = EXCLUDED.public_key,
                sign_count = EXCLUDED.sign_count,
                transports = EXCLUDED.transports,
                passkey_data = EXCLUDED.passkey_data,
                last_used_at = NOW()
            "#,
        )
        .bind(&credential.id)
        .bind(&credential.user_id)
        .bind(&credential.public_key)
        .bind(i64::from(credential.counter))
        .bind(transports)
        .bind(&credential.passkey)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        tracing::info!(credential_id = %credential.id, "Credential stored in database");
        Ok(())
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Database row for credentials
#[derive(sqlx::FromRow)]
struct CredentialRow {
    credential_id: String,
    user_id: String,
    public_key: String,
    sign_count: i64,
    transports: Option<serde_json::Value>,
    passkey_data: Option<serde_json::Value>,
}

impl CredentialRow {
    fn into_stored(self) -> Result<StoredCredential, StorageError> {
        let counter = u32::try_from(self.sign_count)
            .map_err(|_| StorageError::Serialization(format!("sign_count out of range: {}", self.sign_count)))?;

        let transports = self
            .transports
            .map(serde_json::from_value::<Vec<String>>)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(StoredCredential {
            id: self.credential_id,
            public_key: self.public_key,
            counter,
            user_id: self.user_id,
            transports,
            passkey: self.passkey_data,
        })
    }
}

impl std::fmt::Debug for PostgresCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCredentialStore")
            .field("pool", &"<PgPool>")
            .finish()
    }
}
