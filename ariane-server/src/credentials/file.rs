//! Single-document JSON credential store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use ariane_core::{CredentialDocument, StoredCredential};

use super::{CredentialStore, StorageError};

/// Default location, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = ".data/webauthn.json";

/// Credentials kept in one JSON document on disk.
///
/// Upserts are serialized in-process by a mutex held across the whole
/// load/modify/save cycle. Saves go through a temp file and a rename, so a
/// reader never sees a half-written document.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn load(&self) -> Result<CredentialDocument, StorageError> {
        self.ensure_dir().await?;
        match fs::read(&self.path).await {
            Ok(bytes) => parse_document(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => self.create_empty().await,
            Err(e) => Err(e.into()),
        }
    }

    /// First writer wins; everyone else reads what the winner wrote.
    async fn create_empty(&self) -> Result<CredentialDocument, StorageError> {
        let empty = CredentialDocument::default();
        let body = serde_json::to_vec_pretty(&empty)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(mut file) => {
                file.write_all(&body).await?;
                file.flush().await?;
                tracing::debug!(path = %self.path.display(), "Created credential document");
                Ok(empty)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let bytes = fs::read(&self.path).await?;
                parse_document(&bytes)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, document: &CredentialDocument) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(document)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "webauthn.json".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

        fs::write(&tmp, &body).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn parse_document(bytes: &[u8]) -> Result<CredentialDocument, StorageError> {
    // A zero-length file means another process has created it but not yet written
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(CredentialDocument::default());
    }
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<StoredCredential>, StorageError> {
        Ok(self.load().await?.by_user(user_id))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredCredential>, StorageError> {
        Ok(self.load().await?.by_id(id).cloned())
    }

    async fn upsert(&self, credential: StoredCredential) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let credential_id = credential.id.clone();
        document.upsert(credential);
        self.save(&document).await?;

        tracing::info!(credential_id = %credential_id, "Credential stored in file");
        Ok(())
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        self.load().await.map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish()
    }
}
