//! In-memory credential store for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;

use ariane_core::StoredCredential;

use super::{CredentialStore, StorageError};

/// Thread-safe map of credential id to record. Lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    credentials: DashMap<String, StoredCredential>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<StoredCredential>, StorageError> {
        let mut found: Vec<_> = self
            .credentials
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredCredential>, StorageError> {
        Ok(self.credentials.get(id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, credential: StoredCredential) -> Result<(), StorageError> {
        self.credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    async fn check_health(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("credentials", &self.credentials.len())
            .finish()
    }
}
