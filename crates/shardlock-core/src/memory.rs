use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::directory::{DirectoryError, RemoteDirectory};

/// In-memory [`RemoteDirectory`]: the reference implementation of the
/// directory contract and the substrate for manager tests.
#[derive(Default)]
pub struct MemoryDirectory {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// True when the directory holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl RemoteDirectory for MemoryDirectory {
    async fn create(&self, name: &str, contents: &[u8]) -> Result<(), DirectoryError> {
        if name.is_empty() {
            return Err(DirectoryError::InvalidName(name.to_string()));
        }
        let mut objects = self.objects.write().await;
        if objects.contains_key(name) {
            return Err(DirectoryError::AlreadyExists(name.to_string()));
        }
        objects.insert(name.to_string(), contents.to_vec());
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, DirectoryError> {
        self.objects
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<(), DirectoryError> {
        self.objects
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))
    }

    async fn list_all(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.objects.read().await.keys().cloned().collect())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DirectoryError> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}
