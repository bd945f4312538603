use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by remote directory implementations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Exclusive create found an object of the same name.
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    /// The named object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The name is empty or would escape the directory namespace.
    #[error("Invalid object name: {0}")]
    InvalidName(String),

    /// Any other backend failure (network, permissions, I/O).
    #[error("Directory I/O error: {0}")]
    Io(String),
}

/// A flat remote namespace of named blob objects.
///
/// This is the capability the lock manager is built on. The consistency
/// floor is read-after-write for a single caller: a completed `create` is
/// visible to that caller's subsequent `read` and listings. Listings may
/// race with concurrent writers and deleters from other callers.
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Create `name` with the given contents. Fails with
    /// [`DirectoryError::AlreadyExists`] if an object of that exact name
    /// is already present; the check and the write are one atomic step.
    async fn create(&self, name: &str, contents: &[u8]) -> Result<(), DirectoryError>;

    /// Read the full contents of `name`. Fails with
    /// [`DirectoryError::NotFound`] if the object does not exist.
    async fn read(&self, name: &str) -> Result<Vec<u8>, DirectoryError>;

    /// Delete `name`. Backends that can observe a missing object return
    /// [`DirectoryError::NotFound`]; backends that cannot (S3 DeleteObject)
    /// report success either way.
    async fn delete(&self, name: &str) -> Result<(), DirectoryError>;

    /// All object names in the directory, sorted.
    async fn list_all(&self) -> Result<Vec<String>, DirectoryError>;

    /// The subset of [`list_all`](Self::list_all) whose names start with
    /// `prefix`, sorted.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DirectoryError>;
}
