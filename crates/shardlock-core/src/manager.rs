use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::codec;
use crate::descriptor::{require_non_empty, LockDescriptor};
use crate::directory::{DirectoryError, RemoteDirectory};
use crate::error::{LockError, LockResult};

/// Coordinates expiry-bounded exclusive locks over a shared remote
/// namespace.
///
/// Implementations are stateless: every call translates directly into
/// remote directory operations, so any number of instances across
/// processes may share one namespace. Operations that list-then-act can
/// race with concurrent callers; callers needing stronger guarantees
/// re-check after their dependent action.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Write `descriptor` as a new lock record.
    ///
    /// Not idempotent: if a record of the exact same name already exists
    /// the call fails with [`LockError::Conflict`], and the caller retries
    /// with a fresh owner or expiry.
    async fn acquire(&self, descriptor: &LockDescriptor) -> LockResult<()>;

    /// Delete the single lock record held by `owner` on `resource`.
    ///
    /// The stored expiry does not participate in matching. Fails with
    /// [`LockError::NotFound`] when no record matches and
    /// [`LockError::InvariantViolation`] when more than one does.
    async fn release(&self, resource: &str, owner: &str) -> LockResult<()>;

    /// Whether any unexpired lock record protects `resource`, regardless
    /// of owner.
    ///
    /// A snapshot read: the answer can be stale by the time the caller
    /// acts on it. Expired records count as inactive but stay listable
    /// until released.
    async fn is_acquired(&self, resource: &str) -> LockResult<bool>;

    /// Re-protect whatever resource `original_owner` holds under
    /// `new_owner`, without the caller knowing the resource in advance.
    ///
    /// Requires `original_owner` to hold exactly one record; its body, not
    /// its name, is the authoritative source for the resource. The
    /// original record is left in place. Returns the newly acquired
    /// descriptor.
    async fn clone_lock(
        &self,
        original_owner: &str,
        new_owner: &str,
        new_expiry: Option<DateTime<Utc>>,
    ) -> LockResult<LockDescriptor>;
}

/// Lock manager over any [`RemoteDirectory`].
///
/// Holds no state beyond the directory handle. Performs no retries of its
/// own; transient-error policy belongs to the directory adapter or the
/// caller.
#[derive(Clone)]
pub struct DirectoryLockManager {
    directory: Arc<dyn RemoteDirectory>,
}

impl DirectoryLockManager {
    /// Create a manager over the given directory.
    pub fn new(directory: Arc<dyn RemoteDirectory>) -> Self {
        Self { directory }
    }

    /// Every decodable lock record in the store. Objects without the
    /// `.lock` suffix are ignored (the namespace may hold foreign
    /// objects); a `.lock` name that does not decode surfaces
    /// [`LockError::Malformed`].
    pub async fn list_locks(&self) -> LockResult<Vec<LockDescriptor>> {
        let names = self
            .directory
            .list_all()
            .await
            .map_err(|e| store_error("list", "*", e))?;
        decode_lock_names(names)
    }

    /// The subset of [`list_locks`](Self::list_locks) held by `owner`.
    pub async fn locks_for_owner(&self, owner: &str) -> LockResult<Vec<LockDescriptor>> {
        require_non_empty(owner, "owner")?;
        Ok(self
            .list_locks()
            .await?
            .into_iter()
            .filter(|d| d.owner() == owner)
            .collect())
    }

    /// The subset of [`list_locks`](Self::list_locks) protecting
    /// `resource`, found by prefix listing rather than a full scan.
    pub async fn locks_for_resource(&self, resource: &str) -> LockResult<Vec<LockDescriptor>> {
        require_non_empty(resource, "resource")?;
        let prefix = codec::resource_prefix(resource);
        let names = self
            .directory
            .list_by_prefix(&prefix)
            .await
            .map_err(|e| store_error("list", &prefix, e))?;
        decode_lock_names(names)
    }
}

#[async_trait]
impl LockManager for DirectoryLockManager {
    #[instrument(
        skip(self, descriptor),
        level = "debug",
        fields(resource = descriptor.resource(), owner = descriptor.owner())
    )]
    async fn acquire(&self, descriptor: &LockDescriptor) -> LockResult<()> {
        let name = descriptor.lock_name();
        let contents = codec::encode_contents(descriptor)?;
        match self.directory.create(&name, &contents).await {
            Ok(()) => {
                debug!("Acquired lock {}", name);
                Ok(())
            }
            Err(DirectoryError::AlreadyExists(_)) => Err(LockError::Conflict(name)),
            Err(e) => Err(store_error("create", &name, e)),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn release(&self, resource: &str, owner: &str) -> LockResult<()> {
        require_non_empty(resource, "resource")?;
        require_non_empty(owner, "owner")?;

        let matches: Vec<LockDescriptor> = self
            .list_locks()
            .await?
            .into_iter()
            .filter(|d| d.resource() == resource && d.owner() == owner)
            .collect();

        match matches.as_slice() {
            [] => Err(LockError::NotFound(format!(
                "owner '{}' on resource '{}'",
                owner, resource
            ))),
            [descriptor] => {
                let name = descriptor.lock_name();
                self.directory
                    .delete(&name)
                    .await
                    .map_err(|e| store_error("delete", &name, e))?;
                debug!("Released lock {}", name);
                Ok(())
            }
            found => {
                warn!(
                    "Found {} lock records for owner '{}' on resource '{}'",
                    found.len(),
                    owner,
                    resource
                );
                Err(LockError::InvariantViolation(format!(
                    "{} lock records exist for owner '{}' on resource '{}', expected exactly one",
                    found.len(),
                    owner,
                    resource
                )))
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn is_acquired(&self, resource: &str) -> LockResult<bool> {
        require_non_empty(resource, "resource")?;
        let now = Utc::now();
        let locks = self.locks_for_resource(resource).await?;
        let acquired = locks.iter().any(|d| !d.is_expired(now));
        debug!(
            "Resource '{}' has {} lock records, acquired: {}",
            resource,
            locks.len(),
            acquired
        );
        Ok(acquired)
    }

    #[instrument(skip(self), level = "debug")]
    async fn clone_lock(
        &self,
        original_owner: &str,
        new_owner: &str,
        new_expiry: Option<DateTime<Utc>>,
    ) -> LockResult<LockDescriptor> {
        require_non_empty(original_owner, "owner")?;
        require_non_empty(new_owner, "owner")?;

        let held = self.locks_for_owner(original_owner).await?;
        let original = match held.as_slice() {
            [] => {
                return Err(LockError::NotFound(format!(
                    "owner '{}' holds no lock",
                    original_owner
                )))
            }
            [single] => single,
            many => {
                warn!(
                    "Owner '{}' holds {} lock records",
                    original_owner,
                    many.len()
                );
                return Err(LockError::InvariantViolation(format!(
                    "owner '{}' holds {} lock records, expected exactly one",
                    original_owner,
                    many.len()
                )));
            }
        };

        // The record body, not the name, is authoritative for the resource.
        let name = original.lock_name();
        let bytes = self
            .directory
            .read(&name)
            .await
            .map_err(|e| store_error("read", &name, e))?;
        let stored = codec::decode_contents(&bytes)?;

        let cloned = LockDescriptor::new(stored.resource(), new_owner, new_expiry)?;
        self.acquire(&cloned).await?;
        debug!(
            "Cloned lock on '{}' from owner '{}' to '{}'",
            stored.resource(),
            original_owner,
            new_owner
        );
        Ok(cloned)
    }
}

fn store_error(op: &'static str, name: &str, source: DirectoryError) -> LockError {
    LockError::Store {
        op,
        name: name.to_string(),
        source,
    }
}

fn decode_lock_names(names: Vec<String>) -> LockResult<Vec<LockDescriptor>> {
    let mut locks = Vec::new();
    for name in names {
        if !name.ends_with(codec::LOCK_FILE_SUFFIX) {
            continue;
        }
        locks.push(codec::decode_name(&name)?);
    }
    Ok(locks)
}
