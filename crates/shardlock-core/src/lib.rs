//! Expiry-bounded exclusive locks over a remote blob store.
//!
//! This crate defines the abstractions shared between lock-store backends:
//! - `RemoteDirectory`: create/read/delete/list over a flat remote namespace
//! - `LockDescriptor` and its reversible name/content codec
//! - `LockManager` / `DirectoryLockManager`: acquire, release, liveness
//!   check, and owner-to-owner cloning
//! - `MemoryDirectory`: in-memory reference backend for tests

mod codec;
mod descriptor;
mod directory;
mod error;
mod manager;
mod memory;

pub use codec::{
    decode_contents, decode_name, encode_contents, encode_name, matches_resource_prefix,
    resource_prefix, LOCK_FILE_SUFFIX, NO_EXPIRY_MARKER,
};
pub use descriptor::LockDescriptor;
pub use directory::{DirectoryError, RemoteDirectory};
pub use error::{LockError, LockResult};
pub use manager::{DirectoryLockManager, LockManager};
pub use memory::MemoryDirectory;
