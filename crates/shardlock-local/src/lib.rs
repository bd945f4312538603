//! Local filesystem lock directory for shardlock.
//!
//! Maps remote object names onto files in a single flat directory, with
//! `create_new` providing the exclusive-create semantics the lock manager
//! relies on. Suitable for single-host deployments and integration tests.

mod local;

pub use local::LocalDirectory;
