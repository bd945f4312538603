//! S3-compatible lock directory for shardlock.
//!
//! Stores lock records as objects under a key prefix in one bucket, using
//! conditional writes (`If-None-Match: *`) for the exclusive-create
//! semantics the lock manager relies on. Works against AWS S3 and
//! S3-compatible stores (R2, MinIO) via endpoint override and path-style
//! addressing.

mod s3;

pub use s3::S3Directory;
