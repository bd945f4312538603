use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Configuration for the shardlock CLI.
#[derive(Parser, Debug)]
#[command(name = "shardlock")]
#[command(about = "Operate expiry-bounded locks over a remote blob store")]
pub struct Config {
    /// Lock store backend
    #[arg(long, value_enum, default_value = "local", env = "SHARDLOCK_BACKEND")]
    pub backend: Backend,

    /// Root directory for the local backend
    #[arg(long, default_value = ".shardlock", env = "SHARDLOCK_ROOT")]
    pub root: PathBuf,

    /// Bucket name for the s3 backend
    #[arg(long, env = "SHARDLOCK_BUCKET")]
    pub bucket: Option<String>,

    /// Key prefix the s3 backend stores lock records under
    #[arg(long, default_value = "locks/", env = "SHARDLOCK_KEY_PREFIX")]
    pub key_prefix: String,

    /// Endpoint override for S3-compatible stores (R2, MinIO)
    #[arg(long, env = "SHARDLOCK_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Region for the s3 backend
    #[arg(long, default_value = "us-east-1", env = "SHARDLOCK_REGION")]
    pub region: String,

    /// Use path-style addressing (required by most S3-compatible stores)
    #[arg(long, env = "SHARDLOCK_FORCE_PATH_STYLE")]
    pub force_path_style: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available lock store backends.
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Backend {
    /// Flat directory of lock files on the local filesystem
    Local,
    /// S3-compatible bucket
    S3,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire a lock on a resource
    Acquire {
        /// Resource to protect
        #[arg(long)]
        resource: String,

        /// Identity that will hold the lock
        #[arg(long)]
        owner: String,

        /// Lock lifetime in seconds; omit for a lock that never expires
        #[arg(long)]
        ttl_secs: Option<i64>,
    },

    /// Release the lock held by an owner on a resource
    Release {
        /// Resource the lock protects
        #[arg(long)]
        resource: String,

        /// Identity holding the lock
        #[arg(long)]
        owner: String,
    },

    /// Check whether any unexpired lock protects a resource
    Status {
        /// Resource to check
        #[arg(long)]
        resource: String,
    },

    /// Re-protect an owner's resource under a new owner
    Clone {
        /// Owner whose lock is being cloned
        #[arg(long)]
        from_owner: String,

        /// Owner the new lock is written for
        #[arg(long)]
        to_owner: String,

        /// Lifetime of the new lock in seconds; omit for no expiry
        #[arg(long)]
        ttl_secs: Option<i64>,
    },

    /// List lock records
    List {
        /// Only locks protecting this resource
        #[arg(long)]
        resource: Option<String>,

        /// Only locks held by this owner
        #[arg(long)]
        owner: Option<String>,
    },
}
