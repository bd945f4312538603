mod config;

use std::sync::Arc;

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use shardlock_core::{DirectoryLockManager, LockDescriptor, LockManager, RemoteDirectory};
use shardlock_local::LocalDirectory;
use shardlock_s3::S3Directory;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::{Backend, Command, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    debug!("Using {:?} backend", config.backend);
    let directory = build_directory(&config).await?;
    let manager = DirectoryLockManager::new(directory);
    run(&manager, config.command).await
}

async fn build_directory(config: &Config) -> anyhow::Result<Arc<dyn RemoteDirectory>> {
    match config.backend {
        Backend::Local => {
            let directory = LocalDirectory::new(&config.root)
                .await
                .with_context(|| format!("failed to open lock root {}", config.root.display()))?;
            debug!("Using lock root {}", directory.root().display());
            Ok(Arc::new(directory))
        }
        Backend::S3 => {
            let bucket = config
                .bucket
                .clone()
                .context("--bucket is required with --backend s3")?;

            let mut loader = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()));
            if let Some(endpoint) = &config.endpoint_url {
                loader = loader.endpoint_url(endpoint.clone());
            }
            let sdk_config = loader.load().await;

            let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(config.force_path_style)
                .build();
            let client = aws_sdk_s3::Client::from_conf(s3_config);

            Ok(Arc::new(S3Directory::new(
                client,
                bucket,
                config.key_prefix.clone(),
            )))
        }
    }
}

async fn run(manager: &DirectoryLockManager, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Acquire {
            resource,
            owner,
            ttl_secs,
        } => {
            let descriptor = LockDescriptor::new(resource, owner, expiry_from_ttl(ttl_secs)?)?;
            manager.acquire(&descriptor).await?;
            println!("acquired {}", descriptor.lock_name());
        }
        Command::Release { resource, owner } => {
            manager.release(&resource, &owner).await?;
            println!("released lock held by '{}' on '{}'", owner, resource);
        }
        Command::Status { resource } => {
            let acquired = manager.is_acquired(&resource).await?;
            let locks = manager.locks_for_resource(&resource).await?;
            println!(
                "{}: {}",
                resource,
                if acquired { "locked" } else { "unlocked" }
            );
            let now = Utc::now();
            for lock in locks {
                println!("  {}", describe(&lock, now));
            }
        }
        Command::Clone {
            from_owner,
            to_owner,
            ttl_secs,
        } => {
            let cloned = manager
                .clone_lock(&from_owner, &to_owner, expiry_from_ttl(ttl_secs)?)
                .await?;
            println!("cloned to {}", cloned.lock_name());
        }
        Command::List { resource, owner } => {
            let mut locks = match &resource {
                Some(resource) => manager.locks_for_resource(resource).await?,
                None => manager.list_locks().await?,
            };
            if let Some(owner) = &owner {
                locks.retain(|lock| lock.owner() == owner);
            }
            if locks.is_empty() {
                println!("no lock records");
            } else {
                let now = Utc::now();
                for lock in locks {
                    println!("{}", describe(&lock, now));
                }
            }
        }
    }
    Ok(())
}

fn expiry_from_ttl(ttl_secs: Option<i64>) -> anyhow::Result<Option<DateTime<Utc>>> {
    match ttl_secs {
        None => Ok(None),
        Some(secs) if secs <= 0 => anyhow::bail!("--ttl-secs must be positive"),
        Some(secs) => {
            // Duration::seconds panics when out of range; go through the
            // checked forms.
            let expiry = Duration::try_seconds(secs)
                .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                .context("--ttl-secs is out of range")?;
            Ok(Some(expiry))
        }
    }
}

fn describe(lock: &LockDescriptor, now: DateTime<Utc>) -> String {
    let expiry = match lock.expires_at() {
        Some(at) if lock.is_expired(now) => format!("expired {}", at.to_rfc3339()),
        Some(at) => format!("expires {}", at.to_rfc3339()),
        None => "never expires".to_string(),
    };
    format!("{} held by '{}' ({})", lock.resource(), lock.owner(), expiry)
}
