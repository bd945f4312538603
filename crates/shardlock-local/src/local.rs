use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shardlock_core::{DirectoryError, RemoteDirectory};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Lock directory backed by a flat directory of files.
///
/// Object names map one-to-one onto file names under the root; names that
/// would leave the root (separators, `..`) are rejected. Exclusive create
/// uses `O_EXCL`, so two processes racing on the same name see exactly one
/// winner.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    /// Create a directory rooted at `root`, creating the path if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, DirectoryError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| DirectoryError::Io(format!("{}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    /// The root path objects are stored under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, DirectoryError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl RemoteDirectory for LocalDirectory {
    #[instrument(skip(self, contents), level = "debug")]
    async fn create(&self, name: &str, contents: &[u8]) -> Result<(), DirectoryError> {
        let path = self.object_path(name)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| io_error(name, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| io_error(name, e))?;
        // tokio files buffer internally; flush before drop so the record is
        // on disk when create returns.
        file.flush().await.map_err(|e| io_error(name, e))?;
        debug!("Created {} ({} bytes)", name, contents.len());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn read(&self, name: &str) -> Result<Vec<u8>, DirectoryError> {
        let path = self.object_path(name)?;
        fs::read(&path).await.map_err(|e| io_error(name, e))
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, name: &str) -> Result<(), DirectoryError> {
        let path = self.object_path(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| io_error(name, e))?;
        debug!("Deleted {}", name);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_all(&self) -> Result<Vec<String>, DirectoryError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| DirectoryError::Io(format!("{}: {}", self.root.display(), e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DirectoryError::Io(format!("{}: {}", self.root.display(), e)))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| DirectoryError::Io(format!("{}: {}", self.root.display(), e)))?;
            if !file_type.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DirectoryError> {
        let mut names = self.list_all().await?;
        names.retain(|name| name.starts_with(prefix));
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<(), DirectoryError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        return Err(DirectoryError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn io_error(name: &str, err: std::io::Error) -> DirectoryError {
    match err.kind() {
        ErrorKind::NotFound => DirectoryError::NotFound(name.to_string()),
        ErrorKind::AlreadyExists => DirectoryError::AlreadyExists(name.to_string()),
        _ => DirectoryError::Io(format!("{}: {}", name, err)),
    }
}
