use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use shardlock_core::{DirectoryError, RemoteDirectory};
use tracing::{debug, instrument, warn};

/// Maximum retries for transient errors (429 / 5xx).
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff.
const BASE_DELAY_MS: u64 = 200;

/// Lock directory backed by an S3-compatible bucket.
///
/// Object names live under `{key_prefix}{name}`; the prefix is the
/// caller's namespace choice (e.g. `locks/`) and is stripped from listing
/// results. Exclusive create relies on conditional `PutObject`, which S3,
/// R2 and MinIO all honor.
#[derive(Clone)]
pub struct S3Directory {
    s3_client: S3Client,
    bucket: String,
    key_prefix: String,
}

impl S3Directory {
    /// Create a directory over `bucket`, scoping all names under
    /// `key_prefix` (may be empty).
    pub fn new(s3_client: S3Client, bucket: String, key_prefix: String) -> Self {
        Self {
            s3_client,
            bucket,
            key_prefix,
        }
    }

    /// The S3 key for an object name.
    fn object_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }

    /// Sleep with exponential backoff + jitter.
    async fn backoff_sleep(attempt: u32) {
        let base = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
        let jitter = Duration::from_millis(rand_jitter());
        tokio::time::sleep(base + jitter).await;
    }

    /// Check if an S3 error is retryable (429 or 5xx).
    fn is_retryable_s3_error(err: &aws_sdk_s3::error::SdkError<impl std::fmt::Debug>) -> bool {
        use aws_sdk_s3::error::SdkError;
        match err {
            SdkError::ServiceError(e) => {
                let status = e.raw().status().as_u16();
                status == 429 || (500..=504).contains(&status)
            }
            SdkError::ResponseError(e) => {
                let status = e.raw().status().as_u16();
                status == 429 || (500..=504).contains(&status)
            }
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
            _ => false,
        }
    }

    /// Check if an S3 error is a 412 Precondition Failed.
    fn is_precondition_failed(err: &aws_sdk_s3::error::SdkError<impl std::fmt::Debug>) -> bool {
        use aws_sdk_s3::error::SdkError;
        match err {
            SdkError::ServiceError(e) => e.raw().status().as_u16() == 412,
            SdkError::ResponseError(e) => e.raw().status().as_u16() == 412,
            _ => false,
        }
    }

    /// Put an object only if no object of that key exists, with retry on
    /// transient errors. A 412 means the key is already taken.
    async fn put_object_exclusive(&self, key: &str, data: &[u8]) -> Result<(), DirectoryError> {
        for attempt in 0..=MAX_RETRIES {
            let result = self
                .s3_client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .if_none_match("*")
                .body(ByteStream::from(data.to_vec()))
                .send()
                .await;

            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if Self::is_precondition_failed(&e) {
                        return Err(DirectoryError::AlreadyExists(key.to_string()));
                    }
                    if Self::is_retryable_s3_error(&e) && attempt < MAX_RETRIES {
                        warn!(attempt, key, "S3 put_object retryable error, retrying");
                        Self::backoff_sleep(attempt).await;
                        continue;
                    }
                    return Err(DirectoryError::Io(format!("S3 put_object error: {}", e)));
                }
            }
        }
        unreachable!()
    }

    /// Get an object, with retry on transient errors.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, DirectoryError> {
        for attempt in 0..=MAX_RETRIES {
            let result = self
                .s3_client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await;

            match result {
                Ok(output) => {
                    let bytes = output
                        .body
                        .collect()
                        .await
                        .map_err(|e| {
                            DirectoryError::Io(format!("Failed to read S3 object body: {}", e))
                        })?
                        .into_bytes();
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if Self::is_retryable_s3_error(&e) && attempt < MAX_RETRIES {
                        warn!(attempt, key, "S3 get_object retryable error, retrying");
                        Self::backoff_sleep(attempt).await;
                        continue;
                    }
                    let service_error = e.into_service_error();
                    if service_error.is_no_such_key() {
                        return Err(DirectoryError::NotFound(key.to_string()));
                    }
                    return Err(DirectoryError::Io(format!(
                        "S3 get_object error: {}",
                        service_error
                    )));
                }
            }
        }
        unreachable!()
    }

    /// Delete an object, with retry on transient errors. S3 DeleteObject
    /// cannot observe a missing key, so this reports success either way.
    async fn delete_object(&self, key: &str) -> Result<(), DirectoryError> {
        for attempt in 0..=MAX_RETRIES {
            let result = self
                .s3_client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await;

            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if Self::is_retryable_s3_error(&e) && attempt < MAX_RETRIES {
                        warn!(attempt, key, "S3 delete_object retryable error, retrying");
                        Self::backoff_sleep(attempt).await;
                        continue;
                    }
                    return Err(DirectoryError::Io(format!("S3 delete_object error: {}", e)));
                }
            }
        }
        unreachable!()
    }

    /// List object keys under a key prefix, following continuation tokens,
    /// with retry on transient errors.
    async fn list_keys(&self, key_prefix: &str) -> Result<Vec<String>, DirectoryError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .s3_client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(key_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = {
                let mut result = None;
                for attempt in 0..=MAX_RETRIES {
                    match request.clone().send().await {
                        Ok(o) => {
                            result = Some(o);
                            break;
                        }
                        Err(e) => {
                            if Self::is_retryable_s3_error(&e) && attempt < MAX_RETRIES {
                                warn!(
                                    attempt,
                                    key_prefix, "S3 list_objects retryable error, retrying"
                                );
                                Self::backoff_sleep(attempt).await;
                                continue;
                            }
                            return Err(DirectoryError::Io(format!(
                                "S3 list_objects error: {}",
                                e
                            )));
                        }
                    }
                }
                result.ok_or_else(|| {
                    DirectoryError::Io("S3 list_objects exhausted retries".to_string())
                })?
            };

            if let Some(contents) = output.contents {
                for obj in contents {
                    if let Some(key) = obj.key {
                        keys.push(key);
                    }
                }
            }

            if output.is_truncated.unwrap_or(false) {
                continuation_token = output.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(keys)
    }

    /// Strip the directory's key prefix off listed keys.
    fn names_from_keys(&self, keys: Vec<String>) -> Vec<String> {
        keys.into_iter()
            .filter_map(|key| {
                key.strip_prefix(&self.key_prefix)
                    .map(|name| name.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl RemoteDirectory for S3Directory {
    #[instrument(skip(self, contents), level = "debug")]
    async fn create(&self, name: &str, contents: &[u8]) -> Result<(), DirectoryError> {
        validate_name(name)?;
        let key = self.object_key(name);
        self.put_object_exclusive(&key, contents).await?;
        debug!("Created {} ({} bytes)", name, contents.len());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn read(&self, name: &str) -> Result<Vec<u8>, DirectoryError> {
        validate_name(name)?;
        let key = self.object_key(name);
        match self.get_object(&key).await {
            Ok(bytes) => Ok(bytes),
            Err(DirectoryError::NotFound(_)) => Err(DirectoryError::NotFound(name.to_string())),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, name: &str) -> Result<(), DirectoryError> {
        validate_name(name)?;
        let key = self.object_key(name);
        self.delete_object(&key).await?;
        debug!("Deleted {}", name);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_all(&self) -> Result<Vec<String>, DirectoryError> {
        let keys = self.list_keys(&self.key_prefix).await?;
        Ok(self.names_from_keys(keys))
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DirectoryError> {
        let key_prefix = format!("{}{}", self.key_prefix, prefix);
        let keys = self.list_keys(&key_prefix).await?;
        Ok(self.names_from_keys(keys))
    }
}

fn validate_name(name: &str) -> Result<(), DirectoryError> {
    if name.is_empty() || name.contains('/') {
        return Err(DirectoryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Simple jitter: random-ish value 0..50ms using timestamp nanos.
fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % 50)
        .unwrap_or(0)
}
