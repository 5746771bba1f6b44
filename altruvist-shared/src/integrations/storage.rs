/// S3 object storage for uploaded files.
///
/// Uploads are stored as full S3 URLs in user, charity and task records.
/// Reads go through short-lived presigned GET URLs.

use std::time::Duration;

use object_store::{
    aws::{AmazonS3, AmazonS3Builder},
    path::Path as ObjectPath,
    signer::Signer,
    ObjectStore,
};
use thiserror::Error;

pub const DEFAULT_REGION: &str = "eu-west-2";
pub const DEFAULT_BUCKET: &str = "skillanthropy-uploads";

/// Lifetime of presigned URLs
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object key is empty")]
    EmptyKey,

    #[error("Object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

pub struct StorageClient {
    store: AmazonS3,
    bucket: String,
}

impl StorageClient {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::new()
            .with_region(&config.region)
            .with_bucket_name(&config.bucket);

        if let Some(key_id) = config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        Ok(Self {
            store: builder.build()?,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Presigned GET URL for a stored file, or `None` if the key is unusable
    /// or signing fails.
    pub async fn signed_url(&self, file_name: &str, extract: bool) -> Option<String> {
        let Some(key) = extract_key(file_name, extract) else {
            tracing::error!(file_name, "Empty key after processing");
            return None;
        };

        match self
            .store
            .signed_url(http::Method::GET, &ObjectPath::from(key.as_str()), SIGNED_URL_TTL)
            .await
        {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to sign object URL");
                None
            }
        }
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        if key.trim().is_empty() {
            return Err(StorageError::EmptyKey);
        }
        self.store.delete(&ObjectPath::from(key)).await?;
        tracing::info!(key, bucket = %self.bucket, "Deleted object");
        Ok(())
    }
}

/// Object key for a stored file reference.
///
/// With `extract`, a full URL is cut after `.com/` and percent-decoded. In
/// every case `+` is read as a space. Returns `None` for an empty result or
/// undecodable input.
pub fn extract_key(file_name: &str, extract: bool) -> Option<String> {
    let key = match file_name.split_once(".com/") {
        Some((_, encoded)) if extract => urlencoding::decode(encoded).ok()?.into_owned(),
        _ => file_name.to_string(),
    };

    let key = key.replace('+', " ");
    (!key.is_empty()).then_some(key)
}
