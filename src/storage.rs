//! Object storage access.
//!
//! Original uploads live in a private bucket and are never served directly;
//! the watermark pipeline is the only read path. The store is modeled as a
//! narrow trait so tests can substitute a deterministic fake.

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;

/// Narrow download interface over the private image store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Download the object at `key`, returning its raw bytes.
    ///
    /// The key has already passed the filename-safety pattern; no further
    /// escaping is applied here.
    async fn download(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// Storage-side failure, carrying the collaborator's message when available.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StorageError(pub String);

/// S3-backed implementation of [`ObjectStorage`].
#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a store from configuration, using the standard AWS credential
    /// chain. A custom endpoint supports S3-compatible stores.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let region = aws_config::Region::new(config.region.clone());
        let mut loader = aws_config::from_env().region(region);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        Self {
            client: S3Client::new(&sdk_config),
            bucket: config.bucket.clone(),
        }
    }

    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStore {
    async fn download(&self, key: &str) -> Result<Bytes, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError(format!("S3 fetch failed: {e}")))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError(format!("Failed to read S3 body: {e}")))?;

        let bytes = body.into_bytes();
        if bytes.is_empty() {
            return Err(StorageError("empty object".to_string()));
        }

        Ok(bytes)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// In-memory store for pipeline tests.
    #[derive(Default)]
    pub struct FakeStore {
        objects: HashMap<String, Bytes>,
    }

    impl FakeStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_object(mut self, key: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
            self.objects.insert(key.into(), bytes.into());
            self
        }
    }

    #[async_trait]
    impl ObjectStorage for FakeStore {
        async fn download(&self, key: &str) -> Result<Bytes, StorageError> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError(format!("object not found: {key}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeStore;
    use super::*;

    #[tokio::test]
    async fn test_fake_store_returns_bytes() {
        let store = FakeStore::new().with_object("a/b.jpg", &b"\xff\xd8\xff"[..]);
        let bytes = store.download("a/b.jpg").await.unwrap();
        assert_eq!(&bytes[..], b"\xff\xd8\xff");
    }

    #[tokio::test]
    async fn test_fake_store_missing_object_errors() {
        let store = FakeStore::new();
        let err = store.download("nope.jpg").await.unwrap_err();
        assert!(err.to_string().contains("nope.jpg"));
    }
}
