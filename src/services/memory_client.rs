//! In-process blob store. Backs the `memory` backend and the test suites.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::blob_client::{
    BlobClient, BlobClientFactory, BlobError, BlobResult, ListPage, ListQuery, roll_up,
};
use crate::models::{blob::BlobMeta, bucket::BucketSummary, credential::Credential};

#[derive(Clone)]
struct StoredBlob {
    meta: BlobMeta,
    body: Bytes,
}

#[derive(Default)]
struct StoredBucket {
    updated: Option<DateTime<Utc>>,
    blobs: BTreeMap<String, StoredBlob>,
}

/// Cheap to clone; clones share the same buckets.
#[derive(Clone, Default)]
pub struct MemoryBlobClient {
    buckets: Arc<RwLock<BTreeMap<String, StoredBucket>>>,
    generation: Arc<AtomicI64>,
}

impl MemoryBlobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_bucket(&self, name: &str) -> BlobResult<()> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(name) {
            return Err(BlobError::BucketAlreadyExists(name.to_string()));
        }
        buckets.insert(
            name.to_string(),
            StoredBucket {
                updated: Some(Utc::now()),
                blobs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Every key in a bucket, in order. Test helper.
    #[cfg(test)]
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn next_generation(&self) -> i64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn not_found(bucket: &str, key: &str) -> BlobError {
    BlobError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

#[async_trait]
impl BlobClient for MemoryBlobClient {
    async fn list_buckets(&self, prefix: Option<&str>) -> BlobResult<Vec<BucketSummary>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .filter(|(name, _)| prefix.is_none_or(|p| name.starts_with(p)))
            .map(|(name, bucket)| BucketSummary {
                name: name.clone(),
                updated: bucket.updated,
            })
            .collect())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> BlobResult<BlobMeta> {
        if key.is_empty() {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        let generation = self.next_generation();
        let mut buckets = self.buckets.write().await;
        let stored = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobError::BucketNotFound(bucket.to_string()))?;

        let now = Utc::now();
        let digest = md5::compute(&body);
        let time_created = stored
            .blobs
            .get(key)
            .and_then(|existing| existing.meta.time_created)
            .unwrap_or(now);

        let mut meta = BlobMeta::new(bucket, key, body.len() as u64);
        meta.content_type = Some(content_type.to_string());
        meta.time_created = Some(time_created);
        meta.updated = Some(now);
        meta.md5_hash = Some(general_purpose::STANDARD.encode(digest.0));
        meta.etag = Some(format!("{:x}", digest));
        meta.generation = Some(generation);
        meta.metageneration = Some(1);
        meta.storage_class = Some("STANDARD".into());

        stored.blobs.insert(
            key.to_string(),
            StoredBlob {
                meta: meta.clone(),
                body,
            },
        );
        stored.updated = Some(now);
        Ok(meta)
    }

    async fn get(&self, bucket: &str, key: &str) -> BlobResult<Bytes> {
        let buckets = self.buckets.read().await;
        let stored = buckets
            .get(bucket)
            .ok_or_else(|| BlobError::BucketNotFound(bucket.to_string()))?;
        stored
            .blobs
            .get(key)
            .map(|blob| blob.body.clone())
            .ok_or_else(|| not_found(bucket, key))
    }

    async fn head(&self, bucket: &str, key: &str) -> BlobResult<Option<BlobMeta>> {
        let buckets = self.buckets.read().await;
        let stored = buckets
            .get(bucket)
            .ok_or_else(|| BlobError::BucketNotFound(bucket.to_string()))?;
        Ok(stored.blobs.get(key).map(|blob| blob.meta.clone()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()> {
        let mut buckets = self.buckets.write().await;
        let stored = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobError::BucketNotFound(bucket.to_string()))?;
        stored
            .blobs
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| not_found(bucket, key))
    }

    async fn list(&self, bucket: &str, query: &ListQuery) -> BlobResult<ListPage> {
        let buckets = self.buckets.read().await;
        let stored = buckets
            .get(bucket)
            .ok_or_else(|| BlobError::BucketNotFound(bucket.to_string()))?;
        let under_prefix = stored
            .blobs
            .range(query.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&query.prefix))
            .map(|(_, blob)| blob.meta.clone());
        Ok(roll_up(under_prefix, query))
    }

    async fn rename(&self, bucket: &str, key: &str, new_key: &str) -> BlobResult<BlobMeta> {
        if new_key.is_empty() {
            return Err(BlobError::InvalidKey(new_key.to_string()));
        }
        let generation = self.next_generation();
        let mut buckets = self.buckets.write().await;
        let stored = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobError::BucketNotFound(bucket.to_string()))?;
        let mut blob = stored
            .blobs
            .remove(key)
            .ok_or_else(|| not_found(bucket, key))?;

        let now = Utc::now();
        blob.meta.key = new_key.to_string();
        blob.meta.id = format!("{}/{}", bucket, new_key);
        blob.meta.generation = Some(generation);
        blob.meta.time_created = Some(now);
        blob.meta.updated = Some(now);
        let meta = blob.meta.clone();
        stored.blobs.insert(new_key.to_string(), blob);
        stored.updated = Some(now);
        Ok(meta)
    }
}

/// Hands every request a handle onto the same shared store.
#[derive(Clone, Default)]
pub struct MemoryClientFactory {
    store: MemoryBlobClient,
}

impl MemoryClientFactory {
    pub fn new(store: MemoryBlobClient) -> Self {
        Self { store }
    }
}

impl BlobClientFactory for MemoryClientFactory {
    fn make_client(&self, _credential: &Credential) -> BlobResult<Arc<dyn BlobClient>> {
        Ok(Arc::new(self.store.clone()))
    }
}
