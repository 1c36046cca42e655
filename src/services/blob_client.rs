//! The flat key-value blob interface the folder emulation is layered on.
//!
//! Backends implement [`BlobClient`]; the HTTP layer obtains one per request
//! through a [`BlobClientFactory`].

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::models::{blob::BlobMeta, bucket::BucketSummary, credential::Credential};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error("{0}")]
    Provider(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BlobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound { .. })
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Parameters for a prefix listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub prefix: String,
    /// When set, keys containing the delimiter after `prefix` are rolled up
    /// into [`ListPage::prefixes`] instead of being returned as blobs.
    pub delimiter: Option<String>,
    /// Stop after this many entries (blobs plus prefixes).
    pub max_results: Option<usize>,
}

impl ListQuery {
    /// Every blob under `prefix`, no roll-up.
    pub fn recursive(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// One directory level under `prefix`, rolled up on `/`.
    pub fn shallow(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some("/".into()),
            max_results: None,
        }
    }

    pub fn limit(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

/// Result of a listing, blobs in lexicographic key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub blobs: Vec<BlobMeta>,
    /// De-duplicated common prefixes, each ending with the delimiter.
    pub prefixes: Vec<String>,
}

/// Capability set of an object store: flat keys, no directories.
///
/// Every method addresses a single bucket, so cross-bucket renames cannot be
/// expressed.
#[async_trait]
pub trait BlobClient: Send + Sync {
    async fn list_buckets(&self, prefix: Option<&str>) -> BlobResult<Vec<BucketSummary>>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> BlobResult<BlobMeta>;

    /// Fails with [`BlobError::NotFound`] when the key is absent.
    async fn get(&self, bucket: &str, key: &str) -> BlobResult<Bytes>;

    async fn head(&self, bucket: &str, key: &str) -> BlobResult<Option<BlobMeta>>;

    async fn exists(&self, bucket: &str, key: &str) -> BlobResult<bool> {
        Ok(self.head(bucket, key).await?.is_some())
    }

    /// Fails with [`BlobError::NotFound`] when the key is absent.
    async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()>;

    async fn list(&self, bucket: &str, query: &ListQuery) -> BlobResult<ListPage>;

    /// Move a single blob to `new_key` within the same bucket.
    async fn rename(&self, bucket: &str, key: &str, new_key: &str) -> BlobResult<BlobMeta>;
}

/// Builds a client for one request from the caller's credential.
pub trait BlobClientFactory: Send + Sync {
    fn make_client(&self, credential: &Credential) -> BlobResult<Arc<dyn BlobClient>>;
}

/// Split keys into direct children and rolled-up prefixes.
///
/// Shared by the backends that list from a sorted key space rather than
/// delegating the roll-up to a provider. Input must be in key order.
pub(crate) fn roll_up<I>(blobs: I, query: &ListQuery) -> ListPage
where
    I: IntoIterator<Item = BlobMeta>,
{
    let mut page = ListPage::default();
    let limit = query.max_results.unwrap_or(usize::MAX);

    for blob in blobs {
        if !blob.key.starts_with(&query.prefix) {
            continue;
        }
        if page.blobs.len() + page.prefixes.len() >= limit {
            break;
        }
        if let Some(delim) = query.delimiter.as_deref() {
            if let Some(prefix) = common_prefix(&blob.key, &query.prefix, delim) {
                if page.prefixes.last() != Some(&prefix) {
                    page.prefixes.push(prefix);
                }
                continue;
            }
        }
        page.blobs.push(blob);
    }

    page
}

/// Roll a key up to its first delimiter after `prefix`, if it has one.
fn common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let pos = rest.find(delimiter)?;
    Some(format!("{}{}", prefix, &rest[..pos + delimiter.len()]))
}
