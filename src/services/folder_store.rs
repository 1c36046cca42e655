//! src/services/folder_store.rs
//!
//! FolderStore: directory semantics (folders, renames, deletes, conflict
//! detection) reconstructed on top of a flat blob store.
//!
//! A folder is either a zero-byte marker blob at `path/` (empty folder) or the
//! set of blobs whose keys start with `path/`. Nothing here is cached: every
//! operation reads the current remote state, then acts. There is no
//! compare-and-swap between the existence check and the mutation, so two
//! concurrent renames or deletes of the same key race at the provider.

use std::{collections::HashMap, sync::Arc};

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::blob_client::{BlobClient, BlobError, ListQuery};
use crate::models::{
    bucket::BucketSummary,
    listing::{
        FOLDER_MARKER_CONTENT_TYPE, FileContent, FolderCreated, FolderEntry, Listing, ReadFormat,
        RenameReceipt, SaveContent, SaveReceipt,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Missing or malformed request input.
    #[error("{0}")]
    Validation(String),
    /// The request would break a folder invariant.
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    /// Unexpected failure from the storage layer.
    #[error("{0}")]
    Provider(String),
}

impl StoreError {
    pub fn status(&self) -> u16 {
        match self {
            StoreError::Validation(_) => 400,
            StoreError::Conflict(_) => 409,
            StoreError::NotFound(_) => 404,
            StoreError::Provider(_) => 500,
        }
    }
}

impl From<BlobError> for StoreError {
    fn from(err: BlobError) -> Self {
        StoreError::Provider(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Copy, Debug)]
pub struct StoreOptions {
    /// When set, `list`, `read` and `download` log failures and answer with an
    /// empty value so the front end keeps rendering.
    pub degrade_to_empty_on_error: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            degrade_to_empty_on_error: true,
        }
    }
}

/// What a hierarchical path currently resolves to in the flat key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    Missing,
    File,
    /// Only the `path/` marker exists.
    EmptyFolder,
    /// At least one blob other than the marker lives under `path/`.
    NonEmptyFolder,
}

/// Scoped to one request; holds the request's client and nothing else.
#[derive(Clone)]
pub struct FolderStore {
    client: Arc<dyn BlobClient>,
    options: StoreOptions,
}

impl FolderStore {
    pub fn new(client: Arc<dyn BlobClient>, options: StoreOptions) -> Self {
        Self { client, options }
    }

    pub async fn list_buckets(&self, prefix: Option<&str>) -> StoreResult<Vec<BucketSummary>> {
        self.client.list_buckets(prefix).await.map_err(|err| {
            error!("Error listing buckets with prefix {:?}: {}", prefix, err);
            StoreError::from(err)
        })
    }

    /// One level of `bucket` under `prefix`: direct files plus sub-folders.
    ///
    /// The query's own folder marker is never reported as a file.
    pub async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Listing> {
        match self.try_list(bucket, prefix).await {
            Ok(listing) => Ok(listing),
            Err(err) => {
                error!("Error listing files in {} under {:?}: {}", bucket, prefix, err);
                self.degrade(err, Listing::default())
            }
        }
    }

    async fn try_list(&self, bucket: &str, prefix: &str) -> StoreResult<Listing> {
        let page = self.client.list(bucket, &ListQuery::shallow(prefix)).await?;

        let files = page
            .blobs
            .into_iter()
            .filter(|blob| !(blob.key == prefix && blob.is_folder_marker()))
            .collect();

        // Synthetic prefixes carry no timestamps; take the newest blob below each.
        let mut latest: HashMap<String, Option<DateTime<Utc>>> = page
            .prefixes
            .iter()
            .map(|name| (name.clone(), None))
            .collect();
        if !latest.is_empty() {
            let everything = self
                .client
                .list(bucket, &ListQuery::recursive(prefix))
                .await?;
            for blob in everything.blobs {
                let Some((segment, _)) = blob
                    .key
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.split_once('/'))
                else {
                    continue;
                };
                if let Some(slot) = latest.get_mut(&format!("{}{}/", prefix, segment)) {
                    *slot = (*slot).max(blob.updated);
                }
            }
        }

        let prefixes = page
            .prefixes
            .into_iter()
            .map(|name| FolderEntry {
                updated: latest.get(&name).copied().flatten(),
                name,
            })
            .collect();

        let listing = Listing { prefixes, files };
        if listing.is_empty() {
            debug!("Nothing under {:?} in {}", prefix, bucket);
        }
        Ok(listing)
    }

    pub async fn read(
        &self,
        bucket: &str,
        path: &str,
        format: ReadFormat,
    ) -> StoreResult<FileContent> {
        match self.try_read(bucket, path, format).await {
            Ok(content) => Ok(content),
            Err(err) => {
                error!("Error getting file {} from {}: {}", path, bucket, err);
                self.degrade(err, FileContent::Empty)
            }
        }
    }

    async fn try_read(
        &self,
        bucket: &str,
        path: &str,
        format: ReadFormat,
    ) -> StoreResult<FileContent> {
        let bytes = self.fetch(bucket, path).await?;
        match format {
            ReadFormat::Base64 => Ok(FileContent::Base64(
                general_purpose::STANDARD.encode(&bytes),
            )),
            ReadFormat::Json => {
                let text = decode_text(path, bytes)?;
                serde_json::from_str(&text).map(FileContent::Json).map_err(|err| {
                    StoreError::Provider(format!("{} is not valid JSON: {}", path, err))
                })
            }
            ReadFormat::Text => decode_text(path, bytes).map(FileContent::Text),
        }
    }

    /// Raw bytes of a single blob, no format negotiation.
    pub async fn download(&self, bucket: &str, path: &str) -> StoreResult<Bytes> {
        match self.fetch(bucket, path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                error!("Error downloading file {} from {}: {}", path, bucket, err);
                self.degrade(err, Bytes::new())
            }
        }
    }

    async fn fetch(&self, bucket: &str, path: &str) -> StoreResult<Bytes> {
        self.client.get(bucket, path).await.map_err(|err| {
            if err.is_not_found() {
                StoreError::NotFound(format!("{} not found", path))
            } else {
                StoreError::from(err)
            }
        })
    }

    /// Write the zero-byte marker for `parent_path/folder_name/`.
    ///
    /// No existence check: an existing marker is silently overwritten, which
    /// leaves the key set unchanged.
    pub async fn create_folder(
        &self,
        bucket: &str,
        parent_path: &str,
        folder_name: &str,
    ) -> StoreResult<FolderCreated> {
        let folder_name = folder_name.trim_matches('/');
        if folder_name.is_empty() {
            return Err(StoreError::Validation("Folder name is required.".into()));
        }
        let parent = parent_path.trim_end_matches('/');
        let marker = if parent.is_empty() {
            format!("{}/", folder_name)
        } else {
            format!("{}/{}/", parent, folder_name)
        };

        debug!("Creating folder marker {} in {}", marker, bucket);
        let meta = self
            .client
            .put(bucket, &marker, Bytes::new(), FOLDER_MARKER_CONTENT_TYPE)
            .await
            .map_err(|err| {
                error!("Error creating folder {} in {}: {}", marker, bucket, err);
                StoreError::from(err)
            })?;
        Ok(FolderCreated::from(meta))
    }

    /// Store `content` at `destination`.
    ///
    /// `upload` means "add a new file": an existing blob is a conflict and is
    /// left untouched. Otherwise the write overwrites unconditionally.
    pub async fn save(
        &self,
        bucket: &str,
        destination: &str,
        content: SaveContent,
        upload: bool,
    ) -> StoreResult<SaveReceipt> {
        if destination.is_empty() {
            return Err(StoreError::Validation("Missing required parameters.".into()));
        }
        let action = if upload { "uploading" } else { "saving" };

        let result = self.try_save(bucket, destination, content, upload).await;
        match &result {
            Err(StoreError::Conflict(msg)) => warn!("Refused {} {}: {}", action, destination, msg),
            Err(err) => error!("Error {} content to {}: {}", action, destination, err),
            Ok(_) => debug!("Finished {} {} in {}", action, destination, bucket),
        }
        result
    }

    async fn try_save(
        &self,
        bucket: &str,
        destination: &str,
        content: SaveContent,
        upload: bool,
    ) -> StoreResult<SaveReceipt> {
        let (body, content_type) = content
            .into_body()
            .map_err(|err| StoreError::Provider(err.to_string()))?;

        if upload {
            if self.client.exists(bucket, destination).await? {
                return Err(StoreError::Conflict(format!(
                    "A file with name {} already exists in the destination.",
                    destination
                )));
            }
            if self.folder_exists(bucket, destination).await? {
                return Err(folder_taken(destination));
            }
        }

        let meta = self
            .client
            .put(bucket, destination, Bytes::from(body), content_type)
            .await?;
        Ok(SaveReceipt::from(meta))
    }

    /// Delete a file or an empty folder. Non-empty folders and the bucket root
    /// are refused.
    pub async fn delete(&self, bucket: &str, path: &str) -> StoreResult<()> {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(StoreError::Conflict("Deleting Bucket is not allowed.".into()));
        }

        let key = match self.classify_path(bucket, path).await? {
            PathKind::Missing => {
                return Err(StoreError::NotFound("File/Folder not found.".into()));
            }
            PathKind::NonEmptyFolder => {
                return Err(StoreError::Conflict(
                    "Non-Empty folder cannot be deleted.".into(),
                ));
            }
            PathKind::File => path.to_string(),
            PathKind::EmptyFolder => format!("{}/", path),
        };

        self.client.delete(bucket, &key).await.map_err(|err| {
            error!("Error deleting file/folder {} in {}: {}", key, bucket, err);
            StoreError::from(err)
        })
    }

    /// Rename a file, or an empty folder's marker, within `bucket`.
    ///
    /// Folders never rename recursively; a folder with children is refused.
    pub async fn rename(
        &self,
        bucket: &str,
        source: &str,
        new_name: &str,
    ) -> StoreResult<RenameReceipt> {
        let source = source.trim_end_matches('/');
        let new_name = new_name.trim_end_matches('/');
        if source.is_empty() {
            return Err(StoreError::Conflict("Renaming Bucket is not allowed.".into()));
        }
        if new_name.is_empty() {
            return Err(StoreError::Validation("Missing required parameters.".into()));
        }

        let (from, to) = match self.classify_path(bucket, source).await? {
            PathKind::Missing => {
                return Err(StoreError::NotFound(format!("{} not found", source)));
            }
            PathKind::NonEmptyFolder => {
                return Err(StoreError::Conflict(
                    "Non-Empty folder cannot be renamed.".into(),
                ));
            }
            PathKind::File => {
                if self.client.exists(bucket, new_name).await? {
                    return Err(StoreError::Conflict(format!(
                        "A file with name {} already exists in the destination.",
                        new_name
                    )));
                }
                if self.folder_exists(bucket, new_name).await? {
                    return Err(folder_taken(new_name));
                }
                (source.to_string(), new_name.to_string())
            }
            PathKind::EmptyFolder => {
                if self.folder_exists(bucket, new_name).await? {
                    return Err(folder_taken(new_name));
                }
                (format!("{}/", source), format!("{}/", new_name))
            }
        };

        let meta = self.client.rename(bucket, &from, &to).await.map_err(|err| {
            error!("Error renaming from {} to {} in {}: {}", from, to, bucket, err);
            StoreError::from(err)
        })?;

        Ok(RenameReceipt {
            name: meta.key,
            bucket: bucket.to_string(),
            success: true,
            status: 200,
        })
    }

    /// Resolve `path` (no trailing slash) against the flat key space.
    ///
    /// An exact key wins. Otherwise the first two keys under `path/` decide:
    /// the marker sorts first, so a second key means the folder has children.
    pub async fn classify_path(&self, bucket: &str, path: &str) -> StoreResult<PathKind> {
        if self.client.exists(bucket, path).await? {
            return Ok(PathKind::File);
        }

        let marker = format!("{}/", path);
        let page = self
            .client
            .list(bucket, &ListQuery::recursive(marker.as_str()).limit(2))
            .await?;

        let mut has_marker = false;
        for blob in &page.blobs {
            if blob.key == marker {
                has_marker = true;
            } else {
                return Ok(PathKind::NonEmptyFolder);
            }
        }

        Ok(if has_marker {
            PathKind::EmptyFolder
        } else {
            PathKind::Missing
        })
    }

    /// Whether any key (marker or child) lives under `path/`.
    async fn folder_exists(&self, bucket: &str, path: &str) -> StoreResult<bool> {
        // Trailing slash so `data` does not match `data-old/`.
        let page = self
            .client
            .list(bucket, &ListQuery::recursive(format!("{}/", path)).limit(1))
            .await?;
        Ok(!page.blobs.is_empty())
    }

    fn degrade<T>(&self, err: StoreError, empty: T) -> StoreResult<T> {
        if self.options.degrade_to_empty_on_error {
            Ok(empty)
        } else {
            Err(err)
        }
    }
}

fn folder_taken(path: &str) -> StoreError {
    StoreError::Conflict(format!(
        "A folder with name {} already exists in the destination.",
        path
    ))
}

fn decode_text(path: &str, bytes: Bytes) -> StoreResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| StoreError::Provider(format!("{} is not valid UTF-8 text", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{blob::BlobMeta, bucket::BucketSummary},
        services::{
            blob_client::{BlobResult, ListPage},
            memory_client::MemoryBlobClient,
        },
    };
    use async_trait::async_trait;
    use serde_json::json;

    /// `b1` with `a/`, `a/x.txt` (10 bytes) and the `a/sub/` marker.
    async fn seeded() -> (MemoryBlobClient, FolderStore) {
        let client = MemoryBlobClient::new();
        client.create_bucket("b1").await.unwrap();
        for (key, body) in [("a/", ""), ("a/x.txt", "0123456789"), ("a/sub/", "")] {
            client
                .put("b1", key, Bytes::from(body), "text/plain")
                .await
                .unwrap();
        }
        let store = FolderStore::new(Arc::new(client.clone()), StoreOptions::default());
        (client, store)
    }

    fn strict(client: &MemoryBlobClient) -> FolderStore {
        FolderStore::new(
            Arc::new(client.clone()),
            StoreOptions {
                degrade_to_empty_on_error: false,
            },
        )
    }

    struct Unavailable;

    #[async_trait]
    impl BlobClient for Unavailable {
        async fn list_buckets(&self, _: Option<&str>) -> BlobResult<Vec<BucketSummary>> {
            Err(BlobError::Provider("backend unavailable".into()))
        }
        async fn put(&self, _: &str, _: &str, _: Bytes, _: &str) -> BlobResult<BlobMeta> {
            Err(BlobError::Provider("backend unavailable".into()))
        }
        async fn get(&self, _: &str, _: &str) -> BlobResult<Bytes> {
            Err(BlobError::Provider("backend unavailable".into()))
        }
        async fn head(&self, _: &str, _: &str) -> BlobResult<Option<BlobMeta>> {
            Err(BlobError::Provider("backend unavailable".into()))
        }
        async fn delete(&self, _: &str, _: &str) -> BlobResult<()> {
            Err(BlobError::Provider("backend unavailable".into()))
        }
        async fn list(&self, _: &str, _: &ListQuery) -> BlobResult<ListPage> {
            Err(BlobError::Provider("backend unavailable".into()))
        }
        async fn rename(&self, _: &str, _: &str, _: &str) -> BlobResult<BlobMeta> {
            Err(BlobError::Provider("backend unavailable".into()))
        }
    }

    fn unavailable(degrade: bool) -> FolderStore {
        FolderStore::new(
            Arc::new(Unavailable),
            StoreOptions {
                degrade_to_empty_on_error: degrade,
            },
        )
    }

    #[tokio::test]
    async fn list_hides_own_marker_and_rolls_up_subfolders() {
        let (_, store) = seeded().await;
        let listing = store.list("b1", "a/").await.unwrap();

        let files: Vec<_> = listing.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(files, vec!["a/x.txt"]);
        let folders: Vec<_> = listing.prefixes.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folders, vec!["a/sub/"]);
        assert!(listing.prefixes[0].updated.is_some());
    }

    #[tokio::test]
    async fn folder_timestamp_is_latest_nested_update() {
        let (client, store) = seeded().await;
        let newest = client
            .put("b1", "a/sub/late.txt", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();

        let listing = store.list("b1", "").await.unwrap();
        assert!(listing.files.is_empty());
        assert_eq!(listing.prefixes.len(), 1);
        assert_eq!(listing.prefixes[0].name, "a/");
        assert_eq!(listing.prefixes[0].updated, newest.updated);
    }

    #[tokio::test]
    async fn list_failure_degrades_or_propagates() {
        assert!(unavailable(true).list("b1", "a/").await.unwrap().is_empty());
        let err = unavailable(false).list("b1", "a/").await.unwrap_err();
        assert_eq!(err.status(), 500);
        assert_eq!(err.to_string(), "backend unavailable");
    }

    #[tokio::test]
    async fn read_presents_each_format() {
        let (client, store) = seeded().await;
        client
            .put("b1", "nb.ipynb", Bytes::from_static(br#"{"cells":[]}"#), "application/json")
            .await
            .unwrap();

        assert_eq!(
            store.read("b1", "a/x.txt", ReadFormat::Text).await.unwrap(),
            FileContent::Text("0123456789".into())
        );
        assert_eq!(
            store.read("b1", "a/x.txt", ReadFormat::Base64).await.unwrap(),
            FileContent::Base64("MDEyMzQ1Njc4OQ==".into())
        );
        assert_eq!(
            store.read("b1", "nb.ipynb", ReadFormat::Json).await.unwrap(),
            FileContent::Json(json!({"cells": []}))
        );
    }

    #[tokio::test]
    async fn read_of_missing_or_undecodable_blob_is_empty() {
        let (client, store) = seeded().await;
        client
            .put("b1", "bin", Bytes::from_static(&[0xff, 0xfe]), "application/octet-stream")
            .await
            .unwrap();

        assert_eq!(
            store.read("b1", "missing.txt", ReadFormat::Text).await.unwrap(),
            FileContent::Empty
        );
        assert_eq!(
            store.read("b1", "a/x.txt", ReadFormat::Json).await.unwrap(),
            FileContent::Empty
        );
        assert_eq!(store.read("b1", "bin", ReadFormat::Text).await.unwrap(), FileContent::Empty);
    }

    #[tokio::test]
    async fn strict_read_reports_not_found() {
        let (client, _) = seeded().await;
        let err = strict(&client)
            .read("b1", "missing.txt", ReadFormat::Text)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("missing.txt not found".into()));
    }

    #[tokio::test]
    async fn download_returns_raw_bytes_or_nothing() {
        let (_, store) = seeded().await;
        assert_eq!(&store.download("b1", "a/x.txt").await.unwrap()[..], b"0123456789");
        assert!(store.download("b1", "nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_folder_is_idempotent_on_key_set() {
        let (client, store) = seeded().await;
        let first = store.create_folder("b1", "a", "new").await.unwrap();
        store.create_folder("b1", "a/", "new").await.unwrap();

        assert_eq!(first.name, "a/new/");
        assert_eq!(first.size, "0");
        let markers = client
            .keys("b1")
            .await
            .into_iter()
            .filter(|k| k == "a/new/")
            .count();
        assert_eq!(markers, 1);
    }

    #[tokio::test]
    async fn create_folder_at_root_and_without_name() {
        let (client, store) = seeded().await;
        assert_eq!(store.create_folder("b1", "", "top").await.unwrap().name, "top/");
        assert!(client.exists("b1", "top/").await.unwrap());
        assert_eq!(
            store.create_folder("b1", "a", "").await.unwrap_err().status(),
            400
        );
    }

    #[tokio::test]
    async fn upload_never_overwrites_existing_blob() {
        let (client, store) = seeded().await;
        let err = store
            .save("b1", "a/x.txt", SaveContent::Text("new".into()), true)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 409);
        assert_eq!(&client.get("b1", "a/x.txt").await.unwrap()[..], b"0123456789");
    }

    #[tokio::test]
    async fn save_overwrites_existing_blob() {
        let (client, store) = seeded().await;
        let receipt = store
            .save("b1", "a/x.txt", SaveContent::Text("new".into()), false)
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.size, 3);
        assert_eq!(&client.get("b1", "a/x.txt").await.unwrap()[..], b"new");
    }

    #[tokio::test]
    async fn upload_of_structured_content_serializes_it() {
        let (client, store) = seeded().await;
        let receipt = store
            .save("b1", "a/nb.ipynb", SaveContent::Json(json!({"cells": []})), true)
            .await
            .unwrap();
        assert_eq!(receipt.content_type.as_deref(), Some("application/json"));
        assert_eq!(&client.get("b1", "a/nb.ipynb").await.unwrap()[..], br#"{"cells":[]}"#);
    }

    #[tokio::test]
    async fn save_failure_is_provider_error() {
        let err = unavailable(true)
            .save("b1", "k", SaveContent::Text("x".into()), false)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn delete_refuses_non_empty_folder_and_leaves_blobs() {
        let (client, store) = seeded().await;
        let before = client.keys("b1").await;
        let err = store.delete("b1", "a").await.unwrap_err();
        assert_eq!(err, StoreError::Conflict("Non-Empty folder cannot be deleted.".into()));
        assert_eq!(client.keys("b1").await, before);
    }

    #[tokio::test]
    async fn delete_refuses_bucket_root() {
        let (_, store) = seeded().await;
        for root in ["", "/"] {
            assert_eq!(store.delete("b1", root).await.unwrap_err().status(), 409);
        }
    }

    #[tokio::test]
    async fn delete_removes_file_or_empty_folder_marker() {
        let (client, store) = seeded().await;
        store.delete("b1", "a/x.txt").await.unwrap();
        store.delete("b1", "a/sub").await.unwrap();
        assert_eq!(client.keys("b1").await, vec!["a/".to_string()]);
        // `a` is now an empty folder and may go too.
        store.delete("b1", "a/").await.unwrap();
        assert!(client.keys("b1").await.is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_path_is_not_found() {
        let (_, store) = seeded().await;
        let err = store.delete("b1", "ghost").await.unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(err.to_string(), "File/Folder not found.");
    }

    #[tokio::test]
    async fn classify_covers_every_kind() {
        let (client, store) = seeded().await;
        client
            .put("b1", "implicit/child.txt", Bytes::from_static(b"c"), "text/plain")
            .await
            .unwrap();
        assert_eq!(store.classify_path("b1", "a/x.txt").await.unwrap(), PathKind::File);
        assert_eq!(store.classify_path("b1", "a/sub").await.unwrap(), PathKind::EmptyFolder);
        assert_eq!(store.classify_path("b1", "a").await.unwrap(), PathKind::NonEmptyFolder);
        assert_eq!(
            store.classify_path("b1", "implicit").await.unwrap(),
            PathKind::NonEmptyFolder
        );
        assert_eq!(store.classify_path("b1", "nope").await.unwrap(), PathKind::Missing);
    }

    #[tokio::test]
    async fn rename_moves_empty_folder_marker() {
        let (client, store) = seeded().await;
        let receipt = store.rename("b1", "a/sub", "a/sub2").await.unwrap();
        assert_eq!(
            receipt,
            RenameReceipt {
                name: "a/sub2/".into(),
                bucket: "b1".into(),
                success: true,
                status: 200,
            }
        );
        let keys = client.keys("b1").await;
        assert!(keys.contains(&"a/sub2/".to_string()));
        assert!(!keys.contains(&"a/sub/".to_string()));
    }

    #[tokio::test]
    async fn rename_moves_file() {
        let (client, store) = seeded().await;
        let receipt = store.rename("b1", "a/x.txt", "a/y.txt").await.unwrap();
        assert_eq!(receipt.name, "a/y.txt");
        assert_eq!(&client.get("b1", "a/y.txt").await.unwrap()[..], b"0123456789");
        assert!(!client.exists("b1", "a/x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn rename_refuses_non_empty_folder() {
        let (_, store) = seeded().await;
        let err = store.rename("b1", "a", "b").await.unwrap_err();
        assert_eq!(err, StoreError::Conflict("Non-Empty folder cannot be renamed.".into()));
    }

    #[tokio::test]
    async fn rename_refuses_taken_destination() {
        let (client, store) = seeded().await;
        client
            .put("b1", "a/y.txt", Bytes::from_static(b"y"), "text/plain")
            .await
            .unwrap();
        client
            .put("b1", "a/other/z.txt", Bytes::from_static(b"z"), "text/plain")
            .await
            .unwrap();

        assert_eq!(store.rename("b1", "a/x.txt", "a/y.txt").await.unwrap_err().status(), 409);
        assert_eq!(store.rename("b1", "a/sub", "a/other").await.unwrap_err().status(), 409);
        assert!(client.exists("b1", "a/x.txt").await.unwrap());
        assert!(client.exists("b1", "a/sub/").await.unwrap());
    }

    #[tokio::test]
    async fn file_never_shadows_an_existing_folder() {
        let (client, store) = seeded().await;
        client
            .put("b1", "top.txt", Bytes::from_static(b"t"), "text/plain")
            .await
            .unwrap();

        let err = store.rename("b1", "top.txt", "a").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict("A folder with name a already exists in the destination.".into())
        );
        let err = store
            .save("b1", "a/sub", SaveContent::Text("x".into()), true)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 409);

        assert!(!client.exists("b1", "a").await.unwrap());
        assert!(!client.exists("b1", "a/sub").await.unwrap());
        assert!(client.exists("b1", "top.txt").await.unwrap());
    }

    #[tokio::test]
    async fn rename_of_missing_source_is_not_found() {
        let (_, store) = seeded().await;
        let err = store.rename("b1", "ghost", "spirit").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("ghost not found".into()));
    }

    #[tokio::test]
    async fn list_buckets_propagates_errors() {
        assert_eq!(unavailable(true).list_buckets(None).await.unwrap_err().status(), 500);
    }
}
