//! src/services/disk_client.rs
//!
//! DiskBlobClient: a local stand-in for a remote object store, used for
//! development without cloud credentials. Blob metadata lives in SQLite and
//! payloads on disk, sharded beneath `base_path/{bucket}/{shard}/{shard}/{digest}`.
//! Payload files are named by the MD5 of `bucket/key`, so folder markers and
//! keys with unusual characters never touch the filesystem namespace.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::blob_client::{
    BlobClient, BlobClientFactory, BlobError, BlobResult, ListPage, ListQuery, roll_up,
};
use crate::models::{blob::BlobMeta, bucket::BucketSummary, credential::Credential};

const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

const MAX_BLOB_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(FromRow, Debug)]
struct BlobRow {
    bucket: String,
    key: String,
    content_type: Option<String>,
    size_bytes: i64,
    md5_hash: String,
    etag: String,
    generation: i64,
    time_created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<BlobRow> for BlobMeta {
    fn from(row: BlobRow) -> Self {
        let mut meta = BlobMeta::new(&row.bucket, &row.key, row.size_bytes.max(0) as u64);
        meta.content_type = row.content_type;
        meta.time_created = Some(row.time_created);
        meta.updated = Some(row.updated);
        meta.md5_hash = Some(row.md5_hash);
        meta.etag = Some(row.etag);
        meta.generation = Some(row.generation);
        meta.metageneration = Some(1);
        meta.storage_class = Some("STANDARD".into());
        meta
    }
}

#[derive(FromRow)]
struct BucketRow {
    name: String,
    updated_at: DateTime<Utc>,
}

const BLOB_COLUMNS: &str =
    "bucket, key, content_type, size_bytes, md5_hash, etag, generation, time_created, updated";

#[derive(Clone)]
pub struct DiskBlobClient {
    /// Shared SQLite connection pool used for metadata.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
}

impl DiskBlobClient {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(db: &SqlitePool) -> BlobResult<()> {
        let statements = MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(db).await?;
        }
        Ok(())
    }

    /// Create a bucket, or do nothing if it already exists.
    pub async fn ensure_bucket(&self, name: &str) -> BlobResult<()> {
        match self.create_bucket(name).await {
            Ok(()) | Err(BlobError::BucketAlreadyExists(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn create_bucket(&self, name: &str) -> BlobResult<()> {
        ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let now = Utc::now();
        match sqlx::query("INSERT INTO buckets (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&*self.db)
            .await
        {
            Ok(_) => {
                info!("Created bucket {}", name);
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                Err(BlobError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(BlobError::Sqlx(err)),
        }
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// `base_path/{bucket}/{aa}/{bb}/{md5(bucket/key)}`. Parents may not exist yet.
    fn payload_path(&self, bucket: &str, key: &str) -> PathBuf {
        let digest = format!("{:x}", md5::compute(format!("{}/{}", bucket, key)));
        let mut path = self.bucket_root(bucket);
        path.push(&digest[0..2]);
        path.push(&digest[2..4]);
        path.push(digest);
        path
    }

    async fn ensure_bucket_exists(&self, bucket: &str) -> BlobResult<()> {
        let found: Option<String> = sqlx::query_scalar("SELECT name FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_optional(&*self.db)
            .await?;
        found
            .map(|_| ())
            .ok_or_else(|| BlobError::BucketNotFound(bucket.to_string()))
    }

    async fn fetch_row(&self, bucket: &str, key: &str) -> BlobResult<Option<BlobRow>> {
        self.ensure_bucket_exists(bucket).await?;
        let sql = format!("SELECT {} FROM blobs WHERE bucket = ? AND key = ?", BLOB_COLUMNS);
        Ok(sqlx::query_as::<_, BlobRow>(&sql)
            .bind(bucket)
            .bind(key)
            .fetch_optional(&*self.db)
            .await?)
    }

    /// Write bytes to a temp file beside the final location and fsync it.
    /// The caller renames it into place once the metadata row is committed.
    async fn stage_payload(&self, path: &Path, body: &[u8]) -> BlobResult<PathBuf> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BlobError::Io(io::Error::new(
                ErrorKind::Other,
                "payload path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(body).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }
        Ok(tmp_path)
    }

    /// Remove empty shard directories up to the bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    async fn remove_payload(&self, bucket: &str, key: &str) -> BlobResult<()> {
        let path = self.payload_path(bucket, key);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed payload {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", path.display());
            }
            Err(err) => return Err(BlobError::Io(err)),
        }
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root(bucket)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobClient for DiskBlobClient {
    async fn list_buckets(&self, prefix: Option<&str>) -> BlobResult<Vec<BucketSummary>> {
        let prefix = prefix.unwrap_or("");
        let rows = sqlx::query_as::<_, BucketRow>(
            "SELECT name, updated_at FROM buckets
             WHERE substr(name, 1, length(?)) = ? ORDER BY name ASC",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BucketSummary {
                name: row.name,
                updated: Some(row.updated_at),
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
        ensure_key_safe(key)?;
        self.ensure_bucket_exists(bucket).await?;

        let path = self.payload_path(bucket, key);
        let staged = self.stage_payload(&path, &body).await?;

        let digest = md5::compute(&body);
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO blobs ({cols})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(bucket, key) DO UPDATE SET
                 content_type = excluded.content_type,
                 size_bytes = excluded.size_bytes,
                 md5_hash = excluded.md5_hash,
                 etag = excluded.etag,
                 generation = excluded.generation,
                 updated = excluded.updated
             RETURNING {cols}",
            cols = BLOB_COLUMNS
        );
        let row = sqlx::query_as::<_, BlobRow>(&sql)
            .bind(bucket)
            .bind(key)
            .bind(content_type)
            .bind(body.len() as i64)
            .bind(general_purpose::STANDARD.encode(digest.0))
            .bind(format!("{:x}", digest))
            .bind(now.timestamp_micros())
            .bind(now)
            .bind(now)
            .fetch_one(&*self.db)
            .await;

        let row = match row {
            Ok(row) => row,
            Err(err) => {
                // The live payload is untouched until the row is written.
                let _ = fs::remove_file(&staged).await;
                return Err(BlobError::Sqlx(err));
            }
        };

        if let Err(err) = fs::rename(&staged, &path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(BlobError::Io(err));
        }

        sqlx::query("UPDATE buckets SET updated_at = ? WHERE name = ?")
            .bind(now)
            .bind(bucket)
            .execute(&*self.db)
            .await?;

        Ok(row.into())
    }

    async fn get(&self, bucket: &str, key: &str) -> BlobResult<Bytes> {
        let not_found = || BlobError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        self.fetch_row(bucket, key).await?.ok_or_else(not_found)?;

        match fs::read(self.payload_path(bucket, key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            // Metadata without a payload reads as missing.
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> BlobResult<Option<BlobMeta>> {
        Ok(self.fetch_row(bucket, key).await?.map(BlobMeta::from))
    }

    async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()> {
        self.ensure_bucket_exists(bucket).await?;
        let result = sqlx::query("DELETE FROM blobs WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BlobError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        self.remove_payload(bucket, key).await
    }

    async fn list(&self, bucket: &str, query: &ListQuery) -> BlobResult<ListPage> {
        self.ensure_bucket_exists(bucket).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM blobs WHERE bucket = ",
            BLOB_COLUMNS
        ));
        builder.push_bind(bucket);
        if !query.prefix.is_empty() {
            // substr instead of LIKE so `%` and `_` in keys stay literal.
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(query.prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(query.prefix.as_str());
        }
        builder.push(" ORDER BY key ASC");
        // Without roll-up every row is one entry, so the limit can go to SQL.
        if let (None, Some(max)) = (&query.delimiter, query.max_results) {
            builder.push(" LIMIT ");
            builder.push_bind(max as i64);
        }

        let rows: Vec<BlobRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(roll_up(rows.into_iter().map(BlobMeta::from), query))
    }

    async fn rename(&self, bucket: &str, key: &str, new_key: &str) -> BlobResult<BlobMeta> {
        ensure_key_safe(new_key)?;
        let row = self
            .fetch_row(bucket, key)
            .await?
            .ok_or_else(|| BlobError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        if key == new_key {
            return Ok(row.into());
        }

        let old_path = self.payload_path(bucket, key);
        let new_path = self.payload_path(bucket, new_key);
        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&old_path, &new_path).await?;

        let now = Utc::now();
        let moved = async {
            let mut tx = self.db.begin().await?;
            sqlx::query("DELETE FROM blobs WHERE bucket = ? AND key = ?")
                .bind(bucket)
                .bind(new_key)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE blobs SET key = ?, generation = ?, time_created = ?, updated = ?
                 WHERE bucket = ? AND key = ?",
            )
            .bind(new_key)
            .bind(now.timestamp_micros())
            .bind(now)
            .bind(now)
            .bind(bucket)
            .bind(key)
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        }
        .await;

        if let Err(err) = moved {
            let _ = fs::rename(&new_path, &old_path).await;
            return Err(BlobError::Sqlx(err));
        }
        if let Some(parent) = old_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root(bucket)).await;
        }

        let mut meta = BlobMeta::from(row);
        meta.key = new_key.to_string();
        meta.id = format!("{}/{}", bucket, new_key);
        meta.generation = Some(now.timestamp_micros());
        meta.time_created = Some(now);
        meta.updated = Some(now);
        Ok(meta)
    }
}

/// Every request gets a handle onto the same pool and directory.
#[derive(Clone)]
pub struct DiskClientFactory {
    client: DiskBlobClient,
}

impl DiskClientFactory {
    pub fn new(client: DiskBlobClient) -> Self {
        Self { client }
    }
}

impl BlobClientFactory for DiskClientFactory {
    fn make_client(&self, _credential: &Credential) -> BlobResult<Arc<dyn BlobClient>> {
        Ok(Arc::new(self.client.clone()))
    }
}

fn ensure_key_safe(key: &str) -> BlobResult<()> {
    if key.is_empty()
        || key.len() > MAX_BLOB_KEY_LEN
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == "..")
        || key.bytes().any(|b| b.is_ascii_control())
    {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// S3/GCS-style bucket naming: 3–63 chars of lowercase letters, digits, dots
/// and hyphens, starting and ending alphanumeric, not shaped like an IPv4 address.
fn ensure_bucket_name_safe(name: &str) -> BlobResult<()> {
    let invalid = |reason: &str| BlobError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }
    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }
    Ok(())
}

fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn client() -> (DiskBlobClient, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        DiskBlobClient::migrate(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let client = DiskBlobClient::new(Arc::new(pool), dir.path());
        client.create_bucket("bkt1").await.unwrap();
        (client, dir)
    }

    #[tokio::test]
    async fn put_get_head_round_trip_keeps_metadata() {
        let (client, _dir) = client().await;
        let meta = client
            .put("bkt1", "a/x.txt", Bytes::from_static(b"0123456789"), "text/plain")
            .await
            .unwrap();
        assert_eq!(meta.size, 10);
        assert_eq!(meta.etag.as_deref(), Some("781e5e245d69b566979b86e28d23f2c7"));

        assert_eq!(&client.get("bkt1", "a/x.txt").await.unwrap()[..], b"0123456789");
        let head = client.head("bkt1", "a/x.txt").await.unwrap().unwrap();
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
        assert!(client.head("bkt1", "a/y.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn folder_markers_are_storable() {
        let (client, _dir) = client().await;
        let meta = client.put("bkt1", "a/", Bytes::new(), "text/plain").await.unwrap();
        assert!(meta.is_folder_marker());
        assert!(client.get("bkt1", "a/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_rolls_up_and_treats_wildcards_literally() {
        let (client, _dir) = client().await;
        for key in ["a/", "a/sub/", "a/sub/deep.txt", "a/x.txt", "a_b.txt", "a%"] {
            client.put("bkt1", key, Bytes::new(), "text/plain").await.unwrap();
        }

        let page = client.list("bkt1", &ListQuery::shallow("a/")).await.unwrap();
        let keys: Vec<_> = page.blobs.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["a/", "a/x.txt"]);
        assert_eq!(page.prefixes, vec!["a/sub/".to_string()]);

        let limited = client
            .list("bkt1", &ListQuery::recursive("a/").limit(2))
            .await
            .unwrap();
        assert_eq!(limited.blobs.len(), 2);

        let pct = client.list("bkt1", &ListQuery::recursive("a%")).await.unwrap();
        assert_eq!(pct.blobs.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_row_and_payload() {
        let (client, _dir) = client().await;
        client
            .put("bkt1", "gone.txt", Bytes::from_static(b"bye"), "text/plain")
            .await
            .unwrap();
        let path = client.payload_path("bkt1", "gone.txt");
        assert!(path.exists());

        client.delete("bkt1", "gone.txt").await.unwrap();
        assert!(!path.exists());
        assert!(client.delete("bkt1", "gone.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rename_moves_payload_and_metadata() {
        let (client, _dir) = client().await;
        client
            .put("bkt1", "old.txt", Bytes::from_static(b"data"), "text/plain")
            .await
            .unwrap();

        let meta = client.rename("bkt1", "old.txt", "new.txt").await.unwrap();
        assert_eq!(meta.key, "new.txt");
        assert_eq!(&client.get("bkt1", "new.txt").await.unwrap()[..], b"data");
        assert!(client.head("bkt1", "old.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_bucket_and_bad_names_are_rejected() {
        let (client, _dir) = client().await;
        assert!(matches!(
            client.put("nope", "k", Bytes::new(), "text/plain").await,
            Err(BlobError::BucketNotFound(_))
        ));
        for bad in ["ab", "Upper", "-lead", "192.168.0.1", "a..b"] {
            assert!(matches!(
                client.create_bucket(bad).await,
                Err(BlobError::InvalidBucketName { .. })
            ));
        }
        assert!(matches!(
            client.create_bucket("bkt1").await,
            Err(BlobError::BucketAlreadyExists(_))
        ));
        client.ensure_bucket("bkt1").await.unwrap();
    }

    #[tokio::test]
    async fn list_buckets_filters_by_prefix() {
        let (client, _dir) = client().await;
        client.create_bucket("data-lake").await.unwrap();
        let names: Vec<_> = client
            .list_buckets(Some("data"))
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["data-lake".to_string()]);
    }

    #[tokio::test]
    async fn failed_overwrite_keeps_previous_payload() {
        let (client, _dir) = client().await;
        client
            .put("bkt1", "nb.txt", Bytes::from_static(b"original"), "text/plain")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER refuse_update BEFORE UPDATE ON blobs
             BEGIN SELECT RAISE(FAIL, 'boom'); END",
        )
        .execute(&*client.db)
        .await
        .unwrap();

        let err = client
            .put("bkt1", "nb.txt", Bytes::from_static(b"new"), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Sqlx(_)));

        let head = client.head("bkt1", "nb.txt").await.unwrap().unwrap();
        assert_eq!(head.size, 8);
        assert_eq!(&client.get("bkt1", "nb.txt").await.unwrap()[..], b"original");

        // No staged temp files are left beside the payload.
        let shard = client.payload_path("bkt1", "nb.txt");
        let mut entries = fs::read_dir(shard.parent().unwrap()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name());
        }
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn rename_onto_itself_keeps_the_blob() {
        let (client, _dir) = client().await;
        client
            .put("bkt1", "same.txt", Bytes::from_static(b"data"), "text/plain")
            .await
            .unwrap();

        let meta = client.rename("bkt1", "same.txt", "same.txt").await.unwrap();
        assert_eq!(meta.key, "same.txt");
        assert_eq!(meta.size, 4);
        assert_eq!(&client.get("bkt1", "same.txt").await.unwrap()[..], b"data");
    }
}
