//! Google Cloud Storage backend over the GCS JSON API.
//!
//! One `GcsBlobClient` is built per request from the caller's access token.
//! The underlying `reqwest::Client` is shared by the factory.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::blob_client::{
    BlobClient, BlobClientFactory, BlobError, BlobResult, ListPage, ListQuery,
};
use crate::models::{blob::BlobMeta, bucket::BucketSummary, credential::Credential};

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Object resource as returned by the JSON API. Numeric fields arrive as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    bucket: String,
    id: Option<String>,
    size: Option<String>,
    content_type: Option<String>,
    time_created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    md5_hash: Option<String>,
    etag: Option<String>,
    generation: Option<String>,
    metageneration: Option<String>,
    storage_class: Option<String>,
    media_link: Option<String>,
    self_link: Option<String>,
}

impl From<GcsObject> for BlobMeta {
    fn from(obj: GcsObject) -> Self {
        let size = obj.size.and_then(|s| s.parse().ok()).unwrap_or(0);
        let mut meta = BlobMeta::new(&obj.bucket, &obj.name, size);
        if let Some(id) = obj.id {
            meta.id = id;
        }
        meta.content_type = obj.content_type;
        meta.time_created = obj.time_created;
        meta.updated = obj.updated;
        meta.md5_hash = obj.md5_hash;
        meta.etag = obj.etag;
        meta.generation = obj.generation.and_then(|g| g.parse().ok());
        meta.metageneration = obj.metageneration.and_then(|g| g.parse().ok());
        meta.storage_class = obj.storage_class;
        meta.media_link = obj.media_link;
        meta.self_link = obj.self_link;
        meta
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObjectList {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsBucket {
    name: String,
    updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsBucketList {
    #[serde(default)]
    items: Vec<GcsBucket>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsErrorDetail {
    code: Option<u16>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsErrorResponse {
    error: Option<GcsErrorDetail>,
}

pub struct GcsBlobClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
    project_id: String,
}

impl GcsBlobClient {
    pub fn new(http: reqwest::Client, endpoint: &str, credential: &Credential) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token: credential.access_token.clone(),
            project_id: credential.project_id.clone(),
        }
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/b/{}", self.endpoint, encode(bucket))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/o/{}", self.bucket_url(bucket), encode(key))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        context: &str,
        on_missing: OnMissing<'_>,
    ) -> BlobResult<Response> {
        let resp = request.bearer_auth(&self.access_token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        match (status, on_missing) {
            (StatusCode::NOT_FOUND, OnMissing::Key(bucket, key)) => Err(BlobError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            (StatusCode::NOT_FOUND, OnMissing::Bucket(bucket)) => {
                Err(BlobError::BucketNotFound(bucket.to_string()))
            }
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(provider_error(context, status, &body))
            }
        }
    }
}

/// How a 404 from the API should be reported.
#[derive(Clone, Copy)]
enum OnMissing<'a> {
    Provider,
    Key(&'a str, &'a str),
    Bucket(&'a str),
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

/// Build a readable error from a GCS error body (`{"error": {"code", "message"}}`),
/// falling back to the raw body.
fn provider_error(context: &str, status: StatusCode, body: &str) -> BlobError {
    let message = serde_json::from_str::<GcsErrorResponse>(body)
        .ok()
        .and_then(|resp| resp.error)
        .and_then(|err| err.message.map(|m| (m, err.code)));
    let (message, code) = match message {
        Some((m, code)) => (m, code.unwrap_or(status.as_u16())),
        None => (body.to_string(), status.as_u16()),
    };
    BlobError::Provider(format!("GCS {}: {} (code {})", context, message, code))
}

#[async_trait]
impl BlobClient for GcsBlobClient {
    async fn list_buckets(&self, prefix: Option<&str>) -> BlobResult<Vec<BucketSummary>> {
        let mut buckets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("project", self.project_id.clone())];
            if let Some(p) = prefix {
                params.push(("prefix", p.to_string()));
            }
            if let Some(tok) = page_token.take() {
                params.push(("pageToken", tok));
            }

            let url = format!("{}/storage/v1/b", self.endpoint);
            let page: GcsBucketList = self
                .send(
                    self.http.get(&url).query(&params),
                    "list buckets",
                    OnMissing::Provider,
                )
                .await?
                .json()
                .await?;

            buckets.extend(page.items.into_iter().map(|b| BucketSummary {
                name: b.name,
                updated: b.updated,
            }));

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(buckets)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> BlobResult<BlobMeta> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            encode(bucket)
        );
        debug!("Uploading {} bytes to gs://{}/{}", body.len(), bucket, key);
        let request = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        let obj: GcsObject = self
            .send(request, "upload", OnMissing::Bucket(bucket))
            .await?
            .json()
            .await?;
        Ok(obj.into())
    }

    async fn get(&self, bucket: &str, key: &str) -> BlobResult<Bytes> {
        let request = self
            .http
            .get(self.object_url(bucket, key))
            .query(&[("alt", "media")]);
        Ok(self
            .send(request, "download", OnMissing::Key(bucket, key))
            .await?
            .bytes()
            .await?)
    }

    async fn head(&self, bucket: &str, key: &str) -> BlobResult<Option<BlobMeta>> {
        let request = self.http.get(self.object_url(bucket, key));
        match self
            .send(request, "get metadata", OnMissing::Key(bucket, key))
            .await
        {
            Ok(resp) => {
                let obj: GcsObject = resp.json().await?;
                Ok(Some(obj.into()))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()> {
        let request = self.http.delete(self.object_url(bucket, key));
        self.send(request, "delete", OnMissing::Key(bucket, key))
            .await?;
        Ok(())
    }

    async fn list(&self, bucket: &str, query: &ListQuery) -> BlobResult<ListPage> {
        let mut page = ListPage::default();
        let mut page_token: Option<String> = None;
        let limit = query.max_results.unwrap_or(usize::MAX);

        loop {
            let mut params = vec![("prefix", query.prefix.clone())];
            if let Some(delim) = &query.delimiter {
                params.push(("delimiter", delim.clone()));
            }
            if let Some(max) = query.max_results {
                let remaining = max.saturating_sub(page.blobs.len() + page.prefixes.len());
                params.push(("maxResults", remaining.to_string()));
            }
            if let Some(tok) = page_token.take() {
                params.push(("pageToken", tok));
            }

            let request = self
                .http
                .get(format!("{}/o", self.bucket_url(bucket)))
                .query(&params);
            let resp: GcsObjectList = self
                .send(request, "list objects", OnMissing::Bucket(bucket))
                .await?
                .json()
                .await?;

            page.blobs.extend(resp.items.into_iter().map(BlobMeta::from));
            for prefix in resp.prefixes {
                if !page.prefixes.contains(&prefix) {
                    page.prefixes.push(prefix);
                }
            }

            page_token = resp.next_page_token;
            if page_token.is_none() || page.blobs.len() + page.prefixes.len() >= limit {
                break;
            }
        }

        page.blobs.sort_by(|a, b| a.key.cmp(&b.key));
        page.prefixes.sort();
        Ok(page)
    }

    /// Server-side copy to `new_key`, then delete the source.
    async fn rename(&self, bucket: &str, key: &str, new_key: &str) -> BlobResult<BlobMeta> {
        let url = format!(
            "{}/copyTo/b/{}/o/{}",
            self.object_url(bucket, key),
            encode(bucket),
            encode(new_key)
        );
        let request = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_LENGTH, 0);
        let obj: GcsObject = self
            .send(request, "copy", OnMissing::Key(bucket, key))
            .await?
            .json()
            .await?;

        self.delete(bucket, key).await?;
        Ok(obj.into())
    }
}

/// Builds one `GcsBlobClient` per request around a shared HTTP client.
#[derive(Clone)]
pub struct GcsClientFactory {
    http: reqwest::Client,
    endpoint: String,
}

impl GcsClientFactory {
    pub fn new(endpoint: impl Into<String>) -> BlobResult<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

impl BlobClientFactory for GcsClientFactory {
    fn make_client(&self, credential: &Credential) -> BlobResult<Arc<dyn BlobClient>> {
        if credential.access_token.is_empty() {
            return Err(BlobError::Provider("missing access token".into()));
        }
        Ok(Arc::new(GcsBlobClient::new(
            self.http.clone(),
            &self.endpoint,
            credential,
        )))
    }
}
