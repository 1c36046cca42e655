//! Directory-style views derived from flat blob keys, plus the results of the
//! folder-store operations.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer, ser::SerializeSeq};
use serde_json::Value;

use super::blob::{BlobMeta, rfc3339_or_empty, serialize_time};

/// Content type written on zero-byte folder markers.
pub const FOLDER_MARKER_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// A virtual folder: a common prefix ending in `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    /// Latest `updated` among blobs nested under the prefix. Object stores keep
    /// no metadata on synthetic prefixes.
    pub updated: Option<DateTime<Utc>>,
}

/// One level of a bucket, as seen through the folder emulation.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    #[serde(serialize_with = "serialize_folders")]
    pub prefixes: Vec<FolderEntry>,
    #[serde(serialize_with = "serialize_files")]
    pub files: Vec<BlobMeta>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.files.is_empty()
    }
}

fn serialize_folders<S: Serializer>(folders: &[FolderEntry], s: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Inner<'a> {
        name: &'a str,
        #[serde(rename = "updatedAt")]
        updated_at: String,
    }
    #[derive(Serialize)]
    struct Envelope<'a> {
        prefixes: Inner<'a>,
    }

    let mut seq = s.serialize_seq(Some(folders.len()))?;
    for folder in folders {
        seq.serialize_element(&Envelope {
            prefixes: Inner {
                name: &folder.name,
                updated_at: rfc3339_or_empty(folder.updated),
            },
        })?;
    }
    seq.end()
}

fn serialize_files<S: Serializer>(files: &[BlobMeta], s: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Inner<'a> {
        name: &'a str,
        #[serde(rename = "timeCreated")]
        time_created: String,
        updated: String,
        size: u64,
        content_type: Option<&'a str>,
    }
    #[derive(Serialize)]
    struct Envelope<'a> {
        items: Inner<'a>,
    }

    let mut seq = s.serialize_seq(Some(files.len()))?;
    for file in files {
        seq.serialize_element(&Envelope {
            items: Inner {
                name: &file.key,
                time_created: rfc3339_or_empty(file.time_created),
                updated: rfc3339_or_empty(file.updated),
                size: file.size,
                content_type: file.content_type.as_deref(),
            },
        })?;
    }
    seq.end()
}

/// How `read` should present a blob's bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadFormat {
    Base64,
    Json,
    Text,
}

impl ReadFormat {
    /// Anything other than `base64` or `json` reads as plain text.
    pub fn parse(format: &str) -> Self {
        match format {
            "base64" => ReadFormat::Base64,
            "json" => ReadFormat::Json,
            _ => ReadFormat::Text,
        }
    }
}

/// The result of `read`.
#[derive(Clone, Debug, PartialEq)]
pub enum FileContent {
    Text(String),
    Base64(String),
    Json(Value),
    /// Read failed and the store degraded to an empty result.
    Empty,
}

impl Serialize for FileContent {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            FileContent::Text(text) | FileContent::Base64(text) => s.serialize_str(text),
            FileContent::Json(value) => value.serialize(s),
            // The front end treats an empty array as "nothing to show".
            FileContent::Empty => s.serialize_seq(Some(0))?.end(),
        }
    }
}

/// Content handed to `save`: text is written as-is, structured content is
/// serialized first.
#[derive(Clone, Debug, PartialEq)]
pub enum SaveContent {
    Text(String),
    Json(Value),
}

impl SaveContent {
    /// Serialized body and the content type it is written with.
    pub fn into_body(self) -> Result<(String, &'static str), serde_json::Error> {
        match self {
            SaveContent::Text(text) => Ok((text, "text/plain; charset=utf-8")),
            SaveContent::Json(value) => Ok((serde_json::to_string(&value)?, "application/json")),
        }
    }
}

impl From<String> for SaveContent {
    fn from(text: String) -> Self {
        SaveContent::Text(text)
    }
}

impl From<Value> for SaveContent {
    fn from(value: Value) -> Self {
        SaveContent::Json(value)
    }
}

/// Returned by a successful `save`.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    pub name: String,
    pub bucket: String,
    pub size: u64,
    pub content_type: Option<String>,
    #[serde(serialize_with = "serialize_time")]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_time")]
    pub updated: Option<DateTime<Utc>>,
    pub success: bool,
}

impl From<BlobMeta> for SaveReceipt {
    fn from(meta: BlobMeta) -> Self {
        Self {
            name: meta.key,
            bucket: meta.bucket,
            size: meta.size,
            content_type: meta.content_type,
            time_created: meta.time_created,
            updated: meta.updated,
            success: true,
        }
    }
}

/// Returned by a successful `rename`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RenameReceipt {
    pub name: String,
    pub bucket: String,
    pub success: bool,
    pub status: u16,
}

/// Full snapshot of a freshly written folder marker.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FolderCreated {
    pub name: String,
    pub bucket: String,
    pub id: String,
    pub kind: &'static str,
    pub media_link: Option<String>,
    pub self_link: Option<String>,
    pub generation: Option<i64>,
    pub metageneration: Option<i64>,
    pub content_type: &'static str,
    #[serde(serialize_with = "serialize_time")]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_time")]
    pub updated: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
    /// Always `"0"`; markers are empty by construction.
    pub size: &'static str,
    pub md5_hash: Option<String>,
    pub etag: Option<String>,
}

impl From<BlobMeta> for FolderCreated {
    fn from(meta: BlobMeta) -> Self {
        Self {
            name: meta.key,
            bucket: meta.bucket,
            id: meta.id,
            kind: "storage#object",
            media_link: meta.media_link,
            self_link: meta.self_link,
            generation: meta.generation,
            metageneration: meta.metageneration,
            content_type: FOLDER_MARKER_CONTENT_TYPE,
            time_created: meta.time_created,
            updated: meta.updated,
            storage_class: meta.storage_class,
            size: "0",
            md5_hash: meta.md5_hash,
            etag: meta.etag,
        }
    }
}
