//! Represents a single blob (file or folder marker) stored in a bucket.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// A snapshot of one blob's metadata.
///
/// The struct never carries content bytes. Provider-specific fields are
/// optional because not every backend has a notion of them.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    /// Container-relative key, e.g. `reports/2025/q1.csv` or `reports/` for a marker.
    #[serde(rename = "name")]
    pub key: String,

    /// Bucket that holds the blob.
    pub bucket: String,

    /// `bucket/key`.
    pub id: String,

    /// Size in bytes.
    pub size: u64,

    pub content_type: Option<String>,

    #[serde(serialize_with = "serialize_time")]
    pub time_created: Option<DateTime<Utc>>,

    #[serde(serialize_with = "serialize_time")]
    pub updated: Option<DateTime<Utc>>,

    /// Base64 MD5 digest of the content.
    pub md5_hash: Option<String>,

    pub etag: Option<String>,

    pub generation: Option<i64>,

    pub metageneration: Option<i64>,

    pub storage_class: Option<String>,

    pub media_link: Option<String>,

    pub self_link: Option<String>,
}

impl BlobMeta {
    /// Minimal snapshot for a key; backends fill in what they know.
    pub fn new(bucket: &str, key: &str, size: u64) -> Self {
        Self {
            key: key.to_string(),
            bucket: bucket.to_string(),
            id: format!("{}/{}", bucket, key),
            size,
            ..Default::default()
        }
    }

    /// A zero-byte blob whose key ends in `/` stands in for an empty directory.
    pub fn is_folder_marker(&self) -> bool {
        self.size == 0 && self.key.ends_with('/')
    }
}

/// Format an optional timestamp the way the front end expects: RFC 3339,
/// or an empty string when unknown.
pub fn rfc3339_or_empty(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

pub(crate) fn serialize_time<S: Serializer>(
    ts: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&rfc3339_or_empty(*ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_detection_needs_slash_and_zero_size() {
        assert!(BlobMeta::new("b1", "a/", 0).is_folder_marker());
        assert!(!BlobMeta::new("b1", "a/", 3).is_folder_marker());
        assert!(!BlobMeta::new("b1", "a", 0).is_folder_marker());
    }

    #[test]
    fn serializes_with_front_end_field_names() {
        let meta = BlobMeta::new("b1", "a/x.txt", 10);
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["name"], "a/x.txt");
        assert_eq!(value["id"], "b1/a/x.txt");
        assert_eq!(value["timeCreated"], "");
        assert!(value.get("contentType").is_some());
    }
}
