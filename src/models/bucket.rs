//! Represents a bucket, the top-level container for blobs.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A bucket as reported by the storage provider.
///
/// Buckets are created and destroyed by the provider; the bridge only lists them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketSummary {
    /// Globally unique bucket name.
    pub name: String,

    /// When the bucket was last updated, if the provider reports it.
    pub updated: Option<DateTime<Utc>>,
}

/// Wire shape expected by the front end: `{"items": {"name", "updated"}}`.
impl Serialize for BucketSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Items<'a> {
            name: &'a str,
            updated: String,
        }

        #[derive(Serialize)]
        struct Envelope<'a> {
            items: Items<'a>,
        }

        Envelope {
            items: Items {
                name: &self.name,
                updated: super::blob::rfc3339_or_empty(self.updated),
            },
        }
        .serialize(serializer)
    }
}
