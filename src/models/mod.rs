//! Value types exchanged between the blob backends, the folder store and the
//! HTTP layer.
//!
//! None of these are persisted by the bridge itself. They are snapshots of
//! remote state, serialized as JSON via `serde`.

pub mod blob;
pub mod bucket;
pub mod credential;
pub mod listing;
