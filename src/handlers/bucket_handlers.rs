//! Bucket listing.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{errors::AppError, services::bridge_service::BridgeService};

#[derive(Debug, Deserialize)]
pub struct ListBucketsQuery {
    pub prefix: Option<String>,
}

/// `GET /api/storage/listBuckets?prefix=`, answering `[{"items": {"name", "updated"}}]`.
///
/// `prefix` must be present but may be empty.
pub async fn list_buckets(
    State(service): State<BridgeService>,
    Query(q): Query<ListBucketsQuery>,
) -> Response {
    let Some(prefix) = q.prefix else {
        return AppError::missing_params().into_response();
    };
    let prefix = Some(prefix.as_str()).filter(|p| !p.is_empty());

    let result = async {
        let store = service.store().await?;
        Ok::<_, AppError>(store.list_buckets(prefix).await?)
    }
    .await;

    match result {
        Ok(buckets) => Json(buckets).into_response(),
        Err(err) => err.into_soft_response(),
    }
}
