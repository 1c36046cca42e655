use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{
    models::credential::CredentialError,
    services::{blob_client::BlobError, folder_store::StoreError},
};

pub const MISSING_PARAMS: &str = "Missing required parameters.";

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// 400 raised before any storage call when a required parameter is absent.
    pub fn missing_params() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MISSING_PARAMS)
    }

    /// Render as `200 {"error": ..}`.
    ///
    /// Read-only routes answer this way so the front end keeps its list or
    /// file view instead of an error page.
    pub fn into_soft_response(self) -> Response {
        (StatusCode::OK, Json(json!({ "error": self.message }))).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        AppError::new(status, err.to_string())
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        StoreError::from(err).into()
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_status() {
        let conflict = AppError::from(StoreError::Conflict("taken".into()));
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(conflict.message, "taken");

        let missing = AppError::from(StoreError::NotFound("gone".into()));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let provider = AppError::from(StoreError::Provider("boom".into()));
        assert_eq!(provider.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn lower_layer_errors_are_internal() {
        let blob = AppError::from(BlobError::Provider("quota".into()));
        assert_eq!(blob.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(blob.message, "quota");

        let credential = AppError::from(CredentialError::Missing("access_token"));
        assert_eq!(credential.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(credential.message.contains("access_token"));
    }

    #[test]
    fn soft_response_is_ok_status() {
        let resp = AppError::internal("boom").into_soft_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
