//! HTTP handlers for the folder-emulation operations.
//!
//! Read-only routes (`listFiles`, `loadFile`) answer `200 {"error"}` on an
//! unexpected fault; mutating routes answer with the store error's own status.

use axum::{
    Form, Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::AppError,
    models::listing::{ReadFormat, SaveContent},
    services::{bridge_service::BridgeService, folder_store::StoreError},
};

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoadFileQuery {
    pub bucket: Option<String>,
    pub path: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderReq {
    pub bucket: Option<String>,
    #[serde(default)]
    pub path: String,
    pub folder_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveFileForm {
    pub bucket: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub contents: String,
    pub upload: Option<String>,
    /// `json` stores the contents as `application/json` after validating them.
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub bucket: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFileReq {
    pub bucket: Option<String>,
    pub path: Option<String>,
    pub new_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub bucket: Option<String>,
    pub path: Option<String>,
    pub name: Option<String>,
}

/// A present, non-empty value.
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `GET /api/storage/listFiles?bucket=&prefix=`
pub async fn list_files(
    State(service): State<BridgeService>,
    Query(q): Query<ListFilesQuery>,
) -> Response {
    let (Some(bucket), Some(prefix)) = (required(q.bucket), q.prefix) else {
        return AppError::missing_params().into_response();
    };

    let result = async {
        let store = service.store().await?;
        Ok::<_, AppError>(store.list(&bucket, &prefix).await?)
    }
    .await;

    match result {
        Ok(listing) => Json(listing).into_response(),
        Err(err) => err.into_soft_response(),
    }
}

/// `GET /api/storage/loadFile?bucket=&path=&format=`
pub async fn load_file(
    State(service): State<BridgeService>,
    Query(q): Query<LoadFileQuery>,
) -> Response {
    let (Some(bucket), Some(path), Some(format)) = (required(q.bucket), required(q.path), q.format)
    else {
        return AppError::missing_params().into_response();
    };

    let result = async {
        let store = service.store().await?;
        Ok::<_, AppError>(store.read(&bucket, &path, ReadFormat::parse(&format)).await?)
    }
    .await;

    match result {
        Ok(content) => Json(content).into_response(),
        Err(err) => err.into_soft_response(),
    }
}

/// `POST /api/storage/createFolder` with `{bucket, path?, folderName}`.
pub async fn create_folder(
    State(service): State<BridgeService>,
    Json(req): Json<CreateFolderReq>,
) -> Result<Response, AppError> {
    let (Some(bucket), Some(folder_name)) = (required(req.bucket), required(req.folder_name))
    else {
        return Err(AppError::missing_params());
    };

    let store = service.store().await?;
    let created = store.create_folder(&bucket, &req.path, &folder_name).await?;
    Ok(Json(created).into_response())
}

/// `POST /api/storage/saveFile` (form body). `upload` must be present:
/// `true` refuses to overwrite, any other value saves over the existing file.
pub async fn save_file(
    State(service): State<BridgeService>,
    Form(form): Form<SaveFileForm>,
) -> Result<Response, AppError> {
    let (Some(bucket), Some(path), Some(upload)) =
        (required(form.bucket), required(form.path), required(form.upload))
    else {
        return Err(AppError::missing_params());
    };
    let upload = upload == "true";
    let content = match form.format.as_deref() {
        Some("json") => serde_json::from_str::<serde_json::Value>(&form.contents)
            .map(SaveContent::from)
            .map_err(|err| {
                AppError::new(StatusCode::BAD_REQUEST, format!("Invalid JSON contents: {}", err))
            })?,
        _ => SaveContent::from(form.contents),
    };

    let store = service.store().await?;
    match store.save(&bucket, &path, content, upload).await {
        Ok(receipt) => Ok(Json(receipt).into_response()),
        Err(StoreError::Conflict(message)) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "name": path,
                "bucket": bucket,
                "exists": true,
                "success": false,
                "error": message,
                "status": StatusCode::CONFLICT.as_u16(),
            })),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

/// `DELETE /api/storage/deleteFile?bucket=&path=`
///
/// An empty `path` addresses the bucket root and is refused by the store.
pub async fn delete_file(
    State(service): State<BridgeService>,
    Query(q): Query<PathQuery>,
) -> Result<Response, AppError> {
    let (Some(bucket), Some(path)) = (required(q.bucket), q.path) else {
        return Err(AppError::missing_params());
    };

    let store = service.store().await?;
    store.delete(&bucket, &path).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

/// `POST /api/storage/renameFile` with `{bucket, path, newPath}`.
pub async fn rename_file(
    State(service): State<BridgeService>,
    Json(req): Json<RenameFileReq>,
) -> Result<Response, AppError> {
    let (Some(bucket), Some(path), Some(new_path)) =
        (required(req.bucket), required(req.path), required(req.new_path))
    else {
        return Err(AppError::missing_params());
    };

    let store = service.store().await?;
    let receipt = store.rename(&bucket, &path, &new_path).await?;
    Ok(Json(receipt).into_response())
}

/// `GET /api/storage/downloadFile?bucket=&path=&name=` returns raw bytes as an attachment.
pub async fn download_file(
    State(service): State<BridgeService>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let (Some(bucket), Some(path)) = (required(q.bucket), required(q.path)) else {
        return Err(AppError::missing_params());
    };

    let store = service.store().await?;
    let bytes = store.download(&bucket, &path).await?;

    let filename = required(q.name)
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(&path).to_string());
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    Ok(response)
}
