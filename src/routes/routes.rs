//! Routes for the storage bridge.
//!
//! ## Structure
//! - **Bucket endpoints**
//!   - `GET    /api/storage/listBuckets`  — buckets visible to the credential
//!
//! - **File/folder endpoints**
//!   - `GET    /api/storage/listFiles`    — one folder level (files + sub-folders)
//!   - `GET    /api/storage/loadFile`     — file contents as text, JSON or base64
//!   - `GET    /api/storage/downloadFile` — raw bytes as an attachment
//!   - `POST   /api/storage/createFolder` — write a folder marker
//!   - `POST   /api/storage/saveFile`     — create or overwrite a file
//!   - `POST   /api/storage/renameFile`   — rename a file or empty folder
//!   - `DELETE /api/storage/deleteFile`   — delete a file or empty folder
//!
//! Health endpoints are mounted at the root.

use crate::{
    handlers::{
        bucket_handlers::list_buckets,
        file_handlers::{
            create_folder, delete_file, download_file, list_files, load_file, rename_file,
            save_file,
        },
        health_handlers::{healthz, readyz},
    },
    services::bridge_service::BridgeService,
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build the router. Every handler shares the `BridgeService` state.
pub fn routes() -> Router<BridgeService> {
    let storage = Router::new()
        .route("/listBuckets", get(list_buckets))
        .route("/listFiles", get(list_files))
        .route("/loadFile", get(load_file))
        .route("/downloadFile", get(download_file))
        .route("/createFolder", post(create_folder))
        .route("/saveFile", post(save_file))
        .route("/renameFile", post(rename_file))
        .route("/deleteFile", delete(delete_file));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/storage", storage)
}
