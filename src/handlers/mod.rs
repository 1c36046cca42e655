//! axum handlers. Each one resolves a `FolderStore` for the request, calls a
//! single store operation and maps the outcome to JSON.

pub mod bucket_handlers;
pub mod file_handlers;
pub mod health_handlers;
