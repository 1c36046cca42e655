pub mod blob_client;
pub mod bridge_service;
pub mod credentials;
pub mod disk_client;
pub mod folder_store;
pub mod gcs_client;
pub mod memory_client;
