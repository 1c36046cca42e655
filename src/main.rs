use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{AppConfig, Backend},
    models::credential::Credential,
    services::{
        blob_client::BlobClientFactory,
        bridge_service::BridgeService,
        credentials::StaticCredentialProvider,
        disk_client::{DiskBlobClient, DiskClientFactory},
        folder_store::StoreOptions,
        gcs_client::GcsClientFactory,
        memory_client::{MemoryBlobClient, MemoryClientFactory},
    },
};

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting bucket-bridge: backend={:?} addr={} strict_errors={}",
        cfg.backend,
        cfg.addr(),
        cfg.strict_errors
    );

    // --- Backend ---
    let clients: Arc<dyn BlobClientFactory> = match cfg.backend {
        Backend::Memory => {
            let store = MemoryBlobClient::new();
            for bucket in &cfg.buckets {
                store.create_bucket(bucket).await?;
                tracing::info!("Created in-memory bucket {}", bucket);
            }
            Arc::new(MemoryClientFactory::new(store))
        }
        Backend::Local => {
            let client = open_local_backend(&cfg).await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            for bucket in &cfg.buckets {
                client.ensure_bucket(bucket).await?;
            }
            Arc::new(DiskClientFactory::new(client))
        }
        Backend::Gcs => Arc::new(GcsClientFactory::new(cfg.gcs_endpoint.clone())?),
    };

    if migrate {
        tracing::warn!("--migrate only applies to the local backend; nothing to do.");
        return Ok(());
    }

    // --- Credentials ---
    let credentials = load_credentials(&cfg).await?;

    // --- Initialize core service ---
    let service = BridgeService::new(
        Arc::new(credentials),
        clients,
        StoreOptions {
            degrade_to_empty_on_error: !cfg.strict_errors,
        },
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Credentials file first, then `BRIDGE_ACCESS_TOKEN` and friends. Backends
/// that never reach a provider fall back to a placeholder.
async fn load_credentials(cfg: &AppConfig) -> Result<StaticCredentialProvider> {
    if let Some(path) = &cfg.credentials_file {
        return StaticCredentialProvider::from_file(path).await;
    }

    if let (Some(access_token), Some(project_id), Some(region_id)) =
        (&cfg.access_token, &cfg.project_id, &cfg.region_id)
    {
        return Ok(StaticCredentialProvider::new(Credential {
            access_token: access_token.clone(),
            project_id: project_id.clone(),
            region_id: region_id.clone(),
        }));
    }

    match cfg.backend {
        Backend::Memory | Backend::Local => {
            Ok(StaticCredentialProvider::new(Credential::placeholder()))
        }
        Backend::Gcs => {
            tracing::warn!(
                "No credentials configured; every storage request will fail until restart"
            );
            Ok(StaticCredentialProvider::unconfigured())
        }
    }
}

/// Prepare directories, connect to SQLite and apply the schema.
async fn open_local_backend(cfg: &AppConfig) -> Result<DiskBlobClient> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // SQLx will not create the file on its own for a plain URL.
    if !db_path.starts_with(":memory:") {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
            .with_context(|| format!("opening database file {}", db_path))?;
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    DiskBlobClient::migrate(&db).await?;
    tracing::info!("Database schema ready.");

    Ok(DiskBlobClient::new(db, cfg.storage_dir.clone()))
}
