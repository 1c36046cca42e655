//! Request-scoped wiring: credential in, folder store out.

use std::sync::Arc;

use tracing::error;

use super::{
    blob_client::BlobClientFactory,
    credentials::CredentialProvider,
    folder_store::{FolderStore, StoreError, StoreOptions, StoreResult},
};

/// Shared router state. Holds no storage state of its own; every request
/// gets a fresh client from the factory.
#[derive(Clone)]
pub struct BridgeService {
    pub credentials: Arc<dyn CredentialProvider>,
    pub clients: Arc<dyn BlobClientFactory>,
    pub options: StoreOptions,
}

impl BridgeService {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        clients: Arc<dyn BlobClientFactory>,
        options: StoreOptions,
    ) -> Self {
        Self {
            credentials,
            clients,
            options,
        }
    }

    /// Resolve the credential and build a store for one request.
    pub async fn store(&self) -> StoreResult<FolderStore> {
        let credential = self.credentials.credential().await.map_err(|err| {
            error!("Error resolving credentials: {}", err);
            StoreError::Provider(err.to_string())
        })?;
        let client = self.clients.make_client(&credential).map_err(|err| {
            error!("Error building storage client: {}", err);
            StoreError::from(err)
        })?;
        Ok(FolderStore::new(client, self.options))
    }
}
