//! Supplies the credential each request is served with.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use crate::models::credential::{Credential, CredentialError};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self) -> Result<Credential, CredentialError>;
}

/// Serves a credential resolved once at startup.
#[derive(Clone, Debug)]
pub struct StaticCredentialProvider {
    credential: Option<Arc<Credential>>,
}

impl StaticCredentialProvider {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: Some(Arc::new(credential)),
        }
    }

    /// A provider that refuses every request.
    pub fn unconfigured() -> Self {
        Self { credential: None }
    }

    /// Read a JSON credentials file with `access_token`, `project_id` and `region_id`.
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading credentials file {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing credentials file {}", path.display()))?;
        let credential = Credential::from_value(&value)
            .with_context(|| format!("validating credentials file {}", path.display()))?;
        debug!("Loaded credentials for project {}", credential.project_id);
        Ok(Self::new(credential))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self) -> Result<Credential, CredentialError> {
        self.credential
            .as_deref()
            .cloned()
            .ok_or(CredentialError::Unconfigured)
    }
}
