//! The credential consumed (never produced) by the bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("missing required credential `{0}`")]
    Missing(&'static str),
    #[error("credential `{0}` must be a string")]
    NotAString(&'static str),
    #[error("credentials must be a JSON object")]
    NotAnObject,
    #[error("no credentials configured")]
    Unconfigured,
}

/// Access token plus the project/region it is scoped to.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub project_id: String,
    pub region_id: String,
}

const REQUIRED_KEYS: [&str; 3] = ["access_token", "project_id", "region_id"];

impl Credential {
    /// Build a credential from a loosely-typed JSON object.
    ///
    /// Fails on the first missing key rather than producing a half-filled value.
    pub fn from_value(value: &Value) -> Result<Self, CredentialError> {
        let obj = value.as_object().ok_or(CredentialError::NotAnObject)?;
        for key in REQUIRED_KEYS {
            if !obj.contains_key(key) {
                return Err(CredentialError::Missing(key));
            }
        }

        let field = |key: &'static str| -> Result<String, CredentialError> {
            obj[key]
                .as_str()
                .map(str::to_string)
                .ok_or(CredentialError::NotAString(key))
        };

        Ok(Self {
            access_token: field("access_token")?,
            project_id: field("project_id")?,
            region_id: field("region_id")?,
        })
    }

    /// Credential used by backends that never talk to a real provider.
    pub fn placeholder() -> Self {
        Self {
            access_token: String::new(),
            project_id: "local".into(),
            region_id: "local".into(),
        }
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("region_id", &self.region_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_from_complete_object() {
        let cred = Credential::from_value(&json!({
            "access_token": "ya29.token",
            "project_id": "proj",
            "region_id": "us-central1",
        }))
        .unwrap();
        assert_eq!(cred.project_id, "proj");
        assert_eq!(cred.region_id, "us-central1");
    }

    #[test]
    fn fails_fast_on_missing_key() {
        let err = Credential::from_value(&json!({
            "access_token": "ya29.token",
            "region_id": "us-central1",
        }))
        .unwrap_err();
        assert!(matches!(err, CredentialError::Missing("project_id")));
    }

    #[test]
    fn rejects_non_objects_and_non_strings() {
        assert!(matches!(
            Credential::from_value(&json!(["a"])),
            Err(CredentialError::NotAnObject)
        ));
        assert!(matches!(
            Credential::from_value(&json!({
                "access_token": 1, "project_id": "p", "region_id": "r"
            })),
            Err(CredentialError::NotAString("access_token"))
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let cred = Credential {
            access_token: "secret".into(),
            project_id: "p".into(),
            region_id: "r".into(),
        };
        assert!(!format!("{:?}", cred).contains("secret"));
    }
}
