//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that resolves credentials and reaches the backend

use crate::services::bridge_service::BridgeService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Always 200. Performs no I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 1. Resolves the configured credential and builds a client from it.
/// 2. Lists buckets through that client.
///
/// HTTP 200 when both pass, 503 otherwise. The storage check is skipped
/// when the first one fails.
pub async fn readyz(State(service): State<BridgeService>) -> impl IntoResponse {
    let client = match service.credentials.credential().await {
        Ok(credential) => service
            .clients
            .make_client(&credential)
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let credentials_check = CheckStatus {
        ok: client.is_ok(),
        error: client.as_ref().err().cloned(),
    };

    let storage_check = match &client {
        Ok(client) => match client.list_buckets(None).await {
            Ok(_) => CheckStatus {
                ok: true,
                error: None,
            },
            Err(e) => CheckStatus {
                ok: false,
                error: Some(format!("error: {}", e)),
            },
        },
        Err(_) => CheckStatus {
            ok: false,
            error: Some("skipped".into()),
        },
    };

    let overall_ok = credentials_check.ok && storage_check.ok;

    let mut checks = HashMap::new();
    checks.insert("credentials", credentials_check);
    checks.insert("storage", storage_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        models::credential::Credential,
        routes::routes::routes,
        services::{
            credentials::StaticCredentialProvider, folder_store::StoreOptions,
            memory_client::MemoryClientFactory,
        },
    };

    fn service(configured: bool) -> BridgeService {
        let credentials = if configured {
            StaticCredentialProvider::new(Credential::placeholder())
        } else {
            StaticCredentialProvider::unconfigured()
        };
        BridgeService::new(
            Arc::new(credentials),
            Arc::new(MemoryClientFactory::default()),
            StoreOptions::default(),
        )
    }

    async fn probe(service: BridgeService, uri: &str) -> (StatusCode, Value) {
        let resp = routes()
            .with_state(service)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn healthz_is_always_ok() {
        let (status, body) = probe(service(false), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readyz_reports_each_check() {
        let (status, body) = probe(service(true), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["storage"]["ok"], true);

        let (status, body) = probe(service(false), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["credentials"]["ok"], false);
        assert_eq!(body["checks"]["credentials"]["error"], "no credentials configured");
    }
}
