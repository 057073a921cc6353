// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Store write-read-delete probe.
    pub store: String,
    /// Number of controllers currently held in memory.
    pub active_controllers: usize,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness check.
///
/// Returns 200 when the store is reachable, 503 otherwise.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = match state.store.health_check() {
        Ok(()) => "ok".to_string(),
        Err(err) => {
            tracing::error!(error = %err, "store health check failed");
            "unavailable".to_string()
        }
    };
    let all_ok = store == "ok";

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            store,
            active_controllers: state.active_controllers().await,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use `/health` for that.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::provider::mock::MockProvider;
    use crate::blockchain::ChainProvider;
    use crate::controller::ControllerSettings;
    use crate::storage::{StorageError, StorageResult, Store};
    use std::sync::Arc;

    struct BrokenStore;

    impl Store for BrokenStore {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
        fn remove(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
        fn clear(&self) -> StorageResult<()> {
            Ok(())
        }
        fn keys(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn healthy_store_reports_ok() {
        let state = AppState::in_memory(Arc::new(MockProvider::default()));
        let (status, Json(body)) = health(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.store, "ok");
        // The probe leaves nothing behind
        assert!(state.store.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broken_store_is_unavailable() {
        let provider: Arc<dyn ChainProvider> = Arc::new(MockProvider::default());
        let state = AppState::new(Arc::new(BrokenStore), provider, ControllerSettings::default());
        let (status, Json(body)) = health(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.checks.store, "unavailable");
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let Json(body) = liveness().await;
        assert_eq!(body.status, "ok");
    }
}
