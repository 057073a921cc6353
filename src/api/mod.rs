// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    controller::{DevicePublicKey, ProvisionRequest},
    models::{
        AddOwnerParams, ErrorBody, EstimateFeeParams, GrantAdminParams, LogoutParams, Request,
        Response, RevokeSessionParams, SessionStatusParams, VerifyMessageHashParams,
    },
    state::AppState,
};

pub mod dispatch;
pub mod health;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/dispatch", post(dispatch::dispatch_message))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        dispatch::dispatch_message,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            Request,
            Response,
            ErrorBody,
            ProvisionRequest,
            DevicePublicKey,
            VerifyMessageHashParams,
            EstimateFeeParams,
            AddOwnerParams,
            RevokeSessionParams,
            SessionStatusParams,
            GrantAdminParams,
            LogoutParams,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Controller", description = "Wallet controller dispatch"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
