// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde_json::Value;

use crate::{
    dispatch::dispatch,
    error::{ApiError, ControllerError},
    models::{Request, Response},
    state::AppState,
};

/// Calling application's origin, taken from the `Origin` header.
fn request_origin(headers: &HeaderMap) -> Result<String, ApiError> {
    let origin = headers
        .get(header::ORIGIN)
        .ok_or_else(|| ApiError::bad_request("Missing Origin header"))?
        .to_str()
        .map_err(|_| ApiError::bad_request("Origin header is not valid ASCII"))?
        .trim();
    if origin.is_empty() || origin == "null" {
        return Err(ApiError::bad_request("Opaque or empty origin"));
    }
    Ok(origin.to_string())
}

/// Decode the request envelope. A body that does not decode is answered
/// with a `malformed_input` envelope, carrying the method when it is known.
fn parse_request(body: &[u8]) -> Result<Request, Response> {
    let reject = |method: String, err: ControllerError| {
        Response::err(method, err.error_code(), err.to_string())
    };
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        reject(
            String::new(),
            ControllerError::malformed(format!("invalid request body: {e}")),
        )
    })?;
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    serde_json::from_value(value).map_err(|e| {
        reject(
            method,
            ControllerError::malformed(format!("invalid request envelope: {e}")),
        )
    })
}

/// Run one controller method on behalf of the calling origin.
///
/// Once the origin is accepted the reply is always 200; controller and
/// dispatcher failures are reported inside the envelope.
#[utoipa::path(
    post,
    path = "/v1/dispatch",
    request_body = Request,
    tag = "Controller",
    params(
        ("Origin" = String, Header, description = "Origin of the embedding application")
    ),
    responses(
        (status = 200, description = "Response envelope", body = Response),
        (status = 400, description = "Missing or opaque Origin header"),
        (status = 403, description = "Origin is not allowed")
    )
)]
pub async fn dispatch_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let origin = request_origin(&headers)?;
    if !state.origin_allowed(&origin) {
        tracing::warn!(origin = %origin, "rejected request from unlisted origin");
        return Err(ApiError::forbidden(format!("Origin {origin} is not allowed")));
    }
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => {
            tracing::warn!(origin = %origin, "undecodable request envelope");
            return Ok(Json(response));
        }
    };
    Ok(Json(dispatch(&state, &origin, request).await))
}
