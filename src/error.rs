// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::blockchain::{KeyError, ProviderError};
use crate::controller::{AddressError, LockError, SignatureError};
use crate::storage::StorageError;

/// Errors surfaced by controller operations.
///
/// Every variant maps to a stable snake_case code through
/// [`ControllerError::error_code`], which is what embedding applications
/// match on.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Controller is not provisioned")]
    NotProvisioned,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Provider error: {0}")]
    External(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unsupported store schema version: {0}")]
    UnsupportedSchema(String),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ControllerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ControllerError::NotProvisioned => "not_provisioned",
            ControllerError::Unauthorized(_) => "unauthorized",
            ControllerError::MalformedInput(_) => "malformed_input",
            ControllerError::External(_) => "external",
            ControllerError::Storage(_) => "storage",
            ControllerError::UnsupportedSchema(_) => "unsupported_schema",
            ControllerError::Lock(_) => "lock_timeout",
            ControllerError::Signing(_) => "signing",
            ControllerError::Encoding(_) => "encoding",
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ControllerError::MalformedInput(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ControllerError::Unauthorized(message.into())
    }
}

impl From<KeyError> for ControllerError {
    fn from(err: KeyError) -> Self {
        ControllerError::Signing(err.to_string())
    }
}

impl From<SignatureError> for ControllerError {
    fn from(err: SignatureError) -> Self {
        ControllerError::MalformedInput(err.to_string())
    }
}

impl From<AddressError> for ControllerError {
    fn from(err: AddressError) -> Self {
        ControllerError::MalformedInput(err.to_string())
    }
}

impl From<alloy::signers::Error> for ControllerError {
    fn from(err: alloy::signers::Error) -> Self {
        ControllerError::Signing(err.to_string())
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Transport-level rejection returned before a request reaches the
/// dispatcher.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
