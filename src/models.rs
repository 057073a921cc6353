// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Dispatch Data Models
//!
//! Request/response envelopes exchanged with embedding applications, and
//! the parameter shapes of the methods that take structured input.
//!
//! ## Envelopes
//!
//! ```text
//! request:  { "method": "sign-message", "params": { ... } }
//! success:  { "method": "sign-message", "result": ... }
//! failure:  { "method": "sign-message", "error": { "code": "...", "message": "..." } }
//! ```
//!
//! `payload` is accepted as an alias of `params`. A response never carries
//! both `result` and `error`.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::blockchain::{Call, FeeDetails};
use crate::controller::CredentialDescriptor;
use crate::error::{ControllerError, ControllerResult};

// =============================================================================
// Envelopes
// =============================================================================

/// Message sent by the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Request {
    /// Method name, e.g. `get-nonce`.
    #[schema(example = "probe")]
    pub method: String,
    /// Method parameters; `null` for methods without input.
    #[serde(default, alias = "payload")]
    #[schema(value_type = Object)]
    pub params: Value,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Machine-readable failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorBody {
    /// Stable snake_case code, e.g. `not_provisioned`.
    pub code: String,
    pub message: String,
}

/// Reply to a [`Request`]: exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Response {
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(method: impl Into<String>, result: Value) -> Self {
        Self {
            method: method.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(method: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            result: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// =============================================================================
// Method Parameters
// =============================================================================

/// `verify-message-hash` input. Words may be short hex (`0x1`) and are
/// left-padded to 32 bytes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyMessageHashParams {
    #[schema(example = "0xbe609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2")]
    pub hash: String,
    pub signature: Vec<String>,
}

impl VerifyMessageHashParams {
    /// Hash as a 32-byte word. Anything but exactly 64 hex digits is
    /// malformed.
    pub fn hash(&self) -> ControllerResult<B256> {
        self.hash
            .trim()
            .parse::<B256>()
            .map_err(|e| ControllerError::malformed(format!("invalid message hash: {e}")))
    }

    pub fn signature_words(&self) -> ControllerResult<Vec<B256>> {
        self.signature.iter().map(|word| parse_word(word)).collect()
    }
}

fn parse_word(raw: &str) -> ControllerResult<B256> {
    let raw = raw.trim();
    if !(raw.starts_with("0x") || raw.starts_with("0X")) {
        return Err(ControllerError::malformed(format!(
            "signature word '{raw}' must be 0x-prefixed hex"
        )));
    }
    let value: U256 = raw
        .parse()
        .map_err(|e| ControllerError::malformed(format!("invalid signature word '{raw}': {e}")))?;
    Ok(B256::from(value.to_be_bytes::<32>()))
}

/// `estimate-fee` input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EstimateFeeParams {
    #[schema(value_type = Vec<Object>)]
    pub calls: Vec<Call>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: FeeDetails,
}

/// `add-owner` input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddOwnerParams {
    #[schema(value_type = String)]
    pub signer: Address,
    #[schema(value_type = Object)]
    pub credential: CredentialDescriptor,
}

/// `revoke-session` input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RevokeSessionParams {
    pub id: Uuid,
}

/// `session-status` input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionStatusParams {
    #[schema(value_type = Vec<Object>)]
    pub calls: Vec<Call>,
}

/// `grant-admin` input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GrantAdminParams {
    #[schema(example = "https://partner.example")]
    pub origin: String,
}

/// `logout` input. Without `origin` the requesting origin logs itself out.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LogoutParams {
    /// Origin whose binding is removed; the caller needs an admin grant over
    /// that origin's account.
    #[serde(default)]
    #[schema(example = "https://app.example")]
    pub origin: Option<String>,
}
