// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Message Dispatcher
//!
//! Maps a request envelope to one controller operation and wraps the
//! outcome in a response envelope. Every failure, including unknown
//! methods and undecodable params, comes back as `{ method, error }`.
//!
//! The dispatcher does no authorization of its own; operations such as
//! `logout` and `grant-admin` check admin grants themselves.
//!
//! `logout` takes an optional `{ "origin": ... }` naming the binding to
//! remove. An origin granted admin through `grant-admin` uses it to log out
//! the account bound to another origin.

use std::fmt;
use std::str::FromStr;

use alloy::dyn_abi::TypedData;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn, Instrument};

use crate::blockchain::DeployRequest;
use crate::controller::{ControllerSignature, ProvisionRequest, RegisterSessionRequest};
use crate::error::{ControllerError, ControllerResult};
use crate::models::{
    AddOwnerParams, EstimateFeeParams, GrantAdminParams, LogoutParams, Request, Response,
    RevokeSessionParams, SessionStatusParams, VerifyMessageHashParams,
};
use crate::state::AppState;

/// Methods understood by [`dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Probe,
    Address,
    Username,
    GetNonce,
    HashMessage,
    SignMessage,
    VerifyMessageHash,
    EstimateFee,
    DeployContract,
    AddOwner,
    RegisterSession,
    RevokeSession,
    SessionStatus,
    GrantAdmin,
    Provision,
    Logout,
}

impl Method {
    pub const ALL: [Method; 16] = [
        Method::Probe,
        Method::Address,
        Method::Username,
        Method::GetNonce,
        Method::HashMessage,
        Method::SignMessage,
        Method::VerifyMessageHash,
        Method::EstimateFee,
        Method::DeployContract,
        Method::AddOwner,
        Method::RegisterSession,
        Method::RevokeSession,
        Method::SessionStatus,
        Method::GrantAdmin,
        Method::Provision,
        Method::Logout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Probe => "probe",
            Method::Address => "address",
            Method::Username => "username",
            Method::GetNonce => "get-nonce",
            Method::HashMessage => "hash-message",
            Method::SignMessage => "sign-message",
            Method::VerifyMessageHash => "verify-message-hash",
            Method::EstimateFee => "estimate-fee",
            Method::DeployContract => "deploy-contract",
            Method::AddOwner => "add-owner",
            Method::RegisterSession => "register-session",
            Method::RevokeSession => "revoke-session",
            Method::SessionStatus => "session-status",
            Method::GrantAdmin => "grant-admin",
            Method::Provision => "provision",
            Method::Logout => "logout",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownMethod(s.to_string()))
    }
}

/// Dispatcher-level failure.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl DispatchError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::UnknownMethod(_) => "unknown_method",
            DispatchError::Controller(err) => err.error_code(),
        }
    }
}

/// Run `request` for `origin` and wrap the outcome.
pub async fn dispatch(state: &AppState, origin: &str, request: Request) -> Response {
    let span = tracing::info_span!("dispatch", origin, method = %request.method);
    let method_name = request.method.clone();

    let outcome = async {
        let method: Method = request.method.parse()?;
        let result = run(state, origin, method, request.params).await?;
        Ok::<_, DispatchError>(result)
    }
    .instrument(span.clone())
    .await;

    span.in_scope(|| match outcome {
        Ok(result) => {
            debug!("request handled");
            Response::ok(method_name, result)
        }
        Err(err) => {
            warn!(code = err.error_code(), error = %err, "request failed");
            Response::err(method_name, err.error_code(), err.to_string())
        }
    })
}

async fn run(
    state: &AppState,
    origin: &str,
    method: Method,
    params: Value,
) -> Result<Value, DispatchError> {
    // Everything except provisioning needs a provisioned controller
    let controller = || state.controller(origin);

    let result = match method {
        Method::Provision => {
            let request: ProvisionRequest = decode(params)?;
            to_json(&state.provision(origin, request).await?)?
        }
        Method::Probe => {
            let controller = controller().await?;
            json!({
                "address": controller.address(),
                "username": controller.username(),
                "version": controller.version(),
            })
        }
        Method::Address => json!(controller().await?.address()),
        Method::Username => json!(controller().await?.username()),
        Method::GetNonce => json!(controller().await?.get_nonce().await?),
        Method::HashMessage => {
            let typed: TypedData = decode(params)?;
            json!(controller().await?.hash_message(&typed)?)
        }
        Method::SignMessage => {
            let typed: TypedData = decode(params)?;
            to_json(&controller().await?.sign_message(&typed).await?)?
        }
        Method::VerifyMessageHash => {
            let params: VerifyMessageHashParams = decode(params)?;
            let hash = params.hash()?;
            let signature = ControllerSignature::from_words(&params.signature_words()?)
                .map_err(ControllerError::from)?;
            json!({ "valid": controller().await?.verify_message_hash(&hash, &signature).await? })
        }
        Method::EstimateFee => {
            let params: EstimateFeeParams = decode(params)?;
            to_json(&controller().await?.estimate_fee(&params.calls, &params.details).await?)?
        }
        Method::DeployContract => {
            let request: DeployRequest = decode(params)?;
            to_json(&controller().await?.deploy_contract(request).await?)?
        }
        Method::AddOwner => {
            let params: AddOwnerParams = decode(params)?;
            let (owner, authorization) =
                controller().await?.add_owner(params.signer, params.credential).await?;
            json!({ "owner": to_json(&owner)?, "authorization": to_json(&authorization)? })
        }
        Method::RegisterSession => {
            let request: RegisterSessionRequest = decode(params)?;
            let (session, authorization) = controller().await?.register_session(request).await?;
            json!({ "session": to_json(&session)?, "authorization": to_json(&authorization)? })
        }
        Method::RevokeSession => {
            let params: RevokeSessionParams = decode(params)?;
            to_json(&controller().await?.revoke_session(params.id).await?)?
        }
        Method::SessionStatus => {
            let params: SessionStatusParams = decode(params)?;
            let session = controller().await?.session_for(&params.calls).await;
            json!({ "authorized": session.is_some(), "session": to_json(&session)? })
        }
        Method::GrantAdmin => {
            let params: GrantAdminParams = decode(params)?;
            controller().await?.grant_admin(&params.origin).await?;
            json!({ "granted": params.origin.trim() })
        }
        Method::Logout => {
            let params: LogoutParams = decode_or_default(params)?;
            let target = params.origin.as_deref().map(str::trim).unwrap_or(origin);
            state.logout(origin, target).await?;
            json!(true)
        }
    };
    Ok(result)
}

fn decode<T: DeserializeOwned>(params: Value) -> ControllerResult<T> {
    serde_json::from_value(params)
        .map_err(|e| ControllerError::malformed(format!("invalid params: {e}")))
}

/// Like [`decode`], with `null` params meaning all defaults.
fn decode_or_default<T: DeserializeOwned + Default>(params: Value) -> ControllerResult<T> {
    if params.is_null() {
        Ok(T::default())
    } else {
        decode(params)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> ControllerResult<Value> {
    Ok(serde_json::to_value(value)?)
}
