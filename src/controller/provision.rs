// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-shot device-key provisioning.

use std::sync::Arc;

use alloy::primitives::Address;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::blockchain::signing::{generate_device_signer, signer_to_pem};
use crate::blockchain::ChainProvider;
use crate::error::{ControllerError, ControllerResult};
use crate::storage::Store;

use super::account::AccountAddress;
use super::record::{self, ControllerRecord};
use super::signature::ControllerVersion;
use super::{Controller, ControllerSettings};

/// Binding requested by the embedding application. The address and
/// credential id come from an external verification step.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[schema(example = "0xabc")]
    pub address: String,
    #[schema(example = "cred-1")]
    pub credential_id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Public half of a freshly generated device key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevicePublicKey {
    #[schema(value_type = String)]
    pub address: AccountAddress,
    #[schema(value_type = String)]
    pub device_address: Address,
    /// Uncompressed SEC1 public key, 0x-prefixed hex.
    pub public_key: String,
}

/// Generate a device key, bind it to `request` under `origin`, and persist
/// the result together with an admin grant for `(address, origin)`.
///
/// Re-provisioning an origin replaces its record entirely, which revokes
/// every session issued under the previous binding.
pub fn provision(
    origin: &str,
    request: ProvisionRequest,
    store: Arc<dyn Store>,
    provider: Arc<dyn ChainProvider>,
    settings: ControllerSettings,
) -> ControllerResult<(Controller, DevicePublicKey)> {
    let origin = origin.trim();
    if origin.is_empty() {
        return Err(ControllerError::malformed("origin must not be empty"));
    }
    let address: AccountAddress = request.address.parse()?;
    let credential_id = request.credential_id.trim().to_string();
    if credential_id.is_empty() {
        return Err(ControllerError::malformed("credential id must not be empty"));
    }
    let username = request
        .username
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    record::ensure_writable_schema(store.as_ref())?;
    if record::record_exists(store.as_ref(), origin)? {
        warn!(
            origin,
            %address,
            "re-provisioning origin, previous binding and its sessions are replaced"
        );
    }

    let signer = generate_device_signer();
    let record = ControllerRecord {
        address,
        credential_id,
        username,
        version: ControllerVersion::LATEST,
        device_key: signer_to_pem(&signer)?,
        owners: Vec::new(),
        sessions: Vec::new(),
        deployment: None,
        created_at: Utc::now(),
    };

    record::persist_record(store.as_ref(), origin, &record)?;
    record::write_admin_grant(store.as_ref(), &address, origin)?;

    let controller = Controller::from_record(origin, record, store, provider, settings)?;
    let public = DevicePublicKey {
        address,
        device_address: controller.device_address(),
        public_key: controller.device_public_key(),
    };

    info!(
        origin,
        %address,
        device_address = %public.device_address,
        "controller provisioned"
    );
    Ok((controller, public))
}
