// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted controller record and schema migration.
//!
//! ## Read path
//!
//! | marker          | current slot | legacy slot | result            |
//! |-----------------|--------------|-------------|-------------------|
//! | other           | -            | -           | unsupported schema|
//! | `1`, `2`, none  | present      | -           | read current slot |
//! | `1`, `2`, none  | absent       | present     | migrate           |
//! | `1`, `2`, none  | absent       | absent      | not provisioned   |
//!
//! The legacy slot carries no origin. It migrates only into an origin that
//! holds a legacy admin grant over the record's address; every other origin
//! sees not provisioned and the legacy data stays where it is.
//!
//! Missing or unreadable records are reported as not provisioned so callers
//! never see a half-built controller.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::blockchain::signing::{signer_from_hex, signer_to_pem};
use crate::error::{ControllerError, ControllerResult};
use crate::storage::{SchemaVersion, Store, VERSION_KEY};

use super::account::{AccountAddress, Deployment, Owner};
use super::session::Session;
use super::signature::ControllerVersion;

/// Serialized controller, stored as one value under one key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerRecord {
    pub address: AccountAddress,
    pub credential_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub version: ControllerVersion,
    /// PKCS#8 PEM of the device key.
    pub device_key: String,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Deployment>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for ControllerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRecord")
            .field("address", &self.address)
            .field("credential_id", &self.credential_id)
            .field("username", &self.username)
            .field("version", &self.version)
            .field("owners", &self.owners.len())
            .field("sessions", &self.sessions.len())
            .field("deployment", &self.deployment)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Record layout written by schema `V1`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    address: String,
    credential_id: String,
    #[serde(default)]
    username: Option<String>,
    private_key: String,
}

/// Value stored under an admin key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGrant {
    pub granted_at: DateTime<Utc>,
}

/// Load the record for `origin`, migrating legacy data on the way.
pub fn load_record(store: &dyn Store, origin: &str) -> ControllerResult<ControllerRecord> {
    if let Some(marker) = store.get(VERSION_KEY)? {
        if SchemaVersion::from_marker(&marker).is_none() {
            warn!(marker = %marker.trim(), "refusing to read unknown store schema");
            return Err(ControllerError::UnsupportedSchema(marker.trim().to_string()));
        }
    }

    let key = SchemaVersion::CURRENT.selectors().controller(origin);
    match store.get(&key)? {
        Some(raw) => parse_current(&raw, origin),
        None if store.contains(&SchemaVersion::V1.selectors().controller(origin))? => {
            migrate_v1(store, origin)
        }
        None => Err(ControllerError::NotProvisioned),
    }
}

/// Refuse to write over a schema this build cannot read.
pub fn ensure_writable_schema(store: &dyn Store) -> ControllerResult<()> {
    match store.get(VERSION_KEY)? {
        Some(marker) if SchemaVersion::from_marker(&marker).is_none() => {
            Err(ControllerError::UnsupportedSchema(marker.trim().to_string()))
        }
        _ => Ok(()),
    }
}

/// Write `record` under the current-schema key of `origin` and stamp the
/// schema marker.
pub fn persist_record(
    store: &dyn Store,
    origin: &str,
    record: &ControllerRecord,
) -> ControllerResult<()> {
    let key = SchemaVersion::CURRENT.selectors().controller(origin);
    let value = serde_json::to_string(record).map_err(crate::storage::StorageError::from)?;
    store.set(&key, &value)?;
    store.set(VERSION_KEY, &SchemaVersion::CURRENT.to_string())?;
    Ok(())
}

/// Whether the current-schema controller slot of `origin` is occupied.
pub fn record_exists(store: &dyn Store, origin: &str) -> ControllerResult<bool> {
    let key = SchemaVersion::CURRENT.selectors().controller(origin);
    Ok(store.contains(&key)?)
}

pub fn write_admin_grant(
    store: &dyn Store,
    address: &AccountAddress,
    origin: &str,
) -> ControllerResult<()> {
    let key = SchemaVersion::CURRENT
        .selectors()
        .admin(&address.to_string(), origin);
    let grant = AdminGrant {
        granted_at: Utc::now(),
    };
    let value = serde_json::to_string(&grant).map_err(crate::storage::StorageError::from)?;
    store.set(&key, &value)?;
    Ok(())
}

pub fn has_admin_grant(
    store: &dyn Store,
    address: &AccountAddress,
    origin: &str,
) -> ControllerResult<bool> {
    let key = SchemaVersion::CURRENT
        .selectors()
        .admin(&address.to_string(), origin);
    Ok(store.contains(&key)?)
}

/// Remove the binding of `origin` and the admin grants over `address`.
///
/// Grants held by other origins whose own binding is to the same account
/// are kept. Returns the number of grants removed.
pub fn remove_binding(
    store: &dyn Store,
    origin: &str,
    address: &AccountAddress,
) -> ControllerResult<usize> {
    let current = SchemaVersion::CURRENT.selectors();
    let account = address.to_string();

    let mut removed = 0usize;
    for key in store.keys()? {
        let Some((grant_address, grant_origin)) = current.parse_admin(&key) else {
            continue;
        };
        if grant_address != account {
            continue;
        }
        if grant_origin != origin && bound_to(store, &grant_origin, address)? {
            continue;
        }
        store.remove(&key)?;
        removed += 1;
    }

    store.remove(&current.controller(origin))?;
    Ok(removed)
}

/// Whether `origin` has a current-schema binding to `address`.
fn bound_to(store: &dyn Store, origin: &str, address: &AccountAddress) -> ControllerResult<bool> {
    let key = SchemaVersion::CURRENT.selectors().controller(origin);
    Ok(store
        .get(&key)?
        .and_then(|raw| serde_json::from_str::<ControllerRecord>(&raw).ok())
        .is_some_and(|record| record.address == *address))
}

fn parse_current(raw: &str, origin: &str) -> ControllerResult<ControllerRecord> {
    serde_json::from_str(raw).map_err(|e| {
        warn!(origin, error = %e, "controller record is unreadable");
        ControllerError::NotProvisioned
    })
}

/// Move the single legacy slot to the current layout under `origin`.
///
/// `origin` must hold a legacy admin grant over the record's address.
/// Legacy admin grants are carried over for every origin they named.
/// Migrated controllers keep signing with protocol `V1`.
fn migrate_v1(store: &dyn Store, origin: &str) -> ControllerResult<ControllerRecord> {
    let v1 = SchemaVersion::V1.selectors();
    let v2 = SchemaVersion::CURRENT.selectors();

    let raw = store
        .get(&v1.controller(origin))?
        .ok_or(ControllerError::NotProvisioned)?;
    let record = match upgrade_legacy(&raw) {
        Ok(record) => record,
        Err(e) => {
            warn!(origin, error = %e, "legacy controller record is unreadable");
            return Err(ControllerError::NotProvisioned);
        }
    };

    if !holds_legacy_grant(store, &record.address, origin)? {
        warn!(
            origin,
            address = %record.address,
            "legacy controller record belongs to another origin"
        );
        return Err(ControllerError::NotProvisioned);
    }

    persist_record(store, origin, &record)?;

    let mut moved = 0usize;
    for key in store.keys()? {
        let Some((address, grant_origin)) = v1.parse_admin(&key) else {
            continue;
        };
        let address: AccountAddress = match address.parse() {
            Ok(address) => address,
            Err(e) => {
                warn!(key = %key, error = %e, "dropping legacy admin grant with bad address");
                store.remove(&key)?;
                continue;
            }
        };
        let value = store.get(&key)?.unwrap_or_default();
        let value = match serde_json::from_str::<AdminGrant>(&value) {
            Ok(_) => value,
            Err(_) => serde_json::to_string(&AdminGrant {
                granted_at: record.created_at,
            })
            .map_err(crate::storage::StorageError::from)?,
        };
        store.set(&v2.admin(&address.to_string(), &grant_origin), &value)?;
        store.remove(&key)?;
        moved += 1;
    }

    store.remove(&v1.controller(origin))?;

    info!(
        origin,
        address = %record.address,
        admin_grants = moved,
        "migrated legacy controller record"
    );
    Ok(record)
}

fn holds_legacy_grant(
    store: &dyn Store,
    address: &AccountAddress,
    origin: &str,
) -> ControllerResult<bool> {
    let v1 = SchemaVersion::V1.selectors();
    Ok(store.keys()?.iter().any(|key| {
        v1.parse_admin(key).is_some_and(|(grant_address, grant_origin)| {
            grant_origin == origin
                && grant_address.parse::<AccountAddress>().ok().as_ref() == Some(address)
        })
    }))
}

fn upgrade_legacy(raw: &str) -> Result<ControllerRecord, String> {
    let legacy: LegacyRecord = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let address: AccountAddress = legacy.address.parse().map_err(|e| format!("{e}"))?;
    if legacy.credential_id.is_empty() {
        return Err("empty credential id".to_string());
    }
    let signer = signer_from_hex(&legacy.private_key).map_err(|e| e.to_string())?;
    let device_key = signer_to_pem(&signer).map_err(|e| e.to_string())?;

    Ok(ControllerRecord {
        address,
        credential_id: legacy.credential_id,
        username: legacy.username.filter(|name| !name.is_empty()),
        version: ControllerVersion::V1,
        device_key,
        owners: Vec::new(),
        sessions: Vec::new(),
        deployment: None,
        created_at: Utc::now(),
    })
}
