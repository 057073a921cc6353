// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session grants and their policies.
//!
//! A session lets a short-lived key act for the account on a limited set of
//! `(target, method)` pairs until it expires. The owner authorizes a session
//! by signing the EIP-712 hash of a [`SessionGrant`].

use std::borrow::Cow;

use alloy::{
    primitives::{keccak256, Address, B256, U256},
    sol,
    sol_types::Eip712Domain,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blockchain::Call;
use crate::error::{ControllerError, ControllerResult};

use super::AccountAddress;

/// Method wildcard: any function on the target.
pub const ANY_METHOD: &str = "*";

/// EIP-712 domain name used for controller authorizations.
const DOMAIN_NAME: &str = "WalletController";

sol! {
    /// Owner authorization of a session key.
    struct SessionGrant {
        address sessionKey;
        uint64 expiresAt;
        bytes32 policiesRoot;
    }

    /// Owner authorization of an additional owner.
    struct OwnerGrant {
        bytes32 controller;
        address signer;
        bytes32 credentialHash;
    }
}

/// EIP-712 domain binding authorizations to one controller on one chain.
pub fn authorization_domain(chain_id: u64, address: &AccountAddress) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(DOMAIN_NAME)),
        Some(Cow::Borrowed("2")),
        Some(U256::from(chain_id)),
        Some(address.evm_address()),
        None,
    )
}

/// A single `(target, method)` permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy {
    pub target: Address,
    /// Function signature such as `transfer(address,uint256)`, or `*`.
    pub method: String,
}

impl Policy {
    pub fn new(target: Address, method: impl Into<String>) -> Self {
        Self {
            target,
            method: method.into(),
        }
    }

    /// 4-byte selector of the method, `None` for the wildcard.
    pub fn selector(&self) -> Option<[u8; 4]> {
        if self.method == ANY_METHOD {
            return None;
        }
        let hash = keccak256(self.method.as_bytes());
        Some([hash[0], hash[1], hash[2], hash[3]])
    }

    /// Whether this policy allows `call`.
    pub fn permits(&self, call: &Call) -> bool {
        if call.to != self.target {
            return false;
        }
        match self.selector() {
            None => true,
            Some(selector) => call.selector() == Some(selector),
        }
    }

    fn validate(&self) -> ControllerResult<()> {
        if self.method == ANY_METHOD {
            return Ok(());
        }
        let well_formed = match self.method.split_once('(') {
            Some((name, rest)) => {
                !name.is_empty()
                    && rest.ends_with(')')
                    && !self.method.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if well_formed {
            Ok(())
        } else {
            Err(ControllerError::malformed(format!(
                "policy method must be a function signature or '*', got '{}'",
                self.method
            )))
        }
    }

    fn leaf(&self) -> B256 {
        let mut buf = Vec::with_capacity(20 + 32);
        buf.extend_from_slice(self.target.as_slice());
        buf.extend_from_slice(keccak256(self.method.as_bytes()).as_slice());
        keccak256(buf)
    }
}

/// Validate policies and drop duplicates, keeping first-seen order.
pub fn normalize_policies(policies: Vec<Policy>) -> ControllerResult<Vec<Policy>> {
    if policies.is_empty() {
        return Err(ControllerError::malformed(
            "a session needs at least one policy",
        ));
    }
    let mut out: Vec<Policy> = Vec::with_capacity(policies.len());
    for policy in policies {
        policy.validate()?;
        if !out.contains(&policy) {
            out.push(policy);
        }
    }
    Ok(out)
}

/// Commitment to an ordered policy list.
pub fn policies_root(policies: &[Policy]) -> B256 {
    let mut buf = Vec::with_capacity(policies.len() * 32);
    for policy in policies {
        buf.extend_from_slice(policy.leaf().as_slice());
    }
    keccak256(buf)
}

/// Registered session grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub session_key: Address,
    pub policies: Vec<Policy>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether every call is covered by at least one policy.
    pub fn permits(&self, calls: &[Call]) -> bool {
        !calls.is_empty()
            && calls
                .iter()
                .all(|call| self.policies.iter().any(|policy| policy.permits(call)))
    }

    /// Struct the owner signs to authorize this session.
    pub fn grant(&self) -> SessionGrant {
        SessionGrant {
            sessionKey: self.session_key,
            expiresAt: self.expires_at.timestamp().max(0) as u64,
            policiesRoot: policies_root(&self.policies),
        }
    }
}

/// Parameters of `register_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSessionRequest {
    pub session_key: Address,
    pub policies: Vec<Policy>,
    /// Expiry; `issued_at + session duration` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RegisterSessionRequest {
    /// Turn the request into a grant issued at `now`.
    pub fn into_session(
        self,
        now: DateTime<Utc>,
        default_duration: TimeDelta,
    ) -> ControllerResult<Session> {
        if self.session_key == Address::ZERO {
            return Err(ControllerError::malformed("session key must not be zero"));
        }
        let policies = normalize_policies(self.policies)?;
        let expires_at = match self.expires_at {
            Some(expires_at) => expires_at,
            None => now
                .checked_add_signed(default_duration)
                .ok_or_else(|| ControllerError::malformed("session duration is out of range"))?,
        };
        if expires_at <= now {
            return Err(ControllerError::malformed(
                "session expiry must be in the future",
            ));
        }
        Ok(Session {
            id: Uuid::new_v4(),
            session_key: self.session_key,
            policies,
            issued_at: now,
            expires_at,
        })
    }
}
