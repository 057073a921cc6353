// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account identifiers and owner descriptors.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chain account identifier: a 32-byte word, rendered as 0x-prefixed
/// 64-digit lowercase hex.
///
/// Parsing accepts any 0x-prefixed hex value of up to 64 digits and
/// left-pads it, so `0xABC` and `0x0...0abc` are the same account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountAddress(B256);

/// Errors raised while parsing an [`AccountAddress`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address has no digits")]
    Empty,
    #[error("address is longer than 64 hex digits")]
    TooLong,
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),
}

impl AccountAddress {
    pub fn from_word(word: B256) -> Self {
        Self(word)
    }

    pub fn as_word(&self) -> &B256 {
        &self.0
    }

    /// Low 20 bytes, for EVM RPC calls.
    pub fn evm_address(&self) -> Address {
        Address::from_word(self.0)
    }
}

impl FromStr for AccountAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .strip_prefix("0x")
            .or_else(|| s.trim().strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if digits.is_empty() {
            return Err(AddressError::Empty);
        }
        if digits.len() > 64 {
            return Err(AddressError::TooLong);
        }
        let value = U256::from_str_radix(digits, 16)
            .map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Ok(Self(B256::from(value.to_be_bytes::<32>())))
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for AccountAddress {
    fn from(address: Address) -> Self {
        Self(address.into_word())
    }
}

impl Serialize for AccountAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Kind of external authenticator a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// Platform authenticator (passkey)
    Webauthn,
    /// Recovery credential held off-device
    Recovery,
    /// Another device key
    Device,
}

/// Binding between an owner signer and an external authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDescriptor {
    /// Opaque credential identifier.
    pub id: String,
    pub kind: CredentialKind,
    /// Encoded public key of the authenticator, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Additional owner registered through `add_owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub signer: Address,
    pub credential: CredentialDescriptor,
    pub added_at: DateTime<Utc>,
}

/// Record of the account contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub transaction_hash: B256,
    pub deployed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_addresses_are_left_padded() {
        let short: AccountAddress = "0xABC".parse().unwrap();
        let long: AccountAddress =
            "0x0000000000000000000000000000000000000000000000000000000000000abc"
                .parse()
                .unwrap();
        assert_eq!(short, long);
        assert_eq!(
            short.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000abc"
        );
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        assert_eq!("abc".parse::<AccountAddress>(), Err(AddressError::MissingPrefix));
        assert_eq!("0x".parse::<AccountAddress>(), Err(AddressError::Empty));
        assert_eq!(
            format!("0x{}", "1".repeat(65)).parse::<AccountAddress>(),
            Err(AddressError::TooLong)
        );
        assert!(matches!(
            "0xnothex".parse::<AccountAddress>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_uses_padded_hex() {
        let address: AccountAddress = "0x1".parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(
            json,
            "\"0x0000000000000000000000000000000000000000000000000000000000000001\""
        );
        let back: AccountAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn evm_address_uses_low_bytes() {
        let evm = Address::repeat_byte(0x11);
        let account = AccountAddress::from(evm);
        assert_eq!(account.evm_address(), evm);
    }
}
