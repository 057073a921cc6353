// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain provider collaborator.
//!
//! The controller never talks to a node directly. Everything that needs the
//! chain goes through [`ChainProvider`], which performs no retries of its
//! own; callers decide what to do with a failure.

use alloy::{
    primitives::{Address, Bytes, B256, U256},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::controller::AccountAddress;

/// A single contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Target contract.
    pub to: Address,
    /// ABI-encoded call data (selector first).
    #[serde(default)]
    pub data: Bytes,
    /// Native value attached to the call.
    #[serde(default)]
    pub value: U256,
}

impl Call {
    /// 4-byte function selector, if the call data carries one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data
            .get(..4)
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
    }
}

/// Optional overrides for fee estimation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeDetails {
    /// Nonce to simulate with; the provider's pending nonce when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Priority fee override (wei).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Fee estimation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    /// Estimated gas for all calls together
    pub gas_limit: u64,
    /// Max fee per gas (base fee headroom + priority fee)
    pub max_fee_per_gas: u128,
    /// Max priority fee per gas (tip)
    pub max_priority_fee_per_gas: u128,
    /// Upper bound of the total fee in wei
    pub overall_fee: U256,
}

/// Contract deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Creation bytecode, constructor arguments appended.
    pub bytecode: Bytes,
    /// Native value sent with the deployment.
    #[serde(default)]
    pub value: U256,
    /// Gas limit override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// Deployment submission result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// Hash of the submitted transaction.
    pub transaction_hash: B256,
}

/// Errors that can occur while talking to the chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

/// External chain collaborator.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Next valid sequence number of `address`.
    async fn get_nonce(&self, address: &AccountAddress) -> Result<u64, ProviderError>;

    /// Simulate `calls` sent from `address` and price them.
    async fn estimate_fee(
        &self,
        address: &AccountAddress,
        calls: &[Call],
        details: &FeeDetails,
    ) -> Result<FeeEstimate, ProviderError>;

    /// Submit a contract deployment signed by `signer`.
    async fn deploy(
        &self,
        signer: &PrivateKeySigner,
        request: &DeployRequest,
    ) -> Result<DeployResult, ProviderError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_needs_four_bytes() {
        let mut call = Call {
            to: Address::ZERO,
            data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, 0x00]),
            value: U256::ZERO,
        };
        assert_eq!(call.selector(), Some([0xa9, 0x05, 0x9c, 0xbb]));

        call.data = Bytes::from(vec![0xa9, 0x05]);
        assert_eq!(call.selector(), None);
    }

    #[test]
    fn call_deserializes_with_defaults() {
        let call: Call =
            serde_json::from_str(r#"{"to":"0x0000000000000000000000000000000000000001"}"#).unwrap();
        assert!(call.data.is_empty());
        assert_eq!(call.value, U256::ZERO);
    }
}
