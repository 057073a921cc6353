// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM JSON-RPC implementation of [`ChainProvider`].

use alloy::{
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    primitives::{Address, U256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use super::provider::{
    Call, ChainProvider, DeployRequest, DeployResult, FeeDetails, FeeEstimate, ProviderError,
};
use crate::controller::AccountAddress;

/// HTTP provider type (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Base fee assumed when the latest block does not report one (25 gwei).
const FALLBACK_BASE_FEE: u128 = 25_000_000_000;

/// Default priority fee (1.5 gwei).
const DEFAULT_PRIORITY_FEE: u128 = 1_500_000_000;

/// Chain client over HTTP JSON-RPC.
pub struct RpcProvider {
    rpc_url: url::Url,
    provider: HttpProvider,
}

impl RpcProvider {
    /// Create a new client for the given RPC endpoint.
    pub fn new(rpc_url: &str) -> Result<Self, ProviderError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ProviderError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url.clone());

        Ok(Self {
            rpc_url: url,
            provider,
        })
    }

    /// RPC endpoint this client talks to.
    pub fn rpc_url(&self) -> &url::Url {
        &self.rpc_url
    }

    /// Current (max fee, priority fee) pair.
    async fn gas_prices(&self, priority_override: Option<u128>) -> Result<(u128, u128), ProviderError> {
        let block = self
            .provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ProviderError::RpcError(format!("Failed to get block: {}", e)))?
            .ok_or_else(|| ProviderError::RpcError("No latest block".to_string()))?;

        let base_fee: u128 = block
            .header
            .base_fee_per_gas
            .map(|f| f as u128)
            .unwrap_or(FALLBACK_BASE_FEE);

        let priority_fee = priority_override.unwrap_or(DEFAULT_PRIORITY_FEE);

        // Max fee = 2 * base_fee + priority_fee (allows for base fee increase)
        let max_fee = base_fee.saturating_mul(2).saturating_add(priority_fee);

        Ok((max_fee, priority_fee))
    }
}

#[async_trait]
impl ChainProvider for RpcProvider {
    async fn get_nonce(&self, address: &AccountAddress) -> Result<u64, ProviderError> {
        self.provider
            .get_transaction_count(address.evm_address())
            .await
            .map_err(|e| ProviderError::RpcError(e.to_string()))
    }

    async fn estimate_fee(
        &self,
        address: &AccountAddress,
        calls: &[Call],
        details: &FeeDetails,
    ) -> Result<FeeEstimate, ProviderError> {
        let from = address.evm_address();
        let mut gas_limit: u64 = 0;

        for call in calls {
            let mut tx = TransactionRequest::default()
                .from(from)
                .to(call.to)
                .input(call.data.clone().into())
                .value(call.value);
            if let Some(nonce) = details.nonce {
                tx = tx.nonce(nonce);
            }

            let gas = self
                .provider
                .estimate_gas(tx)
                .await
                .map_err(|e| ProviderError::RpcError(format!("Gas estimation failed: {}", e)))?;
            gas_limit = gas_limit.saturating_add(gas);
        }

        let (max_fee_per_gas, max_priority_fee_per_gas) =
            self.gas_prices(details.max_priority_fee_per_gas).await?;

        Ok(FeeEstimate {
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            overall_fee: U256::from(gas_limit) * U256::from(max_fee_per_gas),
        })
    }

    async fn deploy(
        &self,
        signer: &PrivateKeySigner,
        request: &DeployRequest,
    ) -> Result<DeployResult, ProviderError> {
        let from: Address = signer.address();
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone());

        let (max_fee_per_gas, priority_fee) = self.gas_prices(None).await?;

        let mut tx = TransactionRequest::default()
            .from(from)
            .into_create()
            .input(request.bytecode.clone().into())
            .value(request.value)
            .max_fee_per_gas(max_fee_per_gas)
            .max_priority_fee_per_gas(priority_fee);

        if let Some(limit) = request.gas_limit {
            tx = tx.gas_limit(limit);
        }

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| ProviderError::TransactionFailed(format!("Failed to send: {}", e)))?;

        Ok(DeployResult {
            transaction_hash: *pending.tx_hash(),
        })
    }
}
