// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain integration for the controller.
//!
//! This module provides:
//! - The [`ChainProvider`] collaborator used for nonce queries, fee
//!   estimation and contract deployment
//! - An EVM JSON-RPC implementation of it ([`RpcProvider`])
//! - Device key generation and encoding ([`signing`])

pub mod client;
pub mod provider;
pub mod signing;

pub use client::RpcProvider;
pub use provider::{
    Call, ChainProvider, DeployRequest, DeployResult, FeeDetails, FeeEstimate, ProviderError,
};
pub use signing::KeyError;

/// Default RPC endpoint (Avalanche Fuji Testnet).
pub const DEFAULT_RPC_URL: &str = "https://api.avax-test.network/ext/bc/C/rpc";

/// Chain id matching [`DEFAULT_RPC_URL`].
pub const DEFAULT_CHAIN_ID: u64 = 43113;
