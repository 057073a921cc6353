// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Wallet - Embedded Wallet Controller
//!
//! Authenticates a user's device, issues scoped session grants and signs
//! messages and transactions for an account without exposing its device
//! key to the embedding application.
//!
//! ## Modules
//!
//! - `api` - HTTP transport (Axum)
//! - `blockchain` - Chain provider and device key codec
//! - `controller` - Controller, signing lock, sessions, provisioning
//! - `dispatch` - Request/response dispatcher
//! - `storage` - Persistent key/value store (memory, redb)

pub mod api;
pub mod blockchain;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
