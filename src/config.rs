// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the controller database | `/data` |
//! | `HOST` | Server bind IP (IPv4 or IPv6) | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `RPC_URL` | Chain JSON-RPC endpoint | Avalanche Fuji |
//! | `CHAIN_ID` | Chain id used in EIP-712 domains | `43113` |
//! | `SESSION_DURATION_SECS` | Default session lifetime | `604800` (7 days) |
//! | `LOCK_TIMEOUT_MS` | Bound on waiting for the signing lock | unbounded |
//! | `ALLOWED_ORIGINS` | Comma separated origin whitelist | any origin |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;

use crate::blockchain::{DEFAULT_CHAIN_ID, DEFAULT_RPC_URL};
use crate::controller::{ControllerSettings, DEFAULT_SESSION_DURATION};

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const SESSION_DURATION_ENV: &str = "SESSION_DURATION_SECS";
pub const LOCK_TIMEOUT_ENV: &str = "LOCK_TIMEOUT_MS";
pub const ALLOWED_ORIGINS_ENV: &str = "ALLOWED_ORIGINS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
/// Upper bound on `SESSION_DURATION_SECS` (10 years).
pub const MAX_SESSION_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;
/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub rpc_url: String,
    pub allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
    pub controller: ControllerSettings,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.into()));

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host: IpAddr = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|e| invalid(HOST_ENV, e))?;
        let port: u16 = parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;
        let bind_addr = SocketAddr::new(host, port);

        let rpc_url = get(RPC_URL_ENV).unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        url::Url::parse(&rpc_url).map_err(|e| invalid(RPC_URL_ENV, e))?;

        let chain_id: u64 = parse_or(get(CHAIN_ID_ENV), CHAIN_ID_ENV, DEFAULT_CHAIN_ID)?;

        let session_duration = match get(SESSION_DURATION_ENV) {
            None => DEFAULT_SESSION_DURATION,
            Some(raw) => {
                let secs: i64 = raw.parse().map_err(|e| invalid(SESSION_DURATION_ENV, e))?;
                if secs <= 0 {
                    return Err(invalid(SESSION_DURATION_ENV, "must be positive"));
                }
                if secs > MAX_SESSION_DURATION_SECS {
                    return Err(invalid(
                        SESSION_DURATION_ENV,
                        format!("must be at most {MAX_SESSION_DURATION_SECS}"),
                    ));
                }
                TimeDelta::try_seconds(secs)
                    .ok_or_else(|| invalid(SESSION_DURATION_ENV, "out of range"))?
            }
        };

        let lock_timeout = match get(LOCK_TIMEOUT_ENV) {
            None => None,
            Some(raw) => {
                let millis: u64 = raw.parse().map_err(|e| invalid(LOCK_TIMEOUT_ENV, e))?;
                Some(Duration::from_millis(millis))
            }
        };

        let allowed_origins = get(ALLOWED_ORIGINS_ENV).map(|raw| {
            raw.split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        });

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(invalid(
                    LOG_FORMAT_ENV,
                    format!("expected 'json' or 'pretty', got '{other}'"),
                ))
            }
        };

        Ok(Self {
            data_dir,
            bind_addr,
            rpc_url,
            allowed_origins,
            log_format,
            controller: ControllerSettings {
                chain_id,
                session_duration,
                lock_timeout,
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| invalid(name, e)),
    }
}

fn invalid(name: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}
