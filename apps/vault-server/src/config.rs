// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and [`VaultConfig::from_env`].
//! A `.env` file in the working directory is loaded first when present.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind IP (IPv4 or IPv6 literal) | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory for `vault.redb` and the key file | unset (in-memory) |
//! | `FHE_KEY_PATH` | PEM key file, generated if missing | `$DATA_DIR/vault_key.pem` |
//! | `STABLE_RPC_URL` | Chain RPC endpoint | `https://rpc.testnet.stable.xyz` |
//! | `CHAIN_ID` | Chain id | `2201` |
//! | `PRIVATE_KEY` | Anchor signer (hex) | Required with `CONTRACT_ADDRESS` |
//! | `CONTRACT_ADDRESS` | Deployed `ConfidentialVault` | unset (simulated) |
//! | `COMMIT_BATCH_SIZE` | Max operations per commitment | `64` |
//! | `COMMIT_INTERVAL_SECS` | Anchor worker period | `10` |
//! | `COMMIT_MAX_RETRIES` | Attempts per commitment | `5` |
//! | `COMMIT_POLL_MILLIS` | Receipt poll period | `2000` |
//! | `COMMIT_CONFIRM_TIMEOUT_SECS` | Wait per attempt | `60` |
//! | `COMMIT_AUTO_REQUEUE` | Re-queue uncommitted batches each sweep | `true` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | Serve HTTPS with these PEM files | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::anchor::AnchorSettings;
use crate::blockchain::{ChainConfig, STABLE_TESTNET_CHAIN_ID, STABLE_TESTNET_RPC};
use crate::logging::LogFormat;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const FHE_KEY_PATH_ENV: &str = "FHE_KEY_PATH";
pub const RPC_URL_ENV: &str = "STABLE_RPC_URL";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
pub const CONTRACT_ADDRESS_ENV: &str = "CONTRACT_ADDRESS";
pub const COMMIT_BATCH_SIZE_ENV: &str = "COMMIT_BATCH_SIZE";
pub const COMMIT_INTERVAL_ENV: &str = "COMMIT_INTERVAL_SECS";
pub const COMMIT_MAX_RETRIES_ENV: &str = "COMMIT_MAX_RETRIES";
pub const COMMIT_POLL_ENV: &str = "COMMIT_POLL_MILLIS";
pub const COMMIT_CONFIRM_TIMEOUT_ENV: &str = "COMMIT_CONFIRM_TIMEOUT_SECS";
pub const COMMIT_AUTO_REQUEUE_ENV: &str = "COMMIT_AUTO_REQUEUE";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// File name of the ledger journal inside `DATA_DIR`.
pub const JOURNAL_FILE: &str = "vault.redb";

/// File name of the vault key inside `DATA_DIR`.
pub const KEY_FILE: &str = "vault_key.pem";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0} is required when {1} is set")]
    Missing(&'static str, &'static str),
}

#[derive(Debug, Clone)]
pub struct CommitConfig {
    pub batch_size: usize,
    pub interval: Duration,
    pub auto_requeue: bool,
    pub anchor: AnchorSettings,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone)]
pub struct VaultConfig {
    pub bind: SocketAddr,
    pub data_dir: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub chain: ChainConfig,
    pub private_key: Option<String>,
    pub commit: CommitConfig,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("bind", &self.bind)
            .field("data_dir", &self.data_dir)
            .field("key_path", &self.key_path)
            .field("chain", &self.chain)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("commit", &self.commit)
            .field("tls", &self.tls)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl VaultConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host: IpAddr = parse_or(get(HOST_ENV), HOST_ENV, IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = parse_or(get(PORT_ENV), PORT_ENV, 8080)?;
        let bind = SocketAddr::new(host, port);

        let data_dir = get(DATA_DIR_ENV).map(PathBuf::from);
        let key_path = get(FHE_KEY_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| data_dir.as_ref().map(|d| d.join(KEY_FILE)));

        let contract_address = get(CONTRACT_ADDRESS_ENV)
            .map(|v| Address::from_str(&v).map_err(|e| invalid(CONTRACT_ADDRESS_ENV, e)))
            .transpose()?;
        let private_key = get(PRIVATE_KEY_ENV);
        if contract_address.is_some() && private_key.is_none() {
            return Err(ConfigError::Missing(PRIVATE_KEY_ENV, CONTRACT_ADDRESS_ENV));
        }

        let rpc_url = get(RPC_URL_ENV).unwrap_or_else(|| STABLE_TESTNET_RPC.to_string());
        url::Url::parse(&rpc_url).map_err(|e| invalid(RPC_URL_ENV, e))?;

        let chain = ChainConfig {
            name: if contract_address.is_some() {
                "Stable".to_string()
            } else {
                "Stable (simulated)".to_string()
            },
            chain_id: parse_or(get(CHAIN_ID_ENV), CHAIN_ID_ENV, STABLE_TESTNET_CHAIN_ID)?,
            rpc_url,
            contract_address,
        };

        let commit = CommitConfig {
            batch_size: positive(
                parse_or(get(COMMIT_BATCH_SIZE_ENV), COMMIT_BATCH_SIZE_ENV, 64usize)?,
                COMMIT_BATCH_SIZE_ENV,
            )?,
            interval: Duration::from_secs(positive(
                parse_or(get(COMMIT_INTERVAL_ENV), COMMIT_INTERVAL_ENV, 10u64)?,
                COMMIT_INTERVAL_ENV,
            )?),
            auto_requeue: parse_bool(get(COMMIT_AUTO_REQUEUE_ENV), COMMIT_AUTO_REQUEUE_ENV, true)?,
            anchor: AnchorSettings {
                max_retries: positive(
                    parse_or(get(COMMIT_MAX_RETRIES_ENV), COMMIT_MAX_RETRIES_ENV, 5u32)?,
                    COMMIT_MAX_RETRIES_ENV,
                )?,
                poll_interval: Duration::from_millis(positive(
                    parse_or(get(COMMIT_POLL_ENV), COMMIT_POLL_ENV, 2000u64)?,
                    COMMIT_POLL_ENV,
                )?),
                confirm_timeout: Duration::from_secs(positive(
                    parse_or(get(COMMIT_CONFIRM_TIMEOUT_ENV), COMMIT_CONFIRM_TIMEOUT_ENV, 60u64)?,
                    COMMIT_CONFIRM_TIMEOUT_ENV,
                )?),
            },
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV, TLS_CERT_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV)),
        };

        let log_format = get(LOG_FORMAT_ENV)
            .map(|v| LogFormat::from_str_lossy(&v))
            .unwrap_or(LogFormat::Pretty);

        Ok(Self {
            bind,
            data_dir,
            key_path,
            chain,
            private_key,
            commit,
            tls,
            log_format,
        })
    }

    pub fn journal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(JOURNAL_FILE))
    }
}

fn invalid(name: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.parse().map_err(|e| invalid(name, e)),
        None => Ok(default),
    }
}

fn positive<T: PartialEq + Default>(value: T, name: &'static str) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(invalid(name, "must be greater than zero"));
    }
    Ok(value)
}

fn parse_bool(raw: Option<String>, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(invalid(name, format!("expected a boolean, got `{other}`"))),
    }
}
