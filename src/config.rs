// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`ServiceConfig`] loaded
//! from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the ledger database | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ALGORAND_NODE_URL` | algod REST endpoint | AlgoNode TestNet |
//! | `ALGORAND_NODE_TOKEN` | algod API token | none |
//! | `ALGORAND_APP_ID` | Relief contract app ID; `0` disables the indexer | `0` |
//! | `INDEXER_POLL_INTERVAL_SECS` | Seconds between indexer cycles | `5` |
//! | `INDEXER_LOOKBACK_ROUNDS` | Rounds behind head to start without a cursor | `100` |
//! | `INDEXER_MAX_ROUND_RETRIES` | Failures before a round is skipped | `5` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::algorand::ALGORAND_TESTNET;
use crate::indexer::{
    IndexerConfig, DEFAULT_LOOKBACK_ROUNDS, DEFAULT_MAX_ROUND_RETRIES, DEFAULT_POLL_INTERVAL,
};

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const ALGORAND_NODE_URL_ENV: &str = "ALGORAND_NODE_URL";
pub const ALGORAND_NODE_TOKEN_ENV: &str = "ALGORAND_NODE_TOKEN";
pub const ALGORAND_APP_ID_ENV: &str = "ALGORAND_APP_ID";
pub const INDEXER_POLL_INTERVAL_ENV: &str = "INDEXER_POLL_INTERVAL_SECS";
pub const INDEXER_LOOKBACK_ENV: &str = "INDEXER_LOOKBACK_ROUNDS";
pub const INDEXER_MAX_RETRIES_ENV: &str = "INDEXER_MAX_ROUND_RETRIES";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "" => Ok(LogFormat::Pretty),
            _ => Err(ConfigError::Invalid {
                var: LOG_FORMAT_ENV,
                value: raw.to_string(),
                reason: "expected `json` or `pretty`".to_string(),
            }),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub node_url: url::Url,
    pub node_token: Option<String>,
    /// `0` means the indexer is disabled.
    pub app_id: u64,
    pub poll_interval: Duration,
    pub lookback_rounds: u64,
    pub max_round_retries: u32,
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    var: HOST_ENV,
                    value: host.clone(),
                    reason: e.to_string(),
                })?;

        let raw_url =
            get(ALGORAND_NODE_URL_ENV).unwrap_or_else(|| ALGORAND_TESTNET.algod_url.to_string());
        let node_url = url::Url::parse(&raw_url).map_err(|e| ConfigError::Invalid {
            var: ALGORAND_NODE_URL_ENV,
            value: raw_url.clone(),
            reason: e.to_string(),
        })?;

        let poll_secs = parse_or(
            get(INDEXER_POLL_INTERVAL_ENV),
            INDEXER_POLL_INTERVAL_ENV,
            DEFAULT_POLL_INTERVAL.as_secs(),
        )?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                var: INDEXER_POLL_INTERVAL_ENV,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let max_round_retries = parse_or(
            get(INDEXER_MAX_RETRIES_ENV),
            INDEXER_MAX_RETRIES_ENV,
            DEFAULT_MAX_ROUND_RETRIES,
        )?
        .max(1);

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            bind_addr,
            node_url,
            node_token: get(ALGORAND_NODE_TOKEN_ENV),
            app_id: parse_or(get(ALGORAND_APP_ID_ENV), ALGORAND_APP_ID_ENV, 0)?,
            poll_interval: Duration::from_secs(poll_secs),
            lookback_rounds: parse_or(
                get(INDEXER_LOOKBACK_ENV),
                INDEXER_LOOKBACK_ENV,
                DEFAULT_LOOKBACK_ROUNDS,
            )?,
            max_round_retries,
            log_format: get(LOG_FORMAT_ENV)
                .map(|raw| LogFormat::parse(&raw))
                .transpose()?
                .unwrap_or_default(),
        })
    }

    pub fn indexer_enabled(&self) -> bool {
        self.app_id > 0
    }

    /// Indexer settings, if the indexer is enabled.
    pub fn indexer(&self) -> Option<IndexerConfig> {
        self.indexer_enabled().then(|| IndexerConfig {
            app_id: self.app_id,
            poll_interval: self.poll_interval,
            lookback_rounds: self.lookback_rounds,
            max_round_retries: self.max_round_retries,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.node_url.as_str(), "https://testnet-api.algonode.cloud/");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.lookback_rounds, 100);
        assert_eq!(config.max_round_retries, 5);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(!config.indexer_enabled());
        assert!(config.indexer().is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            (PORT_ENV, "9000"),
            (ALGORAND_APP_ID_ENV, "123456"),
            (ALGORAND_NODE_URL_ENV, "http://localhost:4001"),
            (ALGORAND_NODE_TOKEN_ENV, "aaaa"),
            (INDEXER_POLL_INTERVAL_ENV, "2"),
            (LOG_FORMAT_ENV, "JSON"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.node_token.as_deref(), Some("aaaa"));
        assert_eq!(config.log_format, LogFormat::Json);
        let indexer = config.indexer().unwrap();
        assert_eq!(indexer.app_id, 123456);
        assert_eq!(indexer.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = load(&[(ALGORAND_APP_ID_ENV, ""), (ALGORAND_NODE_TOKEN_ENV, " ")]).unwrap();
        assert_eq!(config.app_id, 0);
        assert_eq!(config.node_token, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            load(&[(ALGORAND_APP_ID_ENV, "abc")]),
            Err(ConfigError::Invalid { var: ALGORAND_APP_ID_ENV, .. })
        ));
        assert!(load(&[(ALGORAND_NODE_URL_ENV, "not a url")]).is_err());
        assert!(load(&[(INDEXER_POLL_INTERVAL_ENV, "0")]).is_err());
        assert!(load(&[(LOG_FORMAT_ENV, "xml")]).is_err());
    }
}
