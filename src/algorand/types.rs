// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Algorand block types, network constants and micro-unit helpers.

use serde::Deserialize;

/// Micro-units per whole unit (1 ALGO = 1,000,000 microAlgos).
pub const MICRO_UNITS: u64 = 1_000_000;

/// Transaction type tag for application calls.
pub const APP_CALL_TX_TYPE: &str = "appl";

/// Algorand network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Default algod endpoint
    pub algod_url: &'static str,
}

/// Algorand TestNet via the public AlgoNode endpoint.
pub const ALGORAND_TESTNET: NetworkConfig = NetworkConfig {
    name: "Algorand TestNet",
    algod_url: "https://testnet-api.algonode.cloud",
};

/// Algorand MainNet via the public AlgoNode endpoint.
pub const ALGORAND_MAINNET: NetworkConfig = NetworkConfig {
    name: "Algorand MainNet",
    algod_url: "https://mainnet-api.algonode.cloud",
};

/// Convert micro-units to a decimal currency amount.
pub fn micro_to_decimal(micro: u64) -> f64 {
    micro as f64 / MICRO_UNITS as f64
}

/// Format a signed micro-unit amount (a balance) as a decimal string.
pub fn format_micro(micro: i64) -> String {
    let sign = if micro < 0 { "-" } else { "" };
    format!("{sign}{}", format_micro_unsigned(micro.unsigned_abs()))
}

/// Format a micro-unit amount as a human-readable decimal string.
///
/// Trailing zeros are trimmed but at least one fractional digit is kept,
/// so `5_000_000` renders as `"5.0"` and `1` as `"0.000001"`.
pub fn format_micro_unsigned(micro: u64) -> String {
    let whole = micro / MICRO_UNITS;
    let frac = micro % MICRO_UNITS;

    let frac_str = format!("{frac:06}");
    let trimmed = frac_str.trim_end_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };

    format!("{whole}.{trimmed}")
}

/// A block as seen by the indexer: only the fields reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub round: u64,
    pub transactions: Vec<BlockTransaction>,
}

/// A top-level transaction inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransaction {
    /// Transaction ID (base32).
    pub tx_id: String,
    /// Transaction type tag (`pay`, `appl`, ...).
    pub tx_type: String,
    /// Application ID for application calls.
    pub app_id: Option<u64>,
    /// Sender address.
    pub sender: String,
    /// Raw (already base64-decoded) log lines emitted by the application.
    pub logs: Vec<Vec<u8>>,
}

impl BlockTransaction {
    /// Whether this transaction is an application call to `app_id`.
    pub fn is_app_call_to(&self, app_id: u64) -> bool {
        self.tx_type == APP_CALL_TX_TYPE && self.app_id == Some(app_id)
    }
}

// =============================================================================
// algod wire format
// =============================================================================

/// `GET /v2/status` response (fields we use).
#[derive(Debug, Deserialize)]
pub struct NodeStatusResponse {
    #[serde(rename = "last-round")]
    pub last_round: u64,
}

/// `GET /v2/blocks/{round}?format=json` response.
#[derive(Debug, Deserialize)]
pub struct BlockResponse {
    pub block: RawBlock,
}

#[derive(Debug, Deserialize)]
pub struct RawBlock {
    #[serde(rename = "rnd", default)]
    pub round: u64,
    #[serde(default)]
    pub txns: Vec<RawSignedTxn>,
}

#[derive(Debug, Deserialize)]
pub struct RawSignedTxn {
    pub txn: RawTxn,
    #[serde(default)]
    pub dt: Option<RawEvalDelta>,
}

#[derive(Debug, Deserialize)]
pub struct RawTxn {
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(default)]
    pub apid: Option<u64>,
    #[serde(default)]
    pub snd: String,
}

#[derive(Debug, Deserialize)]
pub struct RawEvalDelta {
    /// Base64-encoded log lines.
    #[serde(default)]
    pub lg: Vec<String>,
}

/// `GET /v2/blocks/{round}/txids` response.
#[derive(Debug, Deserialize)]
pub struct BlockTxidsResponse {
    #[serde(rename = "blockTxids", default)]
    pub block_txids: Vec<String>,
}
