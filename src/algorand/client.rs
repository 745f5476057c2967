// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Algorand node (algod) client used by the round indexer.

use std::future::Future;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use reqwest::header::{HeaderMap, HeaderValue};

use super::types::*;

/// Header algod expects the API token in.
const ALGOD_TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Default request timeout for algod calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Source of blocks for the indexer.
///
/// Implemented by [`AlgodClient`] in production and by in-memory fakes in tests.
pub trait ChainSource: Send + Sync {
    /// Latest round known to the node.
    fn current_round(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Fetch a full block with transaction IDs and decoded logs.
    fn block(&self, round: u64) -> impl Future<Output = Result<ChainBlock, ChainError>> + Send;
}

/// algod REST client.
pub struct AlgodClient {
    base_url: url::Url,
    http: reqwest::Client,
}

impl AlgodClient {
    /// Create a client for the given algod endpoint, with an optional API token.
    pub fn new(node_url: &str, api_token: Option<&str>) -> Result<Self, ChainError> {
        let mut base_url: url::Url = node_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidNodeUrl(e.to_string()))?;
        // Relative joins replace the last segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = api_token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(token)
                .map_err(|e| ChainError::InvalidNodeUrl(format!("invalid API token: {e}")))?;
            headers.insert(ALGOD_TOKEN_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Http(e.to_string()))?;

        Ok(Self { base_url, http })
    }

    /// Create a client for the public TestNet endpoint.
    pub fn testnet() -> Result<Self, ChainError> {
        Self::new(ALGORAND_TESTNET.algod_url, None)
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, ChainError> {
        self.base_url
            .join(path)
            .map_err(|e| ChainError::InvalidNodeUrl(e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))
    }
}

impl ChainSource for AlgodClient {
    fn current_round(&self) -> impl Future<Output = Result<u64, ChainError>> + Send {
        async move {
            let status: NodeStatusResponse = self.get_json("v2/status").await?;
            Ok(status.last_round)
        }
    }

    fn block(&self, round: u64) -> impl Future<Output = Result<ChainBlock, ChainError>> + Send {
        async move {
            let block: BlockResponse = self
                .get_json(&format!("v2/blocks/{round}?format=json"))
                .await?;
            let txids: BlockTxidsResponse =
                self.get_json(&format!("v2/blocks/{round}/txids")).await?;

            assemble_block(round, block.block, txids.block_txids)
        }
    }
}

/// Pair block transactions with their IDs and decode log lines.
///
/// algod returns transaction IDs in block order, so they are matched by position.
fn assemble_block(
    round: u64,
    raw: RawBlock,
    txids: Vec<String>,
) -> Result<ChainBlock, ChainError> {
    if txids.len() != raw.txns.len() {
        return Err(ChainError::Decode(format!(
            "round {round}: {} transactions but {} txids",
            raw.txns.len(),
            txids.len()
        )));
    }

    let mut transactions = Vec::with_capacity(raw.txns.len());
    for (signed, tx_id) in raw.txns.into_iter().zip(txids) {
        let encoded_logs = signed.dt.map(|dt| dt.lg).unwrap_or_default();
        let mut logs = Vec::with_capacity(encoded_logs.len());
        for line in &encoded_logs {
            let bytes = Base64::decode_vec(line).map_err(|e| {
                ChainError::Decode(format!("round {round}, tx {tx_id}: bad log encoding: {e}"))
            })?;
            logs.push(bytes);
        }

        transactions.push(BlockTransaction {
            tx_id,
            tx_type: signed.txn.tx_type,
            app_id: signed.txn.apid,
            sender: signed.txn.snd,
            logs,
        });
    }

    Ok(ChainBlock {
        round: if raw.round == 0 { round } else { raw.round },
        transactions,
    })
}

/// Errors talking to the Algorand node.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid node URL: {0}")]
    InvalidNodeUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Node returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),
}
