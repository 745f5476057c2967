// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. Ledger records from
//! [`crate::storage`] are returned as-is where they already fit.
//!
//! ## Algorand Address Type
//!
//! [`AlgorandAddress`] wraps a 58-character base32 Algorand address. It is
//! validated on registration only; chain events are matched by exact string.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::{
    ActivitySource, BlockchainCard, CardAction, CardActivity, CrisisBadge, EmergencyCase,
    EventLogEntry, LedgerStatus, MobileTransaction, MobileTransactionType, MobileWallet,
    RemittanceLog, SkippedRound, TokenTransaction, UserRole, VirtualCard,
};

// =============================================================================
// Algorand Address Type
// =============================================================================

/// Length of an encoded Algorand address.
pub const ALGORAND_ADDRESS_LEN: usize = 58;

/// Algorand account address.
///
/// Format: 58 characters of RFC 4648 base32 (`A-Z`, `2-7`), no padding.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlgorandAddress(String);

impl AlgorandAddress {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.len() != ALGORAND_ADDRESS_LEN {
            return Err(format!(
                "Algorand address must be {ALGORAND_ADDRESS_LEN} characters, got {}",
                raw.len()
            ));
        }
        if !raw.bytes().all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b)) {
            return Err("Algorand address must be base32 (A-Z, 2-7)".to_string());
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlgorandAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AlgorandAddress> for String {
    fn from(value: AlgorandAddress) -> Self {
        value.0
    }
}

// =============================================================================
// Sync Event Models
// =============================================================================

/// Event posted by an external relay (or replayed by an operator).
///
/// Relays send `{event_type, event_data}` with the transaction context
/// (`algorandTxId`, `algorandSender`, `algorandRound`, `logIndex`) inside
/// `event_data`. The context may also be given at the top level, which wins.
/// Field values inside `event_data` may be strings or numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SyncEventRequest {
    /// Event tag, e.g. `FIAT_DEPOSIT`.
    #[serde(alias = "eventType")]
    pub event_type: Option<String>,
    /// Named event fields.
    #[serde(alias = "eventData")]
    #[schema(value_type = Object)]
    pub event_data: Option<serde_json::Map<String, serde_json::Value>>,
    /// Originating Algorand transaction ID.
    #[serde(alias = "algorandTxId", skip_serializing_if = "Option::is_none")]
    pub algorand_tx_id: Option<String>,
    /// Transaction sender; identifies the NGO or admin for privileged events.
    #[serde(alias = "algorandSender", skip_serializing_if = "Option::is_none")]
    pub algorand_sender: Option<String>,
    #[serde(alias = "algorandRound", skip_serializing_if = "Option::is_none")]
    pub algorand_round: Option<u64>,
    /// Position of the log within the transaction (default 0).
    #[serde(alias = "logIndex", skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u32>,
}

/// Result of applying a synced event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncEventResponse {
    pub success: bool,
    pub message: String,
    pub event_type: String,
    pub algorand_tx_id: String,
    /// True when the event had already been applied.
    pub duplicate: bool,
    /// Audit entry sequence number (absent for duplicates).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_seq: Option<u64>,
    #[schema(value_type = Object)]
    pub result: serde_json::Value,
}

/// Indexer cursor and dead-letter state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IndexerStatusResponse {
    pub enabled: bool,
    pub app_id: u64,
    /// Last fully processed round, once the indexer has run.
    pub last_processed_round: Option<u64>,
    pub skipped_rounds: Vec<SkippedRound>,
}

// =============================================================================
// User & Wallet Models
// =============================================================================

/// Request to register a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    pub wallet_address: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// Defaults to `user`.
    pub role: Option<UserRole>,
}

/// Balance of one token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TokenBalance {
    pub token: String,
    pub balance_micro: i64,
    /// Balance in human-readable format
    pub balance: String,
}

/// A user's off-chain wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub user_id: String,
    pub wallet_address: String,
    pub balances: Vec<TokenBalance>,
    pub virtual_cards: Vec<VirtualCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionListResponse {
    pub transactions: Vec<TokenTransaction>,
}

// =============================================================================
// Emergency Case Models
// =============================================================================

/// Request to open an emergency case.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateEmergencyCaseRequest {
    /// Wallet of the registered user asking for help.
    pub requester_wallet: String,
    pub crisis_type: String,
    /// 1 (low) to 5 (critical).
    pub severity: i64,
    pub description: Option<String>,
    /// Requested amount in micro-units.
    pub requested_amount_micro: u64,
}

/// A case with everything issued against it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmergencyCaseResponse {
    pub case: EmergencyCase,
    pub badges: Vec<CrisisBadge>,
    pub remittances: Vec<RemittanceLog>,
}

// =============================================================================
// Mobile Money Models
// =============================================================================

/// Country code assumed for local Samoan numbers.
const SAMOA_DIALING_CODE: &str = "685";

/// Phone number in E.164 form.
///
/// Local seven-digit numbers get the Samoan `+685` prefix; longer numbers
/// are prefixed with `+`. Anything else is kept as given.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let digits = raw.strip_prefix('+').unwrap_or(raw);
        let valid = (2..=15).contains(&digits.len())
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !digits.starts_with('0');
        if !valid {
            return Err("Invalid phone number format".to_string());
        }

        let normalized = match digits.len() {
            7 if !digits.starts_with(SAMOA_DIALING_CODE) => format!("+{SAMOA_DIALING_CODE}{digits}"),
            10 if digits.starts_with(SAMOA_DIALING_CODE) => format!("+{digits}"),
            n if n > 10 => format!("+{digits}"),
            _ => raw.to_string(),
        };
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Network operator guessed from the Samoan number prefix.
    pub fn provider(&self) -> MobileProvider {
        let digits = self.0.trim_start_matches('+');
        match digits.strip_prefix(SAMOA_DIALING_CODE).and_then(|rest| rest.chars().next()) {
            Some('2' | '6' | '8') => MobileProvider::Vodafone,
            _ => MobileProvider::Digicel,
        }
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

/// Mobile money operators in Samoa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MobileProvider {
    Digicel,
    Vodafone,
}

impl MobileProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MobileProvider::Digicel => "Digicel",
            MobileProvider::Vodafone => "Vodafone",
        }
    }
}

/// Request to send to or receive from a phone wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MobileMoneyRequest {
    pub user_id: String,
    #[serde(alias = "phoneNumber")]
    pub phone_number: String,
    /// Amount in micro-units (at least 0.01).
    #[serde(alias = "amountMicro")]
    pub amount_micro: u64,
    /// Defaults to `WST`.
    pub currency: Option<String>,
    /// Up to 100 characters.
    pub reference: Option<String>,
    /// Who is paying in. Required for receives.
    pub sender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MobileMoneyResponse {
    pub success: bool,
    pub transaction: MobileTransaction,
    pub new_balance_micro: i64,
    pub new_balance: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MobileWalletQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MobileWalletResponse {
    pub wallet: MobileWallet,
    pub balance_micro: i64,
    pub balance: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MobileTransactionQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(rename = "type")]
    pub transaction_type: Option<MobileTransactionType>,
    pub status: Option<LedgerStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MobileTransactionListResponse {
    pub transactions: Vec<MobileTransaction>,
    pub limit: usize,
    pub offset: usize,
}

// =============================================================================
// Blockchain Card Models
// =============================================================================

/// On-chain card state reported by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CardSyncRequest {
    #[serde(alias = "cardId")]
    pub card_id: String,
    #[serde(alias = "userAddress")]
    pub user_address: String,
    /// Balance in micro-units.
    #[serde(alias = "balanceMicro")]
    pub balance_micro: u64,
    /// Defaults to `ALGO`.
    pub currency: Option<String>,
    /// Defaults to `samoa`.
    pub region: Option<String>,
    #[serde(alias = "isActive")]
    pub is_active: Option<bool>,
    #[serde(alias = "transactionHash")]
    pub transaction_hash: Option<String>,
    #[serde(alias = "blockNumber")]
    pub block_number: Option<u64>,
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CardSyncResponse {
    pub success: bool,
    pub card: BlockchainCard,
    pub card_created: bool,
    pub balance_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_balance_micro: Option<u64>,
    pub action: CardAction,
    pub activity_seq: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardActivityQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Activity reported for a card outside of a full sync.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogCardActivityRequest {
    pub action: CardAction,
    #[serde(alias = "amountMicro", default)]
    pub amount_micro: u64,
    pub source: Option<ActivitySource>,
    #[serde(alias = "transactionHash")]
    pub transaction_hash: Option<String>,
    #[serde(alias = "blockNumber")]
    pub block_number: Option<u64>,
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CardActivityResponse {
    pub card_id: String,
    pub activity: Vec<CardActivity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserCardsQuery {
    pub active_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCardsResponse {
    pub user_address: String,
    pub cards: Vec<BlockchainCard>,
}

// =============================================================================
// Audit Models
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventListResponse {
    pub events: Vec<EventLogEntry>,
}
